use super::*;
use tokio::time::sleep;

fn ms(v: u64) -> Duration { Duration::from_millis(v) }

fn logo() -> TriggerId { TriggerId::new("brand-logo") }

fn detector(hold_ms: u64) -> (ActivationDetector, Arc<Mutex<Vec<Activation>>>) {
    let seen: Arc<Mutex<Vec<Activation>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let cfg = ActivationConfig { hold: ms(hold_ms), ..Default::default() };
    let det = ActivationDetector::new(cfg, [logo(), TriggerId::new("footer-mark")], move |a| sink.lock().push(a)).unwrap();
    (det, seen)
}

fn press(p: PointerKind) -> InputEvent { InputEvent::PressStart { trigger: logo(), pointer: p } }
fn release(p: PointerKind) -> InputEvent { InputEvent::PressEnd { trigger: logo(), pointer: p } }

fn chord(repeat: bool) -> InputEvent {
    InputEvent::KeyDown(KeyEvent { key: "L".into(), ctrl: true, shift: true, repeat, ..Default::default() })
}

#[tokio::test(start_paused = true)]
async fn hold_past_threshold_fires_once() {
    let (det, seen) = detector(1200);
    assert_eq!(det.handle(press(PointerKind::Mouse)), Disposition::Tracked);
    sleep(ms(1300)).await;
    assert_eq!(*seen.lock(), vec![Activation::LongPress(logo())]);
    assert_eq!(det.pending(), 0);
    sleep(ms(5000)).await;
    det.handle(release(PointerKind::Mouse));
    assert_eq!(seen.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn early_release_never_fires() {
    let (det, seen) = detector(1200);
    det.handle(press(PointerKind::Mouse));
    sleep(ms(900)).await;
    det.handle(release(PointerKind::Mouse));
    assert_eq!(det.pending(), 0);
    sleep(ms(3000)).await;
    assert!(seen.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn release_exactly_at_threshold_fires() {
    let (det, seen) = detector(1200);
    det.handle(press(PointerKind::Touch));
    sleep(ms(1200)).await;
    det.handle(release(PointerKind::Touch));
    sleep(ms(1000)).await;
    assert_eq!(seen.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn short_taps_never_accumulate() {
    let (det, seen) = detector(700);
    for _ in 0..40 {
        det.handle(press(PointerKind::Mouse));
        sleep(ms(650)).await;
        det.handle(release(PointerKind::Mouse));
        sleep(ms(20)).await;
    }
    sleep(ms(2000)).await;
    assert!(seen.lock().is_empty());
    assert_eq!(det.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn overlapping_presses_do_not_stack() {
    let (det, seen) = detector(1200);
    det.handle(press(PointerKind::Mouse));
    sleep(ms(300)).await;
    assert_eq!(det.handle(press(PointerKind::Mouse)), Disposition::Tracked);
    assert_eq!(det.pending(), 1);
    sleep(ms(1000)).await;
    assert_eq!(seen.lock().len(), 1, "fires from the first press-start");
    det.handle(press(PointerKind::Mouse));
    sleep(ms(3000)).await;
    assert_eq!(seen.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn touch_and_emulated_mouse_do_not_double_fire() {
    let (det, seen) = detector(1200);
    det.handle(press(PointerKind::Touch));
    assert_eq!(det.handle(press(PointerKind::Mouse)), Disposition::Tracked);
    sleep(ms(1300)).await;
    det.handle(release(PointerKind::Touch));
    assert_eq!(seen.lock().len(), 1);

    // Browser-emulated mouse sequence right after the touch ends.
    assert_eq!(det.handle(press(PointerKind::Mouse)), Disposition::Ignored);
    sleep(ms(1300)).await;
    det.handle(release(PointerKind::Mouse));
    assert_eq!(seen.lock().len(), 1);

    // A real mouse press later is honoured.
    det.handle(press(PointerKind::Mouse));
    sleep(ms(1300)).await;
    assert_eq!(seen.lock().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn mismatched_pointer_end_does_not_cancel() {
    let (det, seen) = detector(1200);
    det.handle(press(PointerKind::Touch));
    sleep(ms(200)).await;
    assert_eq!(det.handle(release(PointerKind::Mouse)), Disposition::Ignored);
    sleep(ms(1100)).await;
    assert_eq!(seen.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn leave_and_touch_cancel_abort_the_gesture() {
    let (det, seen) = detector(1200);
    det.handle(press(PointerKind::Mouse));
    sleep(ms(500)).await;
    det.handle(InputEvent::PointerLeave { trigger: logo() });
    sleep(ms(2000)).await;

    det.handle(press(PointerKind::Touch));
    sleep(ms(500)).await;
    det.handle(InputEvent::TouchCancel { trigger: logo() });
    sleep(ms(2000)).await;
    assert!(seen.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn teardown_cancels_pending_timers() {
    let (det, seen) = detector(1200);
    det.handle(press(PointerKind::Mouse));
    det.handle(InputEvent::PressStart { trigger: TriggerId::new("footer-mark"), pointer: PointerKind::Touch });
    assert_eq!(det.pending(), 2);
    assert_eq!(det.teardown(), 2);
    assert_eq!(det.teardown(), 0);
    sleep(ms(5000)).await;
    assert!(seen.lock().is_empty());
    assert_eq!(det.handle(press(PointerKind::Mouse)), Disposition::Ignored);
    assert_eq!(det.handle(chord(false)), Disposition::Ignored);
    assert!(det.is_torn_down());
}

#[tokio::test(start_paused = true)]
async fn drop_cancels_pending_timers() {
    let seen: Arc<Mutex<Vec<Activation>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let sink = seen.clone();
        let det = ActivationDetector::new(ActivationConfig::default(), [logo()], move |a| sink.lock().push(a)).unwrap();
        det.handle(press(PointerKind::Mouse));
    }
    sleep(ms(5000)).await;
    assert!(seen.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn chord_fires_once_per_press_independent_of_gestures() {
    let (det, seen) = detector(1200);
    det.handle(press(PointerKind::Mouse));
    assert_eq!(det.handle(chord(false)), Disposition::Suppress);
    assert_eq!(det.handle(chord(true)), Disposition::Suppress);
    assert_eq!(det.handle(chord(true)), Disposition::Suppress);
    assert_eq!(*seen.lock(), vec![Activation::Chord]);
    sleep(ms(1300)).await;
    assert_eq!(seen.lock().len(), 2);
    det.handle(chord(false));
    assert_eq!(seen.lock().len(), 3);

    let other = InputEvent::KeyDown(KeyEvent { key: "l".into(), ctrl: true, ..Default::default() });
    assert_eq!(det.handle(other), Disposition::Ignored);
    assert_eq!(seen.lock().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn only_designated_triggers_are_watched() {
    let (det, seen) = detector(1200);
    let stray = TriggerId::new("hero-image");
    assert_eq!(det.handle(InputEvent::PressStart { trigger: stray.clone(), pointer: PointerKind::Mouse }), Disposition::Ignored);
    assert_eq!(det.handle(InputEvent::ContextMenu { trigger: stray.clone() }), Disposition::Ignored);
    assert_eq!(det.handle(InputEvent::ContextMenu { trigger: logo() }), Disposition::Suppress);
    sleep(ms(2000)).await;
    assert!(seen.lock().is_empty());

    assert!(det.attach(stray.clone()));
    det.handle(InputEvent::PressStart { trigger: stray.clone(), pointer: PointerKind::Mouse });
    sleep(ms(1300)).await;
    assert_eq!(*seen.lock(), vec![Activation::LongPress(stray)]);
}

#[tokio::test(start_paused = true)]
async fn detach_cancels_gesture_on_that_trigger() {
    let (det, seen) = detector(1200);
    det.handle(press(PointerKind::Mouse));
    assert!(det.detach(&logo()));
    sleep(ms(2000)).await;
    assert!(seen.lock().is_empty());
    assert_eq!(det.handle(press(PointerKind::Mouse)), Disposition::Ignored);
}

#[test]
fn requires_runtime_and_positive_hold() {
    assert!(ActivationDetector::new(ActivationConfig::default(), [logo()], |_| {}).is_err());
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    let _guard = rt.enter();
    let cfg = ActivationConfig { hold: Duration::ZERO, ..Default::default() };
    let err = ActivationDetector::new(cfg, [logo()], |_| {}).err().unwrap();
    assert_eq!(err.code_str(), "bad_hold");
}
