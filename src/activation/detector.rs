use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};

use super::input::{InputEvent, KeyChord, KeyEvent, PointerKind, TriggerId};

/// Signal raised towards the login modal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    /// A trigger was held for the configured duration: open the modal.
    LongPress(TriggerId),
    /// The keyboard chord was pressed: toggle the modal.
    Chord,
}

pub type ActivationHandler = Arc<dyn Fn(Activation) + Send + Sync>;

/// What the host should do with the native event after the detector has seen it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Not ours; let it through.
    Ignored,
    /// Part of a gesture on a trigger.
    Tracked,
    /// Prevent the default action (context menu on a trigger, the chord's keydown).
    Suppress,
}

#[derive(Debug, Clone)]
pub struct ActivationConfig {
    pub hold: Duration,
    pub chord: KeyChord,
    /// Mouse presses this soon after a touch release on the same trigger are the
    /// browser's emulated mouse events and are dropped.
    pub emulated_mouse_window: Duration,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self { hold: Duration::from_millis(1200), chord: KeyChord::default(), emulated_mouse_window: Duration::from_millis(500) }
    }
}

struct Gesture {
    pointer: PointerKind,
    started: Instant,
    generation: u64,
    fired: bool,
    timer: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct DetectorState {
    triggers: HashSet<TriggerId>,
    gestures: HashMap<TriggerId, Gesture>,
    last_touch_end: HashMap<TriggerId, Instant>,
    next_generation: u64,
    torn_down: bool,
}

struct DetectorShared {
    config: ActivationConfig,
    handler: ActivationHandler,
    state: Mutex<DetectorState>,
}

impl DetectorShared {
    /// Timer expiry. Only the gesture that armed the timer may fire, and only once.
    fn fire(&self, trigger: &TriggerId, generation: u64) {
        let fire = {
            let mut st = self.state.lock();
            if st.torn_down { return; }
            match st.gestures.get_mut(trigger) {
                Some(g) if g.generation == generation && !g.fired => {
                    g.fired = true;
                    g.timer = None;
                    true
                }
                _ => false,
            }
        };
        if fire {
            info!(target: "studio_admin::activation", "long press on '{}'", trigger);
            (self.handler)(Activation::LongPress(trigger.clone()));
        }
    }
}

/// Long-press and keyboard-chord detector over an explicit set of trigger handles.
/// Dropping it (or calling `teardown`) cancels every pending timer.
pub struct ActivationDetector {
    shared: Arc<DetectorShared>,
    runtime: Handle,
}

impl ActivationDetector {
    /// Must be called from within a tokio runtime; timers are spawned onto it.
    pub fn new<I, F>(config: ActivationConfig, triggers: I, handler: F) -> AppResult<Self>
    where
        I: IntoIterator<Item = TriggerId>,
        F: Fn(Activation) + Send + Sync + 'static,
    {
        let runtime = Handle::try_current()
            .map_err(|e| AppError::internal("no_runtime".to_string(), format!("activation detector needs a tokio runtime: {}", e)))?;
        if config.hold.is_zero() {
            return Err(AppError::config("bad_hold", "hold duration must be positive"));
        }
        let state = DetectorState { triggers: triggers.into_iter().collect(), ..Default::default() };
        debug!(target: "studio_admin::activation", "detector armed triggers={} hold_ms={} chord={}",
            state.triggers.len(), config.hold.as_millis(), config.chord);
        let shared = Arc::new(DetectorShared { config, handler: Arc::new(handler), state: Mutex::new(state) });
        Ok(Self { shared, runtime })
    }

    pub fn config(&self) -> &ActivationConfig { &self.shared.config }

    pub fn attach(&self, trigger: TriggerId) -> bool {
        let mut st = self.shared.state.lock();
        if st.torn_down { return false; }
        st.triggers.insert(trigger)
    }

    /// Stop watching a trigger, cancelling its gesture if one is in progress.
    pub fn detach(&self, trigger: &TriggerId) -> bool {
        let mut st = self.shared.state.lock();
        if let Some(g) = st.gestures.remove(trigger) {
            if let Some(t) = g.timer { t.abort(); }
        }
        st.last_touch_end.remove(trigger);
        st.triggers.remove(trigger)
    }

    pub fn handle(&self, event: InputEvent) -> Disposition {
        match event {
            InputEvent::PressStart { trigger, pointer } => self.press_start(trigger, pointer),
            InputEvent::PressEnd { trigger, pointer } => self.press_stop(trigger, Some(pointer)),
            InputEvent::PointerLeave { trigger } => self.press_stop(trigger, None),
            InputEvent::TouchCancel { trigger } => self.press_stop(trigger, Some(PointerKind::Touch)),
            InputEvent::ContextMenu { trigger } => {
                let st = self.shared.state.lock();
                if !st.torn_down && st.triggers.contains(&trigger) { Disposition::Suppress } else { Disposition::Ignored }
            }
            InputEvent::KeyDown(key) => self.key_down(&key),
        }
    }

    fn press_start(&self, trigger: TriggerId, pointer: PointerKind) -> Disposition {
        let now = Instant::now();
        let mut st = self.shared.state.lock();
        if st.torn_down || !st.triggers.contains(&trigger) { return Disposition::Ignored; }
        if pointer == PointerKind::Mouse {
            if let Some(t) = st.last_touch_end.get(&trigger) {
                if now.duration_since(*t) < self.shared.config.emulated_mouse_window {
                    debug!(target: "studio_admin::activation", "dropping emulated mouse press on '{}'", trigger);
                    return Disposition::Ignored;
                }
            }
        }
        if st.gestures.contains_key(&trigger) {
            debug!(target: "studio_admin::activation", "press on '{}' absorbed by live gesture", trigger);
            return Disposition::Tracked;
        }
        st.next_generation += 1;
        let generation = st.next_generation;
        let hold = self.shared.config.hold;
        let weak: Weak<DetectorShared> = Arc::downgrade(&self.shared);
        let t = trigger.clone();
        let timer = self.runtime.spawn(async move {
            tokio::time::sleep(hold).await;
            if let Some(s) = weak.upgrade() { s.fire(&t, generation); }
        });
        st.gestures.insert(trigger, Gesture { pointer, started: now, generation, fired: false, timer: Some(timer) });
        Disposition::Tracked
    }

    /// End, leave or cancel. `pointer == None` ends a gesture of either kind.
    fn press_stop(&self, trigger: TriggerId, pointer: Option<PointerKind>) -> Disposition {
        let now = Instant::now();
        let fire_late = {
            let mut st = self.shared.state.lock();
            if st.torn_down { return Disposition::Ignored; }
            if pointer == Some(PointerKind::Touch) && st.triggers.contains(&trigger) {
                st.last_touch_end.insert(trigger.clone(), now);
            }
            match st.gestures.get(&trigger) {
                None => return Disposition::Ignored,
                Some(g) if pointer.map(|p| p != g.pointer).unwrap_or(false) => return Disposition::Ignored,
                _ => {}
            }
            let Some(g) = st.gestures.remove(&trigger) else { return Disposition::Ignored; };
            if let Some(t) = g.timer { t.abort(); }
            // Threshold is inclusive: a release landing exactly on it still fires.
            !g.fired && now.duration_since(g.started) >= self.shared.config.hold
        };
        if fire_late {
            info!(target: "studio_admin::activation", "long press on '{}' (at release)", trigger);
            (self.shared.handler)(Activation::LongPress(trigger));
        }
        Disposition::Tracked
    }

    fn key_down(&self, key: &KeyEvent) -> Disposition {
        if self.shared.state.lock().torn_down { return Disposition::Ignored; }
        if !self.shared.config.chord.matches(key) { return Disposition::Ignored; }
        if key.repeat { return Disposition::Suppress; }
        info!(target: "studio_admin::activation", "chord {}", self.shared.config.chord);
        (self.shared.handler)(Activation::Chord);
        Disposition::Suppress
    }

    /// Number of gestures whose timer is still armed.
    pub fn pending(&self) -> usize {
        self.shared.state.lock().gestures.values().filter(|g| g.timer.is_some()).count()
    }

    pub fn is_torn_down(&self) -> bool { self.shared.state.lock().torn_down }

    /// Cancel all timers and stop reacting to input. Returns how many timers were cancelled.
    pub fn teardown(&self) -> usize {
        let cancelled = {
            let mut st = self.shared.state.lock();
            if st.torn_down { return 0; }
            st.torn_down = true;
            st.triggers.clear();
            st.last_touch_end.clear();
            let mut n = 0;
            for (_, g) in st.gestures.drain() {
                if let Some(t) = g.timer {
                    t.abort();
                    n += 1;
                }
            }
            n
        };
        debug!(target: "studio_admin::activation", "detector torn down, cancelled_timers={}", cancelled);
        cancelled
    }
}

impl Drop for ActivationDetector {
    fn drop(&mut self) { self.teardown(); }
}

#[cfg(test)]
#[path = "detector_tests.rs"]
mod detector_tests;
