//! Hidden admin activation: long press on designated triggers, or a keyboard chord.

mod input;
mod detector;

pub use input::{InputEvent, KeyChord, KeyEvent, PointerKind, TriggerId};
pub use detector::{Activation, ActivationConfig, ActivationDetector, ActivationHandler, Disposition};
