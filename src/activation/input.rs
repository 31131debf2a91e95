use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Handle for a designated trigger element (e.g. the brand logo on a page).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TriggerId(pub String);

impl TriggerId {
    pub fn new<S: Into<String>>(s: S) -> Self { TriggerId(s.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl Display for TriggerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(&self.0) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerKind {
    Mouse,
    Touch,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key: String,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub meta: bool,
    /// Set by the host for auto-repeated keydowns while a key is held.
    #[serde(default)]
    pub repeat: bool,
}

/// Raw input as reported by the host's event loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputEvent {
    PressStart { trigger: TriggerId, pointer: PointerKind },
    PressEnd { trigger: TriggerId, pointer: PointerKind },
    PointerLeave { trigger: TriggerId },
    TouchCancel { trigger: TriggerId },
    ContextMenu { trigger: TriggerId },
    KeyDown(KeyEvent),
}

/// Modifier-plus-key combination such as `Ctrl+Shift+L`. Key comparison ignores case;
/// modifiers must match exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyChord {
    pub key: String,
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub meta: bool,
}

impl KeyChord {
    pub fn matches(&self, ev: &KeyEvent) -> bool {
        ev.key.eq_ignore_ascii_case(&self.key)
            && ev.ctrl == self.ctrl
            && ev.shift == self.shift
            && ev.alt == self.alt
            && ev.meta == self.meta
    }
}

impl Default for KeyChord {
    fn default() -> Self {
        Self { key: "l".into(), ctrl: true, shift: true, alt: false, meta: false }
    }
}

impl FromStr for KeyChord {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chord = KeyChord { key: String::new(), ctrl: false, shift: false, alt: false, meta: false };
        for part in s.split('+').map(|p| p.trim()) {
            match part.to_ascii_lowercase().as_str() {
                "" => return Err(AppError::config("bad_chord", "empty chord segment")),
                "ctrl" | "control" => chord.ctrl = true,
                "shift" => chord.shift = true,
                "alt" | "option" => chord.alt = true,
                "meta" | "cmd" | "super" => chord.meta = true,
                key => {
                    if !chord.key.is_empty() {
                        return Err(AppError::config("bad_chord", "chord names more than one key"));
                    }
                    chord.key = key.to_string();
                }
            }
        }
        if chord.key.is_empty() {
            return Err(AppError::config("bad_chord", "chord has no key"));
        }
        if !(chord.ctrl || chord.alt || chord.meta) {
            return Err(AppError::config("bad_chord", "chord needs ctrl, alt or meta"));
        }
        Ok(chord)
    }
}

impl Display for KeyChord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.ctrl { f.write_str("Ctrl+")?; }
        if self.alt { f.write_str("Alt+")?; }
        if self.shift { f.write_str("Shift+")?; }
        if self.meta { f.write_str("Meta+")?; }
        f.write_str(&self.key.to_ascii_uppercase())
    }
}
