//! Admin surface configuration.
//! Defaults, then an optional JSON file named by `STUDIO_ADMIN_CONFIG`, then individual
//! environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::activation::{ActivationConfig, KeyChord};
use crate::error::{AppError, AppResult};
use crate::identity::AllowList;

pub const ENV_CONFIG: &str = "STUDIO_ADMIN_CONFIG";
pub const ENV_UIDS: &str = "STUDIO_ADMIN_UIDS";
pub const ENV_HOLD_MS: &str = "STUDIO_ADMIN_HOLD_MS";
pub const ENV_CHORD: &str = "STUDIO_ADMIN_CHORD";
pub const ENV_RETURN_URL: &str = "STUDIO_ADMIN_RETURN_URL";
pub const ENV_STATE: &str = "STUDIO_ADMIN_STATE";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AdminConfig {
    pub allow_list: Vec<String>,
    pub hold_ms: u64,
    pub chord: String,
    pub emulated_mouse_window_ms: u64,
    pub return_url: String,
    pub email_key: String,
    pub link_ttl_secs: u64,
    pub state_file: Option<PathBuf>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            allow_list: Vec::new(),
            hold_ms: 1200,
            chord: "Ctrl+Shift+L".to_string(),
            emulated_mouse_window_ms: 500,
            return_url: "http://localhost:3000/".to_string(),
            email_key: "admin-email".to_string(),
            link_ttl_secs: 60 * 60,
            state_file: None,
        }
    }
}

impl AdminConfig {
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("reading config {}", path.display()))?;
        let cfg: AdminConfig = serde_json::from_slice(&bytes).with_context(|| format!("parsing config {}", path.display()))?;
        Ok(cfg)
    }

    /// Full load from the process environment.
    pub fn load() -> AppResult<Self> {
        Self::load_with(|k| std::env::var(k).ok())
    }

    /// Same as `load`, reading variables through `var` so callers can supply their own source.
    pub fn load_with<F: Fn(&str) -> Option<String>>(var: F) -> AppResult<Self> {
        let mut cfg = match var(ENV_CONFIG).filter(|s| !s.trim().is_empty()) {
            Some(p) => Self::from_json_file(Path::new(&p))
                .map_err(|e| AppError::config("config_file".to_string(), format!("{:#}", e)))?,
            None => Self::default(),
        };
        cfg.apply_env(var)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, var: F) -> AppResult<()> {
        if let Some(v) = var(ENV_UIDS) {
            self.allow_list = AllowList::from_csv(&v).iter().map(|s| s.to_string()).collect();
        }
        if let Some(v) = var(ENV_HOLD_MS) {
            self.hold_ms = v.trim().parse().map_err(|_| {
                AppError::config("bad_hold".to_string(), format!("{} must be milliseconds, got '{}'", ENV_HOLD_MS, v))
            })?;
        }
        if let Some(v) = var(ENV_CHORD) { self.chord = v; }
        if let Some(v) = var(ENV_RETURN_URL) { self.return_url = v; }
        if let Some(v) = var(ENV_STATE).filter(|s| !s.trim().is_empty()) { self.state_file = Some(PathBuf::from(v)); }
        Ok(())
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.hold_ms == 0 {
            return Err(AppError::config("bad_hold", "hold_ms must be positive"));
        }
        self.chord.parse::<KeyChord>()?;
        if self.email_key.trim().is_empty() {
            return Err(AppError::config("bad_email_key", "email_key must not be empty"));
        }
        if self.return_url.trim().is_empty() {
            return Err(AppError::config("bad_return_url", "return_url must not be empty"));
        }
        Ok(())
    }

    pub fn allow_list(&self) -> AllowList { AllowList::new(self.allow_list.iter().cloned()) }

    pub fn activation(&self) -> AppResult<ActivationConfig> {
        Ok(ActivationConfig {
            hold: Duration::from_millis(self.hold_ms),
            chord: self.chord.parse()?,
            emulated_mouse_window: Duration::from_millis(self.emulated_mouse_window_ms),
        })
    }

    pub fn link_ttl(&self) -> Duration { Duration::from_secs(self.link_ttl_secs) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let m: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| m.get(k).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = AdminConfig::load_with(env(&[])).unwrap();
        assert_eq!(cfg, AdminConfig::default());
        let act = cfg.activation().unwrap();
        assert_eq!(act.hold, Duration::from_millis(1200));
        assert_eq!(act.chord, KeyChord::default());
        assert!(cfg.allow_list().is_empty());
    }

    #[test]
    fn env_overrides_apply() {
        let cfg = AdminConfig::load_with(env(&[
            (ENV_UIDS, "abc, def,,abc"),
            (ENV_HOLD_MS, "650"),
            (ENV_CHORD, "Alt+A"),
            (ENV_STATE, "/tmp/studio.json"),
        ]))
        .unwrap();
        assert_eq!(cfg.allow_list, vec!["abc".to_string(), "def".to_string()]);
        assert_eq!(cfg.hold_ms, 650);
        assert_eq!(cfg.activation().unwrap().chord.to_string(), "Alt+A");
        assert_eq!(cfg.state_file.as_deref(), Some(Path::new("/tmp/studio.json")));
    }

    #[test]
    fn rejects_bad_values() {
        assert_eq!(AdminConfig::load_with(env(&[(ENV_HOLD_MS, "soon")])).unwrap_err().code_str(), "bad_hold");
        assert_eq!(AdminConfig::load_with(env(&[(ENV_HOLD_MS, "0")])).unwrap_err().code_str(), "bad_hold");
        assert_eq!(AdminConfig::load_with(env(&[(ENV_CHORD, "L")])).unwrap_err().code_str(), "bad_chord");
    }

    #[test]
    fn file_then_env() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("admin.json");
        std::fs::write(&path, r#"{"allow_list":["abc"],"hold_ms":700,"return_url":"https://studio.test/"}"#).unwrap();
        let p = path.to_string_lossy().to_string();
        let cfg = AdminConfig::load_with(env(&[(ENV_CONFIG, p.as_str()), (ENV_HOLD_MS, "900")])).unwrap();
        assert_eq!(cfg.allow_list, vec!["abc".to_string()]);
        assert_eq!(cfg.hold_ms, 900);
        assert_eq!(cfg.return_url, "https://studio.test/");
        assert_eq!(cfg.email_key, "admin-email");

        let missing = AdminConfig::load_with(env(&[(ENV_CONFIG, "/nonexistent/admin.json")])).unwrap_err();
        assert_eq!(missing.code_str(), "config_file");
    }
}
