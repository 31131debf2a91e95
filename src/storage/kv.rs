use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::KeyValueStore;

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct StoreSettings {
    pub name: String,
    /// Pretty-print the JSON file; handy when inspecting state by hand.
    #[serde(default)]
    pub pretty: bool,
}

impl Default for StoreSettings {
    fn default() -> Self { Self { name: "local".to_string(), pretty: true } }
}

/// In-memory store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    map: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
    pub fn len(&self) -> usize { self.map.read().len() }
    pub fn is_empty(&self) -> bool { self.map.read().is_empty() }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> { Ok(self.map.read().get(key).cloned()) }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.map.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.map.write().remove(key);
        Ok(())
    }
}

/// JSON-object file store. The whole map is rewritten on each mutation via a temp file
/// and rename, so a crash never leaves a half-written file.
#[derive(Clone)]
pub struct FileStore {
    settings: StoreSettings,
    path: PathBuf,
    map: Arc<RwLock<BTreeMap<String, String>>>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`. A missing file is an empty store.
    pub fn open(path: impl AsRef<Path>, settings: StoreSettings) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let map: BTreeMap<String, String> = if path.exists() {
            let bytes = std::fs::read(&path).with_context(|| format!("reading store file {}", path.display()))?;
            if bytes.iter().all(|b| b.is_ascii_whitespace()) {
                BTreeMap::new()
            } else {
                serde_json::from_slice(&bytes).with_context(|| format!("parsing store file {}", path.display()))?
            }
        } else {
            BTreeMap::new()
        };
        debug!(target: "studio_admin::storage", "store '{}' opened at {} keys={}", settings.name, path.display(), map.len());
        Ok(Self { settings, path, map: Arc::new(RwLock::new(map)) })
    }

    pub fn path(&self) -> &Path { &self.path }

    fn flush(&self, map: &BTreeMap<String, String>) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
            }
        }
        let bytes = if self.settings.pretty { serde_json::to_vec_pretty(map)? } else { serde_json::to_vec(map)? };
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path).with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> { Ok(self.map.read().get(key).cloned()) }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut w = self.map.write();
        let mut next = w.clone();
        next.insert(key.to_string(), value.to_string());
        self.flush(&next)?;
        *w = next;
        Ok(())
    }

    /// Memory only changes once the file does, so a failed write leaves both holding the key.
    fn remove(&self, key: &str) -> Result<()> {
        let mut w = self.map.write();
        if !w.contains_key(key) { return Ok(()); }
        let mut next = w.clone();
        next.remove(key);
        self.flush(&next)?;
        *w = next;
        Ok(())
    }
}

/// Persistence that is switched off (private browsing, storage quota, policy).
#[derive(Clone, Copy, Default, Debug)]
pub struct UnavailableStore;

impl KeyValueStore for UnavailableStore {
    fn get(&self, _key: &str) -> Result<Option<String>> { Err(anyhow!("local storage unavailable")) }
    fn set(&self, _key: &str, _value: &str) -> Result<()> { Err(anyhow!("local storage unavailable")) }
    fn remove(&self, _key: &str) -> Result<()> { Err(anyhow!("local storage unavailable")) }
}
