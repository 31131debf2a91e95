//!
//! Local key-value persistence
//! ----------------------------
//! A tiny string-to-string store that bridges the passwordless link flow across a page
//! reload: the email is written when the link is requested and read back (then removed)
//! when the link is opened. Back ends:
//! - `MemoryStore`: process-local map.
//! - `FileStore`: JSON object on disk, written through on every mutation.
//! - `UnavailableStore`: every call fails, as when browser storage is disabled.

use anyhow::Result;

pub mod kv;

pub use kv::{FileStore, MemoryStore, StoreSettings, UnavailableStore};

/// Single-writer/single-reader persistence seam.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}
