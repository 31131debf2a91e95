use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A signed-in identity as issued by the identity provider. Immutable once issued.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    pub signed_in_at: DateTime<Utc>,
}

impl Identity {
    pub fn new<S: Into<String>>(uid: S, email: Option<String>) -> Self {
        Self { uid: uid.into(), email, signed_in_at: Utc::now() }
    }

    /// Label for logs and the console; never empty.
    pub fn label(&self) -> &str {
        self.email.as_deref().unwrap_or(self.uid.as_str())
    }
}
