use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::tprintln;

use super::principal::Identity;

/// Failures reported by the identity provider. All of them are transient from the
/// page's point of view.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("the sign-in popup was blocked")]
    PopupBlocked,
    #[error("sign-in was cancelled")]
    Cancelled,
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid email address: {0}")]
    InvalidEmail(String),
    #[error("the sign-in link is invalid or was already used")]
    InvalidLink,
    #[error("the sign-in link has expired")]
    ExpiredLink,
    #[error("the email does not match the one the link was sent to")]
    EmailMismatch,
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    pub fn code(&self) -> &'static str {
        match self {
            ProviderError::PopupBlocked => "popup_blocked",
            ProviderError::Cancelled => "cancelled",
            ProviderError::Network(_) => "network",
            ProviderError::InvalidEmail(_) => "invalid_email",
            ProviderError::InvalidLink => "invalid_link",
            ProviderError::ExpiredLink => "expired_link",
            ProviderError::EmailMismatch => "email_mismatch",
            ProviderError::Unavailable(_) => "unavailable",
        }
    }
}

/// One change notification: the new identity (or none), or a provider-side error.
pub type IdentityNotification = Result<Option<Identity>, ProviderError>;
pub type IdentityListener = Arc<dyn Fn(IdentityNotification) + Send + Sync>;

/// Interactive sign-in methods offered by the popup path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SignInMethod {
    #[default]
    Google,
}

/// Handle for a provider listener. Dropping it unsubscribes; `unsubscribe` does the
/// same explicitly. Release runs at most once.
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new<F: FnOnce() + Send + 'static>(release: F) -> Self {
        Self { release: Some(Box::new(release)) }
    }

    /// A subscription with nothing to release.
    pub fn noop() -> Self { Self { release: None } }

    pub fn unsubscribe(mut self) { self.release_now(); }

    fn release_now(&mut self) {
        if let Some(f) = self.release.take() { f(); }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) { self.release_now(); }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("active", &self.release.is_some()).finish()
    }
}

/// The external authentication service. Implementations deliver the current identity
/// to a new listener immediately and again on every change.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn subscribe(&self, listener: IdentityListener) -> Subscription;
    async fn sign_in_with_popup(&self, method: SignInMethod) -> Result<Identity, ProviderError>;
    async fn send_sign_in_link(&self, email: &str, return_url: &str) -> Result<(), ProviderError>;
    fn is_sign_in_link(&self, url: &str) -> bool;
    async fn complete_sign_in_with_link(&self, email: &str, url: &str) -> Result<Identity, ProviderError>;
    async fn sign_out(&self) -> Result<(), ProviderError>;
}

// ---------------------------------------------------------------------------------------
// In-process provider used by the console and the tests.
// ---------------------------------------------------------------------------------------

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static email pattern"));

const LINK_MODE: &str = "signIn";

/// What the popup does on the next interactive sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopupScript {
    /// The viewer picks this account (by email).
    Account(String),
    Blocked,
    Cancelled,
}

/// A sign-in link the provider "emailed".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentLink {
    pub email: String,
    pub url: String,
}

#[derive(Debug)]
struct PendingLink {
    email: String,
    expires_at: Instant,
}

type ListenerTable = Arc<Mutex<Vec<(u64, IdentityListener)>>>;

struct LocalState {
    accounts: HashMap<String, Identity>,
    current: Option<Identity>,
    popup: PopupScript,
    offline: bool,
    pending: HashMap<String, PendingLink>,
    outbox: Vec<SentLink>,
    sign_out_calls: usize,
    send_link_calls: usize,
}

pub struct LocalIdentityProvider {
    state: Mutex<LocalState>,
    listeners: ListenerTable,
    next_listener: Mutex<u64>,
    link_ttl: Duration,
}

fn gen_code() -> Result<String, ProviderError> {
    let mut buf = [0u8; 24];
    getrandom::getrandom(&mut buf).map_err(|e| ProviderError::Unavailable(e.to_string()))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

/// Extract a decoded query parameter from a URL; fragments are ignored.
fn query_param(url: &str, name: &str) -> Option<String> {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let (_, query) = without_fragment.split_once('?')?;
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        if k != name { return None; }
        urlencoding::decode(v).ok().map(|c| c.into_owned())
    })
}

fn email_key(email: &str) -> String { email.trim().to_ascii_lowercase() }

impl LocalIdentityProvider {
    pub fn new(link_ttl: Duration) -> Self {
        Self {
            state: Mutex::new(LocalState {
                accounts: HashMap::new(),
                current: None,
                popup: PopupScript::Cancelled,
                offline: false,
                pending: HashMap::new(),
                outbox: Vec::new(),
                sign_out_calls: 0,
                send_link_calls: 0,
            }),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener: Mutex::new(0),
            link_ttl,
        }
    }

    /// Register an account with a generated uid.
    pub fn register(&self, email: &str) -> Identity {
        let uid = uuid::Uuid::new_v4().simple().to_string();
        self.register_with_uid(&uid, email)
    }

    pub fn register_with_uid(&self, uid: &str, email: &str) -> Identity {
        let id = Identity::new(uid, Some(email.trim().to_string()));
        self.state.lock().accounts.insert(email_key(email), id.clone());
        id
    }

    pub fn set_popup(&self, script: PopupScript) { self.state.lock().popup = script; }
    pub fn set_offline(&self, offline: bool) { self.state.lock().offline = offline; }

    pub fn current(&self) -> Option<Identity> { self.state.lock().current.clone() }
    pub fn outbox(&self) -> Vec<SentLink> { self.state.lock().outbox.clone() }
    pub fn sign_out_calls(&self) -> usize { self.state.lock().sign_out_calls }
    pub fn send_link_calls(&self) -> usize { self.state.lock().send_link_calls }
    pub fn listener_count(&self) -> usize { self.listeners.lock().len() }

    /// Deliver a provider-side error to every listener.
    pub fn notify_error(&self, err: ProviderError) { self.broadcast(Err(err)); }

    fn broadcast(&self, n: IdentityNotification) {
        // Snapshot listeners so callbacks run without the table lock held.
        let listeners: Vec<IdentityListener> = self.listeners.lock().iter().map(|(_, l)| l.clone()).collect();
        for l in listeners { l(n.clone()); }
    }

    fn ensure_online(&self) -> Result<(), ProviderError> {
        if self.state.lock().offline { return Err(ProviderError::Network("offline".into())); }
        Ok(())
    }

    fn sign_in_account(&self, email: &str) -> Identity {
        let identity = {
            let mut st = self.state.lock();
            let key = email_key(email);
            let account = st
                .accounts
                .entry(key)
                .or_insert_with(|| Identity::new(uuid::Uuid::new_v4().simple().to_string(), Some(email.trim().to_string())))
                .clone();
            let signed_in = Identity::new(account.uid, account.email);
            st.current = Some(signed_in.clone());
            signed_in
        };
        info!(target: "studio_admin::provider", "signed in uid={}", identity.uid);
        self.broadcast(Ok(Some(identity.clone())));
        identity
    }
}

impl Default for LocalIdentityProvider {
    fn default() -> Self { Self::new(Duration::from_secs(60 * 60)) }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    fn subscribe(&self, listener: IdentityListener) -> Subscription {
        let id = {
            let mut n = self.next_listener.lock();
            *n += 1;
            *n
        };
        self.listeners.lock().push((id, listener.clone()));
        let current = self.state.lock().current.clone();
        listener(Ok(current));
        let table: Weak<Mutex<Vec<(u64, IdentityListener)>>> = Arc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(t) = table.upgrade() {
                t.lock().retain(|(lid, _)| *lid != id);
            }
        })
    }

    async fn sign_in_with_popup(&self, _method: SignInMethod) -> Result<Identity, ProviderError> {
        self.ensure_online()?;
        let script = self.state.lock().popup.clone();
        match script {
            PopupScript::Account(email) => Ok(self.sign_in_account(&email)),
            PopupScript::Blocked => Err(ProviderError::PopupBlocked),
            PopupScript::Cancelled => Err(ProviderError::Cancelled),
        }
    }

    async fn send_sign_in_link(&self, email: &str, return_url: &str) -> Result<(), ProviderError> {
        self.state.lock().send_link_calls += 1;
        self.ensure_online()?;
        let email = email.trim();
        if !EMAIL_RE.is_match(email) {
            return Err(ProviderError::InvalidEmail(email.to_string()));
        }
        let code = gen_code()?;
        let sep = if return_url.contains('?') { '&' } else { '?' };
        let url = format!("{}{}mode={}&oobCode={}", return_url, sep, LINK_MODE, urlencoding::encode(&code));
        let mut st = self.state.lock();
        st.pending.insert(code.clone(), PendingLink { email: email.to_string(), expires_at: Instant::now() + self.link_ttl });
        st.outbox.push(SentLink { email: email.to_string(), url });
        tprintln!("provider.link issue email={} code={}", email, code);
        debug!(target: "studio_admin::provider", "sign-in link issued ttl_secs={}", self.link_ttl.as_secs());
        Ok(())
    }

    fn is_sign_in_link(&self, url: &str) -> bool {
        query_param(url, "mode").as_deref() == Some(LINK_MODE)
            && query_param(url, "oobCode").map(|c| !c.is_empty()).unwrap_or(false)
    }

    async fn complete_sign_in_with_link(&self, email: &str, url: &str) -> Result<Identity, ProviderError> {
        self.ensure_online()?;
        let code = query_param(url, "oobCode").ok_or(ProviderError::InvalidLink)?;
        {
            let mut st = self.state.lock();
            let Some(pending) = st.pending.get(&code) else { return Err(ProviderError::InvalidLink); };
            if Instant::now() >= pending.expires_at {
                st.pending.remove(&code);
                return Err(ProviderError::ExpiredLink);
            }
            if email_key(&pending.email) != email_key(email) {
                return Err(ProviderError::EmailMismatch);
            }
            st.pending.remove(&code);
        }
        Ok(self.sign_in_account(email))
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        {
            let mut st = self.state.lock();
            st.sign_out_calls += 1;
            if st.offline { return Err(ProviderError::Network("offline".into())); }
            st.current = None;
        }
        info!(target: "studio_admin::provider", "signed out");
        self.broadcast(Ok(None));
        Ok(())
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod provider_tests;
