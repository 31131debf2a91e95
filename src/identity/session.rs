use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};

use super::allow_list::AllowList;
use super::principal::Identity;
use super::provider::{IdentityNotification, IdentityProvider, Subscription};

/// Derived view of who is signed in. Never stored; recomputed on every notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Session {
    pub identity: Option<Identity>,
    pub is_admin: bool,
}

impl Session {
    pub fn signed_out() -> Self { Self::default() }

    pub fn evaluate(identity: Option<Identity>, allow: &AllowList) -> Self {
        let is_admin = allow.admits(identity.as_ref());
        Self { identity, is_admin }
    }
}

/// Result of a `logout()` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutOutcome {
    SignedOut,
    AlreadySignedOut,
    InFlight,
}

struct OracleShared {
    provider: Arc<dyn IdentityProvider>,
    allow: RwLock<Arc<AllowList>>,
    tx: watch::Sender<Session>,
    signing_out: AtomicBool,
    /// Set from the moment sign-out is requested until the provider reports the viewer
    /// signed out. A failed request leaves it set so the next `logout` retries.
    sign_out_pending: AtomicBool,
}

impl OracleShared {
    fn apply(&self, n: IdentityNotification) {
        match n {
            Ok(identity) => {
                // Any confirmed state from the provider settles an outstanding sign-out.
                self.sign_out_pending.store(false, Ordering::SeqCst);
                let allow = self.allow.read().clone();
                let next = Session::evaluate(identity, &allow);
                match &next.identity {
                    Some(id) => info!(target: "studio_admin::session", "session uid={} admin={}", id.uid, next.is_admin),
                    None => info!(target: "studio_admin::session", "session signed out"),
                }
                if let Some(email) = next.identity.as_ref().and_then(|i| i.email.as_deref()) {
                    debug!(target: "studio_admin::session", "session email={}", email);
                }
                // Last write wins.
                self.tx.send_replace(next);
            }
            Err(e) => {
                warn!(target: "studio_admin::session", "identity notification failed, keeping prior session: {}", e);
            }
        }
    }
}

/// Wraps the identity provider subscription for the lifetime of the owning view and
/// publishes `{identity, is_admin}` to watchers.
pub struct SessionOracle {
    shared: Arc<OracleShared>,
    subscription: Mutex<Option<Subscription>>,
}

impl SessionOracle {
    /// Subscribe once to the provider. The provider's initial delivery sets the first session.
    pub fn attach(provider: Arc<dyn IdentityProvider>, allow: AllowList) -> Self {
        let (tx, _rx) = watch::channel(Session::signed_out());
        let shared = Arc::new(OracleShared {
            provider: provider.clone(),
            allow: RwLock::new(Arc::new(allow)),
            tx,
            signing_out: AtomicBool::new(false),
            sign_out_pending: AtomicBool::new(false),
        });
        let weak = Arc::downgrade(&shared);
        let subscription = provider.subscribe(Arc::new(move |n| {
            if let Some(s) = weak.upgrade() { s.apply(n); }
        }));
        Self { shared, subscription: Mutex::new(Some(subscription)) }
    }

    pub fn session(&self) -> Session { self.shared.tx.borrow().clone() }

    pub fn is_admin(&self) -> bool { self.shared.tx.borrow().is_admin }

    pub fn identity(&self) -> Option<Identity> { self.shared.tx.borrow().identity.clone() }

    /// Receiver that sees every published session; the initial value is the current one.
    pub fn watch(&self) -> watch::Receiver<Session> { self.shared.tx.subscribe() }

    /// Apply a notification exactly as the provider subscription would.
    pub fn observe(&self, n: IdentityNotification) { self.shared.apply(n); }

    pub fn allow_list(&self) -> Arc<AllowList> { self.shared.allow.read().clone() }

    /// Swap the allow-list and re-evaluate the current identity against it.
    pub fn set_allow_list(&self, allow: AllowList) {
        *self.shared.allow.write() = Arc::new(allow);
        let identity = self.identity();
        self.shared.apply(Ok(identity));
    }

    /// Request sign-out. Privileges are revoked locally before the provider is asked,
    /// so nothing privileged can be dispatched while the request is in flight. A no-op only
    /// when the viewer is signed out and no earlier request is left unconfirmed.
    pub async fn logout(&self) -> AppResult<LogoutOutcome> {
        let signed_in = self.shared.tx.borrow().identity.is_some();
        if !signed_in && !self.shared.sign_out_pending.load(Ordering::SeqCst) {
            debug!(target: "studio_admin::session", "logout ignored, already signed out");
            return Ok(LogoutOutcome::AlreadySignedOut);
        }
        if self.shared.signing_out.swap(true, Ordering::SeqCst) {
            debug!(target: "studio_admin::session", "logout joined, sign-out already in flight");
            return Ok(LogoutOutcome::InFlight);
        }
        self.shared.sign_out_pending.store(true, Ordering::SeqCst);
        self.shared.tx.send_replace(Session::signed_out());
        let res = self.shared.provider.sign_out().await;
        self.shared.signing_out.store(false, Ordering::SeqCst);
        match res {
            Ok(()) => {
                self.shared.sign_out_pending.store(false, Ordering::SeqCst);
                Ok(LogoutOutcome::SignedOut)
            }
            Err(e) => {
                warn!(target: "studio_admin::session", "sign-out request failed, will retry on next logout: {}", e);
                Err(AppError::auth("sign_out_failed", "Failed to sign out"))
            }
        }
    }

    /// True while a requested sign-out has not been confirmed by the provider.
    pub fn sign_out_pending(&self) -> bool { self.shared.sign_out_pending.load(Ordering::SeqCst) }

    /// Release the provider subscription. Later notifications are not observed.
    pub fn detach(&self) {
        if let Some(sub) = self.subscription.lock().take() {
            sub.unsubscribe();
            debug!(target: "studio_admin::session", "provider subscription released");
        }
    }

    pub fn is_attached(&self) -> bool { self.subscription.lock().is_some() }
}

impl Drop for SessionOracle {
    fn drop(&mut self) { self.detach(); }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod session_tests;
