use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::activation::Activation;
use crate::error::AppError;
use crate::identity::{Identity, IdentityProvider, ProviderError, SignInMethod};
use crate::storage::KeyValueStore;

use super::prompt::EmailPrompt;

pub const LINK_SENT_NOTICE: &str = "Sign-in link sent! Check your email inbox.";

/// Modal state. `Closed` and `Authenticated` render no modal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    Closed,
    Open { error: Option<AppError> },
    SigningIn,
    SendingLink,
    LinkSent { email: String },
    CompletingLink,
    Authenticated { uid: String },
}

impl LoginState {
    pub fn is_open(&self) -> bool {
        !matches!(self, LoginState::Closed | LoginState::Authenticated { .. })
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, LoginState::SigningIn | LoginState::SendingLink | LoginState::CompletingLink)
    }

    pub fn error(&self) -> Option<&AppError> {
        match self {
            LoginState::Open { error } => error.as_ref(),
            _ => None,
        }
    }
}

/// What a login action ended in. Failures carry the visible error; nothing is thrown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated(Identity),
    LinkSent,
    /// Input rejected before reaching the provider.
    Rejected(AppError),
    Failed(AppError),
    Busy,
    NotALink,
}

pub type CompletionHook = Arc<dyn Fn(&Identity) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct LoginSettings {
    pub return_url: String,
    pub email_key: String,
    pub method: SignInMethod,
}

impl Default for LoginSettings {
    fn default() -> Self {
        Self { return_url: "http://localhost:3000/".into(), email_key: "admin-email".into(), method: SignInMethod::Google }
    }
}

/// Modal-driven login with an interactive popup path and a passwordless link path.
pub struct LoginFlow {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn KeyValueStore>,
    prompt: Arc<dyn EmailPrompt>,
    settings: LoginSettings,
    state: Mutex<LoginState>,
    on_complete: RwLock<Option<CompletionHook>>,
}

impl LoginFlow {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn KeyValueStore>,
        prompt: Arc<dyn EmailPrompt>,
        settings: LoginSettings,
    ) -> Self {
        Self { provider, store, prompt, settings, state: Mutex::new(LoginState::Closed), on_complete: RwLock::new(None) }
    }

    /// Called once per successful authentication, after the modal has closed.
    pub fn set_completion_hook<F: Fn(&Identity) + Send + Sync + 'static>(&self, hook: F) {
        *self.on_complete.write() = Some(Arc::new(hook));
    }

    pub fn state(&self) -> LoginState { self.state.lock().clone() }
    pub fn is_open(&self) -> bool { self.state.lock().is_open() }
    pub fn error(&self) -> Option<AppError> { self.state.lock().error().cloned() }

    pub fn notice(&self) -> Option<&'static str> {
        matches!(*self.state.lock(), LoginState::LinkSent { .. }).then_some(LINK_SENT_NOTICE)
    }

    pub fn open(&self) {
        let mut st = self.state.lock();
        if !st.is_open() {
            *st = LoginState::Open { error: None };
            debug!(target: "studio_admin::login", "modal opened");
        }
    }

    pub fn close(&self) {
        let mut st = self.state.lock();
        if st.is_open() {
            *st = LoginState::Closed;
            debug!(target: "studio_admin::login", "modal closed");
        }
    }

    pub fn toggle(&self) {
        if self.is_open() { self.close() } else { self.open() }
    }

    pub fn apply(&self, activation: &Activation) {
        match activation {
            Activation::LongPress(_) => self.open(),
            Activation::Chord => self.toggle(),
        }
    }

    pub fn dismiss_error(&self) {
        let mut st = self.state.lock();
        if let LoginState::Open { error } = &mut *st { *error = None; }
    }

    /// Show an error raised elsewhere (e.g. sign-out) in the modal. Ignored while a login
    /// request is in flight; returns whether the error is now displayed.
    pub fn show_error(&self, err: AppError) -> bool {
        let mut st = self.state.lock();
        if st.is_busy() { return false; }
        *st = LoginState::Open { error: Some(err) };
        true
    }

    fn begin(&self, next: LoginState) -> bool {
        let mut st = self.state.lock();
        if st.is_busy() { return false; }
        *st = next;
        true
    }

    /// Record a failure. If the viewer closed the modal meanwhile, it stays closed.
    fn fail(&self, busy: LoginState, err: AppError) {
        let mut st = self.state.lock();
        if *st == busy {
            *st = LoginState::Open { error: Some(err) };
        }
    }

    /// Completion funnel for both paths. Safe to call repeatedly; only the first call for
    /// an identity transitions and runs the hook.
    pub fn complete(&self, identity: &Identity) {
        let transitioned = {
            let mut st = self.state.lock();
            match &*st {
                LoginState::Authenticated { uid } if *uid == identity.uid => false,
                _ => {
                    *st = LoginState::Authenticated { uid: identity.uid.clone() };
                    true
                }
            }
        };
        if !transitioned { return; }
        info!(target: "studio_admin::login", "login complete uid={}", identity.uid);
        let hook = self.on_complete.read().clone();
        if let Some(h) = hook { h(identity); }
    }

    pub async fn sign_in_interactive(&self) -> LoginOutcome {
        if !self.begin(LoginState::SigningIn) { return LoginOutcome::Busy; }
        match self.provider.sign_in_with_popup(self.settings.method).await {
            Ok(identity) => {
                self.complete(&identity);
                LoginOutcome::Authenticated(identity)
            }
            Err(e) => {
                warn!(target: "studio_admin::login", "popup sign-in failed: {}", e);
                let err = AppError::auth(e.code(), "Sign-in failed. Please try again.");
                self.fail(LoginState::SigningIn, err.clone());
                LoginOutcome::Failed(err)
            }
        }
    }

    pub async fn request_link(&self, email: &str) -> LoginOutcome {
        let email = email.trim();
        if email.is_empty() {
            let err = AppError::user("empty_email", "Please enter your email address");
            {
                let mut st = self.state.lock();
                if st.is_busy() { return LoginOutcome::Busy; }
                *st = LoginState::Open { error: Some(err.clone()) };
            }
            return LoginOutcome::Rejected(err);
        }
        if !self.begin(LoginState::SendingLink) { return LoginOutcome::Busy; }
        match self.provider.send_sign_in_link(email, &self.settings.return_url).await {
            Ok(()) => {
                if let Err(e) = self.store.set(&self.settings.email_key, email) {
                    warn!(target: "studio_admin::login", "could not persist email, confirmation will be prompted: {:#}", e);
                }
                let mut st = self.state.lock();
                if *st == LoginState::SendingLink {
                    *st = LoginState::LinkSent { email: email.to_string() };
                }
                info!(target: "studio_admin::login", "sign-in link requested");
                LoginOutcome::LinkSent
            }
            Err(e) => {
                warn!(target: "studio_admin::login", "sign-in link request failed: {}", e);
                let err = match &e {
                    ProviderError::InvalidEmail(_) => AppError::user(e.code(), "That email address looks invalid."),
                    _ => AppError::auth(e.code(), "Failed to send sign-in link. Please check your email."),
                };
                self.fail(LoginState::SendingLink, err.clone());
                LoginOutcome::Failed(err)
            }
        }
    }

    /// Finish a passwordless sign-in if `url` is a sign-in link. Call this on page load
    /// before anything else touches the session.
    pub async fn resume_from_url(&self, url: &str) -> LoginOutcome {
        if !self.provider.is_sign_in_link(url) { return LoginOutcome::NotALink; }
        *self.state.lock() = LoginState::CompletingLink;
        info!(target: "studio_admin::login", "completing sign-in link");

        let stored = match self.store.get(&self.settings.email_key) {
            Ok(v) => v.filter(|s| !s.trim().is_empty()),
            Err(e) => {
                warn!(target: "studio_admin::login", "persisted email unavailable: {:#}", e);
                None
            }
        };
        let email = match stored {
            Some(e) => e,
            None => {
                let confirmed = self.prompt.confirm_email().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
                match confirmed {
                    Some(e) => e,
                    None => {
                        let err = AppError::link("email_confirmation_required", "Please confirm your email to finish signing in.");
                        self.fail(LoginState::CompletingLink, err.clone());
                        return LoginOutcome::Failed(err);
                    }
                }
            }
        };

        let result = self.provider.complete_sign_in_with_link(&email, url).await;
        // An email was obtained, so the pending state is spent either way.
        self.clear_persisted_email();
        match result {
            Ok(identity) => {
                self.complete(&identity);
                LoginOutcome::Authenticated(identity)
            }
            Err(e) => {
                warn!(target: "studio_admin::login", "sign-in link completion failed: {}", e);
                let err = AppError::link(e.code(), "Failed to sign in with email link");
                self.fail(LoginState::CompletingLink, err.clone());
                LoginOutcome::Failed(err)
            }
        }
    }

    fn clear_persisted_email(&self) {
        if let Err(e) = self.store.remove(&self.settings.email_key) {
            warn!(target: "studio_admin::login", "could not clear persisted email: {:#}", e);
        }
    }
}

#[cfg(test)]
#[path = "flow_tests.rs"]
mod flow_tests;
