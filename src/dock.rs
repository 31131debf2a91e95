//!
//! Admin dock
//! ----------
//! The single wiring point a page mounts: it completes a pending sign-in link first,
//! then subscribes the session oracle, then arms the activation detector on the page's
//! trigger handles. Pages only ask two questions of it: "is the viewer an admin" and
//! "open/close the login modal". Dropping the dock releases the provider subscription
//! and cancels pending activation timers.

use std::sync::Arc;

use tracing::{info, warn};

use crate::activation::{ActivationDetector, Disposition, InputEvent, TriggerId};
use crate::config::AdminConfig;
use crate::error::{AppError, AppResult};
use crate::gate::{self, AdminGate, Affordances};
use crate::identity::{IdentityProvider, LogoutOutcome, Session, SessionOracle, SignInMethod};
use crate::login::{EmailPrompt, LoginFlow, LoginOutcome, LoginSettings, LoginState};
use crate::storage::KeyValueStore;

/// External collaborators the dock talks to.
#[derive(Clone)]
pub struct DockServices {
    pub provider: Arc<dyn IdentityProvider>,
    pub store: Arc<dyn KeyValueStore>,
    pub prompt: Arc<dyn EmailPrompt>,
}

pub struct AdminDock {
    detector: ActivationDetector,
    flow: Arc<LoginFlow>,
    oracle: Arc<SessionOracle>,
    resumed: LoginOutcome,
}

impl AdminDock {
    /// Mount for a page loaded at `current_url` with the given trigger handles.
    pub async fn mount(
        config: &AdminConfig,
        services: DockServices,
        triggers: Vec<TriggerId>,
        current_url: Option<&str>,
    ) -> AppResult<Self> {
        config.validate()?;
        let activation = config.activation()?;
        let settings = LoginSettings {
            return_url: config.return_url.clone(),
            email_key: config.email_key.clone(),
            method: SignInMethod::Google,
        };
        let flow = Arc::new(LoginFlow::new(services.provider.clone(), services.store, services.prompt, settings));

        let resumed = match current_url {
            Some(url) => flow.resume_from_url(url).await,
            None => LoginOutcome::NotALink,
        };

        let allow = config.allow_list();
        if allow.is_empty() {
            warn!(target: "studio_admin::startup", "allow-list is empty, nobody can administer this site");
        }
        let oracle = Arc::new(SessionOracle::attach(services.provider, allow));
        // Session state comes from the provider subscription alone; the hook only reports.
        let weak_oracle = Arc::downgrade(&oracle);
        flow.set_completion_hook(move |identity| {
            if let Some(o) = weak_oracle.upgrade() {
                info!(target: "studio_admin::login", "login completed uid={} admin={}", identity.uid, o.is_admin());
            }
        });

        let weak_flow = Arc::downgrade(&flow);
        let trigger_count = triggers.len();
        let detector = ActivationDetector::new(activation, triggers, move |a| {
            if let Some(f) = weak_flow.upgrade() { f.apply(&a); }
        })?;

        info!(target: "studio_admin::startup", "admin dock mounted triggers={} admin={}", trigger_count, oracle.is_admin());
        Ok(Self { detector, flow, oracle, resumed })
    }

    pub fn is_admin(&self) -> bool { self.oracle.is_admin() }

    pub fn session(&self) -> Session { self.oracle.session() }

    pub fn affordances(&self) -> Affordances { gate::project(&self.oracle.session()) }

    pub fn gate(&self) -> AdminGate { AdminGate::new(self.oracle.watch()) }

    /// Guard for privileged actions (add/delete). Re-reads the session on every call.
    pub fn require_admin(&self) -> AppResult<()> {
        if self.oracle.is_admin() { Ok(()) } else { Err(AppError::auth("not_admin", "Admin sign-in required")) }
    }

    pub fn request_login(&self, open: bool) {
        if open { self.flow.open() } else { self.flow.close() }
    }

    pub fn toggle_login(&self) { self.flow.toggle() }

    pub fn login_state(&self) -> LoginState { self.flow.state() }

    pub fn handle_input(&self, event: InputEvent) -> Disposition { self.detector.handle(event) }

    /// Outcome of the sign-in link check performed at mount.
    pub fn resumed(&self) -> &LoginOutcome { &self.resumed }

    pub fn flow(&self) -> &LoginFlow { &self.flow }
    /// Shared handle to the login flow; it may outlive the dock.
    pub fn shared_flow(&self) -> Arc<LoginFlow> { self.flow.clone() }
    pub fn oracle(&self) -> &SessionOracle { &self.oracle }
    pub fn detector(&self) -> &ActivationDetector { &self.detector }

    pub async fn sign_in_interactive(&self) -> LoginOutcome { self.flow.sign_in_interactive().await }

    pub async fn request_link(&self, email: &str) -> LoginOutcome { self.flow.request_link(email).await }

    /// Sign-out from the admin indicator or the modal. Closes the modal on success and
    /// shows the error in it on failure.
    pub async fn logout(&self) -> AppResult<LogoutOutcome> {
        match self.oracle.logout().await {
            Ok(out) => {
                self.flow.close();
                Ok(out)
            }
            Err(e) => {
                if self.flow.is_open() { self.flow.show_error(e.clone()); }
                Err(e)
            }
        }
    }

    /// Explicit unmount; dropping the dock does the same.
    pub fn unmount(self) {}
}

impl Drop for AdminDock {
    fn drop(&mut self) {
        let cancelled = self.detector.teardown();
        self.oracle.detach();
        info!(target: "studio_admin::startup", "admin dock unmounted cancelled_timers={}", cancelled);
    }
}
