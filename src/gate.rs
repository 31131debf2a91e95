//! Admin Gate: stateless projection from session to privileged affordances.

use serde::Serialize;
use tokio::sync::watch;

use crate::identity::Session;

pub const ADMIN_INDICATOR: &str = "Admin • Sign out";

/// Privileged UI a page may render. All-off unless the viewer is an admin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Affordances {
    pub add_controls: bool,
    pub delete_controls: bool,
    pub admin_indicator: Option<&'static str>,
}

impl Affordances {
    pub fn none() -> Self { Self::default() }

    pub fn admin() -> Self {
        Self { add_controls: true, delete_controls: true, admin_indicator: Some(ADMIN_INDICATOR) }
    }

    pub fn any(&self) -> bool { self.add_controls || self.delete_controls || self.admin_indicator.is_some() }
}

pub fn project(session: &Session) -> Affordances {
    if session.is_admin { Affordances::admin() } else { Affordances::none() }
}

/// Live view over the session channel; every read re-evaluates the latest session.
#[derive(Clone)]
pub struct AdminGate {
    rx: watch::Receiver<Session>,
}

impl AdminGate {
    pub fn new(rx: watch::Receiver<Session>) -> Self { Self { rx } }

    pub fn current(&self) -> Affordances { project(&self.rx.borrow()) }

    /// Wait for the next session change and return the re-evaluated affordances.
    /// `None` once the session source is gone.
    pub async fn changed(&mut self) -> Option<Affordances> {
        self.rx.changed().await.ok()?;
        Some(project(&self.rx.borrow_and_update()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{AllowList, Identity};

    #[test]
    fn projection_follows_is_admin_only() {
        let allow = AllowList::new(["abc"]);
        let admin = Session::evaluate(Some(Identity::new("abc", None)), &allow);
        let guest = Session::evaluate(Some(Identity::new("xyz", None)), &allow);
        assert_eq!(project(&admin), Affordances::admin());
        assert_eq!(project(&admin).admin_indicator, Some("Admin • Sign out"));
        assert_eq!(project(&guest), Affordances::none());
        assert!(!project(&Session::signed_out()).any());
    }

    #[tokio::test]
    async fn gate_tracks_channel() {
        let (tx, rx) = watch::channel(Session::signed_out());
        let mut gate = AdminGate::new(rx);
        assert!(!gate.current().any());

        let allow = AllowList::new(["abc"]);
        tx.send_replace(Session::evaluate(Some(Identity::new("abc", None)), &allow));
        assert_eq!(gate.changed().await, Some(Affordances::admin()));

        tx.send_replace(Session::signed_out());
        assert!(!gate.current().any(), "no stale privileged UI");
        drop(tx);
        assert_eq!(gate.changed().await, Some(Affordances::none()));
        assert_eq!(gate.changed().await, None);
    }
}
