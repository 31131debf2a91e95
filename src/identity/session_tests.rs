use super::*;
use async_trait::async_trait;
use tokio::sync::Notify;

use crate::identity::{IdentityListener, LocalIdentityProvider, PopupScript, ProviderError, SignInMethod};

/// Local provider whose sign-out waits until the test releases it.
struct GatedSignOut {
    inner: LocalIdentityProvider,
    gate: Notify,
}

#[async_trait]
impl IdentityProvider for GatedSignOut {
    fn subscribe(&self, listener: IdentityListener) -> Subscription { self.inner.subscribe(listener) }
    async fn sign_in_with_popup(&self, method: SignInMethod) -> Result<Identity, ProviderError> {
        self.inner.sign_in_with_popup(method).await
    }
    async fn send_sign_in_link(&self, email: &str, return_url: &str) -> Result<(), ProviderError> {
        self.inner.send_sign_in_link(email, return_url).await
    }
    fn is_sign_in_link(&self, url: &str) -> bool { self.inner.is_sign_in_link(url) }
    async fn complete_sign_in_with_link(&self, email: &str, url: &str) -> Result<Identity, ProviderError> {
        self.inner.complete_sign_in_with_link(email, url).await
    }
    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.gate.notified().await;
        self.inner.sign_out().await
    }
}

fn provider_with_owner() -> Arc<LocalIdentityProvider> {
    let p = Arc::new(LocalIdentityProvider::default());
    p.register_with_uid("abc", "owner@studio.test");
    p.register_with_uid("xyz", "guest@studio.test");
    p
}

#[tokio::test]
async fn admin_iff_uid_in_allow_list() {
    let p = provider_with_owner();
    let oracle = SessionOracle::attach(p.clone(), AllowList::new(["abc"]));
    assert_eq!(oracle.session(), Session::signed_out());

    p.set_popup(PopupScript::Account("owner@studio.test".into()));
    p.sign_in_with_popup(SignInMethod::Google).await.unwrap();
    assert!(oracle.is_admin());
    assert_eq!(oracle.identity().map(|i| i.uid).as_deref(), Some("abc"));

    p.set_popup(PopupScript::Account("guest@studio.test".into()));
    p.sign_in_with_popup(SignInMethod::Google).await.unwrap();
    assert!(!oracle.is_admin());
    assert_eq!(oracle.identity().map(|i| i.uid).as_deref(), Some("xyz"));
}

#[tokio::test]
async fn allow_list_removal_revokes_without_sign_out() {
    let p = provider_with_owner();
    let oracle = SessionOracle::attach(p.clone(), AllowList::new(["abc"]));
    p.set_popup(PopupScript::Account("owner@studio.test".into()));
    p.sign_in_with_popup(SignInMethod::Google).await.unwrap();
    assert!(oracle.is_admin());

    oracle.set_allow_list(AllowList::default());
    assert!(!oracle.is_admin());
    assert!(oracle.identity().is_some(), "still signed in");
    assert_eq!(p.sign_out_calls(), 0);
}

#[tokio::test]
async fn error_notification_keeps_prior_session() {
    let p = provider_with_owner();
    let oracle = SessionOracle::attach(p.clone(), AllowList::new(["abc"]));
    p.set_popup(PopupScript::Account("owner@studio.test".into()));
    p.sign_in_with_popup(SignInMethod::Google).await.unwrap();

    p.notify_error(ProviderError::Network("token refresh".into()));
    assert!(oracle.is_admin());
}

#[tokio::test]
async fn later_notification_wins() {
    let p = provider_with_owner();
    let oracle = SessionOracle::attach(p.clone(), AllowList::new(["abc"]));
    oracle.observe(Ok(Some(Identity::new("abc", None))));
    oracle.observe(Ok(Some(Identity::new("xyz", None))));
    assert!(!oracle.is_admin());
    oracle.observe(Ok(None));
    oracle.observe(Ok(Some(Identity::new("abc", None))));
    assert!(oracle.is_admin());
}

#[tokio::test]
async fn logout_twice_sends_one_request() {
    let p = provider_with_owner();
    let oracle = SessionOracle::attach(p.clone(), AllowList::new(["abc"]));
    p.set_popup(PopupScript::Account("owner@studio.test".into()));
    p.sign_in_with_popup(SignInMethod::Google).await.unwrap();

    assert_eq!(oracle.logout().await, Ok(LogoutOutcome::SignedOut));
    assert_eq!(oracle.logout().await, Ok(LogoutOutcome::AlreadySignedOut));
    assert_eq!(p.sign_out_calls(), 1);
    assert!(!oracle.is_admin());
}

#[tokio::test]
async fn concurrent_logout_joins_the_request_in_flight() {
    let p = Arc::new(GatedSignOut { inner: LocalIdentityProvider::default(), gate: Notify::new() });
    p.inner.register_with_uid("abc", "owner@studio.test");
    p.inner.set_popup(PopupScript::Account("owner@studio.test".into()));
    let oracle = SessionOracle::attach(p.clone(), AllowList::new(["abc"]));
    p.sign_in_with_popup(SignInMethod::Google).await.unwrap();
    assert!(oracle.is_admin());

    let (first, second, _) = futures::join!(oracle.logout(), oracle.logout(), async { p.gate.notify_one() });
    assert_eq!(first, Ok(LogoutOutcome::SignedOut));
    assert_eq!(second, Ok(LogoutOutcome::InFlight));
    assert_eq!(p.inner.sign_out_calls(), 1);
    assert!(!oracle.sign_out_pending());
}

#[tokio::test]
async fn failed_logout_still_revokes_locally() {
    let p = provider_with_owner();
    let oracle = SessionOracle::attach(p.clone(), AllowList::new(["abc"]));
    p.set_popup(PopupScript::Account("owner@studio.test".into()));
    p.sign_in_with_popup(SignInMethod::Google).await.unwrap();

    p.set_offline(true);
    let err = oracle.logout().await.unwrap_err();
    assert_eq!(err.code_str(), "sign_out_failed");
    assert!(!oracle.is_admin());
    assert!(oracle.sign_out_pending());
}

#[tokio::test]
async fn logout_retries_after_failed_sign_out() {
    let p = provider_with_owner();
    let oracle = SessionOracle::attach(p.clone(), AllowList::new(["abc"]));
    p.set_popup(PopupScript::Account("owner@studio.test".into()));
    p.sign_in_with_popup(SignInMethod::Google).await.unwrap();

    p.set_offline(true);
    assert!(oracle.logout().await.is_err());
    assert!(p.current().is_some(), "provider still holds the session");

    p.set_offline(false);
    assert_eq!(oracle.logout().await, Ok(LogoutOutcome::SignedOut));
    assert_eq!(p.sign_out_calls(), 2);
    assert!(p.current().is_none());
    assert!(!oracle.sign_out_pending());
    assert_eq!(oracle.logout().await, Ok(LogoutOutcome::AlreadySignedOut));
    assert_eq!(p.sign_out_calls(), 2);
}

#[tokio::test]
async fn watchers_see_changes_and_detach_stops_updates() {
    let p = provider_with_owner();
    let oracle = SessionOracle::attach(p.clone(), AllowList::new(["abc"]));
    let mut rx = oracle.watch();
    p.set_popup(PopupScript::Account("owner@studio.test".into()));
    p.sign_in_with_popup(SignInMethod::Google).await.unwrap();
    rx.changed().await.unwrap();
    assert!(rx.borrow_and_update().is_admin);

    oracle.detach();
    assert!(!oracle.is_attached());
    assert_eq!(p.listener_count(), 0);
    p.sign_out().await.unwrap();
    assert!(oracle.is_admin(), "detached oracle no longer observes the provider");
}

#[tokio::test]
async fn drop_unsubscribes() {
    let p = provider_with_owner();
    {
        let _oracle = SessionOracle::attach(p.clone(), AllowList::new(["abc"]));
        assert_eq!(p.listener_count(), 1);
    }
    assert_eq!(p.listener_count(), 0);
}
