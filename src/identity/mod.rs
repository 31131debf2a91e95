//! Identity, allow-list authorization and session tracking.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod allow_list;
mod provider;
mod session;

pub use principal::Identity;
pub use allow_list::AllowList;
pub use provider::{
    IdentityListener, IdentityNotification, IdentityProvider, LocalIdentityProvider, PopupScript, ProviderError,
    SentLink, SignInMethod, Subscription,
};
pub use session::{LogoutOutcome, Session, SessionOracle};
