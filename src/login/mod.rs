//! Login modal: popup sign-in, passwordless link request and link completion.

mod prompt;
mod flow;

pub use prompt::{EmailPrompt, NoPrompt};
pub use flow::{CompletionHook, LoginFlow, LoginOutcome, LoginSettings, LoginState, LINK_SENT_NOTICE};
