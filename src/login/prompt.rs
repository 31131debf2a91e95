/// Interactive "please confirm your email" fallback used when a sign-in link is opened
/// without a persisted email (other device, cleared storage, storage unavailable).
pub trait EmailPrompt: Send + Sync {
    /// `None` when the viewer dismisses the prompt.
    fn confirm_email(&self) -> Option<String>;
}

/// Prompt that is always dismissed (headless hosts).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrompt;

impl EmailPrompt for NoPrompt {
    fn confirm_email(&self) -> Option<String> { None }
}

impl<F> EmailPrompt for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn confirm_email(&self) -> Option<String> { self() }
}
