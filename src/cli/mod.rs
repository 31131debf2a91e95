//!
//! studio-admin console
//! --------------------
//! Line-oriented commands that drive an `AdminDock` the way a page would: pointer
//! presses on trigger handles, keyboard chords, popup sign-in, link request and
//! reload-at-URL. The binary reads lines with rustyline and hands them to `Console`.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::debug;

use crate::activation::{InputEvent, KeyEvent, PointerKind, TriggerId};
use crate::config::AdminConfig;
use crate::dock::{AdminDock, DockServices};
use crate::error::{AppError, AppResult};
use crate::identity::{LocalIdentityProvider, LogoutOutcome, PopupScript};
use crate::login::{EmailPrompt, LoginOutcome, LoginState};

pub const USAGE: &str = "\
Commands:
  press <trigger> [mouse|touch]       start a press on a trigger handle
  release <trigger> [mouse|touch]     end the press
  leave <trigger>                     pointer left the trigger
  cancel <trigger>                    touch cancelled
  menu <trigger>                      context menu requested on the trigger
  hold <trigger> <ms> [mouse|touch]   press, wait <ms>, release
  key <Ctrl+Shift+L> [repeat]         keydown with modifiers
  login                               open the login modal
  popup [<email>|blocked|cancelled]   interactive sign-in (optionally scripting the popup first)
  link <email>                        request a passwordless sign-in link
  outbox                              list sign-in links sent so far
  open <url|#n>                       reload the page at a URL (or the n-th outbox link)
  dismiss                             dismiss the modal error
  logout                              sign out (admin indicator / modal action)
  close                               close the login modal
  status                              show session, affordances and modal state
  help                                show this help
  quit | exit                         leave the console";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Press { trigger: TriggerId, pointer: PointerKind },
    Release { trigger: TriggerId, pointer: PointerKind },
    Leave(TriggerId),
    Cancel(TriggerId),
    Menu(TriggerId),
    Hold { trigger: TriggerId, pointer: PointerKind, ms: u64 },
    Key(KeyEvent),
    Login,
    Popup(Option<PopupScript>),
    Link(String),
    Outbox,
    Open(String),
    Dismiss,
    Logout,
    Close,
    Status,
    Help,
    Quit,
}

fn usage_err(msg: &str) -> AppError { AppError::user("usage", msg) }

fn parse_pointer(s: Option<&str>) -> AppResult<PointerKind> {
    match s.map(|p| p.to_ascii_lowercase()).as_deref() {
        None | Some("mouse") => Ok(PointerKind::Mouse),
        Some("touch") => Ok(PointerKind::Touch),
        Some(other) => Err(AppError::user("bad_pointer", format!("unknown pointer '{}', expected mouse or touch", other))),
    }
}

/// `Ctrl+Shift+L` style key description; unlike `KeyChord` a bare key is allowed.
pub fn parse_key_event(desc: &str, repeat: bool) -> AppResult<KeyEvent> {
    let mut ev = KeyEvent { repeat, ..Default::default() };
    for part in desc.split('+').map(|p| p.trim()) {
        match part.to_ascii_lowercase().as_str() {
            "" => return Err(AppError::user("bad_key", "empty key segment")),
            "ctrl" | "control" => ev.ctrl = true,
            "shift" => ev.shift = true,
            "alt" | "option" => ev.alt = true,
            "meta" | "cmd" | "super" => ev.meta = true,
            key => {
                if !ev.key.is_empty() { return Err(AppError::user("bad_key", "more than one key named")); }
                ev.key = key.to_string();
            }
        }
    }
    if ev.key.is_empty() { return Err(AppError::user("bad_key", "no key named")); }
    Ok(ev)
}

/// Parse one console line. `Ok(None)` for blank lines.
pub fn parse_command(line: &str) -> AppResult<Option<Command>> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some((head, args)) = parts.split_first() else { return Ok(None) };
    let trigger = |what: &str| -> AppResult<TriggerId> {
        args.first().map(|t| TriggerId::new(*t)).ok_or_else(|| usage_err(&format!("usage: {} <trigger>", what)))
    };
    let cmd = match head.to_ascii_lowercase().as_str() {
        "press" => Command::Press { trigger: trigger("press")?, pointer: parse_pointer(args.get(1).copied())? },
        "release" => Command::Release { trigger: trigger("release")?, pointer: parse_pointer(args.get(1).copied())? },
        "leave" => Command::Leave(trigger("leave")?),
        "cancel" => Command::Cancel(trigger("cancel")?),
        "menu" => Command::Menu(trigger("menu")?),
        "hold" => {
            if args.len() < 2 { return Err(usage_err("usage: hold <trigger> <ms> [mouse|touch]")); }
            let ms = args[1]
                .parse::<u64>()
                .map_err(|_| AppError::user("bad_duration", format!("'{}' is not a number of milliseconds", args[1])))?;
            Command::Hold { trigger: TriggerId::new(args[0]), pointer: parse_pointer(args.get(2).copied())?, ms }
        }
        "key" => {
            let desc = args.first().ok_or_else(|| usage_err("usage: key <Ctrl+Shift+L> [repeat]"))?;
            let repeat = args.get(1).map(|r| r.eq_ignore_ascii_case("repeat")).unwrap_or(false);
            Command::Key(parse_key_event(desc, repeat)?)
        }
        "login" => Command::Login,
        "popup" => match args.first() {
            None => Command::Popup(None),
            Some(a) if a.eq_ignore_ascii_case("blocked") => Command::Popup(Some(PopupScript::Blocked)),
            Some(a) if a.eq_ignore_ascii_case("cancelled") => Command::Popup(Some(PopupScript::Cancelled)),
            Some(email) => Command::Popup(Some(PopupScript::Account(email.to_string()))),
        },
        // The email may legitimately be empty; the login flow rejects it.
        "link" => Command::Link(args.join(" ")),
        "outbox" => Command::Outbox,
        "open" => Command::Open(args.first().ok_or_else(|| usage_err("usage: open <url|#n>"))?.to_string()),
        "dismiss" => Command::Dismiss,
        "logout" | "signout" => Command::Logout,
        "close" => Command::Close,
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(AppError::user("unknown_command", format!("unknown command '{}', try 'help'", other))),
    };
    Ok(Some(cmd))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Lines(Vec<String>),
    Quit,
}

impl Reply {
    fn line<S: Into<String>>(s: S) -> Self { Reply::Lines(vec![s.into()]) }
}

pub fn describe_outcome(outcome: &LoginOutcome) -> String {
    match outcome {
        LoginOutcome::Authenticated(id) => format!("signed in as {}", id.label()),
        LoginOutcome::LinkSent => "sign-in link sent".to_string(),
        LoginOutcome::Rejected(e) => format!("rejected: {}", e.message()),
        LoginOutcome::Failed(e) => format!("failed: {}", e.message()),
        LoginOutcome::Busy => "busy, try again when the current request finishes".to_string(),
        LoginOutcome::NotALink => "not a sign-in link".to_string(),
    }
}

fn describe_modal(state: &LoginState) -> String {
    match state {
        LoginState::Closed => "closed".to_string(),
        LoginState::Open { error: None } => "open".to_string(),
        LoginState::Open { error: Some(e) } => format!("open, error: {}", e.message()),
        LoginState::SigningIn => "open, signing in".to_string(),
        LoginState::SendingLink => "open, sending link".to_string(),
        LoginState::LinkSent { email } => format!("open, link sent to {}", email),
        LoginState::CompletingLink => "open, completing link".to_string(),
        LoginState::Authenticated { .. } => "closed (authenticated)".to_string(),
    }
}

pub fn render_status(dock: &AdminDock) -> Vec<String> {
    let session = dock.session();
    let aff = dock.affordances();
    let mut out = Vec::new();
    match &session.identity {
        Some(id) => out.push(format!("session: {} (uid {})", id.label(), id.uid)),
        None => out.push("session: signed out".to_string()),
    }
    out.push(format!("admin: {}", if session.is_admin { "yes" } else { "no" }));
    out.push(format!(
        "controls: add={} delete={} indicator={}",
        aff.add_controls,
        aff.delete_controls,
        aff.admin_indicator.unwrap_or("-")
    ));
    let state = dock.login_state();
    out.push(format!("modal: {}", describe_modal(&state)));
    if let Some(notice) = dock.flow().notice() { out.push(format!("notice: {}", notice)); }
    out.push(format!("pending gestures: {}", dock.detector().pending()));
    out
}

/// Owns the mounted dock and the local provider it talks to.
pub struct Console {
    config: AdminConfig,
    provider: Arc<LocalIdentityProvider>,
    services: DockServices,
    triggers: Vec<TriggerId>,
    dock: AdminDock,
}

impl Console {
    pub async fn start(
        config: AdminConfig,
        provider: Arc<LocalIdentityProvider>,
        services: DockServices,
        triggers: Vec<TriggerId>,
    ) -> AppResult<Self> {
        let dock = AdminDock::mount(&config, services.clone(), triggers.clone(), None).await?;
        Ok(Self { config, provider, services, triggers, dock })
    }

    pub fn dock(&self) -> &AdminDock { &self.dock }

    fn input(&self, event: InputEvent) -> Reply {
        let disposition = self.dock.handle_input(event);
        Reply::line(format!("{:?}; modal: {}", disposition, describe_modal(&self.dock.login_state())))
    }

    /// Mount a fresh dock as if the page had been loaded at `url`.
    async fn reload(&mut self, url: &str) -> AppResult<Reply> {
        let dock = AdminDock::mount(&self.config, self.services.clone(), self.triggers.clone(), Some(url)).await?;
        self.dock = dock;
        let mut lines = vec![format!("page loaded at {}", url), describe_outcome(self.dock.resumed())];
        lines.extend(render_status(&self.dock));
        Ok(Reply::Lines(lines))
    }

    fn resolve_url(&self, arg: &str) -> AppResult<String> {
        let Some(n) = arg.strip_prefix('#') else { return Ok(arg.to_string()) };
        let idx: usize = n.parse().map_err(|_| AppError::user("bad_index", format!("'{}' is not an outbox index", arg)))?;
        let outbox = self.provider.outbox();
        idx.checked_sub(1)
            .and_then(|i| outbox.get(i))
            .map(|l| l.url.clone())
            .ok_or_else(|| AppError::user("bad_index", format!("no outbox entry {}", arg)))
    }

    pub async fn execute(&mut self, cmd: Command) -> AppResult<Reply> {
        let reply = match cmd {
            Command::Press { trigger, pointer } => self.input(InputEvent::PressStart { trigger, pointer }),
            Command::Release { trigger, pointer } => self.input(InputEvent::PressEnd { trigger, pointer }),
            Command::Leave(trigger) => self.input(InputEvent::PointerLeave { trigger }),
            Command::Cancel(trigger) => self.input(InputEvent::TouchCancel { trigger }),
            Command::Menu(trigger) => self.input(InputEvent::ContextMenu { trigger }),
            Command::Hold { trigger, pointer, ms } => {
                self.dock.handle_input(InputEvent::PressStart { trigger: trigger.clone(), pointer });
                tokio::time::sleep(Duration::from_millis(ms)).await;
                self.input(InputEvent::PressEnd { trigger, pointer })
            }
            Command::Key(ev) => self.input(InputEvent::KeyDown(ev)),
            Command::Login => {
                self.dock.request_login(true);
                Reply::line(format!("modal: {}", describe_modal(&self.dock.login_state())))
            }
            Command::Popup(script) => {
                if let Some(s) = script { self.provider.set_popup(s); }
                Reply::line(describe_outcome(&self.dock.sign_in_interactive().await))
            }
            Command::Link(email) => Reply::line(describe_outcome(&self.dock.request_link(&email).await)),
            Command::Outbox => {
                let outbox = self.provider.outbox();
                if outbox.is_empty() { return Ok(Reply::line("outbox empty")); }
                Reply::Lines(outbox.iter().enumerate().map(|(i, l)| format!("#{} {} {}", i + 1, l.email, l.url)).collect())
            }
            Command::Open(arg) => {
                let url = self.resolve_url(&arg)?;
                return self.reload(&url).await;
            }
            Command::Dismiss => {
                self.dock.flow().dismiss_error();
                Reply::line(format!("modal: {}", describe_modal(&self.dock.login_state())))
            }
            Command::Logout => match self.dock.logout().await? {
                LogoutOutcome::SignedOut => Reply::line("signed out"),
                LogoutOutcome::AlreadySignedOut => Reply::line("already signed out"),
                LogoutOutcome::InFlight => Reply::line("sign-out already in progress"),
            },
            Command::Close => {
                self.dock.request_login(false);
                Reply::line("modal: closed")
            }
            Command::Status => Reply::Lines(render_status(&self.dock)),
            Command::Help => Reply::line(USAGE),
            Command::Quit => Reply::Quit,
        };
        Ok(reply)
    }
}

pub const EMAIL_PROMPT: &str = "Please provide your email for confirmation: ";

/// Line source shared by the console loop and the email confirmation prompt.
pub trait LineReader: Send {
    fn read_line(&mut self, prompt: &str) -> Result<String, ReadlineError>;
}

impl LineReader for DefaultEditor {
    fn read_line(&mut self, prompt: &str) -> Result<String, ReadlineError> { self.readline(prompt) }
}

/// Email prompt reading through the console's editor. The console loop holds the lock
/// only while it reads a command line.
pub struct EditorPrompt<E> {
    editor: Arc<Mutex<E>>,
}

impl<E> EditorPrompt<E> {
    pub fn new(editor: Arc<Mutex<E>>) -> Self { Self { editor } }
}

impl<E: LineReader> EmailPrompt for EditorPrompt<E> {
    fn confirm_email(&self) -> Option<String> {
        match self.editor.lock().read_line(EMAIL_PROMPT) {
            Ok(line) => Some(line.trim().to_string()).filter(|s| !s.is_empty()),
            Err(e) => {
                debug!(target: "studio_admin::login", "email prompt dismissed: {}", e);
                None
            }
        }
    }
}
