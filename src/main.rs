//!
//! studio-admin console
//! --------------------
//! Interactive driver for the hidden admin surface against an in-process identity
//! provider. Useful for exercising long-press timing, the chord, and both login paths.

use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use studio_admin::activation::TriggerId;
use studio_admin::cli::{parse_command, Console, EditorPrompt, Reply, USAGE};
use studio_admin::config::AdminConfig;
use studio_admin::dock::DockServices;
use studio_admin::identity::LocalIdentityProvider;
use studio_admin::storage::{FileStore, KeyValueStore, MemoryStore, StoreSettings};

/// Trigger handles a page exposes: the brand logo and the footer copyright.
const TRIGGERS: [&str; 2] = ["brand-logo", "footer-copyright"];

fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("building log filter")?;
    fmt().with_env_filter(filter).init();

    let config = AdminConfig::load()?;
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "studio_admin::startup",
        "studio-admin starting: RUST_LOG='{}', hold_ms={}, chord={}, admins={}, return_url='{}', state={}",
        rust_log,
        config.hold_ms,
        config.chord,
        config.allow_list.len(),
        config.return_url,
        config.state_file.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "<memory>".to_string())
    );

    let store: Arc<dyn KeyValueStore> = match &config.state_file {
        Some(path) => Arc::new(FileStore::open(path, StoreSettings::default())?),
        None => Arc::new(MemoryStore::new()),
    };
    let editor = Arc::new(Mutex::new(DefaultEditor::new().context("initialising line editor")?));
    let provider = Arc::new(LocalIdentityProvider::new(config.link_ttl()));
    let services = DockServices { provider: provider.clone(), store, prompt: Arc::new(EditorPrompt::new(editor.clone())) };
    let triggers: Vec<TriggerId> = TRIGGERS.iter().map(|t| TriggerId::new(*t)).collect();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;

    let mut console = rt.block_on(Console::start(config, provider, services, triggers))?;
    println!("studio-admin console. Triggers: {}. Type 'help' for commands.", TRIGGERS.join(", "));

    loop {
        // The lock is released before the command runs; the email prompt takes it again.
        let read = {
            let mut rl = editor.lock();
            let read = rl.readline("admin> ");
            if let Ok(l) = &read { let _ = rl.add_history_entry(l.as_str()); }
            read
        };
        let line = match read {
            Ok(l) => l,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                warn!(target: "studio_admin::startup", "readline failed: {}", e);
                break;
            }
        };
        let cmd = match parse_command(&line) {
            Ok(Some(c)) => c,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("{}", e.message());
                if e.code_str() == "unknown_command" { eprintln!("{}", USAGE); }
                continue;
            }
        };
        match rt.block_on(console.execute(cmd)) {
            Ok(Reply::Lines(lines)) => {
                for l in lines { println!("{}", l); }
            }
            Ok(Reply::Quit) => break,
            Err(e) => eprintln!("Error: {}", e),
        }
    }

    // Unmount inside the runtime so pending timers are aborted on it.
    rt.block_on(async move { drop(console) });
    Ok(())
}
