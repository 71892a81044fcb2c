//! FocusFlow voice: dialogue orchestrator for a voice-driven productivity assistant.
//! Main library: tracing setup, collaborator wiring, console session loop.

pub mod cancellation;
pub mod capture;
pub mod config;
pub mod context;
pub mod debounce;
pub mod dispatcher;
pub mod error;
pub mod history;
pub mod intent;
pub mod interrupt;
pub mod local;
pub mod metrics;
pub mod orchestrator;
pub mod playback;
pub mod responder;
pub mod scheduler;
pub mod state_machine;
pub mod synthesis;
pub mod tasks;
pub mod wake;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

pub use config::{ConfigOverrides, OrchestratorConfig};
pub use error::{Error, Result};
pub use orchestrator::{Collaborators, Orchestrator, OrchestratorEvent, OrchestratorHandle};
pub use scheduler::Fragment;
pub use state_machine::{DialogueState, InputMode};

use capture::NullCapture;
use history::{HistoryStore, Role};
use responder::{HttpResponder, ResponseGenerator, UnconfiguredResponder};
use synthesis::ConsoleSynthesizer;
use tasks::InMemoryTaskStore;

/// Current unix time in seconds.
pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Install the global subscriber. `RUST_LOG` filters; `FOCUSFLOW_LOG_JSON=1`
/// switches to JSON lines. Logs go to stderr so stdout stays the conversation.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("focusflow_voice=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    let json = std::env::var("FOCUSFLOW_LOG_JSON").is_ok_and(|v| v == "1");
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if result.is_err() {
        // Already installed (tests, embedding host).
        tracing::debug!("tracing subscriber already set");
    }
}

/// Options for the console session.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config_path: Option<PathBuf>,
    pub overrides: ConfigOverrides,
    pub history_db: Option<PathBuf>,
    pub start_in_text_mode: bool,
}

/// Run an interactive console session: stdin lines are transcript fragments in
/// voice mode and typed commands in text mode. Lines starting with `/` control
/// the session (`/wake`, `/voice`, `/text`, `/abort`, `/clear`, `/quit`).
pub async fn run(options: RunOptions) -> Result<()> {
    info!("focusflow-voice starting");
    let config = OrchestratorConfig::load(options.config_path.as_deref(), &options.overrides)?;

    let responder: Arc<dyn ResponseGenerator> = match HttpResponder::new(&config.responder) {
        Ok(client) => {
            info!("response generator client initialized");
            Arc::new(client)
        }
        Err(e) => {
            warn!(error = %e, "response generator unavailable, remote replies disabled");
            Arc::new(UnconfiguredResponder)
        }
    };

    let mut collaborators = Collaborators::new(
        Arc::new(NullCapture::new()),
        Arc::new(ConsoleSynthesizer::new(Duration::from_millis(120))),
        Arc::new(InMemoryTaskStore::new()),
        responder,
    );
    if let Some(path) = &options.history_db {
        match HistoryStore::open(path, config.persisted_log_capacity) {
            Ok(store) => collaborators = collaborators.with_history(store),
            Err(e) => warn!(error = %e, "history store failed to open, persistence disabled"),
        }
    }

    let handle = Orchestrator::spawn(config, collaborators)?;
    if options.start_in_text_mode {
        handle.set_mode(InputMode::Text)?;
    } else {
        handle.listen_for_wake()?;
    }
    tokio::spawn(print_events(handle.clone()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line {
            "/quit" => break,
            "/wake" => handle.activate()?,
            "/voice" => {
                handle.set_mode(InputMode::Voice)?;
                handle.listen_for_wake()?;
            }
            "/text" => handle.set_mode(InputMode::Text)?,
            "/abort" => handle.abort()?,
            "/clear" => handle.clear_conversation()?,
            "/metrics" => {
                for (name, summary) in handle.metrics().summary() {
                    println!(
                        "{name}: p50={:.0}us p95={:.0}us n={}",
                        summary.p50_us, summary.p95_us, summary.count
                    );
                }
            }
            _ if handle.mode() == InputMode::Text => handle.submit_text(line)?,
            _ => handle.push_fragment(Fragment::final_(line))?,
        }
    }

    handle.shutdown()?;
    info!("focusflow-voice stopped");
    Ok(())
}

async fn print_events(handle: OrchestratorHandle) {
    let mut events = handle.subscribe_events();
    let mut state = handle.subscribe_state();
    loop {
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    return;
                }
                let current = *state.borrow_and_update();
                println!("[{current}]");
            }
            event = events.recv() => match event {
                Ok(OrchestratorEvent::WakeAcknowledged) => println!("(listening)"),
                Ok(OrchestratorEvent::TurnAppended { turn }) if turn.role == Role::System => {
                    println!("system> {}", turn.text);
                }
                Ok(OrchestratorEvent::CaptureDegraded { error }) => println!("(voice unavailable: {error})"),
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "event printer lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            }
        }
    }
}
