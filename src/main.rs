use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use focusflow_voice::config::SurfaceConfig;
use focusflow_voice::{init_tracing, run, ConfigOverrides, RunOptions};

/// FocusFlow voice - console dialogue session.
///
/// In voice mode stdin lines stand in for speech transcripts; in text mode
/// they are typed commands. Session commands: /wake /voice /text /abort
/// /clear /metrics /quit
#[derive(Parser)]
#[command(name = "focusflow-voice", version, about)]
struct Cli {
    /// JSON config file; defaults are used when omitted or unreadable
    #[arg(short, long, env = "FOCUSFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite file for the persisted conversation log
    #[arg(long, env = "FOCUSFLOW_HISTORY")]
    history: Option<PathBuf>,

    /// Start in text mode instead of waiting for a wake phrase
    #[arg(long)]
    text: bool,

    /// Response generator endpoint
    #[arg(long, env = "FOCUSFLOW_RESPONDER_URL")]
    responder_url: Option<String>,

    /// Bearer token for the response generator
    #[arg(long, env = "FOCUSFLOW_RESPONDER_KEY", hide_env_values = true)]
    responder_key: Option<String>,

    /// User the conversation and tasks belong to
    #[arg(long, env = "FOCUSFLOW_USER_ID")]
    user_id: Option<String>,

    /// Timing profile
    #[arg(long, env = "FOCUSFLOW_SURFACE", value_enum)]
    surface: Option<Surface>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Surface {
    /// Full voice assistant (3 s silence commit)
    Voice,
    /// Chat-style surface (1.5 s silence commit)
    Chat,
}

impl From<Surface> for SurfaceConfig {
    fn from(surface: Surface) -> Self {
        match surface {
            Surface::Voice => SurfaceConfig::voice_assistant(),
            Surface::Chat => SurfaceConfig::chat(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    init_tracing();

    let options = RunOptions {
        config_path: cli.config,
        history_db: cli.history,
        start_in_text_mode: cli.text,
        overrides: ConfigOverrides {
            responder_url: cli.responder_url,
            responder_key: cli.responder_key,
            user_id: cli.user_id,
            surface: cli.surface.map(SurfaceConfig::from),
        },
    };

    run(options).await?;
    Ok(())
}
