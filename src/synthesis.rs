//! Speech synthesis adapter.
//! `speak` resolves exactly once per call unless `stop_speaking` cut it short,
//! in which case the orchestrator has already moved on and ignores the result.

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use parking_lot::Mutex;

use crate::error::SynthesisError;

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn speak(&self, text: &str) -> Result<(), SynthesisError>;
    fn stop_speaking(&self);
}

/// Writes replies to stdout and simulates playback time per word.
pub struct ConsoleSynthesizer {
    per_word: Duration,
    current: Mutex<CancellationToken>,
}

impl ConsoleSynthesizer {
    pub fn new(per_word: Duration) -> Self {
        Self {
            per_word,
            current: Mutex::new(CancellationToken::new()),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for ConsoleSynthesizer {
    async fn speak(&self, text: &str) -> Result<(), SynthesisError> {
        let token = {
            let mut current = self.current.lock();
            *current = CancellationToken::new();
            current.clone()
        };
        {
            let mut out = std::io::stdout().lock();
            writeln!(out, "assistant> {text}").map_err(|e| SynthesisError::Failed(e.to_string()))?;
        }
        let words = text.split_whitespace().count() as u32;
        tokio::select! {
            _ = tokio::time::sleep(self.per_word * words) => Ok(()),
            _ = token.cancelled() => Err(SynthesisError::Interrupted),
        }
    }

    fn stop_speaking(&self) {
        self.current.lock().cancel();
    }
}
