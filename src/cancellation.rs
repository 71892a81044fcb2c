//! Session-generation cancellation: CancellationToken + generation guard.
//! Every abort advances the generation; callbacks captured under an older
//! generation are discarded instead of mutating the current session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

/// Owns the current session generation and its root cancellation token.
/// The counter is shared with every issued guard so a guard can tell it went stale.
pub struct SessionGeneration {
    current_token: RwLock<CancellationToken>,
    generation: Arc<AtomicU64>,
}

impl SessionGeneration {
    pub fn new() -> Self {
        Self {
            current_token: RwLock::new(CancellationToken::new()),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Cancel everything issued so far, advance the generation and return it.
    pub fn cancel_and_advance(&self) -> u64 {
        let mut token_guard = self.current_token.write();
        token_guard.cancel();
        *token_guard = CancellationToken::new();
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Guard for a task started under the current generation.
    pub fn guard(&self) -> GenerationGuard {
        let token = self.current_token.read().child_token();
        GenerationGuard {
            generation: Arc::clone(&self.generation),
            my_generation: self.generation.load(Ordering::SeqCst),
            token,
        }
    }

    pub fn current(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// True if `generation` is still the live one.
    #[inline]
    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }
}

impl Default for SessionGeneration {
    fn default() -> Self {
        Self::new()
    }
}

/// Handed to every spawned task (dispatch, synthesis, timers).
#[derive(Clone)]
pub struct GenerationGuard {
    generation: Arc<AtomicU64>,
    my_generation: u64,
    token: CancellationToken,
}

impl GenerationGuard {
    #[inline]
    pub fn is_current(&self) -> bool {
        self.generation.load(Ordering::SeqCst) == self.my_generation
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Not cancelled and still the current generation.
    #[inline]
    pub fn should_continue(&self) -> bool {
        !self.is_cancelled() && self.is_current()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn my_generation(&self) -> u64 {
        self.my_generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_invalidates_outstanding_guards() {
        let gen = SessionGeneration::new();
        let guard = gen.guard();
        assert!(guard.should_continue());
        assert_eq!(guard.my_generation(), 0);

        assert_eq!(gen.cancel_and_advance(), 1);
        assert!(guard.is_cancelled());
        assert!(!guard.is_current());
        assert!(!guard.should_continue());
    }

    #[test]
    fn fresh_guard_after_advance_is_live() {
        let gen = SessionGeneration::new();
        gen.cancel_and_advance();
        gen.cancel_and_advance();
        let guard = gen.guard();
        assert_eq!(guard.my_generation(), 2);
        assert!(guard.should_continue());
        assert!(gen.is_current(2));
        assert!(!gen.is_current(1));
    }
}
