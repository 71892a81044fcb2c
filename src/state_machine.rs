//! Dialogue state machine: Dormant → Listening → Committing → Processing → Speaking → Listening.
//! One tagged state replaces the listening/processing/speaking flag soup, so
//! impossible combinations (listening while speaking) cannot be represented.

use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DialogueState {
    /// Not attending to speech except for wake phrases.
    Dormant,
    /// Accumulating fragments toward a command.
    Listening,
    /// Buffer frozen into a command, classification pending.
    Committing,
    /// Waiting on a local handler, the task store or the remote responder.
    Processing,
    /// Revealing and speaking a reply.
    Speaking,
}

impl fmt::Display for DialogueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialogueState::Dormant => write!(f, "Dormant"),
            DialogueState::Listening => write!(f, "Listening"),
            DialogueState::Committing => write!(f, "Committing"),
            DialogueState::Processing => write!(f, "Processing"),
            DialogueState::Speaking => write!(f, "Speaking"),
        }
    }
}

/// Mutually exclusive input mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputMode {
    Voice,
    Text,
}

impl DialogueState {
    /// Returns whether transitioning from `self` to `next` is valid.
    pub fn can_transition_to(self, next: DialogueState) -> bool {
        use DialogueState::*;
        matches!(
            (self, next),
            (Dormant, Listening) // wake word or explicit activation
                | (Dormant, Committing) // typed command in text mode
                | (Listening, Committing)
                | (Committing, Listening) // empty buffer or aborted sentinel
                | (Committing, Processing)
                | (Processing, Speaking)
                | (Processing, Listening) // barge-in
                | (Speaking, Listening) // barge-in or re-arm after playback
                | (_, Dormant)
        )
    }

    /// States in which new speech is treated as a possible barge-in.
    pub fn is_busy(self) -> bool {
        matches!(self, DialogueState::Processing | DialogueState::Speaking)
    }
}

/// State cell with a watch channel for reactive subscribers.
pub struct StateMachine {
    state: RwLock<DialogueState>,
    mode: RwLock<InputMode>,
    state_tx: watch::Sender<DialogueState>,
}

impl StateMachine {
    pub fn new(mode: InputMode) -> Self {
        let (state_tx, _) = watch::channel(DialogueState::Dormant);
        Self {
            state: RwLock::new(DialogueState::Dormant),
            mode: RwLock::new(mode),
            state_tx,
        }
    }

    pub fn current(&self) -> DialogueState {
        *self.state.read()
    }

    pub fn mode(&self) -> InputMode {
        *self.mode.read()
    }

    pub fn set_mode(&self, mode: InputMode) {
        *self.mode.write() = mode;
        info!(mode = ?mode, "input_mode_set");
    }

    /// Attempt a transition. Unhandled combinations are logged no-ops;
    /// a transition to the current state is accepted silently.
    pub fn transition(&self, next: DialogueState) -> bool {
        let mut state = self.state.write();
        let current = *state;
        if current == next {
            return true;
        }
        if !current.can_transition_to(next) {
            debug!(from = %current, to = %next, "transition_ignored");
            return false;
        }
        *state = next;
        self.state_tx.send_replace(next);
        info!(from = %current, to = %next, "state_transition");
        true
    }

    /// Force Dormant from any state (idle timeout, mode switch, shutdown).
    pub fn force_dormant(&self) {
        let mut state = self.state.write();
        let prev = *state;
        *state = DialogueState::Dormant;
        self.state_tx.send_replace(DialogueState::Dormant);
        if prev != DialogueState::Dormant {
            info!(from = %prev, "force_dormant");
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<DialogueState> {
        self.state_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions_are_valid() {
        let sm = StateMachine::new(InputMode::Voice);
        assert!(sm.transition(DialogueState::Listening));
        assert!(sm.transition(DialogueState::Committing));
        assert!(sm.transition(DialogueState::Processing));
        assert!(sm.transition(DialogueState::Speaking));
        assert!(sm.transition(DialogueState::Listening));
        assert_eq!(sm.current(), DialogueState::Listening);
    }

    #[test]
    fn impossible_transition_is_a_noop() {
        let sm = StateMachine::new(InputMode::Voice);
        assert!(!sm.transition(DialogueState::Speaking));
        assert_eq!(sm.current(), DialogueState::Dormant);

        sm.transition(DialogueState::Listening);
        assert!(!sm.transition(DialogueState::Processing));
        assert_eq!(sm.current(), DialogueState::Listening);
    }

    #[test]
    fn subscribers_observe_changes() {
        let sm = StateMachine::new(InputMode::Voice);
        let rx = sm.subscribe();
        sm.transition(DialogueState::Listening);
        assert_eq!(*rx.borrow(), DialogueState::Listening);
        sm.force_dormant();
        assert_eq!(*rx.borrow(), DialogueState::Dormant);
    }

    #[test]
    fn busy_states() {
        assert!(DialogueState::Processing.is_busy());
        assert!(DialogueState::Speaking.is_busy());
        assert!(!DialogueState::Listening.is_busy());
        assert!(!DialogueState::Committing.is_busy());
    }
}
