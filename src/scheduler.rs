//! Session event queue and named timers.
//! Everything that can change session state arrives as a `SessionEvent` on one
//! unbounded queue and is handled in arrival order by the orchestrator task.
//! Timers, dispatch and synthesis run as spawned tasks that only post events.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::dispatcher::Dispatch;
use crate::error::SynthesisError;
use crate::orchestrator::SessionSnapshot;
use crate::state_machine::InputMode;

/// One transcript fragment from the speech capture adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub text: String,
    pub is_final: bool,
}

impl Fragment {
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    pub fn final_(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

/// Inputs to the orchestrator loop.
#[derive(Debug)]
pub enum SessionEvent {
    Fragment(Fragment),
    SubmitText(String),
    Activate,
    ListenForWake,
    SetMode(InputMode),
    Abort,
    ClearConversation,
    Timer {
        kind: TimerKind,
        ticket: u64,
    },
    DispatchDone {
        generation: u64,
        command: String,
        outcome: Dispatch,
        started_at: Instant,
    },
    SynthesisDone {
        generation: u64,
        result: Result<(), SynthesisError>,
    },
    Inspect(oneshot::Sender<SessionSnapshot>),
    Shutdown,
}

/// Named timer slots. At most one instance of each is ever armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Commits the transcript buffer after a pause in speech.
    Silence,
    /// Returns the session to Dormant after inactivity.
    Idle,
    /// Ticks the word-by-word reveal.
    WordReveal,
    /// Restarts capture after playback.
    Rearm,
    /// Resubmits a superseding fragment after an abort.
    Grace,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerKind::Silence => write!(f, "silence"),
            TimerKind::Idle => write!(f, "idle"),
            TimerKind::WordReveal => write!(f, "word_reveal"),
            TimerKind::Rearm => write!(f, "rearm"),
            TimerKind::Grace => write!(f, "grace"),
        }
    }
}

struct ArmedTimer {
    ticket: u64,
    repeating: bool,
    handle: JoinHandle<()>,
}

/// Timer slots keyed by kind. Arming a kind aborts its previous task and
/// issues a new ticket; fire events carrying an old ticket are rejected.
pub struct TimerSet {
    tx: mpsc::UnboundedSender<SessionEvent>,
    slots: HashMap<TimerKind, ArmedTimer>,
    next_ticket: u64,
}

impl TimerSet {
    pub fn new(tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            tx,
            slots: HashMap::new(),
            next_ticket: 0,
        }
    }

    /// One-shot timer. Replaces any armed timer of the same kind.
    pub fn arm(&mut self, kind: TimerKind, delay: Duration) {
        let ticket = self.issue_ticket();
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SessionEvent::Timer { kind, ticket });
        });
        self.install(kind, ticket, false, handle);
        trace!(timer = %kind, ticket, delay_ms = delay.as_millis() as u64, "timer_armed");
    }

    /// Repeating timer firing every `period`. Replaces any armed timer of the same kind.
    pub fn arm_interval(&mut self, kind: TimerKind, period: Duration) {
        let ticket = self.issue_ticket();
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                interval.tick().await;
                if tx.send(SessionEvent::Timer { kind, ticket }).is_err() {
                    break;
                }
            }
        });
        self.install(kind, ticket, true, handle);
        trace!(timer = %kind, ticket, period_ms = period.as_millis() as u64, "interval_armed");
    }

    /// Validate a fire event. One-shot slots are released on acceptance.
    pub fn accept(&mut self, kind: TimerKind, ticket: u64) -> bool {
        match self.slots.get(&kind) {
            Some(armed) if armed.ticket == ticket => {
                if !armed.repeating {
                    self.slots.remove(&kind);
                }
                true
            }
            _ => {
                debug!(timer = %kind, ticket, "stale_timer_fire_ignored");
                false
            }
        }
    }

    pub fn disarm(&mut self, kind: TimerKind) {
        if let Some(armed) = self.slots.remove(&kind) {
            armed.handle.abort();
        }
    }

    pub fn disarm_all(&mut self) {
        for (_, armed) in self.slots.drain() {
            armed.handle.abort();
        }
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.slots.contains_key(&kind)
    }

    pub fn armed(&self) -> Vec<TimerKind> {
        self.slots.keys().copied().collect()
    }

    fn issue_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    fn install(&mut self, kind: TimerKind, ticket: u64, repeating: bool, handle: JoinHandle<()>) {
        if let Some(prev) = self.slots.insert(
            kind,
            ArmedTimer {
                ticket,
                repeating,
                handle,
            },
        ) {
            prev.handle.abort();
        }
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.disarm_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn rearm_replaces_and_old_ticket_is_stale() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TimerSet::new(tx);

        timers.arm(TimerKind::Silence, Duration::from_secs(3));
        timers.arm(TimerKind::Silence, Duration::from_secs(3));
        assert_eq!(timers.armed(), vec![TimerKind::Silence]);

        tokio::time::sleep(Duration::from_secs(4)).await;
        let Some(SessionEvent::Timer { kind, ticket }) = rx.recv().await else {
            panic!("expected timer event");
        };
        assert_eq!(kind, TimerKind::Silence);
        assert_eq!(ticket, 2);
        assert!(rx.try_recv().is_err(), "replaced timer must not fire");

        assert!(timers.accept(kind, ticket));
        assert!(!timers.is_armed(TimerKind::Silence));
        assert!(!timers.accept(kind, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn disarm_all_silences_every_slot() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TimerSet::new(tx);
        timers.arm(TimerKind::Silence, Duration::from_millis(100));
        timers.arm(TimerKind::Idle, Duration::from_millis(100));
        timers.arm_interval(TimerKind::WordReveal, Duration::from_millis(30));
        timers.disarm_all();
        assert!(timers.armed().is_empty());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn interval_keeps_slot_on_accept() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TimerSet::new(tx);
        timers.arm_interval(TimerKind::WordReveal, Duration::from_millis(30));

        for _ in 0..3 {
            let Some(SessionEvent::Timer { kind, ticket }) = rx.recv().await else {
                panic!("expected tick");
            };
            assert!(timers.accept(kind, ticket));
        }
        assert!(timers.is_armed(TimerKind::WordReveal));
    }
}
