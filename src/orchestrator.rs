//! Dialogue orchestrator: one task owning one `DialogueSession`, driven by
//! `SessionEvent`s in arrival order.
//!
//! Fragments flow through the wake gate (Dormant), the silence debouncer
//! (Listening) or the barge-in handler (Processing/Speaking). Commits are
//! classified and dispatched on a spawned task; replies are revealed word by
//! word, spoken, and capture is re-armed afterwards. Every abort advances the
//! session generation, and any event from an older generation is dropped.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::cancellation::SessionGeneration;
use crate::capture::SpeechCapture;
use crate::config::OrchestratorConfig;
use crate::context::{ContextSnapshot, ContextStore, InMemoryContextStore};
use crate::debounce::{strip_leading_words, TranscriptBuffer};
use crate::dispatcher::{CommandDispatcher, Dispatch, DispatchContext, Reply, ReplySource};
use crate::error::{CaptureError, Error, Result, SynthesisError};
use crate::history::{ConversationLog, ConversationTurn, HistoryStore, Role};
use crate::intent::{IntentClassifier, KeywordClassifier};
use crate::interrupt::{classify_barge_in, BargeIn};
use crate::metrics::{metric_names, MetricsRegistry, RequestIds};
use crate::playback::WordReveal;
use crate::responder::ResponseGenerator;
use crate::scheduler::{Fragment, SessionEvent, TimerKind, TimerSet};
use crate::state_machine::{DialogueState, InputMode, StateMachine};
use crate::synthesis::SpeechSynthesizer;
use crate::tasks::TaskStore;
use crate::wake::{WakeDetector, WakeWordGate};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// External collaborators. Context store, classifier and wake detector default
/// to the in-process implementations.
pub struct Collaborators {
    pub capture: Arc<dyn SpeechCapture>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub tasks: Arc<dyn TaskStore>,
    pub responder: Arc<dyn ResponseGenerator>,
    pub context_store: Arc<dyn ContextStore>,
    pub classifier: Arc<dyn IntentClassifier>,
    pub wake: Option<Box<dyn WakeDetector>>,
    pub history: Option<Arc<HistoryStore>>,
}

impl Collaborators {
    pub fn new(
        capture: Arc<dyn SpeechCapture>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        tasks: Arc<dyn TaskStore>,
        responder: Arc<dyn ResponseGenerator>,
    ) -> Self {
        Self {
            capture,
            synthesizer,
            tasks,
            responder,
            context_store: Arc::new(InMemoryContextStore::default()),
            classifier: Arc::new(KeywordClassifier::new()),
            wake: None,
            history: None,
        }
    }

    pub fn with_context_store(mut self, store: Arc<dyn ContextStore>) -> Self {
        self.context_store = store;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_wake_detector(mut self, wake: Box<dyn WakeDetector>) -> Self {
        self.wake = Some(wake);
        self
    }

    pub fn with_history(mut self, history: Arc<HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AbortReason {
    /// "stop" as a committed command.
    StopCommand,
    /// Stop-class speech during a reply.
    BargeIn,
    /// Other speech during a reply; resubmitted as the next command.
    Supersede,
    Explicit,
    ModeSwitch,
    Activation,
    Shutdown,
}

/// Outbound notifications for the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    WakeAcknowledged,
    Committed { command: String },
    RevealProgress { text: String },
    ResponseReady { text: String },
    TurnAppended { turn: ConversationTurn },
    Aborted { reason: AbortReason },
    IdleTimeout,
    CaptureDegraded { error: String },
    ConversationCleared,
}

/// Point-in-time view of the session, for inspection and tests.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: DialogueState,
    pub mode: InputMode,
    pub generation: u64,
    pub armed_timers: Vec<TimerKind>,
    pub buffered_fragments: usize,
    pub context: ContextSnapshot,
    pub synthesis_in_flight: bool,
    pub pending_supersede: Option<String>,
}

/// Cloneable control surface for the host (speech engine callbacks, UI).
#[derive(Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::UnboundedSender<SessionEvent>,
    state: Arc<StateMachine>,
    events: broadcast::Sender<OrchestratorEvent>,
    log: Arc<Mutex<ConversationLog>>,
    metrics: Arc<MetricsRegistry>,
}

impl OrchestratorHandle {
    fn send(&self, event: SessionEvent) -> Result<()> {
        self.tx.send(event).map_err(|_| Error::Closed)
    }

    pub fn push_fragment(&self, fragment: Fragment) -> Result<()> {
        self.send(SessionEvent::Fragment(fragment))
    }

    pub fn submit_text(&self, command: impl Into<String>) -> Result<()> {
        self.send(SessionEvent::SubmitText(command.into()))
    }

    pub fn activate(&self) -> Result<()> {
        self.send(SessionEvent::Activate)
    }

    pub fn listen_for_wake(&self) -> Result<()> {
        self.send(SessionEvent::ListenForWake)
    }

    pub fn set_mode(&self, mode: InputMode) -> Result<()> {
        self.send(SessionEvent::SetMode(mode))
    }

    pub fn abort(&self) -> Result<()> {
        self.send(SessionEvent::Abort)
    }

    pub fn clear_conversation(&self) -> Result<()> {
        self.send(SessionEvent::ClearConversation)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(SessionEvent::Shutdown)
    }

    pub fn state(&self) -> DialogueState {
        self.state.current()
    }

    pub fn mode(&self) -> InputMode {
        self.state.mode()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<DialogueState> {
        self.state.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.events.subscribe()
    }

    pub fn conversation(&self) -> Vec<ConversationTurn> {
        self.log.lock().all()
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Snapshot taken inside the loop, ordered after every event sent before it.
    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SessionEvent::Inspect(reply_tx))?;
        reply_rx.await.map_err(|_| Error::Closed)
    }
}

/// Reply currently being revealed or spoken.
struct ActiveReply {
    text: String,
    reveal: WordReveal,
    available_at: Instant,
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    state: Arc<StateMachine>,
    generation: SessionGeneration,
    timers: TimerSet,
    buffer: TranscriptBuffer,
    wake: Box<dyn WakeDetector>,
    /// Text that woke the session; repeats of it are not treated as a command.
    wake_echo: Option<String>,
    pending_supersede: Option<String>,
    active_reply: Option<ActiveReply>,
    synthesis_in_flight: bool,
    snapshot: ContextSnapshot,
    dispatcher: Arc<CommandDispatcher>,
    capture: Arc<dyn SpeechCapture>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    context_store: Arc<dyn ContextStore>,
    history: Option<Arc<HistoryStore>>,
    log: Arc<Mutex<ConversationLog>>,
    events: broadcast::Sender<OrchestratorEvent>,
    metrics: Arc<MetricsRegistry>,
    tx: mpsc::UnboundedSender<SessionEvent>,
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        collaborators: Collaborators,
    ) -> Result<(Self, OrchestratorHandle)> {
        config.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let metrics = Arc::new(MetricsRegistry::new());
        let state = Arc::new(StateMachine::new(InputMode::Voice));
        let log = Arc::new(Mutex::new(ConversationLog::new(config.log_capacity)));

        let Collaborators {
            capture,
            synthesizer,
            tasks,
            responder,
            context_store,
            classifier,
            wake,
            history,
        } = collaborators;

        let wake = wake.unwrap_or_else(|| {
            Box::new(WakeWordGate::new(&config.wake_phrases, config.wake_max_words))
        });
        let dispatcher = Arc::new(CommandDispatcher::new(
            classifier,
            tasks,
            responder,
            Arc::clone(&metrics),
        ));
        let snapshot = context_store.load(&config.user_id);

        let handle = OrchestratorHandle {
            tx: tx.clone(),
            state: Arc::clone(&state),
            events: events.clone(),
            log: Arc::clone(&log),
            metrics: Arc::clone(&metrics),
        };

        let orchestrator = Self {
            timers: TimerSet::new(tx.clone()),
            config,
            state,
            generation: SessionGeneration::new(),
            buffer: TranscriptBuffer::new(),
            wake,
            wake_echo: None,
            pending_supersede: None,
            active_reply: None,
            synthesis_in_flight: false,
            snapshot,
            dispatcher,
            capture,
            synthesizer,
            context_store,
            history,
            log,
            events,
            metrics,
            tx,
            rx,
        };
        Ok((orchestrator, handle))
    }

    /// Build and spawn the event loop on the current runtime.
    pub fn spawn(
        config: OrchestratorConfig,
        collaborators: Collaborators,
    ) -> Result<OrchestratorHandle> {
        let (orchestrator, handle) = Self::new(config, collaborators)?;
        tokio::spawn(orchestrator.run());
        Ok(handle)
    }

    /// Process events until `Shutdown`.
    pub async fn run(mut self) {
        info!(user_id = %self.config.user_id, "orchestrator started");
        while let Some(event) = self.rx.recv().await {
            if !self.handle_event(event) {
                break;
            }
        }
        self.timers.disarm_all();
        info!("orchestrator stopped");
    }

    fn handle_event(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Fragment(fragment) => self.on_fragment(fragment),
            SessionEvent::SubmitText(command) => self.on_submit_text(command),
            SessionEvent::Activate => self.on_activate(),
            SessionEvent::ListenForWake => self.on_listen_for_wake(),
            SessionEvent::SetMode(mode) => self.on_set_mode(mode),
            SessionEvent::Abort => {
                let target = self.rest_state(AbortReason::Explicit);
                self.abort(target, AbortReason::Explicit);
            }
            SessionEvent::ClearConversation => self.clear_conversation(),
            SessionEvent::Timer { kind, ticket } => {
                if self.timers.accept(kind, ticket) {
                    self.on_timer(kind);
                }
            }
            SessionEvent::DispatchDone {
                generation,
                command,
                outcome,
                started_at,
            } => self.on_dispatch_done(generation, command, outcome, started_at),
            SessionEvent::SynthesisDone { generation, result } => {
                self.on_synthesis_done(generation, result)
            }
            SessionEvent::Inspect(reply) => {
                let _ = reply.send(self.session_snapshot());
            }
            SessionEvent::Shutdown => {
                self.abort(DialogueState::Dormant, AbortReason::Shutdown);
                return false;
            }
        }
        true
    }

    // --- Input ---

    fn on_fragment(&mut self, fragment: Fragment) {
        if self.state.mode() == InputMode::Text {
            debug!("fragment ignored in text mode");
            return;
        }
        let text = fragment.text.trim();
        if text.is_empty() {
            return;
        }

        match self.state.current() {
            DialogueState::Dormant => {
                if self.wake.detect(text) {
                    info!(fragment = text, "wake_word_detected");
                    self.begin_session(AbortReason::Activation, false);
                    if !fragment.is_final {
                        self.wake_echo = Some(text.to_lowercase());
                    }
                }
            }
            DialogueState::Listening => self.on_listening_fragment(text, fragment.is_final),
            DialogueState::Committing => {
                debug!(fragment = text, "fragment during commit ignored");
            }
            DialogueState::Processing | DialogueState::Speaking => self.on_barge_in(text),
        }
    }

    fn on_listening_fragment(&mut self, text: &str, is_final: bool) {
        self.timers.arm(TimerKind::Idle, self.config.idle_timeout);

        if let Some(pending) = self.pending_supersede.as_mut() {
            // Capture is settling after a barge-in; only let the same utterance grow.
            if strip_leading_words(text, pending).is_some() {
                *pending = text.to_string();
            }
            return;
        }

        let Some(text) = self.strip_wake_echo(text, is_final) else {
            return;
        };
        self.buffer.push(&text, is_final);
        self.timers.arm(TimerKind::Silence, self.config.surface.silence_commit);
    }

    /// The recognizer keeps reporting the utterance that woke the session, so
    /// its leading wake words are removed until that utterance is final.
    /// `None` means nothing but wake talk is left.
    fn strip_wake_echo(&mut self, text: &str, is_final: bool) -> Option<String> {
        let Some(echo) = self.wake_echo.take() else {
            return Some(text.to_string());
        };
        let Some(rest) = strip_leading_words(text, &echo) else {
            return Some(text.to_string());
        };
        if rest.is_empty() || self.wake.detect(&rest) {
            if !is_final {
                self.wake_echo = Some(text.to_lowercase());
            }
            return None;
        }
        if !is_final {
            self.wake_echo = Some(echo);
        }
        Some(rest)
    }

    fn on_barge_in(&mut self, text: &str) {
        match classify_barge_in(text, self.config.supersede_min_chars) {
            BargeIn::Stop => {
                info!(fragment = text, "barge_in_stop");
                let target = self.rest_state(AbortReason::BargeIn);
                self.abort(target, AbortReason::BargeIn);
            }
            BargeIn::Supersede(command) => {
                info!(fragment = %command, "barge_in_supersede");
                self.abort(DialogueState::Listening, AbortReason::Supersede);
                self.pending_supersede = Some(command);
                self.timers.arm(TimerKind::Grace, self.config.supersede_grace);
            }
            BargeIn::Ignore => debug!(fragment = text, "barge_in_ignored"),
        }
    }

    fn on_submit_text(&mut self, command: String) {
        if self.state.mode() != InputMode::Text {
            warn!("typed command ignored outside text mode");
            return;
        }
        let command = command.trim().to_string();
        if command.is_empty() {
            return;
        }
        if self.state.current().is_busy() {
            self.abort(DialogueState::Dormant, AbortReason::Supersede);
        }
        self.commit(command);
    }

    fn on_activate(&mut self) {
        if self.state.mode() == InputMode::Text {
            warn!("activation ignored in text mode");
            return;
        }
        self.begin_session(AbortReason::Activation, true);
    }

    fn on_listen_for_wake(&mut self) {
        if self.state.mode() != InputMode::Voice || self.state.current() != DialogueState::Dormant {
            return;
        }
        if self.capture.is_capturing() {
            return;
        }
        if let Err(e) = self.capture.start() {
            self.degrade_to_text(e);
        } else {
            info!("listening_for_wake_word");
        }
    }

    fn on_set_mode(&mut self, mode: InputMode) {
        if self.state.mode() == mode {
            return;
        }
        self.abort(DialogueState::Dormant, AbortReason::ModeSwitch);
        self.state.set_mode(mode);
        if mode == InputMode::Text {
            self.capture.stop();
        }
    }

    /// Tear down whatever the previous session had in flight, then listen.
    /// With `rearm_capture`, capture restarts only after the teardown.
    fn begin_session(&mut self, reason: AbortReason, rearm_capture: bool) {
        let was_active = self.state.current() != DialogueState::Dormant;
        self.teardown();
        if was_active {
            let _ = self.events.send(OrchestratorEvent::Aborted { reason });
        }
        if rearm_capture {
            if let Err(e) = self.restart_capture() {
                self.degrade_to_text(e);
                return;
            }
        }
        self.state.transition(DialogueState::Listening);
        self.timers.arm(TimerKind::Idle, self.config.idle_timeout);
        let _ = self.events.send(OrchestratorEvent::WakeAcknowledged);
    }

    // --- Commit & dispatch ---

    fn commit(&mut self, command: String) {
        self.timers.disarm(TimerKind::Silence);
        self.timers.disarm(TimerKind::Idle);
        self.wake_echo = None;

        if !self.state.transition(DialogueState::Committing) {
            warn!(state = %self.state.current(), "commit outside listening ignored");
            return;
        }
        info!(command = %command, "command_committed");
        let _ = self.events.send(OrchestratorEvent::Committed {
            command: command.clone(),
        });

        self.state.transition(DialogueState::Processing);

        let guard = self.generation.guard();
        let ctx = DispatchContext {
            user_id: self.config.user_id.clone(),
            snapshot: self.snapshot.clone(),
            history: self.log.lock().last_n(self.config.history_window),
            mode: self.state.mode(),
            ids: RequestIds::new(guard.my_generation()),
        };
        let dispatcher = Arc::clone(&self.dispatcher);
        let tx = self.tx.clone();
        let started_at = Instant::now();

        tokio::spawn(async move {
            let outcome = tokio::select! {
                outcome = dispatcher.dispatch(&command, ctx) => outcome,
                _ = guard.token().cancelled() => {
                    debug!(generation = guard.my_generation(), "dispatch cancelled");
                    return;
                }
            };
            if !guard.should_continue() {
                debug!(generation = guard.my_generation(), "dispatch finished after abort");
                return;
            }
            let _ = tx.send(SessionEvent::DispatchDone {
                generation: guard.my_generation(),
                command,
                outcome,
                started_at,
            });
        });
    }

    fn on_dispatch_done(
        &mut self,
        generation: u64,
        command: String,
        outcome: Dispatch,
        started_at: Instant,
    ) {
        if !self.generation.is_current(generation)
            || self.state.current() != DialogueState::Processing
        {
            self.drop_stale("dispatch_done", generation);
            return;
        }
        self.metrics.record(
            metric_names::DISPATCH_DONE,
            started_at.elapsed().as_micros() as f64,
        );

        let reply = match outcome {
            Dispatch::Aborted => {
                info!("stop command, nothing to process");
                let target = self.rest_state(AbortReason::StopCommand);
                self.abort(target, AbortReason::StopCommand);
                return;
            }
            Dispatch::Reply(reply) => reply,
        };
        if reply.source == ReplySource::Cleared {
            self.clear_conversation();
        } else {
            self.append_turn(Role::User, &command);
            self.update_context(&command, &reply);
        }
        self.append_turn(Role::Assistant, &reply.text);
        self.present(reply.text);
    }

    fn update_context(&mut self, command: &str, reply: &Reply) {
        if !reply.updates_context() {
            return;
        }
        self.snapshot = ContextSnapshot::from_exchange(command, &reply.text);
        self.context_store
            .save(&self.config.user_id, self.snapshot.clone());
        debug!(topic = self.snapshot.last_topic.as_str(), "context_updated");
    }

    // --- Playback ---

    fn present(&mut self, text: String) {
        self.state.transition(DialogueState::Speaking);
        let _ = self.events.send(OrchestratorEvent::ResponseReady { text: text.clone() });

        let reveal = WordReveal::new(&text);
        let complete = reveal.is_complete();
        self.active_reply = Some(ActiveReply {
            text,
            reveal,
            available_at: Instant::now(),
        });
        if complete {
            self.finish_reveal();
        } else {
            self.timers
                .arm_interval(TimerKind::WordReveal, self.config.word_reveal_interval);
        }
    }

    fn on_reveal_tick(&mut self) {
        if self.state.current() != DialogueState::Speaking {
            self.timers.disarm(TimerKind::WordReveal);
            return;
        }
        let Some(active) = self.active_reply.as_mut() else {
            self.timers.disarm(TimerKind::WordReveal);
            return;
        };
        if let Some(text) = active.reveal.advance() {
            let _ = self.events.send(OrchestratorEvent::RevealProgress { text });
        }
        if active.reveal.is_complete() {
            self.finish_reveal();
        }
    }

    fn finish_reveal(&mut self) {
        self.timers.disarm(TimerKind::WordReveal);
        let Some(active) = self.active_reply.as_ref() else {
            return;
        };
        self.metrics.record(
            metric_names::REVEAL_DONE,
            active.available_at.elapsed().as_micros() as f64,
        );
        let text = active.text.clone();
        self.start_synthesis(text);
    }

    fn start_synthesis(&mut self, text: String) {
        self.synthesis_in_flight = true;
        let guard = self.generation.guard();
        let synthesizer = Arc::clone(&self.synthesizer);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                result = synthesizer.speak(&text) => result,
                _ = guard.token().cancelled() => return,
            };
            if !guard.should_continue() {
                return;
            }
            let _ = tx.send(SessionEvent::SynthesisDone {
                generation: guard.my_generation(),
                result,
            });
        });
    }

    fn on_synthesis_done(&mut self, generation: u64, result: std::result::Result<(), SynthesisError>) {
        if !self.generation.is_current(generation) {
            self.drop_stale("synthesis_done", generation);
            return;
        }
        self.synthesis_in_flight = false;
        self.active_reply = None;
        if let Err(e) = result {
            // Silent audio beats a stuck session: same path as success.
            warn!(error = %e, "speech synthesis failed");
        }
        if self.state.current() != DialogueState::Speaking {
            return;
        }
        match self.state.mode() {
            InputMode::Voice => self.timers.arm(TimerKind::Rearm, self.config.rearm_delay),
            InputMode::Text => self.state.force_dormant(),
        }
    }

    fn on_rearm(&mut self) {
        if self.state.current() != DialogueState::Speaking || self.state.mode() != InputMode::Voice {
            return;
        }
        if let Err(e) = self.restart_capture() {
            self.degrade_to_text(e);
            return;
        }
        self.state.transition(DialogueState::Listening);
        self.timers.arm(TimerKind::Idle, self.config.idle_timeout);
        debug!("capture_rearmed");
    }

    // --- Timers ---

    fn on_timer(&mut self, kind: TimerKind) {
        match kind {
            TimerKind::Silence => {
                if self.state.current() != DialogueState::Listening {
                    return;
                }
                match self.buffer.commit() {
                    Some(command) => self.commit(command),
                    None => debug!("silence with empty buffer, still listening"),
                }
            }
            TimerKind::Idle => {
                if self.state.current() == DialogueState::Listening {
                    self.on_idle_timeout();
                }
            }
            TimerKind::WordReveal => self.on_reveal_tick(),
            TimerKind::Rearm => self.on_rearm(),
            TimerKind::Grace => {
                if let Some(command) = self.pending_supersede.take() {
                    if self.state.current() == DialogueState::Listening {
                        self.commit(command);
                    }
                }
            }
        }
    }

    fn on_idle_timeout(&mut self) {
        let secs = self.config.idle_timeout.as_secs();
        info!(idle_secs = secs, "idle_timeout");
        self.teardown();
        self.capture.stop();
        self.state.force_dormant();
        self.append_turn(
            Role::System,
            &format!("Voice assistant stopped after {secs} seconds of inactivity."),
        );
        let _ = self.events.send(OrchestratorEvent::IdleTimeout);
    }

    // --- Abort ---

    /// Where an abort lands: Dormant in text mode or when the surface needs
    /// explicit re-activation after a stop, Listening otherwise.
    fn rest_state(&self, reason: AbortReason) -> DialogueState {
        if self.state.mode() == InputMode::Text {
            return DialogueState::Dormant;
        }
        let stop = matches!(reason, AbortReason::BargeIn | AbortReason::StopCommand);
        if stop && self.config.surface.require_reactivation {
            DialogueState::Dormant
        } else {
            DialogueState::Listening
        }
    }

    /// Cancel in-flight work, disarm all timers and drop buffered text.
    /// Safe to repeat: playback is only stopped if it is still running.
    fn teardown(&mut self) {
        let generation = self.generation.cancel_and_advance();
        if self.synthesis_in_flight {
            self.synthesizer.stop_speaking();
            self.synthesis_in_flight = false;
        }
        self.timers.disarm_all();
        self.buffer.clear();
        self.active_reply = None;
        self.pending_supersede = None;
        self.wake_echo = None;
        debug!(generation, "session_torn_down");
    }

    fn abort(&mut self, target: DialogueState, reason: AbortReason) {
        let start = Instant::now();
        let from = self.state.current();
        self.teardown();

        match target {
            DialogueState::Listening if from != DialogueState::Dormant => {
                self.state.transition(DialogueState::Listening);
                self.timers.arm(TimerKind::Idle, self.config.idle_timeout);
            }
            DialogueState::Listening => {}
            _ => {
                if self.config.surface.require_reactivation
                    || reason == AbortReason::ModeSwitch
                    || reason == AbortReason::Shutdown
                {
                    self.capture.stop();
                }
                self.state.force_dormant();
            }
        }

        info!(from = %from, to = %self.state.current(), reason = ?reason, "session_aborted");
        let _ = self.events.send(OrchestratorEvent::Aborted { reason });
        self.metrics.record(
            metric_names::ABORT_LATENCY,
            start.elapsed().as_micros() as f64,
        );
    }

    // --- Conversation ---

    fn append_turn(&mut self, role: Role, text: &str) {
        let turn = ConversationTurn::new(role, text);
        self.log.lock().push(turn.clone());
        if let Some(history) = &self.history {
            history.record(&self.config.user_id, turn.clone());
        }
        let _ = self.events.send(OrchestratorEvent::TurnAppended { turn });
    }

    fn clear_conversation(&mut self) {
        self.log.lock().clear();
        self.snapshot = ContextSnapshot::default();
        self.context_store.clear(&self.config.user_id);
        if let Some(history) = &self.history {
            history.clear(&self.config.user_id);
        }
        info!(user_id = %self.config.user_id, "conversation_cleared");
        let _ = self.events.send(OrchestratorEvent::ConversationCleared);
    }

    // --- Capture ---

    fn restart_capture(&self) -> std::result::Result<(), CaptureError> {
        if self.capture.is_capturing() {
            self.capture.stop();
        }
        self.capture.start()
    }

    fn degrade_to_text(&mut self, error: CaptureError) {
        warn!(error = %error, "speech capture unavailable, switching to text mode");
        self.teardown();
        self.capture.stop();
        self.state.set_mode(InputMode::Text);
        self.state.force_dormant();
        self.append_turn(
            Role::System,
            "Voice input is unavailable. Switched to text mode.",
        );
        let _ = self.events.send(OrchestratorEvent::CaptureDegraded {
            error: error.to_string(),
        });
    }

    // --- Misc ---

    fn drop_stale(&self, what: &'static str, generation: u64) {
        debug!(
            event = what,
            generation,
            current = self.generation.current(),
            "stale_event_dropped"
        );
        self.metrics.record(metric_names::STALE_EVENTS, 1.0);
    }

    fn session_snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state.current(),
            mode: self.state.mode(),
            generation: self.generation.current(),
            armed_timers: self.timers.armed(),
            buffered_fragments: self.buffer.len(),
            context: self.snapshot.clone(),
            synthesis_in_flight: self.synthesis_in_flight,
            pending_supersede: self.pending_supersede.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::NullCapture;
    use crate::responder::UnconfiguredResponder;
    use crate::synthesis::ConsoleSynthesizer;
    use crate::tasks::InMemoryTaskStore;
    use std::time::Duration;

    fn orchestrator() -> Orchestrator {
        let collaborators = Collaborators::new(
            Arc::new(NullCapture::new()),
            Arc::new(ConsoleSynthesizer::new(Duration::from_millis(1))),
            Arc::new(InMemoryTaskStore::new()),
            Arc::new(UnconfiguredResponder),
        );
        let (orchestrator, _handle) =
            Orchestrator::new(OrchestratorConfig::default(), collaborators).unwrap();
        orchestrator
    }

    #[tokio::test(start_paused = true)]
    async fn results_from_an_aborted_generation_are_dropped() {
        let mut orch = orchestrator();
        orch.handle_event(SessionEvent::Activate);
        orch.commit("tell me a story".to_string());
        assert_eq!(orch.state.current(), DialogueState::Processing);
        let stale = orch.generation.current();

        orch.handle_event(SessionEvent::Abort);
        assert_eq!(orch.state.current(), DialogueState::Listening);
        assert_ne!(orch.generation.current(), stale);

        let reply = Reply {
            text: "A story from before.".to_string(),
            source: ReplySource::Responder,
        };
        orch.handle_event(SessionEvent::DispatchDone {
            generation: stale,
            command: "tell me a story".to_string(),
            outcome: Dispatch::Reply(reply),
            started_at: Instant::now(),
        });
        orch.handle_event(SessionEvent::SynthesisDone {
            generation: stale,
            result: Ok(()),
        });

        assert_eq!(orch.state.current(), DialogueState::Listening);
        assert!(orch.log.lock().is_empty());
        assert!(orch.active_reply.is_none());
        assert!(!orch.timers.is_armed(TimerKind::Rearm));
        assert!(!orch.timers.is_armed(TimerKind::WordReveal));
        assert_eq!(orch.metrics.count(metric_names::STALE_EVENTS), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn wake_echo_is_stripped_until_the_utterance_is_final() {
        let mut orch = orchestrator();
        orch.handle_event(SessionEvent::Fragment(Fragment::interim("hey")));
        assert_eq!(orch.state.current(), DialogueState::Listening);

        orch.handle_event(SessionEvent::Fragment(Fragment::interim("hey focusflow")));
        assert!(orch.buffer.is_empty());
        orch.handle_event(SessionEvent::Fragment(Fragment::interim("hey focusflow add")));
        orch.handle_event(SessionEvent::Fragment(Fragment::final_("hey focusflow add task call mom")));
        assert!(orch.wake_echo.is_none());

        orch.handle_event(SessionEvent::Fragment(Fragment::final_("hey there")));
        assert_eq!(
            orch.buffer.commit().as_deref(),
            Some("add task call mom hey there")
        );
    }
}
