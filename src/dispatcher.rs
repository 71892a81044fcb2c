//! Command dispatcher: classifies a committed command and routes it to a
//! local handler, the task store, or the remote response generator.
//!
//! Routing order (first match wins): stop sentinel, clear conversation,
//! local intents, task intents, continuation, general forwarding.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::context::{ContextSnapshot, Topic};
use crate::history::ConversationTurn;
use crate::intent::{BulkAction, Intent, IntentClassifier};
use crate::local::LocalResponder;
use crate::metrics::{metric_names, MetricsRegistry, RequestIds};
use crate::responder::{Continuation, ResponderContext, ResponderRequest, ResponseGenerator};
use crate::state_machine::InputMode;
use crate::tasks::{TaskStore, TaskStoreResult};

/// Spoken when the remote responder fails for any reason.
pub const FALLBACK_SENTENCE: &str =
    "I'm experiencing some technical difficulties right now. Please try again in a moment.";

pub const CLEARED_SENTENCE: &str = "Okay, I've cleared our conversation.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    Local,
    TaskStore,
    Responder,
    Continuation,
    /// Conversation log and context must be wiped by the caller.
    Cleared,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub source: ReplySource,
}

impl Reply {
    fn new(text: impl Into<String>, source: ReplySource) -> Self {
        Self {
            text: text.into(),
            source,
        }
    }

    /// Whether this reply completes an exchange that should update the context snapshot.
    pub fn updates_context(&self) -> bool {
        !matches!(self.source, ReplySource::Cleared | ReplySource::Fallback)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The ABORTED sentinel: no reply, no turns.
    Aborted,
    Reply(Reply),
}

/// Everything the dispatcher may read. Owned, so a dispatch can run on its own task.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub user_id: String,
    pub snapshot: ContextSnapshot,
    pub history: Vec<ConversationTurn>,
    pub mode: InputMode,
    pub ids: RequestIds,
}

pub struct CommandDispatcher {
    classifier: Arc<dyn IntentClassifier>,
    tasks: Arc<dyn TaskStore>,
    responder: Arc<dyn ResponseGenerator>,
    local: LocalResponder,
    metrics: Arc<MetricsRegistry>,
}

impl CommandDispatcher {
    pub fn new(
        classifier: Arc<dyn IntentClassifier>,
        tasks: Arc<dyn TaskStore>,
        responder: Arc<dyn ResponseGenerator>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            classifier,
            tasks,
            responder,
            local: LocalResponder,
            metrics,
        }
    }

    /// Classify and route one committed command.
    pub async fn dispatch(&self, command: &str, ctx: DispatchContext) -> Dispatch {
        let intent = self.classifier.classify(command);
        info!(
            request_id = %ctx.ids.request_id,
            generation = ctx.ids.generation,
            mode = ?ctx.mode,
            intent = ?intent,
            "dispatch"
        );

        let reply = match intent {
            Intent::Stop => return Dispatch::Aborted,
            Intent::ClearConversation => Reply::new(CLEARED_SENTENCE, ReplySource::Cleared),
            Intent::Local(local) => Reply::new(self.local.respond(local), ReplySource::Local),
            Intent::BulkTasks { action, priority } => {
                let result = match action {
                    BulkAction::Complete => self.tasks.complete_all(&ctx.user_id, priority).await,
                    BulkAction::Delete => self.tasks.delete_all(&ctx.user_id, priority).await,
                };
                Reply::new(task_message(result), ReplySource::TaskStore)
            }
            Intent::AddTask { title, priority } => {
                let result = self.tasks.create_task(&ctx.user_id, &title, priority).await;
                Reply::new(task_message(result), ReplySource::TaskStore)
            }
            Intent::Continuation => match ctx.snapshot.last_topic {
                Topic::Quote => self
                    .continue_topic(Topic::Quote, "Share another motivational quote.", &ctx)
                    .await,
                Topic::Joke => self
                    .continue_topic(Topic::Joke, "Tell me another joke.", &ctx)
                    .await,
                // No usable topic: the responder disambiguates from history.
                Topic::General => self.forward(command, None, &ctx).await,
            },
            Intent::General => self.forward(command, None, &ctx).await,
        };
        Dispatch::Reply(reply)
    }

    async fn continue_topic(&self, topic: Topic, command: &str, ctx: &DispatchContext) -> Reply {
        let continuation = Continuation {
            topic,
            avoid: ctx.snapshot.last_response_excerpt.clone(),
        };
        let reply = self.forward(command, Some(continuation), ctx).await;
        match reply.source {
            ReplySource::Responder => Reply::new(reply.text, ReplySource::Continuation),
            _ => reply,
        }
    }

    async fn forward(
        &self,
        command: &str,
        continuation: Option<Continuation>,
        ctx: &DispatchContext,
    ) -> Reply {
        let request = ResponderRequest {
            command: command.to_string(),
            user_id: ctx.user_id.clone(),
            context: ResponderContext {
                last_topic: ctx.snapshot.last_topic,
                last_response: ctx.snapshot.last_response_excerpt.clone(),
                full_conversation: ctx.history.clone(),
            },
            continuation,
        };

        let start = Instant::now();
        let result = self.responder.generate(request).await;
        self.metrics.record(
            metric_names::RESPONDER_CALL,
            start.elapsed().as_micros() as f64,
        );

        match result {
            Ok(reply) if !reply.response.trim().is_empty() => {
                Reply::new(reply.response.trim(), ReplySource::Responder)
            }
            Ok(_) => {
                warn!(request_id = %ctx.ids.request_id, "responder returned empty text, using fallback");
                Reply::new(FALLBACK_SENTENCE, ReplySource::Fallback)
            }
            Err(e) => {
                warn!(request_id = %ctx.ids.request_id, error = %e, "responder failed, using fallback");
                Reply::new(FALLBACK_SENTENCE, ReplySource::Fallback)
            }
        }
    }
}

fn task_message(result: Result<TaskStoreResult, crate::error::TaskStoreError>) -> String {
    match result {
        Ok(r) if !r.message.trim().is_empty() => r.message,
        Ok(r) if r.success => "Done.".to_string(),
        Ok(_) => "I couldn't update your tasks.".to_string(),
        Err(e) => {
            warn!(error = %e, "task store call failed");
            "Sorry, I couldn't update your tasks right now.".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResponderError;
    use crate::history::Role;
    use crate::intent::KeywordClassifier;
    use crate::responder::ResponderReply;
    use crate::tasks::InMemoryTaskStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingResponder {
        requests: Mutex<Vec<ResponderRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl ResponseGenerator for RecordingResponder {
        async fn generate(
            &self,
            request: ResponderRequest,
        ) -> Result<ResponderReply, ResponderError> {
            self.requests.lock().push(request);
            if self.fail {
                return Err(ResponderError::Timeout);
            }
            Ok(ResponderReply {
                response: "remote reply".into(),
                context: serde_json::Value::Null,
            })
        }
    }

    fn dispatcher(
        responder: Arc<RecordingResponder>,
    ) -> (CommandDispatcher, Arc<InMemoryTaskStore>) {
        let tasks = Arc::new(InMemoryTaskStore::new());
        let d = CommandDispatcher::new(
            Arc::new(KeywordClassifier::new()),
            tasks.clone(),
            responder,
            Arc::new(MetricsRegistry::new()),
        );
        (d, tasks)
    }

    fn ctx(snapshot: ContextSnapshot) -> DispatchContext {
        DispatchContext {
            user_id: "u1".into(),
            snapshot,
            history: vec![ConversationTurn::new(Role::User, "earlier")],
            mode: InputMode::Voice,
            ids: RequestIds::new(1),
        }
    }

    #[tokio::test]
    async fn stop_is_the_aborted_sentinel() {
        let responder = Arc::new(RecordingResponder::default());
        let (d, _) = dispatcher(responder.clone());
        assert_eq!(
            d.dispatch("please stop", ctx(ContextSnapshot::default())).await,
            Dispatch::Aborted
        );
        assert!(responder.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn local_intent_makes_no_network_call() {
        let responder = Arc::new(RecordingResponder::default());
        let (d, _) = dispatcher(responder.clone());
        let Dispatch::Reply(reply) = d.dispatch("what time is it", ctx(ContextSnapshot::default())).await else {
            panic!("expected reply");
        };
        assert_eq!(reply.source, ReplySource::Local);
        assert!(reply.text.starts_with("It's "));
        assert!(responder.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn add_task_goes_to_task_store() {
        let responder = Arc::new(RecordingResponder::default());
        let (d, tasks) = dispatcher(responder.clone());
        let Dispatch::Reply(reply) = d.dispatch("add task buy milk", ctx(ContextSnapshot::default())).await else {
            panic!("expected reply");
        };
        assert_eq!(reply.source, ReplySource::TaskStore);
        assert_eq!(tasks.tasks("u1")[0].title, "buy milk");
        assert!(responder.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn joke_continuation_carries_anchor() {
        let responder = Arc::new(RecordingResponder::default());
        let (d, _) = dispatcher(responder.clone());
        let snapshot = ContextSnapshot::from_exchange("tell me a joke", "Here's a funny joke.");
        let Dispatch::Reply(reply) = d.dispatch("another one", ctx(snapshot)).await else {
            panic!("expected reply");
        };
        assert_eq!(reply.source, ReplySource::Continuation);

        let requests = responder.requests.lock();
        let cont = requests[0].continuation.as_ref().unwrap();
        assert_eq!(cont.topic, Topic::Joke);
        assert_eq!(cont.avoid, "Here's a funny joke.");
        assert_ne!(requests[0].command, "another one");
    }

    #[tokio::test]
    async fn continuation_without_topic_forwards_literal_phrase() {
        let responder = Arc::new(RecordingResponder::default());
        let (d, _) = dispatcher(responder.clone());
        let Dispatch::Reply(reply) = d.dispatch("again", ctx(ContextSnapshot::default())).await else {
            panic!("expected reply");
        };
        assert_eq!(reply.source, ReplySource::Responder);
        let requests = responder.requests.lock();
        assert_eq!(requests[0].command, "again");
        assert!(requests[0].continuation.is_none());
        assert_eq!(requests[0].context.full_conversation.len(), 1);
    }

    #[tokio::test]
    async fn responder_failure_yields_fallback() {
        let responder = Arc::new(RecordingResponder {
            fail: true,
            ..Default::default()
        });
        let (d, _) = dispatcher(responder);
        let Dispatch::Reply(reply) = d.dispatch("plan my day", ctx(ContextSnapshot::default())).await else {
            panic!("expected reply");
        };
        assert_eq!(reply, Reply::new(FALLBACK_SENTENCE, ReplySource::Fallback));
        assert!(!reply.updates_context());
    }
}
