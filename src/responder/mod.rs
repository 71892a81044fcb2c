//! Remote response generator contract.
//! Prompt construction and model choice live behind the endpoint; this side
//! only ships the command, the per-user context and the recent conversation.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::Topic;
use crate::error::ResponderError;
use crate::history::ConversationTurn;

pub use http::HttpResponder;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponderContext {
    pub last_topic: Topic,
    pub last_response: String,
    pub full_conversation: Vec<ConversationTurn>,
}

/// Topic-specific follow-up. `avoid` is the previous reply, which the
/// generator must not repeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Continuation {
    pub topic: Topic,
    pub avoid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponderRequest {
    pub command: String,
    pub user_id: String,
    pub context: ResponderContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation: Option<Continuation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponderReply {
    pub response: String,
    #[serde(default)]
    pub context: serde_json::Value,
}

#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, request: ResponderRequest) -> Result<ResponderReply, ResponderError>;
}

/// Used when no endpoint is configured; every general command gets the fallback sentence.
pub struct UnconfiguredResponder;

#[async_trait]
impl ResponseGenerator for UnconfiguredResponder {
    async fn generate(&self, _request: ResponderRequest) -> Result<ResponderReply, ResponderError> {
        Err(ResponderError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Role;

    #[test]
    fn request_uses_camel_case_wire_names() {
        let req = ResponderRequest {
            command: "another one".into(),
            user_id: "u1".into(),
            context: ResponderContext {
                last_topic: Topic::Joke,
                last_response: "a funny joke".into(),
                full_conversation: vec![ConversationTurn::new(Role::User, "tell me a joke")],
            },
            continuation: Some(Continuation {
                topic: Topic::Joke,
                avoid: "a funny joke".into(),
            }),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["context"]["lastTopic"], "joke");
        assert_eq!(json["context"]["lastResponse"], "a funny joke");
        assert_eq!(json["context"]["fullConversation"][0]["role"], "user");
        assert_eq!(json["continuation"]["avoid"], "a funny joke");
    }

    #[test]
    fn plain_request_omits_continuation() {
        let req = ResponderRequest {
            command: "hi".into(),
            user_id: "u1".into(),
            context: ResponderContext {
                last_topic: Topic::General,
                last_response: String::new(),
                full_conversation: Vec::new(),
            },
            continuation: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("continuation").is_none());
    }

    #[test]
    fn reply_context_is_optional() {
        let reply: ResponderReply = serde_json::from_str(r#"{"response":"ok"}"#).unwrap();
        assert_eq!(reply.response, "ok");
        assert!(reply.context.is_null());
    }
}
