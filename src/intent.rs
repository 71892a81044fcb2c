//! Command intent classification.
//! `IntentClassifier` is the seam; `KeywordClassifier` is the default
//! keyword/regex heuristic. Classification order is fixed: first match wins.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::tasks::Priority;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocalIntent {
    Time,
    Date,
    Greeting,
    HowAreYou,
    Thanks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BulkAction {
    Complete,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Stop,
    ClearConversation,
    Local(LocalIntent),
    BulkTasks {
        action: BulkAction,
        priority: Option<Priority>,
    },
    AddTask {
        title: String,
        priority: Priority,
    },
    /// "another one", "more", "again": meaning depends on the last topic.
    Continuation,
    General,
}

pub trait IntentClassifier: Send + Sync {
    fn classify(&self, command: &str) -> Intent;
}

pub struct KeywordClassifier {
    time: Regex,
    date: Regex,
    how_are_you: Regex,
    thanks: Regex,
    greeting: Regex,
    bulk: Regex,
    add_task: Regex,
    trailing_priority: Regex,
    priority_word: Regex,
}

/// Greetings longer than this are treated as real requests.
const GREETING_MAX_WORDS: usize = 4;

impl KeywordClassifier {
    pub fn new() -> Self {
        // Constant patterns; a failure here is a programming error.
        let re = |p: &str| Regex::new(p).expect("intent pattern must compile");
        Self {
            time: re(r"\b(?:what(?:'s| is)? the time|what time is it|current time|tell me the time)\b"),
            date: re(r"\b(?:what(?:'s| is)? (?:the |today'?s )?date|what day is (?:it|today)|today'?s date)\b"),
            how_are_you: re(r"\bhow are you\b"),
            thanks: re(r"\b(?:thanks|thank you|thx)\b"),
            greeting: re(r"^(?:hello|hi|hey|good (?:morning|afternoon|evening))\b"),
            bulk: re(r"\b(complete|finish|mark|delete|remove|clear)\s+all\b"),
            add_task: re(r"^(?:please\s+)?(?:add|create|new)\s+(?:a\s+)?(?:new\s+)?task\s*(?:to\s+|called\s+|:\s*)?(?P<title>.+)$"),
            trailing_priority: re(r"\s*,?\s*(?:with\s+)?(?:a\s+)?(high|medium|low)\s+priority\s*$"),
            priority_word: re(r"\b(high|medium|low)\b"),
        }
    }

    fn local_intent(&self, lower: &str) -> Option<LocalIntent> {
        if self.time.is_match(lower) {
            Some(LocalIntent::Time)
        } else if self.date.is_match(lower) {
            Some(LocalIntent::Date)
        } else if self.how_are_you.is_match(lower) {
            Some(LocalIntent::HowAreYou)
        } else if self.thanks.is_match(lower) {
            Some(LocalIntent::Thanks)
        } else if self.greeting.is_match(lower)
            && lower.split_whitespace().count() <= GREETING_MAX_WORDS
        {
            Some(LocalIntent::Greeting)
        } else {
            None
        }
    }

    fn task_intent(&self, lower: &str) -> Option<Intent> {
        if let Some(caps) = self.bulk.captures(lower) {
            let action = match &caps[1] {
                "complete" | "finish" | "mark" => BulkAction::Complete,
                _ => BulkAction::Delete,
            };
            let priority = self
                .priority_word
                .captures(lower)
                .and_then(|c| Priority::parse(&c[1]));
            return Some(Intent::BulkTasks { action, priority });
        }

        let caps = self.add_task.captures(lower)?;
        let raw_title = caps.name("title")?.as_str();
        let (title, priority) = match self.trailing_priority.captures(raw_title) {
            Some(p) => {
                let start = p.get(0).map_or(raw_title.len(), |m| m.start());
                (&raw_title[..start], Priority::parse(&p[1]).unwrap_or_default())
            }
            None => (raw_title, Priority::default()),
        };
        let title = title.trim().trim_end_matches(['.', '!', '?']).trim();
        if title.is_empty() {
            return None;
        }
        Some(Intent::AddTask {
            title: title.to_string(),
            priority,
        })
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentClassifier for KeywordClassifier {
    fn classify(&self, command: &str) -> Intent {
        let lower = command.trim().to_lowercase();

        if lower.contains("stop") {
            return Intent::Stop;
        }
        if lower.contains("clear conversation") || lower.contains("delete history") {
            return Intent::ClearConversation;
        }
        if let Some(local) = self.local_intent(&lower) {
            return Intent::Local(local);
        }
        if let Some(task) = self.task_intent(&lower) {
            return task;
        }
        if ["another one", "more", "again"]
            .iter()
            .any(|k| lower.contains(k))
        {
            return Intent::Continuation;
        }
        Intent::General
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(s: &str) -> Intent {
        KeywordClassifier::new().classify(s)
    }

    #[test]
    fn stop_wins_over_everything() {
        assert_eq!(classify("stop telling me the time"), Intent::Stop);
    }

    #[test]
    fn clear_conversation_phrases() {
        assert_eq!(classify("please clear conversation"), Intent::ClearConversation);
        assert_eq!(classify("Delete history"), Intent::ClearConversation);
    }

    #[test]
    fn local_intents() {
        assert_eq!(classify("what time is it"), Intent::Local(LocalIntent::Time));
        assert_eq!(classify("What's the date"), Intent::Local(LocalIntent::Date));
        assert_eq!(classify("hey how are you"), Intent::Local(LocalIntent::HowAreYou));
        assert_eq!(classify("thank you so much"), Intent::Local(LocalIntent::Thanks));
        assert_eq!(classify("good morning"), Intent::Local(LocalIntent::Greeting));
    }

    #[test]
    fn long_greeting_is_general() {
        assert_eq!(
            classify("hi can you summarize my week for me"),
            Intent::General
        );
    }

    #[test]
    fn bulk_task_intents() {
        assert_eq!(
            classify("complete all high priority tasks"),
            Intent::BulkTasks {
                action: BulkAction::Complete,
                priority: Some(Priority::High)
            }
        );
        assert_eq!(
            classify("delete all tasks"),
            Intent::BulkTasks {
                action: BulkAction::Delete,
                priority: None
            }
        );
    }

    #[test]
    fn add_task_extracts_title_and_priority() {
        assert_eq!(
            classify("add task buy milk"),
            Intent::AddTask {
                title: "buy milk".to_string(),
                priority: Priority::Medium
            }
        );
        assert_eq!(
            classify("create a task to call mom with high priority"),
            Intent::AddTask {
                title: "call mom".to_string(),
                priority: Priority::High
            }
        );
    }

    #[test]
    fn continuation_and_general() {
        assert_eq!(classify("another one"), Intent::Continuation);
        assert_eq!(classify("tell me one more"), Intent::Continuation);
        assert_eq!(classify("tell me a joke"), Intent::General);
    }
}
