//! Wake-word gate.
//! Runs on interim transcript fragments while the session is dormant. A short
//! fragment containing an activation phrase wakes the assistant; long
//! utterances that merely contain a greeting do not.

/// Wake detector trait, so a model-based spotter can replace the phrase gate.
pub trait WakeDetector: Send + Sync {
    /// Returns true if `fragment` should activate the assistant.
    fn detect(&self, fragment: &str) -> bool;
}

/// Fixed phrase set plus a word-count cap.
pub struct WakeWordGate {
    phrases: Vec<String>,
    max_words: usize,
}

impl WakeWordGate {
    pub fn new(phrases: &[String], max_words: usize) -> Self {
        let phrases = phrases
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>();
        tracing::debug!(phrases = ?phrases, max_words, "wake gate initialized");
        Self { phrases, max_words }
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }
}

impl WakeDetector for WakeWordGate {
    fn detect(&self, fragment: &str) -> bool {
        let words = fragment.split_whitespace().count();
        if words == 0 || words > self.max_words {
            return false;
        }
        let lower = fragment.to_lowercase();
        self.phrases.iter().any(|p| lower.contains(p.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> WakeWordGate {
        let phrases = ["hello", "hey", "focusflow", "wake up", "assistant"]
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>();
        WakeWordGate::new(&phrases, 4)
    }

    #[test]
    fn short_greeting_activates() {
        let g = gate();
        assert!(g.detect("hello"));
        assert!(g.detect("Hey FocusFlow"));
        assert!(g.detect("okay wake up now"));
    }

    #[test]
    fn long_incidental_greeting_does_not_activate() {
        let g = gate();
        assert!(!g.detect("and then I said hello to my neighbour"));
    }

    #[test]
    fn unrelated_or_empty_fragment_does_not_activate() {
        let g = gate();
        assert!(!g.detect("buy milk"));
        assert!(!g.detect("   "));
    }

    #[test]
    fn phrases_are_normalized() {
        let g = WakeWordGate::new(&["  Hey ORIN ".to_string(), String::new()], 4);
        assert_eq!(g.phrases(), &["hey orin"]);
        assert!(g.detect("HEY orin"));
    }
}
