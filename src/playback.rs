//! Progressive word reveal for the live-typing affordance.
//! The orchestrator advances the cursor once per reveal tick; synthesis starts
//! only after the last word is out.

#[derive(Debug, Clone)]
pub struct WordReveal {
    words: Vec<String>,
    shown: usize,
}

impl WordReveal {
    pub fn new(text: &str) -> Self {
        Self {
            words: text.split_whitespace().map(str::to_string).collect(),
            shown: 0,
        }
    }

    /// Reveal one more word and return the visible prefix.
    /// None once everything is shown.
    pub fn advance(&mut self) -> Option<String> {
        if self.is_complete() {
            return None;
        }
        self.shown += 1;
        Some(self.words[..self.shown].join(" "))
    }

    pub fn is_complete(&self) -> bool {
        self.shown >= self.words.len()
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reveals_word_by_word() {
        let mut reveal = WordReveal::new("keep  going strong");
        assert_eq!(reveal.word_count(), 3);
        assert_eq!(reveal.advance().as_deref(), Some("keep"));
        assert_eq!(reveal.advance().as_deref(), Some("keep going"));
        assert_eq!(reveal.advance().as_deref(), Some("keep going strong"));
        assert!(reveal.is_complete());
        assert_eq!(reveal.advance(), None);
    }

    #[test]
    fn empty_text_is_complete_immediately() {
        let mut reveal = WordReveal::new("   ");
        assert!(reveal.is_complete());
        assert_eq!(reveal.advance(), None);
    }
}
