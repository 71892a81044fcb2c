//! Silence-commit transcript buffer.
//! Fragments accumulate while listening; when the silence timer fires the
//! buffer is frozen into one command and cleared. Timer arming lives in
//! `scheduler`; this module only owns the text.

/// Ordered fragments since the last commit.
///
/// Speech engines resend the whole utterance so far as interim results, so the
/// buffer keeps one trailing interim slot that each interim overwrites. A final
/// fragment settles that slot; the next utterance starts a fresh one.
#[derive(Debug, Default)]
pub struct TranscriptBuffer {
    settled: Vec<String>,
    interim: Option<String>,
}

impl TranscriptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, text: &str, is_final: bool) {
        let text = text.trim();
        if text.is_empty() {
            if is_final {
                self.interim = None;
            }
            return;
        }
        if is_final {
            self.interim = None;
            self.settled.push(text.to_string());
        } else {
            self.interim = Some(text.to_string());
        }
    }

    /// Freeze into a command string and clear. None if only whitespace was heard.
    pub fn commit(&mut self) -> Option<String> {
        let mut parts = std::mem::take(&mut self.settled);
        parts.extend(self.interim.take());
        let command = parts.join(" ");
        if command.is_empty() {
            None
        } else {
            Some(command)
        }
    }

    pub fn clear(&mut self) {
        self.settled.clear();
        self.interim = None;
    }

    pub fn is_empty(&self) -> bool {
        self.settled.is_empty() && self.interim.is_none()
    }

    /// Settled fragments plus the pending interim, if any.
    pub fn len(&self) -> usize {
        self.settled.len() + usize::from(self.interim.is_some())
    }
}

/// Words of `text` that follow a leading run equal to `prefix`, compared word
/// by word ignoring case and surrounding punctuation. `None` if `text` does not
/// start with `prefix`.
pub fn strip_leading_words(text: &str, prefix: &str) -> Option<String> {
    let mut words = text.split_whitespace();
    for expected in prefix.split_whitespace() {
        let word = words.next()?;
        if normalize_word(word) != normalize_word(expected) {
            return None;
        }
    }
    Some(words.collect::<Vec<_>>().join(" "))
}

fn normalize_word(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_fragments_concatenate_in_order() {
        let mut buf = TranscriptBuffer::new();
        buf.push("add", true);
        buf.push("task", true);
        buf.push("buy milk", true);
        assert_eq!(buf.commit().as_deref(), Some("add task buy milk"));
        assert!(buf.is_empty());
    }

    #[test]
    fn growing_interim_overwrites_its_slot() {
        let mut buf = TranscriptBuffer::new();
        buf.push("what", false);
        buf.push("what time", false);
        buf.push("what time is it", false);
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.commit().as_deref(), Some("what time is it"));
    }

    #[test]
    fn final_settles_interim_and_next_utterance_appends() {
        let mut buf = TranscriptBuffer::new();
        buf.push("remind", false);
        buf.push("remind me", true);
        buf.push("to call", false);
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.commit().as_deref(), Some("remind me to call"));
    }

    #[test]
    fn word_sharing_a_prefix_is_not_merged() {
        let mut buf = TranscriptBuffer::new();
        buf.push("add", true);
        buf.push("address book cleanup", true);
        assert_eq!(buf.commit().as_deref(), Some("add address book cleanup"));
    }

    #[test]
    fn repeated_word_is_kept() {
        let mut buf = TranscriptBuffer::new();
        buf.push("no", true);
        buf.push("no", true);
        assert_eq!(buf.commit().as_deref(), Some("no no"));
    }

    #[test]
    fn whitespace_only_does_not_commit() {
        let mut buf = TranscriptBuffer::new();
        buf.push("   ", false);
        buf.push("", true);
        assert_eq!(buf.commit(), None);
    }

    #[test]
    fn leading_words_are_matched_whole() {
        assert_eq!(
            strip_leading_words("Hey, FocusFlow what time is it", "hey focusflow").as_deref(),
            Some("what time is it")
        );
        assert_eq!(strip_leading_words("hey", "hey").as_deref(), Some(""));
        assert_eq!(strip_leading_words("address book", "add"), None);
        assert_eq!(strip_leading_words("hey", "hey focusflow"), None);
    }
}
