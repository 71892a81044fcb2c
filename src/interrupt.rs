//! Barge-in classification for speech that arrives while a reply is in flight.
//! Evaluated per fragment, never debounced.

const STOP_WORDS: [&str; 3] = ["stop", "cancel", "enough"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BargeIn {
    /// Abort and discard the captured text.
    Stop,
    /// Abort, then resubmit the text as the next command after the grace delay.
    Supersede(String),
    /// Too short to be deliberate (echo, breath, filler).
    Ignore,
}

pub fn classify_barge_in(fragment: &str, min_chars: usize) -> BargeIn {
    let text = fragment.trim();
    let lower = text.to_lowercase();
    if STOP_WORDS.iter().any(|w| lower.contains(w)) {
        return BargeIn::Stop;
    }
    if text.chars().count() > min_chars {
        BargeIn::Supersede(text.to_string())
    } else {
        BargeIn::Ignore
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_class_words() {
        assert_eq!(classify_barge_in("stop", 5), BargeIn::Stop);
        assert_eq!(classify_barge_in("Cancel that", 5), BargeIn::Stop);
        assert_eq!(classify_barge_in("ok enough", 5), BargeIn::Stop);
    }

    #[test]
    fn longer_speech_supersedes() {
        assert_eq!(
            classify_barge_in("  what about tomorrow ", 5),
            BargeIn::Supersede("what about tomorrow".to_string())
        );
    }

    #[test]
    fn short_noise_is_ignored() {
        assert_eq!(classify_barge_in("uh", 5), BargeIn::Ignore);
        assert_eq!(classify_barge_in("hello", 5), BargeIn::Ignore);
        assert_eq!(
            classify_barge_in("hello!", 5),
            BargeIn::Supersede("hello!".to_string())
        );
    }
}
