//! Decides whether an incremental transcript is a finished thought worth
//! sending to the model.

/// Word growth over the last accepted transcript that counts as complete.
const COMPLETION_WORD_GROWTH: usize = 3;

/// Largest word growth still treated as the provider re-emitting a prefix.
const EXTENSION_WORD_LIMIT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionReason {
    Complete,
    Duplicate,
    Incomplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtteranceDecision {
    pub accept: bool,
    pub reason: DecisionReason,
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn is_complete(transcript: &str, last_accepted: &str) -> bool {
    let ends_sentence = transcript.trim_end().ends_with(['.', '?', '!']);
    ends_sentence || word_count(transcript) >= word_count(last_accepted) + COMPLETION_WORD_GROWTH
}

fn is_duplicate(transcript: &str, last_accepted: &str) -> bool {
    let transcript = transcript.to_lowercase();
    let last = last_accepted.to_lowercase();
    if transcript == last {
        return true;
    }
    // An empty previous transcript never counts as a prefix.
    if last.is_empty() || !transcript.starts_with(&last) {
        return false;
    }
    let growth = word_count(&transcript).saturating_sub(word_count(&last));
    (1..=EXTENSION_WORD_LIMIT).contains(&growth)
}

/// Classifies `transcript` against the last transcript the session acted on.
/// Duplicates are rejected even when they also look complete.
pub fn decide(transcript: &str, last_accepted: &str) -> UtteranceDecision {
    if is_duplicate(transcript, last_accepted) {
        return UtteranceDecision {
            accept: false,
            reason: DecisionReason::Duplicate,
        };
    }
    if is_complete(transcript, last_accepted) {
        UtteranceDecision {
            accept: true,
            reason: DecisionReason::Complete,
        }
    } else {
        UtteranceDecision {
            accept: false,
            reason: DecisionReason::Incomplete,
        }
    }
}
