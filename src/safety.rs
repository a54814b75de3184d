//! Heuristic safety gate and escape-signal detection
//!
//! A lightweight bilingual classifier, independent of the language service,
//! that flags medical-advice requests plus the "escape" signals (explicit
//! cancellation, greeting/meta chatter). The advice check runs before intent
//! routing and is a hard override: it resets any active flow and routes to a
//! fixed refusal.

use crate::text::normalize;
use aho_corasick::{AhoCorasick, AhoCorasickBuilder};
use regex::RegexSet;
use tracing::{debug, info};

const ADVICE_PATTERNS_EN: &[&str] = &[
    r"\bshould i\b",
    r"\brecommend\b",
    r"\bwhat should i take\b",
    r"\bhurts\b",
    r"\bdiagnos(e|is)\b",
    r"\btreat(ment)?\b",
    r"\bwhat do i do\b",
    r"\bis it safe\b",
    r"\bworth (buying|taking)\b",
];

const ADVICE_PATTERNS_HE: &[&str] = &[
    r"מה כדאי",
    r"מומלץ",
    r"איך לטפל",
    r"אבחון",
    r"מה לקחת",
    r"כואב לי",
    r"מה לעשות",
    r"למה יש לי",
    r"שווה לקנות",
    r"האם זה בטוח",
];

const CANCEL_PHRASES: &[&str] = &[
    "cancel",
    "never mind",
    "nevermind",
    "forget it",
    "stop",
    "בטל",
    "ביטול",
    "עזוב",
    "לא משנה",
];

const SMALLTALK_PHRASES: &[&str] = &[
    "hello",
    "hi",
    "hey",
    "thanks",
    "thank you",
    "good morning",
    "what can you do",
    "who are you",
    "how are you",
    "שלום",
    "היי",
    "תודה",
    "בוקר טוב",
    "מה אתה יודע לעשות",
    "מי אתה",
    "מה נשמע",
];

// Greeting/meta only counts when the message is essentially just that;
// a long sentence that happens to contain "hi" is not small talk.
const SMALLTALK_MAX_LEN: usize = 40;

/// Bilingual keyword/regex heuristics, compiled once at construction
pub struct SafetyGate {
    advice: RegexSet,
    cancel: AhoCorasick,
    smalltalk: AhoCorasick,
}

impl SafetyGate {
    pub fn new() -> Self {
        let advice_patterns: Vec<&str> = ADVICE_PATTERNS_EN
            .iter()
            .chain(ADVICE_PATTERNS_HE.iter())
            .copied()
            .collect();

        let gate = Self {
            advice: RegexSet::new(&advice_patterns).expect("advice patterns must compile"),
            cancel: build_phrase_matcher(CANCEL_PHRASES),
            smalltalk: build_phrase_matcher(SMALLTALK_PHRASES),
        };

        info!(
            advice_patterns = advice_patterns.len(),
            cancel_phrases = CANCEL_PHRASES.len(),
            smalltalk_phrases = SMALLTALK_PHRASES.len(),
            "safety gate compiled"
        );

        gate
    }

    /// Does the message ask for diagnosis, treatment recommendation, or
    /// encouragement to purchase?
    pub fn is_advice_request(&self, text: &str) -> bool {
        let normalized = normalize(text);
        let hit = self.advice.is_match(&normalized);
        if hit {
            debug!(message = %normalized, "advice request flagged");
        }
        hit
    }

    /// Does the message explicitly cancel the current task?
    pub fn is_cancel(&self, text: &str) -> bool {
        let normalized = normalize(text);
        phrase_hit(&self.cancel, &normalized)
    }

    /// Is the message greeting/meta chatter rather than task content?
    pub fn is_smalltalk_or_meta(&self, text: &str) -> bool {
        let normalized = normalize(text);
        normalized.chars().count() <= SMALLTALK_MAX_LEN && phrase_hit(&self.smalltalk, &normalized)
    }
}

impl Default for SafetyGate {
    fn default() -> Self {
        Self::new()
    }
}

fn build_phrase_matcher(phrases: &[&str]) -> AhoCorasick {
    let normalized: Vec<String> = phrases.iter().map(|p| normalize(p)).collect();
    AhoCorasickBuilder::new()
        .build(&normalized)
        .expect("phrase automaton must build")
}

// Phrase hit at word boundaries within already-normalized text, so "hi"
// never fires inside "this".
fn phrase_hit(matcher: &AhoCorasick, haystack: &str) -> bool {
    for mat in matcher.find_iter(haystack) {
        let left_ok = mat.start() == 0 || haystack.as_bytes()[mat.start() - 1] == b' ';
        let right_ok = mat.end() == haystack.len() || haystack.as_bytes()[mat.end()] == b' ';
        if left_ok && right_ok {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advice_request_english() {
        let gate = SafetyGate::new();
        assert!(gate.is_advice_request("what should I take for my headache"));
        assert!(gate.is_advice_request("can you recommend something?"));
        assert!(gate.is_advice_request("my back hurts"));
        assert!(gate.is_advice_request("is it worth buying lipitor?"));
    }

    #[test]
    fn test_advice_request_hebrew() {
        let gate = SafetyGate::new();
        assert!(gate.is_advice_request("מה כדאי לקחת לכאב ראש?"));
        assert!(gate.is_advice_request("כואב לי הגב"));
    }

    #[test]
    fn test_factual_question_is_not_advice() {
        let gate = SafetyGate::new();
        assert!(!gate.is_advice_request("tell me about ibuprofen"));
        assert!(!gate.is_advice_request("is advil in stock in haifa?"));
        assert!(!gate.is_advice_request("מה זה אדביל?"));
    }

    #[test]
    fn test_cancel_detection() {
        let gate = SafetyGate::new();
        assert!(gate.is_cancel("cancel"));
        assert!(gate.is_cancel("never mind, thanks"));
        assert!(gate.is_cancel("בטל את זה"));
        assert!(!gate.is_cancel("tell me about advil"));
    }

    #[test]
    fn test_cancel_requires_word_boundary() {
        let gate = SafetyGate::new();
        // "stop" inside "stops" must not fire
        assert!(!gate.is_cancel("which bus stops near the branch?"));
    }

    #[test]
    fn test_smalltalk_detection() {
        let gate = SafetyGate::new();
        assert!(gate.is_smalltalk_or_meta("hello"));
        assert!(gate.is_smalltalk_or_meta("hi there"));
        assert!(gate.is_smalltalk_or_meta("what can you do?"));
        assert!(gate.is_smalltalk_or_meta("שלום"));
    }

    #[test]
    fn test_smalltalk_requires_short_message() {
        let gate = SafetyGate::new();
        assert!(!gate.is_smalltalk_or_meta(
            "hi, I wanted to ask whether the haifa branch carries ibuprofen these days"
        ));
    }

    #[test]
    fn test_smalltalk_word_boundary() {
        let gate = SafetyGate::new();
        assert!(!gate.is_smalltalk_or_meta("this is fine"));
    }
}
