//! Entity resolvers: medication, branch, prescription id, user id
//!
//! Medication and branch mentions resolve through the alias matcher against
//! catalog records. Prescription and user ids are structural: a pattern
//! either matches and normalizes to the canonical form, or it doesn't; there
//! is no ambiguity concept for ids.

use crate::catalog::{Branch, Medication, ReferenceStore};
use crate::text::{self, normalize, MatchOutcome};
use crate::types::{PrescriptionId, UserId};
use regex::Regex;
use tracing::debug;

/// Resolve a free-text medication mention against the catalog.
pub fn resolve_medication(store: &dyn ReferenceStore, query: &str) -> MatchOutcome<Medication> {
    let outcome = text::match_candidates(query, store.medications());
    debug!(query, found = outcome.is_found(), "medication resolution");
    outcome
}

/// Resolve a free-text branch mention against the catalog.
pub fn resolve_branch(store: &dyn ReferenceStore, query: &str) -> MatchOutcome<Branch> {
    let outcome = text::match_candidates(query, store.branches());
    debug!(query, found = outcome.is_found(), "branch resolution");
    outcome
}

/// Deterministic branch-mention extractor.
///
/// Scans the message for any branch alias or display name contained in the
/// normalized text and returns the matched alias string (not the branch id).
/// Longer matches win, so "tel aviv" beats "ta" and "haifa" beats "ha".
pub fn extract_branch_mention(store: &dyn ReferenceStore, message: &str) -> Option<String> {
    let haystack = normalize(message);
    if haystack.is_empty() {
        return None;
    }

    let mut best: Option<&str> = None;
    for branch in store.branches() {
        let keys = std::iter::once(branch.display_name.as_str())
            .chain(branch.aliases.iter().map(|a| a.as_str()));
        for key in keys {
            let key_norm = normalize(key);
            if key_norm.is_empty() || !contains_word(&haystack, &key_norm) {
                continue;
            }
            if best.map_or(true, |b| key.len() > b.len()) {
                best = Some(key);
            }
        }
    }

    best.map(|s| s.to_string())
}

// Alias hit at word boundaries within already-normalized text.
fn contains_word(haystack: &str, needle: &str) -> bool {
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(needle) {
        let begin = start + pos;
        let end = begin + needle.len();
        let left_ok = begin == 0 || haystack.as_bytes()[begin - 1] == b' ';
        let right_ok = end == haystack.len() || haystack.as_bytes()[end] == b' ';
        if left_ok && right_ok {
            return true;
        }
        match haystack[begin..].char_indices().nth(1) {
            Some((off, _)) => start = begin + off,
            None => break,
        }
    }
    false
}

/// Structural recognizers for prescription and user ids
///
/// Patterns are compiled once at construction. Recognition is forgiving on
/// separators and case; the output is always the canonical form.
#[derive(Debug)]
pub struct IdRecognizer {
    prescription: Regex,
    user: Regex,
}

impl IdRecognizer {
    pub fn new() -> Self {
        Self {
            prescription: Regex::new(r"(?i)\brx[\s_-]?(\d{3,6})\b")
                .expect("prescription id pattern must compile"),
            user: Regex::new(r"(?i)\buser[\s_-]?0*(\d{1,4})\b")
                .expect("user id pattern must compile"),
        }
    }

    /// Recognize a prescription id anywhere in `text`, normalized to the
    /// canonical dash-separated uppercase form (`RX-1042`).
    pub fn prescription_id(&self, text: &str) -> Option<PrescriptionId> {
        self.prescription
            .captures(text)
            .map(|caps| PrescriptionId::new(format!("RX-{}", &caps[1])))
    }

    /// Recognize a user id anywhere in `text`, normalized to the canonical
    /// lowercase zero-padded form (`user_009`).
    pub fn user_id(&self, text: &str) -> Option<UserId> {
        self.user.captures(text).and_then(|caps| {
            let n: u32 = caps[1].parse().ok()?;
            Some(UserId::new(format!("user_{n:03}")))
        })
    }
}

impl Default for IdRecognizer {
    fn default() -> Self {
        Self::new()
    }
}
