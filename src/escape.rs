//! Mid-flow escape heuristic
//!
//! While a flow is waiting for a slot value, the user may answer the
//! question or may change topic entirely. The judge decides which: a
//! message that plausibly fills the awaited slot stays inside the flow
//! without a new routing call; anything else escapes back through the
//! full pipeline (safety gate, intent router) as a fresh request.

use crate::catalog::ReferenceStore;
use crate::flow::Awaiting;
use crate::resolve::IdRecognizer;
use crate::safety::SafetyGate;
use crate::text::normalize;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

// A bare slot answer is a short single-line fragment, not a sentence.
const MAX_ANSWER_CHARS: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscapeReason {
    Cancel,
    SmalltalkOrMeta,
    ImplausibleSlotAnswer,
}

impl EscapeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscapeReason::Cancel => "cancel",
            EscapeReason::SmalltalkOrMeta => "smalltalk_or_meta",
            EscapeReason::ImplausibleSlotAnswer => "implausible_slot_answer",
        }
    }
}

pub struct EscapeJudge {
    ids: IdRecognizer,
    token_shape: Regex,
}

impl EscapeJudge {
    pub fn new() -> Self {
        Self {
            ids: IdRecognizer::new(),
            // one or two normalized words
            token_shape: Regex::new(r"^[0-9a-z\u{05d0}-\u{05ea}]+( [0-9a-z\u{05d0}-\u{05ea}]+)?$")
                .expect("token shape pattern must compile"),
        }
    }

    /// Decide whether a message received mid-flow abandons the flow.
    ///
    /// Returns `None` when the flow should consume the message (either no
    /// slot is awaited, or the text plausibly answers the awaited slot),
    /// otherwise the reason the flow must be reset before re-routing.
    pub fn should_escape(
        &self,
        gate: &SafetyGate,
        awaiting: &Awaiting,
        message: &str,
        store: &dyn ReferenceStore,
    ) -> Option<EscapeReason> {
        let reason = if gate.is_cancel(message) {
            Some(EscapeReason::Cancel)
        } else if gate.is_smalltalk_or_meta(message) {
            Some(EscapeReason::SmalltalkOrMeta)
        } else if *awaiting == Awaiting::None || self.is_plausible_answer(awaiting, message, store)
        {
            None
        } else {
            Some(EscapeReason::ImplausibleSlotAnswer)
        };

        if let Some(reason) = reason {
            debug!(reason = reason.as_str(), "flow escape");
        }
        reason
    }

    /// True when `message` plausibly answers the awaited slot.
    ///
    /// Unknown names must still reach the flow so it can produce a proper
    /// "not found" reply, so a short bare token always passes for name
    /// slots; identifier slots additionally require an id-shaped form.
    pub fn is_plausible_answer(
        &self,
        awaiting: &Awaiting,
        message: &str,
        store: &dyn ReferenceStore,
    ) -> bool {
        let plausible = match awaiting {
            Awaiting::None => false,
            Awaiting::MedName => {
                self.plausible_name_answer(message, medication_aliases(store))
            }
            Awaiting::BranchName => self.plausible_name_answer(message, branch_aliases(store)),
            Awaiting::RxId => {
                self.ids.prescription_id(message).is_some()
                    || looks_like_identifier_fragment(message)
            }
            Awaiting::UserId => {
                self.ids.user_id(message).is_some() || looks_like_identifier_fragment(message)
            }
            Awaiting::RxOrUser => {
                self.ids.prescription_id(message).is_some()
                    || self.ids.user_id(message).is_some()
                    || looks_like_identifier_fragment(message)
            }
        };

        trace!(?awaiting, plausible, "slot answer plausibility");
        plausible
    }

    fn plausible_name_answer(&self, message: &str, aliases: Vec<String>) -> bool {
        if !is_short_single_line(message) {
            return false;
        }
        let normalized = normalize(message);
        aliases.iter().any(|alias| normalized.contains(alias.as_str()))
            || self.token_shape.is_match(&normalized)
    }
}

impl Default for EscapeJudge {
    fn default() -> Self {
        Self::new()
    }
}

fn medication_aliases(store: &dyn ReferenceStore) -> Vec<String> {
    store
        .medications()
        .iter()
        .flat_map(|m| {
            std::iter::once(normalize(&m.display_name))
                .chain(m.aliases.iter().map(|a| normalize(a)))
        })
        .collect()
}

fn branch_aliases(store: &dyn ReferenceStore) -> Vec<String> {
    store
        .branches()
        .iter()
        .flat_map(|b| {
            std::iter::once(normalize(&b.display_name))
                .chain(b.aliases.iter().map(|a| normalize(a)))
        })
        .collect()
}

fn is_short_single_line(message: &str) -> bool {
    if message.contains('\n') {
        return false;
    }
    let normalized = normalize(message);
    !normalized.is_empty() && normalized.chars().count() <= MAX_ANSWER_CHARS
}

// Identifier slots additionally require a digit somewhere; a plain word
// like "actually" can never be a prescription or user id.
fn looks_like_identifier_fragment(message: &str) -> bool {
    is_short_single_line(message) && message.chars().any(|c| c.is_ascii_digit())
}
