//! Small-talk flow and the safety refusal
//!
//! Single step, always completes in one turn. This is also the universal
//! fallback: unroutable messages and flows that reach an unexpected state
//! land here rather than failing the turn.

use crate::flow::{FlowKind, FlowTurn, Reply};
use serde_json::json;

pub fn drive(message: &str) -> FlowTurn {
    FlowTurn::done(FlowKind::SmallTalk, reply(message))
}

pub fn reply(message: &str) -> Reply {
    Reply::new(
        "You are a pharmacist assistant; respond politely to small talk and \
         greetings. You may greet, thank, and explain your capabilities. Do \
         NOT provide medical advice, diagnosis, or recommendations.",
        json!({
            "user said": message,
            "capabilities": "factual medication info, branch stock availability, \
                             prescription status",
            "if asked for personal guidance": "suggest consulting a pharmacist or doctor",
        }),
    )
}

/// Fixed refusal used when the safety gate fires.
pub fn refusal(message: &str) -> Reply {
    Reply::new(
        "Refuse to provide medical advice, diagnosis, or recommendations. \
         Explain you can provide factual medication information only. Suggest \
         consulting a pharmacist or doctor for personal guidance.",
        json!({ "user request": message }),
    )
}
