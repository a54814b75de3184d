//! Slot-filling flow state machines
//!
//! Each flow is a pure-ish step function from (state, message) to (reply,
//! next state). State is an immutable value the caller carries between
//! turns; a machine never mutates the inbound state, it returns a new one.
//! A turn may advance through several internal steps when the earlier ones
//! complete deterministically, and always ends with exactly one reply.

pub mod med_info;
pub mod rx_verify;
pub mod small_talk;
pub mod stock_check;

use crate::audit::AuditTrail;
use crate::catalog::ReferenceStore;
use crate::provider::LlmProvider;
use crate::types::{BranchId, MedicationId, PrescriptionId, UserId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

/// Which slot, if any, the active flow asked the user for last turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Awaiting {
    #[default]
    None,
    MedName,
    BranchName,
    RxId,
    UserId,
    RxOrUser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    MedInfo,
    StockCheck,
    RxVerify,
    SmallTalk,
}

impl FlowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowKind::MedInfo => "med_info",
            FlowKind::StockCheck => "stock_check",
            FlowKind::RxVerify => "rx_verify",
            FlowKind::SmallTalk => "small_talk",
        }
    }
}

/// Client-owned conversation state, serialized into every turn request.
///
/// `Done` is the terminal snapshot surfaced when a flow finishes; feeding
/// it back (like feeding `Idle`) causes fresh intent routing, never
/// continuation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "flow", rename_all = "snake_case")]
pub enum FlowState {
    #[default]
    Idle,
    MedInfo(MedInfoState),
    StockCheck(StockCheckState),
    RxVerify(RxVerifyState),
    Done {
        completed: FlowKind,
    },
}

impl FlowState {
    /// Active means a machine holds partially-filled slots.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            FlowState::MedInfo(_) | FlowState::StockCheck(_) | FlowState::RxVerify(_)
        )
    }

    pub fn awaiting(&self) -> Awaiting {
        match self {
            FlowState::MedInfo(s) => s.awaiting,
            FlowState::StockCheck(s) => s.awaiting,
            FlowState::RxVerify(s) => s.awaiting,
            FlowState::Idle | FlowState::Done { .. } => Awaiting::None,
        }
    }

    /// One-line description handed to the intent router as context.
    pub fn summary(&self) -> String {
        match self {
            FlowState::Idle => "none".to_string(),
            FlowState::Done { completed } => format!("{} (completed)", completed.as_str()),
            FlowState::MedInfo(s) => format!("med_info at step {:?}", s.step),
            FlowState::StockCheck(s) => format!("stock_check at step {:?}", s.step),
            FlowState::RxVerify(s) => format!("rx_verify at step {:?}", s.step),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MedInfoStep {
    #[default]
    ExtractMedName,
    Lookup,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MedInfoState {
    pub step: MedInfoStep,
    pub med_name: Option<String>,
    pub awaiting: Awaiting,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockCheckStep {
    #[default]
    Collect,
    ResolveMed,
    ResolveBranch,
    Stock,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockCheckState {
    pub step: StockCheckStep,
    pub med_name: Option<String>,
    pub branch_name: Option<String>,
    pub medication: Option<MedicationId>,
    pub branch: Option<BranchId>,
    pub awaiting: Awaiting,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RxVerifyStep {
    #[default]
    Collect,
    VerifyRx,
    ListUserRx,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RxVerifyState {
    pub step: RxVerifyStep,
    pub prescription: Option<PrescriptionId>,
    pub user: Option<UserId>,
    pub awaiting: Awaiting,
}

/// What a flow wants said this turn: a phrasing instruction for the
/// renderer plus the only facts it may state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub instruction: String,
    pub facts: Value,
}

impl Reply {
    pub fn new(instruction: impl Into<String>, facts: Value) -> Self {
        Self {
            instruction: instruction.into(),
            facts,
        }
    }
}

/// Result of driving a machine for one turn
#[derive(Debug, Clone)]
pub struct FlowTurn {
    pub reply: Reply,
    pub next: FlowState,
}

impl FlowTurn {
    pub fn done(kind: FlowKind, reply: Reply) -> Self {
        Self {
            reply,
            next: FlowState::Done { completed: kind },
        }
    }
}

/// Read-only dependencies the machines share for one turn
pub struct FlowDeps<'a> {
    pub store: &'a dyn ReferenceStore,
    pub provider: &'a dyn LlmProvider,
    pub call_timeout: Duration,
    pub today: NaiveDate,
}

/// Ask the language service for a medication mention, treating provider
/// failure and timeout as "no mention". The flows decide whether to fall
/// back to raw text.
pub(crate) async fn extract_medication_mention(
    deps: &FlowDeps<'_>,
    message: &str,
    audit: &mut AuditTrail,
) -> Option<String> {
    let mention = match timeout(deps.call_timeout, deps.provider.extract_medication(message)).await
    {
        Ok(Ok(mention)) => mention,
        Ok(Err(e)) => {
            warn!(error = %e, "medication extraction failed");
            None
        }
        Err(_) => {
            warn!("medication extraction timed out");
            None
        }
    };

    audit.record(
        "extract_medication",
        json!({ "message": message }),
        json!({ "mention": mention }),
    );
    mention
}
