//! # Apothecary - Stateless Pharmacist-Assistant Orchestration
//!
//! Apothecary turns free-text pharmacy questions into grounded, streamed
//! answers. The server holds no session state: every turn request carries
//! the conversation history and flow state the client got back last time,
//! and every streamed delta carries a full snapshot to send back next turn.
//!
//! ## Features
//!
//! - 🎯 **Intent routing**: med info, branch stock, prescription status, small talk
//! - 🧭 **Slot-filling flows**: typed per-flow state machines the client carries between turns
//! - 🔎 **Deterministic resolution**: exact-before-substring alias matching over bilingual catalogs
//! - 🛡️ **Safety gate**: bilingual (Hebrew/English) refusal of medical-advice requests
//! - 🔄 **Escape heuristic**: mid-flow topic changes re-route instead of corrupting slots
//! - 📋 **Audit trail**: every deterministic lookup of a turn, replayable from the snapshot
//! - ⚡ **Streaming**: incremental text deltas, each paired with the full turn snapshot
//!
//! ## Quick Start
//!
//! ```no_run
//! use apothecary::{
//!     InMemoryReferenceStore, OpenAIProvider, Orchestrator, TurnRequest,
//! };
//! use futures::StreamExt;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = OpenAIProvider::from_env()?;
//! let store = InMemoryReferenceStore::demo();
//! let orchestrator = Orchestrator::new(Arc::new(provider), Arc::new(store));
//!
//! let mut turn = orchestrator
//!     .take_turn(TurnRequest::new("is Advil in stock in Haifa?"))
//!     .await?;
//!
//! let mut last = None;
//! while let Some(delta) = turn.next().await {
//!     print!("{}", delta.text);
//!     last = Some(delta.snapshot);
//! }
//!
//! // The final snapshot drives the next turn.
//! let snapshot = last.expect("stream yields at least one delta");
//! let next = TurnRequest::new("and in Tel Aviv?")
//!     .with_history(snapshot.history)
//!     .with_flow(snapshot.flow);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────┐
//! │                  Orchestrator                     │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────┐  │
//! │  │ Safety Gate │ │ Escape      │ │ Intent      │  │
//! │  │  (bilingual)│ │ Heuristic   │ │ Router      │  │
//! │  └─────────────┘ └─────────────┘ └─────────────┘  │
//! │  ┌─────────────────────────────────────────────┐  │
//! │  │  Flows: med_info · stock_check · rx_verify  │  │
//! │  │         · small_talk                        │  │
//! │  └─────────────────────────────────────────────┘  │
//! │  ┌──────────────────────┐ ┌──────────────────┐    │
//! │  │   LLM Provider       │ │  Reference Store │    │
//! │  │   (classify/extract/ │ │  (catalogs,      │    │
//! │  │    render stream)    │ │   inventory, rx) │    │
//! │  └──────────────────────┘ └──────────────────┘    │
//! └───────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`orchestrator`]: the turn pipeline and streaming turn API
//! - [`flow`]: per-intent slot-filling state machines
//! - [`intent`]: intent routing with retry and fallback
//! - [`safety`]: bilingual advice/cancel/small-talk heuristics
//! - [`escape`]: mid-flow topic-change detection
//! - [`resolve`]: entity resolvers and structural id recognizers
//! - [`text`]: normalization and exact-before-substring alias matching
//! - [`catalog`]: reference data model and the in-memory store
//! - [`provider`]: language-service abstraction (OpenAI implementation)
//! - [`audit`]: per-turn tool invocation records
//! - [`error`]: error types and result aliases

pub mod audit;
pub mod catalog;
pub mod error;
pub mod escape;
pub mod flow;
pub mod intent;
pub mod orchestrator;
pub mod provider;
pub mod resolve;
pub mod safety;
pub mod text;
pub mod types;

pub use audit::{AuditTrail, ToolInvocationRecord};
pub use catalog::{
    Branch, EffectiveStatus, InMemoryReferenceStore, Medication, Prescription,
    PrescriptionStatus, ReferenceStore, StockStatus, User,
};
pub use error::{AssistantError, ProviderError, ProviderResult, Result};
pub use escape::{EscapeJudge, EscapeReason};
pub use flow::{Awaiting, FlowKind, FlowState, Reply};
pub use intent::{Intent, IntentRouter};
pub use orchestrator::{
    ChatRole, HistoryEntry, Orchestrator, OrchestratorConfig, TurnDelta, TurnRequest,
    TurnSnapshot, TurnStream,
};
pub use provider::{LlmProvider, OpenAIProvider, RenderPrompt, TextStream};
pub use resolve::{extract_branch_mention, resolve_branch, resolve_medication, IdRecognizer};
pub use safety::SafetyGate;
pub use text::{match_candidates, normalize, Candidate, MatchKind, MatchOutcome, MatchProvenance};
pub use types::{BranchId, Language, MedicationId, PrescriptionId, TurnId, UserId};
