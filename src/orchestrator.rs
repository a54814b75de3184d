//! Stateless turn orchestrator
//!
//! One call per user message. The caller sends the message together with
//! the history and flow state it got back last turn; the orchestrator plans
//! the turn deterministically (safety gate, escape check, routing, flow
//! step, reference lookups), asks the language service to phrase the single
//! planned reply, and streams text deltas each paired with a full snapshot.
//! Nothing is retained between calls.

use crate::audit::AuditTrail;
use crate::catalog::ReferenceStore;
use crate::error::Result;
use crate::escape::EscapeJudge;
use crate::flow::{
    med_info, rx_verify, small_talk, stock_check, FlowDeps, FlowKind, FlowState, FlowTurn,
    MedInfoState, RxVerifyState, StockCheckState,
};
use crate::intent::{Intent, IntentRouter};
use crate::provider::{LlmProvider, RenderPrompt, TextStream};
use crate::safety::SafetyGate;
use crate::types::{Language, TurnId, UserId};
use chrono::{NaiveDate, Utc};
use futures::{future, stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One entry of the client-held conversation transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: ChatRole,
    pub content: String,
}

impl HistoryEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Everything the client carries between turns, sent with each message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub flow: FlowState,
    /// Logged for traceability only; never drives behavior.
    #[serde(default)]
    pub user_id: Option<UserId>,
}

impl TurnRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            history: Vec::new(),
            flow: FlowState::default(),
            user_id: None,
        }
    }

    pub fn with_history(mut self, history: Vec<HistoryEntry>) -> Self {
        self.history = history;
        self
    }

    pub fn with_flow(mut self, flow: FlowState) -> Self {
        self.flow = flow;
        self
    }

    pub fn with_user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

/// Full turn state as of one delta; the caller must persist the snapshot
/// from the *final* delta to drive the next turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnSnapshot {
    pub turn_id: TurnId,
    pub language: Language,
    pub answer: String,
    pub history: Vec<HistoryEntry>,
    pub flow: FlowState,
    pub audit: AuditTrail,
}

/// One streamed increment: the new text plus the snapshot including it
#[derive(Debug, Clone)]
pub struct TurnDelta {
    pub text: String,
    pub snapshot: TurnSnapshot,
}

pub type TurnStream = Pin<Box<dyn Stream<Item = TurnDelta> + Send>>;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Timeout applied around every language-service round trip
    pub call_timeout: Duration,
    /// Extra classification attempts before the small-talk fallback
    pub classify_retries: u32,
    /// Fixed "today" for effective-status computation; `None` uses the
    /// wall clock
    pub today: Option<NaiveDate>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
            classify_retries: 1,
            today: None,
        }
    }
}

impl OrchestratorConfig {
    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }
}

pub struct Orchestrator {
    provider: Arc<dyn LlmProvider>,
    store: Arc<dyn ReferenceStore>,
    gate: SafetyGate,
    judge: EscapeJudge,
    router: IntentRouter,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn LlmProvider>, store: Arc<dyn ReferenceStore>) -> Self {
        Self::with_config(provider, store, OrchestratorConfig::default())
    }

    pub fn with_config(
        provider: Arc<dyn LlmProvider>,
        store: Arc<dyn ReferenceStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            provider,
            store,
            gate: SafetyGate::new(),
            judge: EscapeJudge::new(),
            router: IntentRouter::new(config.call_timeout, config.classify_retries),
            config,
        }
    }

    /// Process one turn and stream the reply.
    ///
    /// Every delta carries a complete snapshot; consumers must use the
    /// final one, not an earlier partial, as next turn's `TurnRequest`
    /// state.
    pub async fn take_turn(&self, request: TurnRequest) -> Result<TurnStream> {
        let turn_id = TurnId::new();
        let language = Language::detect(&request.message);
        let mut audit = AuditTrail::new();

        info!(
            turn_id = %turn_id,
            language = ?language,
            user_id = ?request.user_id,
            flow = %request.flow.summary(),
            "turn started"
        );

        // A done flow is terminal; treat it exactly like no flow at all.
        let inbound = match request.flow {
            FlowState::Done { .. } => FlowState::Idle,
            flow => flow,
        };

        let deps = FlowDeps {
            store: self.store.as_ref(),
            provider: self.provider.as_ref(),
            call_timeout: self.config.call_timeout,
            today: self.config.today(),
        };

        let turn = self
            .plan(inbound, &request.message, &deps, &mut audit)
            .await;

        if let FlowState::Done { completed } = &turn.next {
            audit.record(
                "flow_completed",
                json!({ "flow": completed.as_str() }),
                json!({ "done": true }),
            );
        }

        let prompt = RenderPrompt::new(
            language,
            turn.reply.instruction.clone(),
            turn.reply.facts.clone(),
        );
        let text_stream: TextStream = match timeout(
            self.config.call_timeout,
            self.provider.render_stream(&prompt),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!(error = %e, "render failed, using canned fallback");
                canned_stream(fallback_text(language))
            }
            Err(_) => {
                warn!("render timed out, using canned fallback");
                canned_stream(fallback_text(language))
            }
        };

        let mut base_history = request.history;
        base_history.push(HistoryEntry::user(request.message.clone()));

        let next_flow = turn.next;
        let out = text_stream.scan(
            (String::new(), false),
            move |(answer, failed), item| {
                let text = match item {
                    Ok(text) => text,
                    Err(e) => {
                        if *failed {
                            return future::ready(None);
                        }
                        *failed = true;
                        warn!(error = %e, "render stream broke mid-reply");
                        fallback_text(language)
                    }
                };

                answer.push_str(&text);

                let mut history = base_history.clone();
                history.push(HistoryEntry::assistant(answer.clone()));

                future::ready(Some(TurnDelta {
                    text,
                    snapshot: TurnSnapshot {
                        turn_id,
                        language,
                        answer: answer.clone(),
                        history,
                        flow: next_flow.clone(),
                        audit: audit.clone(),
                    },
                }))
            },
        );

        Ok(Box::pin(out))
    }

    /// Decide what to say and what state to hand back, without rendering.
    async fn plan(
        &self,
        inbound: FlowState,
        message: &str,
        deps: &FlowDeps<'_>,
        audit: &mut AuditTrail,
    ) -> FlowTurn {
        // Hard override: advice requests reset any flow unconditionally.
        if self.gate.is_advice_request(message) {
            audit.record(
                "safety_gate",
                json!({ "message": message }),
                json!({ "refused": true }),
            );
            return FlowTurn::done(FlowKind::SmallTalk, small_talk::refusal(message));
        }

        if inbound.is_active() {
            match self
                .judge
                .should_escape(&self.gate, &inbound.awaiting(), message, deps.store)
            {
                None => return self.drive(inbound, message, deps, audit).await,
                Some(reason) => {
                    audit.record(
                        "flow_escape",
                        json!({ "from": inbound.summary() }),
                        json!({ "reason": reason.as_str() }),
                    );
                }
            }
        }

        let intent = self
            .router
            .classify(self.provider.as_ref(), message, &inbound.summary(), audit)
            .await;
        self.start(intent, message, deps, audit).await
    }

    async fn start(
        &self,
        intent: Intent,
        message: &str,
        deps: &FlowDeps<'_>,
        audit: &mut AuditTrail,
    ) -> FlowTurn {
        match intent {
            Intent::MedInfo => {
                med_info::drive(MedInfoState::default(), message, deps, audit).await
            }
            Intent::StockCheck => {
                stock_check::drive(StockCheckState::default(), message, deps, audit).await
            }
            Intent::RxVerify => {
                rx_verify::drive(RxVerifyState::default(), message, deps, audit).await
            }
            Intent::SmallTalk => small_talk::drive(message),
        }
    }

    async fn drive(
        &self,
        flow: FlowState,
        message: &str,
        deps: &FlowDeps<'_>,
        audit: &mut AuditTrail,
    ) -> FlowTurn {
        match flow {
            FlowState::MedInfo(state) => med_info::drive(state, message, deps, audit).await,
            FlowState::StockCheck(state) => stock_check::drive(state, message, deps, audit).await,
            FlowState::RxVerify(state) => rx_verify::drive(state, message, deps, audit).await,
            // Unexpected here; small talk is the universal fallback.
            FlowState::Idle | FlowState::Done { .. } => small_talk::drive(message),
        }
    }
}

fn canned_stream(text: String) -> TextStream {
    Box::pin(stream::iter(vec![Ok(text)]))
}

fn fallback_text(language: Language) -> String {
    match language {
        Language::He => "מצטערים, משהו השתבש בהכנת התשובה. נסו שוב בבקשה.".to_string(),
        Language::En => {
            "Sorry, something went wrong while preparing the reply. Please try again.".to_string()
        }
    }
}
