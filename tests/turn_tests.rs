//! End-to-end turn tests against the public API
//!
//! A scripted mock provider stands in for the language service: fixed
//! classification, fixed extraction, and a renderer that prints the fact
//! payload as `key: value` lines so assertions can target the grounded
//! content of the reply.

use apothecary::{
    Awaiting, FlowKind, FlowState, InMemoryReferenceStore, Intent, LlmProvider, Medication,
    Orchestrator, OrchestratorConfig, ProviderResult, RenderPrompt, TextStream, TurnDelta,
    TurnRequest, TurnSnapshot, TurnStream,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

struct MockProvider {
    intent: Intent,
    mention: Option<String>,
}

impl MockProvider {
    fn new(intent: Intent) -> Self {
        Self {
            intent,
            mention: None,
        }
    }

    fn with_mention(mut self, mention: &str) -> Self {
        self.mention = Some(mention.to_string());
        self
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn classify_intent(&self, _message: &str, _flow_summary: &str) -> ProviderResult<Intent> {
        Ok(self.intent)
    }

    async fn extract_medication(&self, _message: &str) -> ProviderResult<Option<String>> {
        Ok(self.mention.clone())
    }

    async fn render(&self, prompt: &RenderPrompt) -> ProviderResult<String> {
        Ok(render_facts(&prompt.facts))
    }

    async fn render_stream(&self, prompt: &RenderPrompt) -> ProviderResult<TextStream> {
        let chunks: Vec<ProviderResult<String>> = render_facts(&prompt.facts)
            .split_inclusive(' ')
            .map(|s| Ok(s.to_string()))
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

fn render_facts(facts: &Value) -> String {
    fn plain(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            Value::Array(items) => items.iter().map(plain).collect::<Vec<_>>().join(", "),
            other => other.to_string(),
        }
    }
    match facts {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{k}: {}", plain(v)))
            .collect::<Vec<_>>()
            .join("\n"),
        other => plain(other),
    }
}

fn orchestrator(provider: MockProvider, store: InMemoryReferenceStore) -> Orchestrator {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
    let config = OrchestratorConfig {
        call_timeout: Duration::from_secs(5),
        classify_retries: 1,
        today: NaiveDate::from_ymd_opt(2026, 1, 10),
    };
    Orchestrator::with_config(Arc::new(provider), Arc::new(store), config)
}

async fn final_snapshot(mut stream: TurnStream) -> (String, TurnSnapshot) {
    let mut last: Option<TurnDelta> = None;
    while let Some(delta) = stream.next().await {
        last = Some(delta);
    }
    let last = last.expect("stream must yield at least one delta");
    (last.snapshot.answer.clone(), last.snapshot)
}

#[tokio::test]
async fn test_med_info_end_to_end() {
    let provider = MockProvider::new(Intent::MedInfo).with_mention("Advil");
    let orch = orchestrator(provider, InMemoryReferenceStore::demo());

    let stream = orch.take_turn(TurnRequest::new("Advil")).await.unwrap();
    let (answer, snapshot) = final_snapshot(stream).await;

    assert!(answer.contains("Ibuprofen"));
    assert!(answer.contains("prescription required: No"));
    assert_eq!(
        snapshot.flow,
        FlowState::Done {
            completed: FlowKind::MedInfo
        }
    );
}

#[tokio::test]
async fn test_ambiguous_medication_lists_candidates_and_reasks() {
    let mut store = InMemoryReferenceStore::new();
    store.add_medication(Medication {
        id: "med_a".into(),
        display_name: "Amoxicillin 500mg".to_string(),
        aliases: vec!["amoxicillin".to_string()],
        active_ingredient: "Amoxicillin".to_string(),
        rx_required: true,
        label_summary: "Antibiotic.".to_string(),
    });
    store.add_medication(Medication {
        id: "med_b".into(),
        display_name: "Amoxiclav".to_string(),
        aliases: vec!["amoxiclav".to_string()],
        active_ingredient: "Amoxicillin/Clavulanate".to_string(),
        rx_required: true,
        label_summary: "Antibiotic.".to_string(),
    });

    let provider = MockProvider::new(Intent::MedInfo).with_mention("Amox");
    let orch = orchestrator(provider, store);

    let stream = orch.take_turn(TurnRequest::new("Amox")).await.unwrap();
    let (answer, snapshot) = final_snapshot(stream).await;

    assert!(answer.contains("Amoxicillin 500mg"));
    assert!(answer.contains("Amoxiclav"));
    assert_eq!(snapshot.flow.awaiting(), Awaiting::MedName);
}

#[tokio::test]
async fn test_mid_flow_branch_answer_resumes_stock_check() {
    // no mention configured: "tlv" must reach the flow as raw slot data
    let provider = MockProvider::new(Intent::SmallTalk);
    let orch = orchestrator(provider, InMemoryReferenceStore::demo());

    let paused = FlowState::StockCheck(apothecary::flow::StockCheckState {
        med_name: Some("Advil".to_string()),
        awaiting: Awaiting::BranchName,
        ..Default::default()
    });

    let stream = orch
        .take_turn(TurnRequest::new("tlv").with_flow(paused))
        .await
        .unwrap();
    let (answer, snapshot) = final_snapshot(stream).await;

    assert!(answer.contains("Tel Aviv Center"));
    assert!(answer.contains("in stock"));
    assert_eq!(
        snapshot.flow,
        FlowState::Done {
            completed: FlowKind::StockCheck
        }
    );
    // the flow consumed the answer; no routing happened
    assert!(snapshot
        .audit
        .records()
        .iter()
        .all(|r| r.tool != "classify_intent"));
}

#[tokio::test]
async fn test_advice_request_overrides_active_flow() {
    let provider = MockProvider::new(Intent::MedInfo);
    let orch = orchestrator(provider, InMemoryReferenceStore::demo());

    let paused = FlowState::StockCheck(apothecary::flow::StockCheckState {
        med_name: Some("Advil".to_string()),
        awaiting: Awaiting::BranchName,
        ..Default::default()
    });

    let stream = orch
        .take_turn(TurnRequest::new("what should I take for my headache?").with_flow(paused))
        .await
        .unwrap();
    let (_, snapshot) = final_snapshot(stream).await;

    assert_eq!(
        snapshot.flow,
        FlowState::Done {
            completed: FlowKind::SmallTalk
        }
    );
    assert!(snapshot
        .audit
        .records()
        .iter()
        .any(|r| r.tool == "safety_gate"));
    // the interrupted flow never advanced
    assert!(snapshot
        .audit
        .records()
        .iter()
        .all(|r| r.tool != "resolve_branch"));
}

#[tokio::test]
async fn test_stale_valid_prescription_reports_expired() {
    let provider = MockProvider::new(Intent::RxVerify);
    let orch = orchestrator(provider, InMemoryReferenceStore::demo());

    let stream = orch
        .take_turn(TurnRequest::new("check rx 1002 please"))
        .await
        .unwrap();
    let (answer, snapshot) = final_snapshot(stream).await;

    assert!(answer.contains("EXPIRED"));
    assert_eq!(
        snapshot.flow,
        FlowState::Done {
            completed: FlowKind::RxVerify
        }
    );
}

#[tokio::test]
async fn test_cancel_mid_flow_escapes_and_reroutes() {
    let provider = MockProvider::new(Intent::SmallTalk);
    let orch = orchestrator(provider, InMemoryReferenceStore::demo());

    let paused = FlowState::MedInfo(apothecary::flow::MedInfoState {
        awaiting: Awaiting::MedName,
        ..Default::default()
    });

    let stream = orch
        .take_turn(TurnRequest::new("never mind").with_flow(paused))
        .await
        .unwrap();
    let (_, snapshot) = final_snapshot(stream).await;

    let escape = snapshot
        .audit
        .records()
        .iter()
        .find(|r| r.tool == "flow_escape")
        .expect("escape must be audited");
    assert_eq!(escape.result["reason"], "cancel");
    assert_eq!(
        snapshot.flow,
        FlowState::Done {
            completed: FlowKind::SmallTalk
        }
    );
}

#[tokio::test]
async fn test_done_flow_is_never_resumed() {
    let provider = MockProvider::new(Intent::MedInfo).with_mention("Advil");
    let orch = orchestrator(provider, InMemoryReferenceStore::demo());

    let stream = orch
        .take_turn(TurnRequest::new("Advil").with_flow(FlowState::Done {
            completed: FlowKind::StockCheck,
        }))
        .await
        .unwrap();
    let (_, snapshot) = final_snapshot(stream).await;

    assert!(snapshot
        .audit
        .records()
        .iter()
        .any(|r| r.tool == "classify_intent"));
    assert_eq!(
        snapshot.flow,
        FlowState::Done {
            completed: FlowKind::MedInfo
        }
    );
}

#[tokio::test]
async fn test_snapshot_round_trips_as_next_request_state() {
    let provider = MockProvider::new(Intent::StockCheck).with_mention("Advil");
    let orch = orchestrator(provider, InMemoryReferenceStore::demo());

    // turn 1: medication known, branch missing
    let stream = orch
        .take_turn(TurnRequest::new("is Advil available?"))
        .await
        .unwrap();
    let (_, snapshot) = final_snapshot(stream).await;
    assert_eq!(snapshot.flow.awaiting(), Awaiting::BranchName);

    // the snapshot must survive the client round trip as JSON
    let raw = serde_json::to_string(&snapshot).unwrap();
    let restored: TurnSnapshot = serde_json::from_str(&raw).unwrap();

    // turn 2: short branch answer resumes the restored flow
    let stream = orch
        .take_turn(
            TurnRequest::new("haifa")
                .with_history(restored.history)
                .with_flow(restored.flow),
        )
        .await
        .unwrap();
    let (answer, snapshot) = final_snapshot(stream).await;

    assert!(answer.contains("Haifa"));
    assert!(answer.contains("in stock"));
    assert_eq!(
        snapshot.flow,
        FlowState::Done {
            completed: FlowKind::StockCheck
        }
    );
    // history: user turn 1, assistant turn 1, user turn 2, assistant turn 2
    assert_eq!(snapshot.history.len(), 4);
}

#[tokio::test]
async fn test_hebrew_advice_request_is_refused() {
    let provider = MockProvider::new(Intent::SmallTalk);
    let orch = orchestrator(provider, InMemoryReferenceStore::demo());

    let stream = orch
        .take_turn(TurnRequest::new("מה כדאי לקחת לכאב ראש?"))
        .await
        .unwrap();
    let (_, snapshot) = final_snapshot(stream).await;

    assert!(snapshot
        .audit
        .records()
        .iter()
        .any(|r| r.tool == "safety_gate"));
    assert_eq!(snapshot.language, apothecary::Language::He);
}
