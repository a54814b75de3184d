//! Intent routing
//!
//! A thin wrapper around the provider's classification call that adds a
//! timeout, one retry, and a deterministic fallback. Routing never fails
//! the turn: when the language service cannot produce a usable label the
//! message is handled as small talk and the fallback is audited.

use crate::audit::AuditTrail;
use crate::provider::LlmProvider;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

/// Supported conversational intents.
///
/// Unknown labels from the classifier deserialize as `SmallTalk`, which
/// keeps the orchestrator total over whatever the model returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    MedInfo,
    StockCheck,
    RxVerify,
    #[serde(other)]
    SmallTalk,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::MedInfo => "med_info",
            Intent::StockCheck => "stock_check",
            Intent::RxVerify => "rx_verify",
            Intent::SmallTalk => "small_talk",
        }
    }
}

pub struct IntentRouter {
    call_timeout: Duration,
    retries: u32,
}

impl IntentRouter {
    pub fn new(call_timeout: Duration, retries: u32) -> Self {
        Self {
            call_timeout,
            retries,
        }
    }

    /// Classify `message`, retrying once on provider failure and falling
    /// back to `SmallTalk` when no attempt yields a label.
    pub async fn classify(
        &self,
        provider: &dyn LlmProvider,
        message: &str,
        flow_summary: &str,
        audit: &mut AuditTrail,
    ) -> Intent {
        for attempt in 0..=self.retries {
            match timeout(self.call_timeout, provider.classify_intent(message, flow_summary)).await
            {
                Ok(Ok(intent)) => {
                    info!(intent = intent.as_str(), attempt, "intent classified");
                    audit.record(
                        "classify_intent",
                        json!({ "message": message, "attempt": attempt }),
                        json!({ "intent": intent.as_str() }),
                    );
                    return intent;
                }
                Ok(Err(e)) => {
                    warn!(error = %e, attempt, "intent classification failed");
                }
                Err(_) => {
                    warn!(timeout_ms = self.call_timeout.as_millis() as u64, attempt, "intent classification timed out");
                }
            }
        }

        audit.record(
            "classify_intent",
            json!({ "message": message }),
            json!({ "intent": Intent::SmallTalk.as_str(), "fallback": true }),
        );
        Intent::SmallTalk
    }
}
