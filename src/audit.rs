//! Per-turn audit trail
//!
//! Every deterministic lookup the orchestrator performs during a turn is
//! recorded as a tool invocation with its JSON arguments and result. The
//! trail is returned to the caller inside the turn snapshot and also logged,
//! so a turn can be replayed or inspected without server-side state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocationRecord {
    pub tool: String,
    pub arguments: Value,
    pub result: Value,
    pub recorded_at: DateTime<Utc>,
}

/// Ordered record of the lookups performed while planning one turn
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditTrail {
    records: Vec<ToolInvocationRecord>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, tool: &str, arguments: Value, result: Value) {
        debug!(tool = %tool, args = %arguments, "tool invocation");
        self.records.push(ToolInvocationRecord {
            tool: tool.to_string(),
            arguments,
            result,
            recorded_at: Utc::now(),
        });
    }

    pub fn records(&self) -> &[ToolInvocationRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_records_preserve_order() {
        let mut trail = AuditTrail::new();
        trail.record("resolve_medication", json!({"query": "advil"}), json!({"found": true}));
        trail.record("stock_lookup", json!({"med": "med_001"}), json!({"status": "IN_STOCK"}));

        assert_eq!(trail.len(), 2);
        assert_eq!(trail.records()[0].tool, "resolve_medication");
        assert_eq!(trail.records()[1].tool, "stock_lookup");
    }

    #[test]
    fn test_trail_round_trips_through_json() {
        let mut trail = AuditTrail::new();
        trail.record("verify_prescription", json!({"rx": "RX-1001"}), json!({"status": "VALID"}));

        let raw = serde_json::to_string(&trail).unwrap();
        let back: AuditTrail = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back.records()[0].tool, "verify_prescription");
    }
}
