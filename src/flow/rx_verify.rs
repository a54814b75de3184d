//! Prescription verification flow
//!
//! `collect -> verify_rx | list_user_rx -> done`. Collection is purely
//! structural: the id recognizer pulls prescription and user ids out of the
//! message, a prescription id takes precedence, and the effective status of
//! every surfaced prescription is recomputed against today's date.

use crate::audit::AuditTrail;
use crate::catalog::Prescription;
use crate::flow::{
    Awaiting, FlowDeps, FlowKind, FlowState, FlowTurn, Reply, RxVerifyState, RxVerifyStep,
};
use crate::resolve::IdRecognizer;
use serde_json::{json, Value};
use tracing::info;

pub async fn drive(
    state: RxVerifyState,
    message: &str,
    deps: &FlowDeps<'_>,
    audit: &mut AuditTrail,
) -> FlowTurn {
    let mut state = state;
    let ids = IdRecognizer::new();

    loop {
        match state.step {
            RxVerifyStep::Collect => {
                if state.prescription.is_none() {
                    state.prescription = ids.prescription_id(message);
                }
                if state.user.is_none() {
                    state.user = ids.user_id(message);
                }
                audit.record(
                    "collect_identifiers",
                    json!({ "message": message }),
                    json!({ "prescription": state.prescription, "user": state.user }),
                );

                if state.prescription.is_some() {
                    state.awaiting = Awaiting::None;
                    state.step = RxVerifyStep::VerifyRx;
                } else if state.user.is_some() {
                    state.awaiting = Awaiting::None;
                    state.step = RxVerifyStep::ListUserRx;
                } else {
                    state.awaiting = Awaiting::RxOrUser;
                    return FlowTurn {
                        reply: ask_identifiers(),
                        next: FlowState::RxVerify(state),
                    };
                }
            }
            RxVerifyStep::VerifyRx => {
                let rx_id = match &state.prescription {
                    Some(id) => id.clone(),
                    None => {
                        state.step = RxVerifyStep::Collect;
                        continue;
                    }
                };

                let record = deps.store.prescription(&rx_id).cloned();
                audit.record(
                    "verify_prescription",
                    json!({ "prescription": rx_id }),
                    json!({ "found": record.is_some() }),
                );

                return match record {
                    Some(rx) => {
                        let status = rx.effective_status(deps.today);
                        info!(prescription = %rx.id, status = %status, "prescription verified");
                        FlowTurn::done(
                            FlowKind::RxVerify,
                            Reply::new(
                                "State the prescription's status factually.",
                                prescription_facts(deps, &rx),
                            ),
                        )
                    }
                    None => {
                        state.prescription = None;
                        state.awaiting = Awaiting::RxId;
                        state.step = RxVerifyStep::Collect;
                        FlowTurn {
                            reply: rx_not_found(&rx_id.to_string()),
                            next: FlowState::RxVerify(state),
                        }
                    }
                };
            }
            RxVerifyStep::ListUserRx => {
                let user_id = match &state.user {
                    Some(id) => id.clone(),
                    None => {
                        state.step = RxVerifyStep::Collect;
                        continue;
                    }
                };

                let user = deps.store.user(&user_id).cloned();
                audit.record(
                    "lookup_user",
                    json!({ "user": user_id }),
                    json!({ "found": user.is_some() }),
                );

                let Some(user) = user else {
                    state.user = None;
                    state.awaiting = Awaiting::UserId;
                    state.step = RxVerifyStep::Collect;
                    return FlowTurn {
                        reply: user_not_found(&user_id.to_string()),
                        next: FlowState::RxVerify(state),
                    };
                };

                let mut prescriptions = deps.store.prescriptions_for(&user.id);
                // sorted for a deterministic listing order
                prescriptions.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
                info!(user = %user.id, count = prescriptions.len(), "prescriptions listed");

                let reply = if prescriptions.is_empty() {
                    Reply::new(
                        "Inform the user that no prescriptions are on file for this customer.",
                        json!({ "user": user.full_name, "prescriptions": "NONE" }),
                    )
                } else {
                    let listed: Vec<Value> = prescriptions
                        .iter()
                        .map(|rx| prescription_facts(deps, rx))
                        .collect();
                    Reply::new(
                        "List the customer's prescriptions and their statuses factually.",
                        json!({ "user": user.full_name, "prescriptions": listed }),
                    )
                };
                return FlowTurn::done(FlowKind::RxVerify, reply);
            }
        }
    }
}

fn prescription_facts(deps: &FlowDeps<'_>, rx: &Prescription) -> Value {
    let medication = deps
        .store
        .medication(&rx.medication_id)
        .map(|m| m.display_name.clone())
        .unwrap_or_else(|| rx.medication_id.to_string());

    json!({
        "prescription": rx.id,
        "medication": medication,
        "status": rx.effective_status(deps.today).to_string(),
        "expires on": rx.expires_on.to_string(),
    })
}

fn ask_identifiers() -> Reply {
    Reply::new(
        "Ask the user for a prescription id (like RX-1001) or a customer id \
         (like user_009).",
        json!({ "missing": "prescription id or customer id" }),
    )
}

fn rx_not_found(id: &str) -> Reply {
    Reply::new(
        "Inform the user the prescription id was not found and ask them to \
         check the number.",
        json!({ "prescription": id, "result": "NOT_FOUND" }),
    )
}

fn user_not_found(id: &str) -> Reply {
    Reply::new(
        "Inform the user the customer id was not found and ask them to check it.",
        json!({ "user": id, "result": "NOT_FOUND" }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryReferenceStore;
    use crate::flow::testing::{deps, StubProvider};

    #[tokio::test]
    async fn test_valid_prescription_reports_valid() {
        let store = InMemoryReferenceStore::demo();
        let provider = StubProvider::new();
        let mut audit = AuditTrail::new();

        let turn = drive(
            RxVerifyState::default(),
            "is RX-1001 still valid?",
            &deps(&store, &provider),
            &mut audit,
        )
        .await;

        assert_eq!(
            turn.next,
            FlowState::Done {
                completed: FlowKind::RxVerify
            }
        );
        assert_eq!(turn.reply.facts["status"], "VALID");
        assert_eq!(turn.reply.facts["medication"], "Amoxicillin");
    }

    #[tokio::test]
    async fn test_stale_valid_prescription_reports_expired() {
        let store = InMemoryReferenceStore::demo();
        let provider = StubProvider::new();
        let mut audit = AuditTrail::new();

        // stored VALID but expired 2024-12-01, test "today" is 2026-01-10
        let turn = drive(
            RxVerifyState::default(),
            "check rx 1002",
            &deps(&store, &provider),
            &mut audit,
        )
        .await;

        assert_eq!(turn.reply.facts["status"], "EXPIRED");
    }

    #[tokio::test]
    async fn test_cancelled_wins_over_date() {
        let store = InMemoryReferenceStore::demo();
        let provider = StubProvider::new();
        let mut audit = AuditTrail::new();

        // RX-1003 is cancelled but its expiry date is in the future
        let turn = drive(
            RxVerifyState::default(),
            "RX-1003",
            &deps(&store, &provider),
            &mut audit,
        )
        .await;

        assert_eq!(turn.reply.facts["status"], "CANCELLED");
    }

    #[tokio::test]
    async fn test_user_listing_is_sorted_by_prescription_id() {
        let store = InMemoryReferenceStore::demo();
        let provider = StubProvider::new();
        let mut audit = AuditTrail::new();

        let turn = drive(
            RxVerifyState::default(),
            "what do you have for user_009?",
            &deps(&store, &provider),
            &mut audit,
        )
        .await;

        let listed = turn.reply.facts["prescriptions"].as_array().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0]["prescription"], "RX-1001");
        assert_eq!(listed[1]["prescription"], "RX-1003");
    }

    #[tokio::test]
    async fn test_user_without_prescriptions_reports_none() {
        let store = InMemoryReferenceStore::demo();
        let provider = StubProvider::new();
        let mut audit = AuditTrail::new();

        let turn = drive(
            RxVerifyState::default(),
            "user_001",
            &deps(&store, &provider),
            &mut audit,
        )
        .await;

        assert_eq!(turn.reply.facts["prescriptions"], "NONE");
        assert_eq!(
            turn.next,
            FlowState::Done {
                completed: FlowKind::RxVerify
            }
        );
    }

    #[tokio::test]
    async fn test_no_identifier_asks_for_either() {
        let store = InMemoryReferenceStore::demo();
        let provider = StubProvider::new();
        let mut audit = AuditTrail::new();

        let turn = drive(
            RxVerifyState::default(),
            "can you check my prescription?",
            &deps(&store, &provider),
            &mut audit,
        )
        .await;

        assert_eq!(turn.next.awaiting(), Awaiting::RxOrUser);
    }

    #[tokio::test]
    async fn test_unknown_rx_id_reasks_for_rx_specifically() {
        let store = InMemoryReferenceStore::demo();
        let provider = StubProvider::new();
        let mut audit = AuditTrail::new();

        let turn = drive(
            RxVerifyState::default(),
            "RX-9999",
            &deps(&store, &provider),
            &mut audit,
        )
        .await;

        assert_eq!(turn.next.awaiting(), Awaiting::RxId);
        assert_eq!(turn.reply.facts["result"], "NOT_FOUND");
        match &turn.next {
            FlowState::RxVerify(s) => assert_eq!(s.prescription, None),
            other => panic!("unexpected state: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_prescription_id_takes_precedence_over_user_id() {
        let store = InMemoryReferenceStore::demo();
        let provider = StubProvider::new();
        let mut audit = AuditTrail::new();

        let turn = drive(
            RxVerifyState::default(),
            "user_009 asked about RX-1001",
            &deps(&store, &provider),
            &mut audit,
        )
        .await;

        // verify path, not the listing path
        assert_eq!(turn.reply.facts["prescription"], "RX-1001");
        assert!(turn.reply.facts.get("prescriptions").is_none());
    }
}
