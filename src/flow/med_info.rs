//! Medication information flow
//!
//! `extract_med_name -> lookup -> done`. Extraction goes through the
//! language service; when the flow explicitly asked for a name last turn,
//! a failed extraction falls back to the raw message text so short answers
//! like a bare brand name always reach the resolver.

use crate::audit::AuditTrail;
use crate::flow::{
    extract_medication_mention, Awaiting, FlowDeps, FlowKind, FlowState, FlowTurn, MedInfoState,
    MedInfoStep, Reply,
};
use crate::resolve::resolve_medication;
use crate::text::{normalize, Candidate, MatchOutcome, MatchProvenance};
use serde_json::json;
use tracing::info;

pub async fn drive(
    state: MedInfoState,
    message: &str,
    deps: &FlowDeps<'_>,
    audit: &mut AuditTrail,
) -> FlowTurn {
    let mut state = state;

    loop {
        match state.step {
            MedInfoStep::ExtractMedName => {
                let mention = extract_medication_mention(deps, message, audit).await;
                let candidate = mention.or_else(|| {
                    (state.awaiting == Awaiting::MedName).then(|| message.trim().to_string())
                });

                match candidate {
                    Some(name) if !name.is_empty() => {
                        state.med_name = Some(name);
                        state.awaiting = Awaiting::None;
                        state.step = MedInfoStep::Lookup;
                    }
                    _ => {
                        return FlowTurn {
                            reply: ask_med_name(),
                            next: FlowState::MedInfo(MedInfoState {
                                step: MedInfoStep::ExtractMedName,
                                med_name: None,
                                awaiting: Awaiting::MedName,
                            }),
                        };
                    }
                }
            }
            MedInfoStep::Lookup => {
                // A persisted Lookup step without a stored name can only come
                // from a hand-edited state; treat the message as the name.
                let name = state
                    .med_name
                    .clone()
                    .unwrap_or_else(|| message.trim().to_string());

                let outcome = resolve_medication(deps.store, &name);
                audit.record(
                    "resolve_medication",
                    json!({ "query": name }),
                    outcome_json(&outcome),
                );

                return match outcome {
                    MatchOutcome::Found { record, provenance } => {
                        info!(medication = %record.id, "medication resolved");
                        FlowTurn::done(FlowKind::MedInfo, med_facts(&record, &provenance))
                    }
                    MatchOutcome::Ambiguous { candidates } => FlowTurn {
                        reply: ambiguous(&candidates),
                        next: reask(),
                    },
                    MatchOutcome::NotFound => FlowTurn {
                        reply: not_found(&name),
                        next: reask(),
                    },
                };
            }
        }
    }
}

fn reask() -> FlowState {
    FlowState::MedInfo(MedInfoState {
        step: MedInfoStep::ExtractMedName,
        med_name: None,
        awaiting: Awaiting::MedName,
    })
}

fn ask_med_name() -> Reply {
    Reply::new(
        "Ask the user to provide the medication name.",
        json!({ "missing": "medication name" }),
    )
}

fn not_found(query: &str) -> Reply {
    Reply::new(
        "Inform the user the medication was not found in the database \
         and ask for a different name or spelling.",
        json!({ "query": query, "result": "NOT_FOUND" }),
    )
}

fn ambiguous(candidates: &[Candidate]) -> Reply {
    let options: Vec<&str> = candidates.iter().map(|c| c.display_name.as_str()).collect();
    Reply::new(
        "Ask the user which medication they meant from the options.",
        json!({ "options": options }),
    )
}

fn med_facts(record: &crate::catalog::Medication, provenance: &MatchProvenance) -> Reply {
    let mut facts = json!({
        "name": record.display_name,
        "active ingredient": record.active_ingredient,
        "prescription required": if record.rx_required { "Yes" } else { "No" },
        "summary": record.label_summary,
    });

    // Disclose when the match came through an alias rather than the
    // canonical name, so "Acamol" answers say which product they mean.
    if normalize(&provenance.alias) != normalize(&record.display_name) {
        facts["matched alias"] = json!(provenance.alias);
    }

    Reply::new(
        "Present factual medication information and a brief safety note.",
        facts,
    )
}

fn outcome_json<T>(outcome: &MatchOutcome<T>) -> serde_json::Value {
    match outcome {
        MatchOutcome::Found { provenance, .. } => {
            json!({ "status": "ok", "matched_alias": provenance.alias })
        }
        MatchOutcome::NotFound => json!({ "status": "not_found" }),
        MatchOutcome::Ambiguous { candidates } => json!({
            "status": "ambiguous",
            "candidates": candidates.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
        }),
    }
}
