//! Branch stock availability flow
//!
//! `collect -> resolve_med -> resolve_branch -> stock -> done`. The two
//! slots are collected independently each turn: the medication through the
//! language service, the branch through the deterministic mention
//! extractor. Raw message text stands in for a failed extraction only when
//! that specific slot was asked for last turn.

use crate::audit::AuditTrail;
use crate::catalog::StockStatus;
use crate::flow::{
    extract_medication_mention, Awaiting, FlowDeps, FlowKind, FlowState, FlowTurn, Reply,
    StockCheckState, StockCheckStep,
};
use crate::resolve::{extract_branch_mention, resolve_branch, resolve_medication};
use crate::text::{Candidate, MatchOutcome};
use serde_json::json;
use tracing::info;

pub async fn drive(
    state: StockCheckState,
    message: &str,
    deps: &FlowDeps<'_>,
    audit: &mut AuditTrail,
) -> FlowTurn {
    let mut state = state;

    loop {
        match state.step {
            StockCheckStep::Collect => {
                if state.med_name.is_none() {
                    let mention = extract_medication_mention(deps, message, audit).await;
                    state.med_name = mention.or_else(|| {
                        (state.awaiting == Awaiting::MedName).then(|| message.trim().to_string())
                    });
                }
                if state.branch_name.is_none() {
                    let mention = extract_branch_mention(deps.store, message);
                    audit.record(
                        "extract_branch",
                        json!({ "message": message }),
                        json!({ "mention": mention }),
                    );
                    state.branch_name = mention.or_else(|| {
                        (state.awaiting == Awaiting::BranchName)
                            .then(|| message.trim().to_string())
                    });
                }

                match (&state.med_name, &state.branch_name) {
                    (None, None) => {
                        return pause(state, Awaiting::MedName, ask_both());
                    }
                    (None, Some(_)) => {
                        return pause(state, Awaiting::MedName, ask_med());
                    }
                    (Some(_), None) => {
                        return pause(state, Awaiting::BranchName, ask_branch());
                    }
                    (Some(_), Some(_)) => {
                        state.awaiting = Awaiting::None;
                        state.step = StockCheckStep::ResolveMed;
                    }
                }
            }
            StockCheckStep::ResolveMed => {
                if state.medication.is_some() {
                    state.step = StockCheckStep::ResolveBranch;
                    continue;
                }
                let name = state.med_name.clone().unwrap_or_default();
                let outcome = resolve_medication(deps.store, &name);
                audit.record(
                    "resolve_medication",
                    json!({ "query": name }),
                    outcome_label(&outcome),
                );

                match outcome {
                    MatchOutcome::Found { record, .. } => {
                        state.medication = Some(record.id.clone());
                        state.step = StockCheckStep::ResolveBranch;
                    }
                    MatchOutcome::Ambiguous { candidates } => {
                        state.med_name = None;
                        state.step = StockCheckStep::Collect;
                        return pause(state, Awaiting::MedName, ambiguous_med(&candidates));
                    }
                    MatchOutcome::NotFound => {
                        state.med_name = None;
                        state.step = StockCheckStep::Collect;
                        return pause(state, Awaiting::MedName, med_not_found(&name));
                    }
                }
            }
            StockCheckStep::ResolveBranch => {
                if state.branch.is_some() {
                    state.step = StockCheckStep::Stock;
                    continue;
                }
                let name = state.branch_name.clone().unwrap_or_default();
                let outcome = resolve_branch(deps.store, &name);
                audit.record(
                    "resolve_branch",
                    json!({ "query": name }),
                    outcome_label(&outcome),
                );

                match outcome {
                    MatchOutcome::Found { record, .. } => {
                        state.branch = Some(record.id.clone());
                        state.step = StockCheckStep::Stock;
                    }
                    MatchOutcome::Ambiguous { candidates } => {
                        state.branch_name = None;
                        state.step = StockCheckStep::Collect;
                        return pause(state, Awaiting::BranchName, ambiguous_branch(&candidates));
                    }
                    MatchOutcome::NotFound => {
                        state.branch_name = None;
                        state.step = StockCheckStep::Collect;
                        return pause(state, Awaiting::BranchName, branch_not_found(&name));
                    }
                }
            }
            StockCheckStep::Stock => {
                // Both ids are present by construction of the earlier steps.
                let med_id = match &state.medication {
                    Some(id) => id.clone(),
                    None => {
                        state.step = StockCheckStep::Collect;
                        continue;
                    }
                };
                let branch_id = match &state.branch {
                    Some(id) => id.clone(),
                    None => {
                        state.step = StockCheckStep::Collect;
                        continue;
                    }
                };

                let status = deps.store.stock_status(&branch_id, &med_id);
                audit.record(
                    "stock_lookup",
                    json!({ "branch": branch_id, "medication": med_id }),
                    json!({ "status": status.to_string() }),
                );
                info!(branch = %branch_id, medication = %med_id, status = %status, "stock resolved");

                let med_name = deps
                    .store
                    .medication(&med_id)
                    .map(|m| m.display_name.clone())
                    .unwrap_or_else(|| med_id.to_string());
                let branch_name = deps
                    .store
                    .branch(&branch_id)
                    .map(|b| b.display_name.clone())
                    .unwrap_or_else(|| branch_id.to_string());

                return FlowTurn::done(
                    FlowKind::StockCheck,
                    stock_facts(&med_name, &branch_name, status),
                );
            }
        }
    }
}

fn pause(mut state: StockCheckState, awaiting: Awaiting, reply: Reply) -> FlowTurn {
    state.awaiting = awaiting;
    FlowTurn {
        reply,
        next: FlowState::StockCheck(state),
    }
}

fn ask_both() -> Reply {
    Reply::new(
        "Ask the user which medication and which branch they are asking about.",
        json!({ "missing": "medication name and branch name" }),
    )
}

fn ask_med() -> Reply {
    Reply::new(
        "Ask the user which medication they are asking about.",
        json!({ "missing": "medication name" }),
    )
}

fn ask_branch() -> Reply {
    Reply::new(
        "Ask the user which branch they are asking about.",
        json!({ "missing": "branch name" }),
    )
}

fn med_not_found(query: &str) -> Reply {
    Reply::new(
        "Inform the user the medication was not found in the database \
         and ask for a different name or spelling.",
        json!({ "query": query, "result": "NOT_FOUND" }),
    )
}

fn branch_not_found(query: &str) -> Reply {
    Reply::new(
        "Inform the user the branch was not recognized and ask for a \
         different branch or city name.",
        json!({ "query": query, "result": "NOT_FOUND" }),
    )
}

fn ambiguous_med(candidates: &[Candidate]) -> Reply {
    let options: Vec<&str> = candidates.iter().map(|c| c.display_name.as_str()).collect();
    Reply::new(
        "Ask the user which medication they meant from the options.",
        json!({ "options": options }),
    )
}

fn ambiguous_branch(candidates: &[Candidate]) -> Reply {
    let options: Vec<&str> = candidates.iter().map(|c| c.display_name.as_str()).collect();
    Reply::new(
        "Ask the user which branch they meant from the options.",
        json!({ "options": options }),
    )
}

fn stock_facts(med_name: &str, branch_name: &str, status: StockStatus) -> Reply {
    Reply::new(
        "State the factual stock availability for the medication at the branch.",
        json!({
            "medication": med_name,
            "branch": branch_name,
            "status": status.to_string(),
        }),
    )
}

fn outcome_label<T>(outcome: &MatchOutcome<T>) -> serde_json::Value {
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
