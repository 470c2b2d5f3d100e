//! Decision Ledger business layer (C6): create, atomic supersession, and
//! scope-ranked active-decision queries over the Effective View.

use amc_core::{ids, CoreError, Decision, DecisionInput, DecisionStatus, EffectiveDecision, Scope};
use amc_storage::Store;

use crate::effective_view::apply_edits_to_decision;

pub fn create_decision(store: &Store, tenant_id: &str, input: DecisionInput, ts: i64) -> Result<Decision, CoreError> {
    let decision = Decision {
        decision_id: ids::new_decision_id(),
        tenant_id: tenant_id.to_string(),
        ts,
        status: DecisionStatus::Active,
        scope: input.scope,
        decision: input.decision,
        rationale: input.rationale,
        constraints: input.constraints,
        alternatives: input.alternatives,
        consequences: input.consequences,
        refs: input.refs,
        subject_type: input.subject_type,
        subject_id: input.subject_id,
        project_id: input.project_id,
    };
    store.insert_decision(&decision)?;
    Ok(decision)
}

/// Supersedes `predecessor_id` with a freshly-minted decision carrying
/// `refs=[predecessor_id]`. Fails with `Conflict` if the predecessor is
/// not currently `active` — both writes happen in one transaction, so a
/// failure here leaves the predecessor untouched.
pub fn supersede(store: &Store, tenant_id: &str, predecessor_id: &str, input: DecisionInput, ts: i64) -> Result<Decision, CoreError> {
    let mut refs = input.refs.clone();
    if !refs.contains(&predecessor_id.to_string()) {
        refs.push(predecessor_id.to_string());
    }
    let successor = Decision {
        decision_id: ids::new_decision_id(),
        tenant_id: tenant_id.to_string(),
        ts,
        status: DecisionStatus::Active,
        scope: input.scope,
        decision: input.decision,
        rationale: input.rationale,
        constraints: input.constraints,
        alternatives: input.alternatives,
        consequences: input.consequences,
        refs,
        subject_type: input.subject_type,
        subject_id: input.subject_id,
        project_id: input.project_id,
    };
    store.supersede_decision(tenant_id, predecessor_id, &successor)?;
    Ok(successor)
}

/// Active decisions relevant to a subject/project, already sorted by
/// `Store::active_decisions` (scope precedence desc, then ts desc), with
/// approved edits applied and retracted/quarantined rows dropped.
pub fn get_active(
    store: &Store,
    tenant_id: &str,
    subject: Option<(&str, &str)>,
    project_id: Option<&str>,
    include_quarantined: bool,
) -> Result<Vec<EffectiveDecision>, CoreError> {
    let base = store.active_decisions(tenant_id, subject, project_id)?;
    let mut out = Vec::with_capacity(base.len());
    for decision in base {
        let edits = store.approved_edits_for_target(tenant_id, amc_core::TargetType::Decision, &decision.decision_id)?;
        if let Some(effective) = apply_edits_to_decision(&decision, &edits, include_quarantined) {
            out.push(effective);
        }
    }
    Ok(out)
}

/// Precedence used to order results from `get_active`, exposed for
/// callers (e.g. the Orchestrator) that need to re-sort a merged set.
pub fn scope_precedence(scope: Scope) -> u8 {
    scope.precedence()
}

#[cfg(test)]
mod tests {
    use super::*;
    use amc_core::CoreError as Err;

    fn sample_input(text: &str, scope: Scope) -> DecisionInput {
        DecisionInput {
            scope,
            decision: text.to_string(),
            rationale: Vec::new(),
            constraints: Vec::new(),
            alternatives: Vec::new(),
            consequences: Vec::new(),
            refs: Vec::new(),
            subject_type: None,
            subject_id: None,
            project_id: None,
        }
    }

    #[test]
    fn create_then_supersede_flips_predecessor_status() {
        let store = Store::open_in_memory().expect("open store");
        let d1 = create_decision(&store, "t1", sample_input("never store secrets", Scope::Policy), 1000).unwrap();
        let d2 = supersede(&store, "t1", &d1.decision_id, sample_input("store secrets encrypted", Scope::Policy), 2000).unwrap();

        let active = get_active(&store, "t1", None, None, false).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].decision.decision_id, d2.decision_id);
        assert!(d2.refs.contains(&d1.decision_id));
    }

    #[test]
    fn supersede_of_already_superseded_decision_fails() {
        let store = Store::open_in_memory().expect("open store");
        let d1 = create_decision(&store, "t1", sample_input("a", Scope::Global), 1000).unwrap();
        supersede(&store, "t1", &d1.decision_id, sample_input("b", Scope::Global), 2000).unwrap();
        let err = supersede(&store, "t1", &d1.decision_id, sample_input("c", Scope::Global), 3000).unwrap_err();
        assert!(matches!(err, Err::Conflict(_)));
    }

    #[test]
    fn active_decisions_ordered_by_scope_precedence_then_recency() {
        let store = Store::open_in_memory().expect("open store");
        create_decision(&store, "t1", sample_input("global", Scope::Global), 1000).unwrap();
        create_decision(&store, "t1", sample_input("policy", Scope::Policy), 1000).unwrap();
        create_decision(&store, "t1", sample_input("project", Scope::Project), 1000).unwrap();

        let active = get_active(&store, "t1", None, None, false).unwrap();
        assert_eq!(active[0].decision.decision, "policy");
        assert_eq!(active[1].decision.decision, "project");
        assert_eq!(active[2].decision.decision, "global");
    }
}
