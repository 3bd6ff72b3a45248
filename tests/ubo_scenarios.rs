//! End-to-end UBO scenarios against an in-memory graph store
//!
//! Covers the reference ownership chains, terminus handling, control-prong
//! selection, CBU validation and store idempotence.

mod helpers;

use helpers::*;
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::sync::Arc;

use ubo_engine::{Aggregator, GraphStore, UboConfig, UboEngine, UboError, UboResolutionService};
use ubo_types::{
    Cbu, CbuId, CbuRole, ControlRoleTitle, Entity, EntityId, EntityType, FailureKind, Finding,
    FundCategory, LinkType, ResolutionState, TerminusReason, UboOutcome, ValidationCode,
};

fn ids(pairs: &[(&str, &str)]) -> BTreeMap<EntityId, rust_decimal::Decimal> {
    pairs
        .iter()
        .map(|(id, p)| (EntityId::new(*id), pct(p)))
        .collect()
}

// =========================================================================
// AGGREGATION
// =========================================================================

#[test]
fn scenario_a_consolidation_chain() {
    let store = GraphStore::new();
    for id in ["P", "Q", "R"] {
        corp(&store, id);
    }
    store
        .add_ownership_edge(assertion("P", "Q", "100", LinkType::AccountingConsolidation))
        .expect("P->Q");
    own(&store, "Q", "R", "100");

    let snapshot = store.snapshot();
    let config = UboConfig::default();
    let aggregation = Aggregator::new(&snapshot, &config)
        .aggregate_default(&EntityId::new("R"))
        .expect("aggregate");

    assert_eq!(aggregation.percentages(), ids(&[("P", "100"), ("Q", "100")]));
    assert!(aggregation.findings.is_empty());
}

#[test]
fn scenario_b_direct_and_indirect_paths_sum() {
    let store = GraphStore::new();
    for id in ["P", "Q", "R"] {
        corp(&store, id);
    }
    own(&store, "P", "Q", "60");
    own(&store, "Q", "R", "50");
    own(&store, "P", "R", "10");

    let snapshot = store.snapshot();
    let config = UboConfig::default();
    let aggregation = Aggregator::new(&snapshot, &config)
        .aggregate_default(&EntityId::new("R"))
        .expect("aggregate");

    assert_eq!(aggregation.percentages(), ids(&[("P", "40"), ("Q", "50")]));
    let p = &aggregation.ancestors[&EntityId::new("P")];
    assert_eq!(p.paths.len(), 2);
    assert_eq!(p.distance, 1);
}

// =========================================================================
// TERMINUS
// =========================================================================

#[test]
fn scenario_c_terminus_subject_has_no_ubo() {
    let store = GraphStore::new();
    terminus(
        &store,
        "P",
        EntityType::Corporation,
        TerminusReason::NoKnownPerson,
    );

    let config = UboConfig::default();
    let snapshot = store.snapshot();
    let result = UboEngine::new(&snapshot, &config).determine(&client_cbu("CBU-C", "P"));

    assert_eq!(result.state, ResolutionState::TerminatedNoUbo);
    assert_eq!(
        result.outcome,
        UboOutcome::TerminatedNoUbo {
            terminus: EntityId::new("P"),
            reason: TerminusReason::NoKnownPerson,
        }
    );
    assert!(result.rationale.contains("P"));
    assert!(result.ubos().is_empty());
}

#[test]
fn terminus_without_owners_never_fails_for_any_workflow() {
    let config = UboConfig::default();
    for entity_type in [
        EntityType::Corporation,
        EntityType::Llc,
        EntityType::Trust,
        EntityType::Partnership,
        EntityType::Foundation,
        EntityType::Fund,
    ] {
        for reason in [
            TerminusReason::NoKnownPerson,
            TerminusReason::PubliclyTraded,
            TerminusReason::RegulatedInstitution,
            TerminusReason::GovernmentOwned,
        ] {
            let store = GraphStore::new();
            terminus(&store, "X", entity_type, reason);
            let snapshot = store.snapshot();
            let result =
                UboEngine::new(&snapshot, &config).determine(&client_cbu("CBU-X", "X"));
            assert_eq!(
                result.state,
                ResolutionState::TerminatedNoUbo,
                "{:?} / {:?}",
                entity_type,
                reason
            );
            assert!(!result.rationale.is_empty());
        }
    }
}

#[test]
fn listed_parent_terminates_chain() {
    let store = GraphStore::new();
    terminus(
        &store,
        "LISTED",
        EntityType::Corporation,
        TerminusReason::PubliclyTraded,
    );
    corp(&store, "OPCO");
    own(&store, "LISTED", "OPCO", "75");

    let config = UboConfig::default();
    let snapshot = store.snapshot();
    let result = UboEngine::new(&snapshot, &config).determine(&client_cbu("CBU", "OPCO"));

    assert_eq!(result.state, ResolutionState::TerminatedNoUbo);
    assert_eq!(
        result.outcome,
        UboOutcome::TerminatedNoUbo {
            terminus: EntityId::new("LISTED"),
            reason: TerminusReason::PubliclyTraded,
        }
    );
}

// =========================================================================
// CONTROL PRONG
// =========================================================================

fn dispersed() -> GraphStore {
    let store = GraphStore::new();
    corp(&store, "OPCO");
    for p in ["dave", "erin"] {
        person(&store, p);
    }
    own(&store, "dave", "OPCO", "5");
    store
}

#[test]
fn scenario_d_hierarchy_discriminates_rank_tie() {
    let store = dispersed();
    role(&store, "OPCO", "erin", ControlRoleTitle::Cfo, 1, 1);
    role(&store, "OPCO", "dave", ControlRoleTitle::Ceo, 1, 2);

    let config = UboConfig::default();
    let snapshot = store.snapshot();
    let result = UboEngine::new(&snapshot, &config).determine(&client_cbu("CBU", "OPCO"));

    assert_eq!(result.state, ResolutionState::Resolved);
    let ubos = result.ubos();
    assert_eq!(ubos.len(), 1);
    assert_eq!(ubos[0].person, EntityId::new("dave"));
    let selection = ubos[0].selection.as_ref().expect("selection");
    assert_eq!(selection.priority_rank, 1);
    assert_eq!(selection.regulatory_citation, "31_CFR_1010_230");
    assert_eq!(selection.alternatives.len(), 1);
    assert_eq!(selection.alternatives[0].person, EntityId::new("erin"));
}

#[test]
fn scenario_d_indistinguishable_candidates_fail() {
    let store = dispersed();
    role(&store, "OPCO", "erin", ControlRoleTitle::Ceo, 1, 1);
    role(&store, "OPCO", "dave", ControlRoleTitle::Ceo, 1, 1);

    let config = UboConfig::default();
    let snapshot = store.snapshot();
    let result = UboEngine::new(&snapshot, &config).determine(&client_cbu("CBU", "OPCO"));

    assert_eq!(result.state, ResolutionState::Failed);
    assert_eq!(
        result.failure_kind(),
        Some(FailureKind::AmbiguousControlSelection)
    );
    assert!(result.rationale.contains("dave"));
    assert!(result.rationale.contains("erin"));
}

#[test]
fn control_selection_is_independent_of_insertion_order() {
    let config = UboConfig::default();
    let cbu = client_cbu("CBU", "OPCO");

    let forward = dispersed();
    role(&forward, "OPCO", "dave", ControlRoleTitle::Coo, 2, 3);
    role(&forward, "OPCO", "erin", ControlRoleTitle::Coo, 2, 4);

    let reverse = dispersed();
    role(&reverse, "OPCO", "erin", ControlRoleTitle::Coo, 2, 4);
    role(&reverse, "OPCO", "dave", ControlRoleTitle::Coo, 2, 3);

    let a = UboEngine::new(&forward.snapshot(), &config).determine(&cbu);
    let b = UboEngine::new(&reverse.snapshot(), &config).determine(&cbu);
    assert_eq!(a.outcome, b.outcome);
    assert_eq!(a.ubos()[0].person, EntityId::new("dave"));
}

#[test]
fn repeated_determination_is_deterministic() {
    let store = dispersed();
    role(&store, "OPCO", "erin", ControlRoleTitle::Cfo, 1, 1);
    role(&store, "OPCO", "dave", ControlRoleTitle::Ceo, 1, 2);

    let config = UboConfig::default();
    let snapshot = store.snapshot();
    let engine = UboEngine::new(&snapshot, &config);
    let cbu = client_cbu("CBU", "OPCO");

    let first = engine.determine(&cbu);
    for _ in 0..5 {
        let again = engine.determine(&cbu);
        assert_eq!(again.outcome, first.outcome);
        assert_eq!(again.rationale, first.rationale);
        assert_eq!(again.findings, first.findings);
        assert_eq!(again.aggregated, first.aggregated);
        assert_ne!(again.run_id, first.run_id);
    }
}

// =========================================================================
// VALIDATION
// =========================================================================

#[test]
fn scenario_e_sicav_pointing_at_fund_is_rejected() {
    let store = GraphStore::new();
    store
        .upsert_entity(
            ubo_types::Entity::new("FUND", "Alpha Fund", "LU", EntityType::Fund)
                .with_fund_category(FundCategory::Umbrella),
        )
        .expect("fund");
    corp(&store, "CLIENT");

    let cbu = Cbu::new("CBU-E", "Alpha", "FUND")
        .with_role(CbuRole::AssetOwner, "FUND")
        .with_role(CbuRole::Sicav, "FUND")
        .with_role(CbuRole::UltimateClient, "CLIENT");

    let findings = ubo_engine::validate_cbu(&store.snapshot(), &cbu);
    assert!(findings
        .iter()
        .any(|f| f.code == ValidationCode::SicavIsFundEntity));

    match store.register_cbu(cbu) {
        Err(UboError::ValidationRejected { cbu, findings }) => {
            assert_eq!(cbu.0, "CBU-E");
            assert!(findings
                .iter()
                .any(|f| f.code == ValidationCode::SicavIsFundEntity));
        }
        other => panic!("expected rejection, got {:?}", other),
    }
    assert!(store.snapshot().cbus().next().is_none());
}

fn fund_store() -> GraphStore {
    let store = GraphStore::new();
    store
        .upsert_entity(
            Entity::new("FUND", "Alpha Sub-Fund", "LU", EntityType::Fund)
                .with_fund_category(FundCategory::SubFund),
        )
        .expect("fund");
    store
        .upsert_entity(
            Entity::new("UMB", "Alpha SICAV", "LU", EntityType::Fund)
                .with_fund_category(FundCategory::Umbrella),
        )
        .expect("umbrella");
    corp(&store, "CLIENT");
    person(&store, "alice");
    own(&store, "alice", "FUND", "60");
    store
}

#[test]
fn determine_fails_cbu_that_no_longer_validates() {
    let store = fund_store();
    let cbu = Cbu::new("CBU-F", "Alpha", "FUND")
        .with_role(CbuRole::AssetOwner, "FUND")
        .with_role(CbuRole::Sicav, "UMB")
        .with_role(CbuRole::UltimateClient, "CLIENT");
    store.register_cbu(cbu).expect("admitted while UMB is an umbrella");

    // Registered CBU passes before the umbrella is reclassified
    let svc = UboResolutionService::new(Arc::new(store), UboConfig::default());
    let ok = svc.resolve_cbu(&CbuId::new("CBU-F")).expect("resolve");
    assert_eq!(ok.state, ResolutionState::Resolved);

    svc.store()
        .upsert_entity(
            Entity::new("UMB", "Alpha SICAV", "LU", EntityType::Fund)
                .with_fund_category(FundCategory::SubFund),
        )
        .expect("reclassified");

    let result = svc.resolve_cbu(&CbuId::new("CBU-F")).expect("resolve");
    assert_eq!(result.state, ResolutionState::Failed);
    assert_eq!(result.failure_kind(), Some(FailureKind::ValidationRejected));
    assert_eq!(
        result.state_trail,
        vec![ResolutionState::Pending, ResolutionState::Failed]
    );
    assert!(result.ubos().is_empty());
    assert!(result.aggregated.is_empty());
    assert!(result.dependencies.contains(&EntityId::new("UMB")));
    assert!(svc.store().snapshot().is_stale(&ok));
}

#[test]
fn determine_fails_unregistered_cbu_with_invalid_roles() {
    let store = fund_store();
    let config = UboConfig::default();
    let snapshot = store.snapshot();

    let sicav_is_fund = Cbu::new("CBU-S", "Alpha", "FUND")
        .with_role(CbuRole::Sicav, "FUND")
        .with_role(CbuRole::UltimateClient, "CLIENT");
    let result = UboEngine::new(&snapshot, &config).determine(&sicav_is_fund);
    assert_eq!(result.failure_kind(), Some(FailureKind::ValidationRejected));
    assert!(result.rationale.contains("CBU-S"));

    let no_client = Cbu::new("CBU-N", "Alpha", "FUND");
    let result = UboEngine::new(&snapshot, &config).determine(&no_client);
    assert_eq!(result.failure_kind(), Some(FailureKind::ValidationRejected));
}

// =========================================================================
// FAILURES AND LIMITS
// =========================================================================

#[test]
fn aggregated_share_above_hundred_fails_while_aggregating() {
    let store = GraphStore::new();
    corp(&store, "OPCO");
    person(&store, "alice");
    own(&store, "alice", "OPCO", "80");
    store
        .add_ownership_edge(assertion("alice", "OPCO", "30", LinkType::VotingRight))
        .expect("voting rights");

    let config = UboConfig::default();
    let snapshot = store.snapshot();
    let result = UboEngine::new(&snapshot, &config).determine(&client_cbu("CBU", "OPCO"));

    assert_eq!(result.state, ResolutionState::Failed);
    assert_eq!(
        result.failure_kind(),
        Some(FailureKind::PercentageSumViolation)
    );
    assert_eq!(
        result.state_trail,
        vec![
            ResolutionState::Pending,
            ResolutionState::Aggregating,
            ResolutionState::Failed
        ]
    );
    assert!(result.rationale.contains("alice"));
}

#[test]
fn expired_deadline_fails_with_timeout() {
    let store = GraphStore::new();
    corp(&store, "OPCO");
    person(&store, "alice");
    own(&store, "alice", "OPCO", "60");

    let config = UboConfig {
        deadline_ms: Some(0),
        ..UboConfig::default()
    };
    let snapshot = store.snapshot();
    let result = UboEngine::new(&snapshot, &config).determine(&client_cbu("CBU", "OPCO"));

    assert_eq!(result.state, ResolutionState::Failed);
    assert_eq!(result.failure_kind(), Some(FailureKind::Timeout));
    assert_eq!(
        result.state_trail,
        vec![
            ResolutionState::Pending,
            ResolutionState::Aggregating,
            ResolutionState::Failed
        ]
    );
}

#[test]
fn depth_limit_resolves_but_marks_incomplete() {
    let store = GraphStore::new();
    for id in ["OPCO", "HOLD"] {
        corp(&store, id);
    }
    for p in ["alice", "bob"] {
        person(&store, p);
    }
    own(&store, "HOLD", "OPCO", "100");
    own(&store, "alice", "HOLD", "100");
    role(&store, "OPCO", "bob", ControlRoleTitle::Ceo, 1, 1);

    let config = UboConfig::default().with_depth(1);
    let snapshot = store.snapshot();
    let result = UboEngine::new(&snapshot, &config).determine(&client_cbu("CBU", "OPCO"));

    assert_eq!(result.state, ResolutionState::Resolved);
    assert!(result.incomplete);
    assert!(result.findings.contains(&Finding::DepthExceeded {
        at: EntityId::new("HOLD"),
        max_depth: 1,
    }));
    assert_eq!(
        result.state_trail,
        vec![
            ResolutionState::Pending,
            ResolutionState::Aggregating,
            ResolutionState::Evaluating,
            ResolutionState::Resolved
        ]
    );
    // alice sits beyond the limit; the control prong picks bob
    assert_eq!(result.ubos()[0].person, EntityId::new("bob"));
    assert!(!result.aggregated.contains_key(&EntityId::new("alice")));
}

// =========================================================================
// STORE
// =========================================================================

#[test]
fn reingesting_identical_facts_changes_nothing() {
    let store = GraphStore::new();
    corp(&store, "P");
    corp(&store, "Q");
    own(&store, "P", "Q", "60");
    let version = store.version();

    corp(&store, "P");
    let outcome = store
        .add_ownership_edge(assertion("P", "Q", "60", LinkType::DirectShare))
        .expect("same edge");

    assert!(!outcome.applied.changed());
    assert_eq!(store.version(), version);
    assert_eq!(store.snapshot().live_edges().count(), 1);
    assert!(store.facts_since(version).is_empty());
}

#[test]
fn conflicting_entity_is_refused() {
    let store = GraphStore::new();
    corp(&store, "P");
    let err = store
        .upsert_entity(ubo_types::Entity::new("P", "P", "FR", EntityType::Corporation))
        .unwrap_err();
    assert!(matches!(err, UboError::DuplicateConflict { .. }));
}

#[test]
fn result_goes_stale_after_upstream_change() {
    let store = GraphStore::new();
    corp(&store, "OPCO");
    person(&store, "alice");
    person(&store, "zed");
    own(&store, "alice", "OPCO", "60");

    let config = UboConfig::default();
    let result =
        UboEngine::new(&store.snapshot(), &config).determine(&client_cbu("CBU", "OPCO"));
    assert!(!store.snapshot().is_stale(&result));

    // unrelated write
    corp(&store, "ELSEWHERE");
    assert!(!store.snapshot().is_stale(&result));

    own(&store, "zed", "OPCO", "30");
    assert!(store.snapshot().is_stale(&result));
}

#[test]
fn result_goes_stale_after_cbu_reregistration() {
    let store = GraphStore::new();
    corp(&store, "OPCO");
    corp(&store, "MANCO");
    person(&store, "alice");
    own(&store, "alice", "OPCO", "60");
    store
        .register_cbu(client_cbu("CBU", "OPCO"))
        .expect("registered");

    let config = UboConfig::default();
    let snapshot = store.snapshot();
    let cbu = snapshot.cbu(&CbuId::new("CBU")).cloned().expect("cbu");
    let result = UboEngine::new(&snapshot, &config).determine(&cbu);
    assert!(!store.snapshot().is_stale(&result));

    // identical re-registration is a no-op
    store.register_cbu(cbu.clone()).expect("same cbu");
    assert!(!store.snapshot().is_stale(&result));

    store
        .register_cbu(cbu.with_role(CbuRole::ManagementCompany, "MANCO"))
        .expect("roles changed");
    assert!(store.snapshot().is_stale(&result));
}

#[test]
fn audit_replay_reproduces_result() {
    let store = GraphStore::new();
    corp(&store, "OPCO");
    person(&store, "alice");
    person(&store, "bob");
    own(&store, "alice", "OPCO", "60");

    let config = UboConfig::default();
    let cbu = client_cbu("CBU", "OPCO");
    let original = UboEngine::new(&store.snapshot(), &config).determine(&cbu);

    own(&store, "bob", "OPCO", "40");
    let current = UboEngine::new(&store.snapshot(), &config).determine(&cbu);
    assert_eq!(current.ubos().len(), 2);

    let historic = store
        .snapshot_at(original.snapshot_version)
        .expect("historic snapshot");
    let replayed = UboEngine::new(&historic, &config).determine(&cbu);
    assert_eq!(replayed.outcome, original.outcome);
    assert_eq!(replayed.snapshot_version, original.snapshot_version);
}
