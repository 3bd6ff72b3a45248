//! Result Diff
//!
//! Compares two determinations of the same CBU, typically computed at
//! different snapshot versions, and reports which natural persons entered or
//! left the UBO set and which recorded fields changed for the persons in both.
//! Output is ordered by person id.

use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Result, UboError};
use ubo_types::{EntityId, QualifyingReason, UboChange, UboDetermination, UboResult, UboResultDiff};

/// Diff `before` against `after`; both must be results for the same CBU
pub fn diff_results(before: &UboResult, after: &UboResult) -> Result<UboResultDiff> {
    if before.cbu_id != after.cbu_id {
        return Err(UboError::DiffMismatch {
            left: before.cbu_id.clone(),
            right: after.cbu_id.clone(),
        });
    }

    let old = by_person(before);
    let new = by_person(after);

    let added: Vec<EntityId> = new
        .keys()
        .filter(|p| !old.contains_key(*p))
        .map(|p| (*p).clone())
        .collect();
    let removed: Vec<EntityId> = old
        .keys()
        .filter(|p| !new.contains_key(*p))
        .map(|p| (*p).clone())
        .collect();

    let mut changed = Vec::new();
    for (person, was) in &old {
        let Some(now) = new.get(person) else {
            continue;
        };
        let mut field = |name: &str, old_value: String, new_value: String| {
            if old_value != new_value {
                changed.push(UboChange {
                    person: (*person).clone(),
                    field: name.to_string(),
                    old_value,
                    new_value,
                });
            }
        };
        field(
            "prong",
            was.prong.to_db_str().to_string(),
            now.prong.to_db_str().to_string(),
        );
        field(
            "aggregated_percentage",
            pct_str(was.aggregated_percentage),
            pct_str(now.aggregated_percentage),
        );
        field("reasons", reasons_str(&was.reasons), reasons_str(&now.reasons));
    }

    let state_change = (before.state != after.state).then_some((before.state, after.state));

    let diff = UboResultDiff {
        cbu_id: after.cbu_id.clone(),
        run_a: before.run_id,
        run_b: after.run_id,
        version_a: before.snapshot_version,
        version_b: after.snapshot_version,
        state_change,
        added,
        removed,
        changed,
    };
    tracing::debug!(
        "ubo.result-diff: cbu={} v{}..v{} added={} removed={} changed={}",
        diff.cbu_id,
        diff.version_a,
        diff.version_b,
        diff.added.len(),
        diff.removed.len(),
        diff.changed.len()
    );
    Ok(diff)
}

fn by_person(result: &UboResult) -> BTreeMap<&EntityId, &UboDetermination> {
    result.ubos().iter().map(|u| (&u.person, u)).collect()
}

fn pct_str(value: Option<Decimal>) -> String {
    value.map(|v| v.normalize().to_string()).unwrap_or_default()
}

fn reasons_str(reasons: &BTreeSet<QualifyingReason>) -> String {
    reasons
        .iter()
        .map(QualifyingReason::to_db_str)
        .collect::<Vec<_>>()
        .join(",")
}
