//! Role/Reference Validator
//!
//! Checks CBU role assignments for referential consistency with a graph
//! snapshot. Findings are collected, never thrown; `GraphStore::register_cbu`
//! turns error-severity findings into a rejection.

use std::collections::BTreeMap;

use crate::graph_store::GraphSnapshot;
use ubo_types::{
    Cbu, CbuId, CbuRole, EntityId, Severity, ValidationCode, ValidationFinding,
};

struct Findings<'a> {
    cbu: &'a Cbu,
    out: Vec<ValidationFinding>,
}

impl<'a> Findings<'a> {
    fn push(
        &mut self,
        code: ValidationCode,
        severity: Severity,
        role: Option<CbuRole>,
        entity: Option<&EntityId>,
        message: String,
    ) {
        self.out.push(ValidationFinding {
            cbu_id: self.cbu.id.clone(),
            code,
            severity,
            role,
            entity: entity.cloned(),
            message,
        });
    }

    fn error(
        &mut self,
        code: ValidationCode,
        role: Option<CbuRole>,
        entity: Option<&EntityId>,
        message: String,
    ) {
        self.push(code, Severity::Error, role, entity, message);
    }
}

/// Validate one CBU against the snapshot
pub fn validate_cbu(snapshot: &GraphSnapshot, cbu: &Cbu) -> Vec<ValidationFinding> {
    let mut findings = Findings {
        cbu,
        out: Vec::new(),
    };

    if !snapshot.contains(&cbu.subject) {
        findings.error(
            ValidationCode::UnknownSubject,
            None,
            Some(&cbu.subject),
            format!("subject entity {} is not in the graph", cbu.subject),
        );
    }

    // ------------------------------------------------------------------
    // 1. Every role reference must resolve
    // ------------------------------------------------------------------
    for assignment in &cbu.roles {
        match snapshot.entity(&assignment.entity) {
            None => findings.error(
                ValidationCode::UnresolvedRoleReference,
                Some(assignment.role),
                Some(&assignment.entity),
                format!(
                    "{} references unknown entity {}",
                    assignment.role.to_db_str(),
                    assignment.entity
                ),
            ),
            Some(entity) if entity.status.is_terminal() => findings.push(
                ValidationCode::InactiveRoleEntity,
                Severity::Warning,
                Some(assignment.role),
                Some(&assignment.entity),
                format!(
                    "{} references {} entity {}",
                    assignment.role.to_db_str(),
                    entity.status.to_db_str(),
                    assignment.entity
                ),
            ),
            Some(_) => {}
        }
    }

    // ------------------------------------------------------------------
    // 2. SICAV must be an umbrella, never the fund entity itself
    // ------------------------------------------------------------------
    let fund_entity = cbu.fund_entity();
    for sicav in cbu.entities_in_role(CbuRole::Sicav) {
        if sicav == fund_entity {
            findings.error(
                ValidationCode::SicavIsFundEntity,
                Some(CbuRole::Sicav),
                Some(sicav),
                format!("SICAV role points at the fund entity {} itself", sicav),
            );
        }
        if let Some(entity) = snapshot.entity(sicav) {
            if !entity.is_umbrella() {
                findings.error(
                    ValidationCode::SicavNotUmbrella,
                    Some(CbuRole::Sicav),
                    Some(sicav),
                    format!("SICAV role entity {} is not an umbrella", sicav),
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // 3. Cardinality
    // ------------------------------------------------------------------
    match cbu.entities_in_role(CbuRole::UltimateClient).count() {
        1 => {}
        0 => findings.error(
            ValidationCode::MissingUltimateClient,
            Some(CbuRole::UltimateClient),
            None,
            "no ULTIMATE_CLIENT assigned".to_string(),
        ),
        n => findings.error(
            ValidationCode::MultipleUltimateClients,
            Some(CbuRole::UltimateClient),
            None,
            format!("{} ULTIMATE_CLIENT assignments, expected exactly one", n),
        ),
    }

    let asset_owners = cbu.entities_in_role(CbuRole::AssetOwner).count();
    if asset_owners > 1 {
        findings.error(
            ValidationCode::MultipleAssetOwners,
            Some(CbuRole::AssetOwner),
            None,
            format!("{} ASSET_OWNER assignments, at most one allowed", asset_owners),
        );
    }

    if !findings.out.is_empty() {
        tracing::debug!(
            "validator.cbu: {} produced {} finding(s)",
            cbu.id,
            findings.out.len()
        );
    }
    findings.out
}

/// Validate many CBUs; every CBU gets an entry, empty when clean
pub fn validate_batch<'a>(
    snapshot: &GraphSnapshot,
    cbus: impl IntoIterator<Item = &'a Cbu>,
) -> BTreeMap<CbuId, Vec<ValidationFinding>> {
    cbus.into_iter()
        .map(|cbu| (cbu.id.clone(), validate_cbu(snapshot, cbu)))
        .collect()
}

pub fn has_errors(findings: &[ValidationFinding]) -> bool {
    findings.iter().any(|f| f.severity == Severity::Error)
}
