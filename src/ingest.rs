//! Fact bundles
//!
//! A YAML document of facts applied to a `GraphStore` in dependency order:
//! entities, edges, control roles, trust parties, partnership parties, CBUs.
//! Each fact is applied independently; a rejected fact is reported and the
//! rest of the bundle still goes in.
//!
//! ```yaml
//! entities:
//!   - { id: P, legal_name: Parent, jurisdiction: GB, entity_type: CORPORATION }
//! edges:
//!   - owner: P
//!     owned: Q
//!     percentage: "60.00"
//!     link_type: DIRECT_SHARE
//!     provenance: { source: companies-house }
//! cbus:
//!   - id: CBU-1
//!     name: Q onboarding
//!     subject: Q
//!     roles: [{ role: ULTIMATE_CLIENT, entity: P }]
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use crate::error::UboError;
use crate::graph_store::{Applied, GraphStore};
use ubo_types::{
    Cbu, ControlRole, EdgeAssertion, EdgeId, Entity, EntityId, PartnershipParty, TrustParty,
    ValidationFinding,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactBundle {
    pub entities: Vec<Entity>,
    pub edges: Vec<EdgeAssertion>,
    pub control_roles: Vec<ControlRole>,
    pub trust_parties: Vec<TrustParty>,
    pub partnership_parties: Vec<PartnershipParty>,
    pub cbus: Vec<Cbu>,
}

/// Outcome of one fact in a bundle
#[derive(Debug, Clone, PartialEq)]
pub struct FactOutcome {
    /// Section name and position, e.g. `edges[3]`
    pub locator: String,
    pub result: std::result::Result<Applied, UboError>,
}

#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub outcomes: Vec<FactOutcome>,
    /// Ids assigned to each accepted edge, in bundle order
    pub edge_ids: Vec<EdgeId>,
    /// Cycles closed by edges in this bundle
    pub cycles: Vec<Vec<EntityId>>,
    /// Warning-level findings from admitted CBUs
    pub warnings: Vec<ValidationFinding>,
    pub version: u64,
}

impl IngestReport {
    pub fn changed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(&o.result, Ok(applied) if applied.changed()))
            .count()
    }

    pub fn unchanged(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.result == Ok(Applied::NoChange))
            .count()
    }

    pub fn rejected(&self) -> Vec<&FactOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err()).collect()
    }

    fn record(&mut self, locator: String, result: std::result::Result<Applied, UboError>) {
        if let Err(e) = &result {
            warn!("ingest.apply: {} rejected: {}", locator, e);
        }
        self.outcomes.push(FactOutcome { locator, result });
    }
}

impl FactBundle {
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse fact bundle YAML")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fact bundle: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Invalid fact bundle: {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
            + self.edges.len()
            + self.control_roles.len()
            + self.trust_parties.len()
            + self.partnership_parties.len()
            + self.cbus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply every fact in order, collecting per-fact outcomes
    pub fn apply(self, store: &GraphStore) -> IngestReport {
        let mut report = IngestReport::default();

        for (i, entity) in self.entities.into_iter().enumerate() {
            report.record(format!("entities[{}]", i), store.upsert_entity(entity));
        }

        for (i, edge) in self.edges.into_iter().enumerate() {
            let result = store.add_ownership_edge(edge).map(|outcome| {
                report.edge_ids.push(outcome.edge_id);
                if let Some(cycle) = outcome.cycle {
                    report.cycles.push(cycle);
                }
                outcome.applied
            });
            report.record(format!("edges[{}]", i), result);
        }

        for (i, role) in self.control_roles.into_iter().enumerate() {
            report.record(format!("control_roles[{}]", i), store.add_control_role(role));
        }

        for (i, party) in self.trust_parties.into_iter().enumerate() {
            report.record(format!("trust_parties[{}]", i), store.add_trust_party(party));
        }

        for (i, party) in self.partnership_parties.into_iter().enumerate() {
            report.record(
                format!("partnership_parties[{}]", i),
                store.add_partnership_party(party),
            );
        }

        for (i, cbu) in self.cbus.into_iter().enumerate() {
            let result = store.admit_cbu(cbu).map(|(applied, warnings)| {
                report.warnings.extend(warnings);
                applied
            });
            report.record(format!("cbus[{}]", i), result);
        }

        report.version = store.version();
        info!(
            "ingest.apply: {} fact(s), {} changed, {} rejected, {} cycle(s), version {}",
            report.outcomes.len(),
            report.changed(),
            report.rejected().len(),
            report.cycles.len(),
            report.version
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BUNDLE: &str = r#"
entities:
  - { id: P, legal_name: Parent Ltd, jurisdiction: GB, entity_type: CORPORATION }
  - { id: Q, legal_name: Sub Ltd, jurisdiction: GB, entity_type: CORPORATION }
  - { id: alice, legal_name: Alice, jurisdiction: GB, entity_type: NATURAL_PERSON }
edges:
  - owner: alice
    owned: P
    percentage: "100"
    link_type: DIRECT_SHARE
    provenance: { source: register, corroboration: FULLY_CORROBORATED }
  - owner: P
    owned: Q
    percentage: "60.00"
    link_type: DIRECT_SHARE
    provenance: { source: register }
  - owner: P
    owned: NOBODY
    percentage: "10"
    link_type: DIRECT_SHARE
    provenance: { source: register }
cbus:
  - id: CBU-Q
    name: Sub onboarding
    subject: Q
    roles:
      - { role: ULTIMATE_CLIENT, entity: P }
"#;

    #[test]
    fn test_apply_reports_each_fact() {
        let store = GraphStore::new();
        let bundle = FactBundle::from_yaml(BUNDLE).expect("bundle parses");
        assert_eq!(bundle.len(), 7);

        let report = bundle.apply(&store);
        assert_eq!(report.outcomes.len(), 7);
        assert_eq!(report.changed(), 6);

        let rejected = report.rejected();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].locator, "edges[2]");
        assert!(matches!(
            rejected[0].result,
            Err(UboError::UnknownEntity { .. })
        ));
        assert_eq!(report.edge_ids.len(), 2);
        assert_eq!(report.version, store.version());
    }

    #[test]
    fn test_reapply_is_idempotent() {
        let store = GraphStore::new();
        FactBundle::from_yaml(BUNDLE).expect("parse").apply(&store);
        let version = store.version();

        let again = FactBundle::from_yaml(BUNDLE).expect("parse").apply(&store);
        assert_eq!(store.version(), version);
        assert_eq!(again.changed(), 0);
        assert_eq!(again.unchanged(), 6);
        assert_eq!(store.snapshot().live_edges().count(), 2);
    }

    #[test]
    fn test_cycle_reported() {
        let yaml = r#"
entities:
  - { id: A, legal_name: A, jurisdiction: GB, entity_type: CORPORATION }
  - { id: B, legal_name: B, jurisdiction: GB, entity_type: CORPORATION }
edges:
  - { owner: A, owned: B, percentage: "50", link_type: DIRECT_SHARE, provenance: { source: x } }
  - { owner: B, owned: A, percentage: "50", link_type: DIRECT_SHARE, provenance: { source: x } }
"#;
        let store = GraphStore::new();
        let report = FactBundle::from_yaml(yaml).expect("parse").apply(&store);
        assert_eq!(report.cycles.len(), 1);
        assert!(report.rejected().is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(BUNDLE.as_bytes()).expect("write");
        let bundle = FactBundle::load(file.path()).expect("load");
        assert_eq!(bundle.entities.len(), 3);
        assert_eq!(bundle.cbus[0].id.0, "CBU-Q");
    }

    #[test]
    fn test_load_missing_file_has_context() {
        let err = FactBundle::load("/nonexistent/bundle.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read fact bundle"));
    }
}
