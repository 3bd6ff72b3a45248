//! Versioned, append-only graph store
//!
//! Writes are serialised behind a single lock and each changing fact bumps the
//! version by one. The current snapshot is copy-on-write: a reader holding an
//! `Arc<GraphSnapshot>` keeps a consistent view while later writes proceed.

use chrono::Utc;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{Applied, EdgeOutcome, Fact, FactRecord, GraphSnapshot};
use crate::error::{Result, UboError};
use crate::validator::{has_errors, validate_cbu};
use ubo_types::{
    Cbu, ControlRole, EdgeAssertion, Entity, EntityId, EntityStatus, PartnershipParty, Severity,
    TrustParty, ValidationFinding,
};

#[derive(Debug, Default)]
struct StoreInner {
    log: Vec<FactRecord>,
    current: Arc<GraphSnapshot>,
}

#[derive(Debug, Default)]
pub struct GraphStore {
    inner: RwLock<StoreInner>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn version(&self) -> u64 {
        self.read().current.version()
    }

    /// Point-in-time consistent view of the current graph
    pub fn snapshot(&self) -> Arc<GraphSnapshot> {
        Arc::clone(&self.read().current)
    }

    /// Rebuild the graph as it stood at `version` by replaying the log
    pub fn snapshot_at(&self, version: u64) -> Result<Arc<GraphSnapshot>> {
        let records: Vec<FactRecord> = {
            let inner = self.read();
            if version >= inner.current.version() {
                return Ok(Arc::clone(&inner.current));
            }
            inner
                .log
                .iter()
                .take_while(|r| r.version <= version)
                .cloned()
                .collect()
        };

        let mut snapshot = GraphSnapshot::new();
        for record in records {
            snapshot.apply(record.fact, record.version)?;
        }
        tracing::debug!(
            "graph.snapshot-at: replayed to v{} (requested v{})",
            snapshot.version(),
            version
        );
        Ok(Arc::new(snapshot))
    }

    /// Log entries with a version strictly greater than `version`
    pub fn facts_since(&self, version: u64) -> Vec<FactRecord> {
        self.read()
            .log
            .iter()
            .filter(|r| r.version > version)
            .cloned()
            .collect()
    }

    // ========================================================================
    // INGESTION
    // ========================================================================

    pub fn upsert_entity(&self, entity: Entity) -> Result<Applied> {
        self.apply(Fact::Entity(entity))
    }

    pub fn add_ownership_edge(&self, assertion: EdgeAssertion) -> Result<EdgeOutcome> {
        let fact = Fact::OwnershipEdge(assertion.clone());
        let mut inner = self.write();
        Self::commit(&mut inner, fact, |snapshot, version| {
            let outcome = snapshot.apply_edge(assertion, version)?;
            let applied = outcome.applied;
            Ok((outcome, applied))
        })
    }

    /// Record a natural person as deceased. The entity keeps its history; later
    /// determinations skip it as an owner or control candidate.
    pub fn mark_deceased(&self, person: &EntityId) -> Result<Applied> {
        let mut inner = self.write();

        let entity = inner
            .current
            .entity(person)
            .ok_or_else(|| UboError::UnknownEntity {
                entity: person.clone(),
                context: "deceased person",
            })?;
        if !entity.is_natural_person() {
            return Err(UboError::NotNaturalPerson {
                entity: person.clone(),
                context: "deceased person",
            });
        }
        if entity.status == EntityStatus::Deceased {
            return Ok(Applied::NoChange);
        }

        let deceased = entity.clone().with_status(EntityStatus::Deceased);
        let applied = Self::commit(&mut inner, Fact::Entity(deceased.clone()), |snapshot, version| {
            let applied = snapshot.apply_entity(deceased, version)?;
            Ok((applied, applied))
        })?;
        tracing::info!("graph.mark-deceased: {} at v{}", person, inner.current.version());
        Ok(applied)
    }

    pub fn add_control_role(&self, role: ControlRole) -> Result<Applied> {
        self.apply(Fact::ControlRole(role))
    }

    pub fn add_trust_party(&self, party: TrustParty) -> Result<Applied> {
        self.apply(Fact::TrustParty(party))
    }

    pub fn add_partnership_party(&self, party: PartnershipParty) -> Result<Applied> {
        self.apply(Fact::PartnershipParty(party))
    }

    /// Admit a CBU after validating its role references against the current graph.
    /// Error findings reject it; warnings are returned alongside the admission.
    pub fn register_cbu(&self, cbu: Cbu) -> Result<Vec<ValidationFinding>> {
        self.admit_cbu(cbu).map(|(_, warnings)| warnings)
    }

    /// `register_cbu` that also reports whether the CBU was new, changed or identical
    pub fn admit_cbu(&self, cbu: Cbu) -> Result<(Applied, Vec<ValidationFinding>)> {
        let mut inner = self.write();

        let findings = validate_cbu(&inner.current, &cbu);
        if has_errors(&findings) {
            let errors: Vec<ValidationFinding> = findings
                .into_iter()
                .filter(|f| f.severity == Severity::Error)
                .collect();
            tracing::warn!(
                "graph.register-cbu: {} rejected with {} error finding(s)",
                cbu.id,
                errors.len()
            );
            return Err(UboError::ValidationRejected {
                cbu: cbu.id,
                findings: errors,
            });
        }

        let applied = Self::commit(&mut inner, Fact::Cbu(cbu.clone()), |snapshot, version| {
            let applied = snapshot.apply_cbu(cbu, version);
            Ok((applied, applied))
        })?;
        Ok((applied, findings))
    }

    /// Apply any fact. CBUs go through `register_cbu` validation.
    pub fn apply(&self, fact: Fact) -> Result<Applied> {
        if let Fact::Cbu(cbu) = fact {
            return self.admit_cbu(cbu).map(|(applied, _)| applied);
        }

        let mut inner = self.write();
        Self::commit(&mut inner, fact.clone(), |snapshot, version| {
            let applied = snapshot.apply(fact, version)?;
            Ok((applied, applied))
        })
    }

    fn commit<T>(
        inner: &mut StoreInner,
        fact: Fact,
        apply: impl FnOnce(&mut GraphSnapshot, u64) -> Result<(T, Applied)>,
    ) -> Result<T> {
        let version = inner.log.len() as u64 + 1;
        let kind = fact.kind();
        let (out, applied) = apply(Arc::make_mut(&mut inner.current), version)?;

        if applied.changed() {
            inner.log.push(FactRecord {
                version,
                recorded_at: Utc::now(),
                fact,
            });
            tracing::debug!("graph.commit: v{} {} {:?}", version, kind, applied);
        }
        Ok(out)
    }
}
