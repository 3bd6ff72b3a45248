//! Materialised point-in-time view of the fact log
//!
//! Arena-and-index layout: entities and edges live in vectors, adjacency is a
//! list of edge slots per entity slot. Superseded edges stay in the arena and
//! are skipped by every query.

use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};

use super::{Applied, Direction, EdgeOutcome, Fact};
use crate::error::{Result, UboError};
use ubo_types::{
    Cbu, CbuId, ControlRole, EdgeAssertion, EdgeId, Entity, EntityId, EntityStatus, OwnershipEdge,
    PartnershipParty, TrustParty, TrustRole, UboResult,
};

#[derive(Debug, Clone, Default)]
pub struct GraphSnapshot {
    version: u64,
    entities: Vec<Entity>,
    index: HashMap<EntityId, usize>,
    /// Version of the last fact touching each entity slot
    last_changed: Vec<u64>,
    edges: Vec<OwnershipEdge>,
    superseded: HashSet<EdgeId>,
    /// Per entity slot: edge slots where the entity is owned
    owners_of: Vec<Vec<usize>>,
    /// Per entity slot: edge slots where the entity is owner
    owned_by: Vec<Vec<usize>>,
    control_roles: Vec<ControlRole>,
    trust_parties: Vec<TrustParty>,
    partnership_parties: Vec<PartnershipParty>,
    cbus: BTreeMap<CbuId, Cbu>,
    /// Version at which each CBU was last registered or re-registered
    cbu_changed: BTreeMap<CbuId, u64>,
    flagged_cycles: Vec<Vec<EntityId>>,
}

impl GraphSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn entity(&self, id: &EntityId) -> Option<&Entity> {
        self.index.get(id).map(|&slot| &self.entities[slot])
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.index.contains_key(id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.entities.iter()
    }

    /// Edges in the current view (superseded edges excluded)
    pub fn live_edges(&self) -> impl Iterator<Item = &OwnershipEdge> + '_ {
        self.edges
            .iter()
            .filter(move |e| !self.superseded.contains(&e.id))
    }

    pub fn edge(&self, id: EdgeId) -> Option<&OwnershipEdge> {
        self.edges.iter().find(|e| e.id == id)
    }

    pub fn is_superseded(&self, id: EdgeId) -> bool {
        self.superseded.contains(&id)
    }

    /// Lazy iterator over `(neighbor, edge)` pairs in the given direction.
    /// Unknown entities yield nothing. Call again to restart.
    pub fn neighbors_of(&self, entity: &EntityId, direction: Direction) -> Neighbors<'_> {
        let slots: &[usize] = match self.index.get(entity) {
            Some(&slot) => match direction {
                Direction::Owners => &self.owners_of[slot],
                Direction::Owned => &self.owned_by[slot],
            },
            None => &[],
        };
        Neighbors {
            snapshot: self,
            slots: slots.iter(),
            direction,
        }
    }

    pub fn has_owners(&self, entity: &EntityId) -> bool {
        self.neighbors_of(entity, Direction::Owners).next().is_some()
    }

    pub fn control_roles_for<'a>(
        &'a self,
        entity: &EntityId,
    ) -> impl Iterator<Item = &'a ControlRole> + 'a {
        let entity = entity.clone();
        self.control_roles.iter().filter(move |r| r.entity == entity)
    }

    pub fn trust_parties_for<'a>(
        &'a self,
        trust: &'a EntityId,
    ) -> impl Iterator<Item = &'a TrustParty> + 'a {
        self.trust_parties.iter().filter(move |p| &p.trust == trust)
    }

    pub fn partnership_parties_for<'a>(
        &'a self,
        partnership: &'a EntityId,
    ) -> impl Iterator<Item = &'a PartnershipParty> + 'a {
        self.partnership_parties
            .iter()
            .filter(move |p| &p.partnership == partnership)
    }

    pub fn cbu(&self, id: &CbuId) -> Option<&Cbu> {
        self.cbus.get(id)
    }

    pub fn cbus(&self) -> impl Iterator<Item = &Cbu> + '_ {
        self.cbus.values()
    }

    /// Cycles flagged when the closing edge was appended
    pub fn flagged_cycles(&self) -> &[Vec<EntityId>] {
        &self.flagged_cycles
    }

    pub fn last_changed(&self, id: &EntityId) -> Option<u64> {
        self.index.get(id).map(|&slot| self.last_changed[slot])
    }

    pub fn cbu_last_changed(&self, id: &CbuId) -> Option<u64> {
        self.cbu_changed.get(id).copied()
    }

    /// A result is stale once its CBU was re-registered, or any entity it
    /// depends on changed, after it was computed
    pub fn is_stale(&self, result: &UboResult) -> bool {
        let cbu_changed = self
            .cbu_last_changed(&result.cbu_id)
            .is_some_and(|version| version > result.snapshot_version);
        cbu_changed
            || result
                .dependencies
                .iter()
                .any(|id| match self.last_changed(id) {
                    Some(version) => version > result.snapshot_version,
                    None => true,
                })
    }

    pub(super) fn slot(&self, id: &EntityId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub(super) fn entity_at(&self, slot: usize) -> &EntityId {
        &self.entities[slot].id
    }

    pub(super) fn owner_slots(&self, slot: usize) -> &[usize] {
        &self.owners_of[slot]
    }

    pub(super) fn edge_at(&self, edge_slot: usize) -> &OwnershipEdge {
        &self.edges[edge_slot]
    }

    // ========================================================================
    // MUTATIONS (store-internal, validate before touching state)
    // ========================================================================

    pub(super) fn apply(&mut self, fact: Fact, version: u64) -> Result<Applied> {
        match fact {
            Fact::Entity(entity) => self.apply_entity(entity, version),
            Fact::OwnershipEdge(assertion) => Ok(self.apply_edge(assertion, version)?.applied),
            Fact::ControlRole(role) => self.apply_control_role(role, version),
            Fact::TrustParty(party) => self.apply_trust_party(party, version),
            Fact::PartnershipParty(party) => self.apply_partnership_party(party, version),
            Fact::Cbu(cbu) => Ok(self.apply_cbu(cbu, version)),
        }
    }

    pub(super) fn apply_entity(&mut self, entity: Entity, version: u64) -> Result<Applied> {
        if entity.status == EntityStatus::Deceased && !entity.is_natural_person() {
            return Err(UboError::NotNaturalPerson {
                entity: entity.id.clone(),
                context: "deceased entity",
            });
        }
        let Some(slot) = self.slot(&entity.id) else {
            let slot = self.entities.len();
            self.index.insert(entity.id.clone(), slot);
            self.entities.push(entity);
            self.last_changed.push(version);
            self.owners_of.push(Vec::new());
            self.owned_by.push(Vec::new());
            self.version = version;
            return Ok(Applied::Created);
        };

        let existing = &self.entities[slot];
        if existing == &entity {
            return Ok(Applied::NoChange);
        }
        if existing.jurisdiction != entity.jurisdiction {
            return Err(conflict(existing, "jurisdiction", &entity.jurisdiction));
        }
        if existing.entity_type != entity.entity_type {
            return Err(conflict(existing, "entity_type", entity.entity_type.to_db_str()));
        }
        if let (Some(held), Some(incoming)) =
            (&existing.registration_number, &entity.registration_number)
        {
            if held != incoming {
                return Err(UboError::DuplicateConflict {
                    entity: existing.id.clone(),
                    field: "registration_number",
                    existing: held.clone(),
                    incoming: incoming.clone(),
                });
            }
        }

        let registration_number = entity
            .registration_number
            .clone()
            .or_else(|| existing.registration_number.clone());
        let refreshed = Entity {
            registration_number,
            ..entity
        };
        if &refreshed == existing {
            return Ok(Applied::NoChange);
        }

        self.entities[slot] = refreshed;
        self.touch(slot, version);
        Ok(Applied::Refreshed)
    }

    pub(super) fn apply_edge(
        &mut self,
        assertion: EdgeAssertion,
        version: u64,
    ) -> Result<EdgeOutcome> {
        let owner_slot = self.require(&assertion.owner, "edge owner")?;
        let owned_slot = self.require(&assertion.owned, "edge owned entity")?;
        if !valid_percentage(assertion.percentage) {
            return Err(UboError::InvalidPercentage {
                owner: assertion.owner,
                owned: assertion.owned,
                value: assertion.percentage,
            });
        }
        if let Some(previous) = assertion.provenance.supersedes {
            if self.edge(previous).is_none() {
                return Err(UboError::UnknownEdge(previous));
            }
        }

        let candidate = assertion.into_edge(EdgeId(self.edges.len() as u64 + 1));
        let existing = self.owners_of[owned_slot]
            .iter()
            .map(|&e| &self.edges[e])
            .find(|e| !self.superseded.contains(&e.id) && e.same_fact(&candidate));
        if let Some(existing) = existing {
            return Ok(EdgeOutcome {
                edge_id: existing.id,
                applied: Applied::NoChange,
                cycle: None,
            });
        }

        let edge_slot = self.edges.len();
        let edge_id = candidate.id;
        if let Some(previous) = candidate.provenance.supersedes {
            self.superseded.insert(previous);
        }
        let owned = candidate.owned.clone();
        self.edges.push(candidate);
        self.owners_of[owned_slot].push(edge_slot);
        self.owned_by[owner_slot].push(edge_slot);
        self.touch(owner_slot, version);
        self.touch(owned_slot, version);

        let cycle = self.detect_cycle(&owned);
        if let Some(path) = &cycle {
            tracing::warn!(
                "graph.add-edge: {} closes ownership cycle {:?}",
                edge_id,
                path.iter().map(EntityId::as_str).collect::<Vec<_>>()
            );
            if !self.flagged_cycles.contains(path) {
                self.flagged_cycles.push(path.clone());
            }
        }

        Ok(EdgeOutcome {
            edge_id,
            applied: Applied::Created,
            cycle,
        })
    }

    pub(super) fn apply_control_role(&mut self, role: ControlRole, version: u64) -> Result<Applied> {
        let slot = self.require(&role.entity, "controlled entity")?;
        self.require_person(&role.person, "control role holder")?;
        if !(1..=10).contains(&role.priority_rank) {
            return Err(UboError::InvalidPriorityRank {
                entity: role.entity,
                person: role.person,
                rank: role.priority_rank,
            });
        }
        if self.control_roles.contains(&role) {
            return Ok(Applied::NoChange);
        }
        self.control_roles.push(role);
        self.touch(slot, version);
        Ok(Applied::Created)
    }

    pub(super) fn apply_trust_party(&mut self, party: TrustParty, version: u64) -> Result<Applied> {
        let slot = self.require(&party.trust, "trust")?;
        if let Some(id) = &party.party {
            self.require(id, "trust party")?;
        }
        if let TrustRole::Beneficiary {
            share: Some(share), ..
        } = &party.role
        {
            if !valid_percentage(*share) {
                return Err(UboError::InvalidPercentage {
                    owner: party.party.clone().unwrap_or_else(|| party.trust.clone()),
                    owned: party.trust.clone(),
                    value: *share,
                });
            }
        }
        if self.trust_parties.contains(&party) {
            return Ok(Applied::NoChange);
        }
        self.trust_parties.push(party);
        self.touch(slot, version);
        Ok(Applied::Created)
    }

    pub(super) fn apply_partnership_party(
        &mut self,
        party: PartnershipParty,
        version: u64,
    ) -> Result<Applied> {
        let slot = self.require(&party.partnership, "partnership")?;
        self.require(&party.partner, "partner")?;
        if party.capital_commitment < Decimal::ZERO {
            return Err(UboError::InvalidCommitment {
                partnership: party.partnership,
                partner: party.partner,
                value: party.capital_commitment,
            });
        }
        if self.partnership_parties.contains(&party) {
            return Ok(Applied::NoChange);
        }
        self.partnership_parties.push(party);
        self.touch(slot, version);
        Ok(Applied::Created)
    }

    pub(super) fn apply_cbu(&mut self, cbu: Cbu, version: u64) -> Applied {
        let applied = match self.cbus.get(&cbu.id) {
            Some(existing) if existing == &cbu => return Applied::NoChange,
            Some(_) => Applied::Refreshed,
            None => Applied::Created,
        };
        self.cbu_changed.insert(cbu.id.clone(), version);
        self.cbus.insert(cbu.id.clone(), cbu);
        self.version = version;
        applied
    }

    fn touch(&mut self, slot: usize, version: u64) {
        self.last_changed[slot] = version;
        self.version = version;
    }

    fn require(&self, id: &EntityId, context: &'static str) -> Result<usize> {
        self.slot(id).ok_or_else(|| UboError::UnknownEntity {
            entity: id.clone(),
            context,
        })
    }

    fn require_person(&self, id: &EntityId, context: &'static str) -> Result<usize> {
        let slot = self.require(id, context)?;
        if !self.entities[slot].is_natural_person() {
            return Err(UboError::NotNaturalPerson {
                entity: id.clone(),
                context,
            });
        }
        Ok(slot)
    }
}

fn conflict(existing: &Entity, field: &'static str, incoming: &str) -> UboError {
    let held = match field {
        "jurisdiction" => existing.jurisdiction.clone(),
        _ => existing.entity_type.to_db_str().to_string(),
    };
    UboError::DuplicateConflict {
        entity: existing.id.clone(),
        field,
        existing: held,
        incoming: incoming.to_string(),
    }
}

/// 0.00..=100.00 with at most two decimal places
fn valid_percentage(value: Decimal) -> bool {
    value >= Decimal::ZERO && value <= Decimal::ONE_HUNDRED && value.normalize().scale() <= 2
}

/// Lazy `(neighbor, edge)` iterator returned by `GraphSnapshot::neighbors_of`
pub struct Neighbors<'a> {
    snapshot: &'a GraphSnapshot,
    slots: std::slice::Iter<'a, usize>,
    direction: Direction,
}

impl<'a> Iterator for Neighbors<'a> {
    type Item = (&'a Entity, &'a OwnershipEdge);

    fn next(&mut self) -> Option<Self::Item> {
        let snapshot = self.snapshot;
        for &slot in self.slots.by_ref() {
            let edge = &snapshot.edges[slot];
            if snapshot.superseded.contains(&edge.id) {
                continue;
            }
            let neighbor = match self.direction {
                Direction::Owners => &edge.owner,
                Direction::Owned => &edge.owned,
            };
            if let Some(entity) = snapshot.entity(neighbor) {
                return Some((entity, edge));
            }
        }
        None
    }
}
