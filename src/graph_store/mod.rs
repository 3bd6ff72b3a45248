//! Graph Store
//!
//! Entities and directed ownership/control edges held as an append-only,
//! versioned fact log with a materialised current snapshot. Readers pin an
//! `Arc<GraphSnapshot>`; writers are serialised and bump the version.

mod cycle;
mod snapshot;
mod store;

pub use snapshot::{GraphSnapshot, Neighbors};
pub use store::GraphStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ubo_types::{
    Cbu, ControlRole, EdgeAssertion, EdgeId, Entity, EntityId, PartnershipParty, TrustParty,
};

/// Traversal direction relative to an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Upward: the entities owning this one
    Owners,
    /// Downward: the entities this one owns
    Owned,
}

/// Outcome of an idempotent store mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Applied {
    Created,
    Refreshed,
    NoChange,
}

impl Applied {
    pub fn changed(&self) -> bool {
        !matches!(self, Applied::NoChange)
    }
}

/// Result of `add_ownership_edge`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeOutcome {
    pub edge_id: EdgeId,
    pub applied: Applied,
    /// Cycle closed by this edge, subject entity first and last
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle: Option<Vec<EntityId>>,
}

/// A single ingested fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "fact", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Fact {
    Entity(Entity),
    OwnershipEdge(EdgeAssertion),
    ControlRole(ControlRole),
    TrustParty(TrustParty),
    PartnershipParty(PartnershipParty),
    Cbu(Cbu),
}

impl Fact {
    pub fn kind(&self) -> &'static str {
        match self {
            Fact::Entity(_) => "ENTITY",
            Fact::OwnershipEdge(_) => "OWNERSHIP_EDGE",
            Fact::ControlRole(_) => "CONTROL_ROLE",
            Fact::TrustParty(_) => "TRUST_PARTY",
            Fact::PartnershipParty(_) => "PARTNERSHIP_PARTY",
            Fact::Cbu(_) => "CBU",
        }
    }
}

/// Log entry for a fact that changed the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRecord {
    pub version: u64,
    pub recorded_at: DateTime<Utc>,
    pub fact: Fact,
}
