//! Ownership/control edge types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::entity::EntityId;

/// Stable edge identifier assigned by the graph store (log sequence of the append)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub u64);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "edge-{}", self.0)
    }
}

/// Nature of an ownership/control link
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkType {
    DirectShare,
    IndirectShare,
    VotingRight,
    ControlAgreement,
    AccountingConsolidation,
}

impl LinkType {
    pub const ALL: [LinkType; 5] = [
        LinkType::DirectShare,
        LinkType::IndirectShare,
        LinkType::VotingRight,
        LinkType::ControlAgreement,
        LinkType::AccountingConsolidation,
    ];

    pub fn to_db_str(&self) -> &'static str {
        match self {
            Self::DirectShare => "DIRECT_SHARE",
            Self::IndirectShare => "INDIRECT_SHARE",
            Self::VotingRight => "VOTING_RIGHT",
            Self::ControlAgreement => "CONTROL_AGREEMENT",
            Self::AccountingConsolidation => "ACCOUNTING_CONSOLIDATION",
        }
    }
}

/// How well the source of an edge has been corroborated
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Corroboration {
    FullyCorroborated,
    PartiallyCorroborated,
    #[default]
    Unknown,
}

/// Where an edge came from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provenance {
    pub source: String,
    #[serde(default)]
    pub corroboration: Corroboration,
    /// Earlier edge this one corrects; the superseded edge drops out of the current view
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<EdgeId>,
}

impl Provenance {
    pub fn new(source: impl Into<String>, corroboration: Corroboration) -> Self {
        Self {
            source: source.into(),
            corroboration,
            supersedes: None,
        }
    }

    pub fn superseding(mut self, edge: EdgeId) -> Self {
        self.supersedes = Some(edge);
        self
    }
}

/// Directed `owner -> owned` relationship
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipEdge {
    pub id: EdgeId,
    pub owner: EntityId,
    pub owned: EntityId,
    /// 0.00..=100.00
    pub percentage: Decimal,
    pub link_type: LinkType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_class: Option<String>,
    pub provenance: Provenance,
}

impl OwnershipEdge {
    /// Percentage expressed as a fraction in 0..=1
    pub fn fraction(&self) -> Decimal {
        self.percentage / Decimal::ONE_HUNDRED
    }

    /// Identity of the fact asserted by this edge, ignoring the store-assigned id.
    /// Two appends with the same key are the same fact.
    pub fn same_fact(&self, other: &OwnershipEdge) -> bool {
        self.owner == other.owner
            && self.owned == other.owned
            && self.percentage == other.percentage
            && self.link_type == other.link_type
            && self.share_class == other.share_class
            && self.provenance == other.provenance
    }
}

/// Incoming edge assertion, before the store assigns an id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeAssertion {
    pub owner: EntityId,
    pub owned: EntityId,
    pub percentage: Decimal,
    pub link_type: LinkType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_class: Option<String>,
    pub provenance: Provenance,
}

impl EdgeAssertion {
    pub fn new(
        owner: impl Into<String>,
        owned: impl Into<String>,
        percentage: Decimal,
        link_type: LinkType,
        provenance: Provenance,
    ) -> Self {
        Self {
            owner: EntityId::new(owner),
            owned: EntityId::new(owned),
            percentage,
            link_type,
            share_class: None,
            provenance,
        }
    }

    pub fn with_share_class(mut self, class: impl Into<String>) -> Self {
        self.share_class = Some(class.into());
        self
    }

    pub fn into_edge(self, id: EdgeId) -> OwnershipEdge {
        OwnershipEdge {
            id,
            owner: self.owner,
            owned: self.owned,
            percentage: self.percentage,
            link_type: self.link_type,
            share_class: self.share_class,
            provenance: self.provenance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_fraction() {
        let edge = EdgeAssertion::new(
            "P",
            "Q",
            Decimal::new(6000, 2),
            LinkType::DirectShare,
            Provenance::new("register", Corroboration::FullyCorroborated),
        )
        .into_edge(EdgeId(1));
        assert_eq!(edge.fraction(), Decimal::new(6, 1));
    }

    #[test]
    fn test_same_fact_ignores_id_but_not_share_class() {
        let base = EdgeAssertion::new(
            "P",
            "Q",
            Decimal::new(1000, 2),
            LinkType::DirectShare,
            Provenance::new("register", Corroboration::Unknown),
        );
        let a = base.clone().into_edge(EdgeId(1));
        let b = base.clone().into_edge(EdgeId(2));
        let c = base.with_share_class("B").into_edge(EdgeId(3));

        assert!(a.same_fact(&b));
        assert!(!a.same_fact(&c));
    }
}
