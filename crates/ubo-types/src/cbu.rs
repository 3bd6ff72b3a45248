//! Client Business Unit types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::entity::EntityId;
use crate::result::{RegulatoryFramework, WorkflowType};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CbuId(pub String);

impl CbuId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for CbuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role an entity plays for a CBU
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CbuRole {
    AssetOwner,
    InvestmentManager,
    ManagementCompany,
    Sicav,
    UltimateClient,
}

impl CbuRole {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            Self::AssetOwner => "ASSET_OWNER",
            Self::InvestmentManager => "INVESTMENT_MANAGER",
            Self::ManagementCompany => "MANAGEMENT_COMPANY",
            Self::Sicav => "SICAV",
            Self::UltimateClient => "ULTIMATE_CLIENT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub role: CbuRole,
    pub entity: EntityId,
}

/// The unit under compliance review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cbu {
    pub id: CbuId,
    pub name: String,
    /// Root entity whose ownership is resolved
    pub subject: EntityId,
    #[serde(default)]
    pub roles: Vec<RoleAssignment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_override: Option<WorkflowType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regulatory_framework: Option<RegulatoryFramework>,
}

impl Cbu {
    pub fn new(id: impl Into<String>, name: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            id: CbuId::new(id),
            name: name.into(),
            subject: EntityId::new(subject),
            roles: Vec::new(),
            workflow_override: None,
            regulatory_framework: None,
        }
    }

    pub fn with_role(mut self, role: CbuRole, entity: impl Into<String>) -> Self {
        self.roles.push(RoleAssignment {
            role,
            entity: EntityId::new(entity),
        });
        self
    }

    pub fn entities_in_role(&self, role: CbuRole) -> impl Iterator<Item = &EntityId> + '_ {
        self.roles
            .iter()
            .filter(move |r| r.role == role)
            .map(|r| &r.entity)
    }

    /// The fund entity being registered: the asset owner, else the subject
    pub fn fund_entity(&self) -> &EntityId {
        self.entities_in_role(CbuRole::AssetOwner)
            .next()
            .unwrap_or(&self.subject)
    }
}
