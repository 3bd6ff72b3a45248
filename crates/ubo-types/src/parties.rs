//! Control roles and entity-type-specific party attachments
//!
//! Aligned to the FinCEN CDD rule (31 CFR 1010.230) control prong and the FATF
//! guidance on trusts and partnerships.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::entity::EntityId;

// ============================================================================
// CONTROL PRONG
// ============================================================================

/// Title of a person holding a FinCEN qualifying control role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlRoleTitle {
    Ceo,
    Cfo,
    Coo,
    President,
    GeneralPartner,
    ManagingMember,
    SimilarFunctions,
}

impl ControlRoleTitle {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            Self::Ceo => "CEO",
            Self::Cfo => "CFO",
            Self::Coo => "COO",
            Self::President => "PRESIDENT",
            Self::GeneralPartner => "GENERAL_PARTNER",
            Self::ManagingMember => "MANAGING_MEMBER",
            Self::SimilarFunctions => "SIMILAR_FUNCTIONS",
        }
    }
}

/// A natural person holding a control role in an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRole {
    /// Entity being controlled
    pub entity: EntityId,
    /// Natural person holding the role
    pub person: EntityId,
    pub role_title: ControlRoleTitle,
    /// 1..=10, lower is higher priority
    pub priority_rank: u8,
    #[serde(default)]
    pub functions_performed: String,
    /// Timestamp of the source record, used as the final tie-break
    pub recorded_at: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub has_significant_responsibility: bool,
}

fn default_true() -> bool {
    true
}

impl ControlRole {
    pub fn new(
        entity: impl Into<String>,
        person: impl Into<String>,
        role_title: ControlRoleTitle,
        priority_rank: u8,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            entity: EntityId::new(entity),
            person: EntityId::new(person),
            role_title,
            priority_rank,
            functions_performed: String::new(),
            recorded_at,
            has_significant_responsibility: true,
        }
    }

    pub fn with_functions(mut self, functions: impl Into<String>) -> Self {
        self.functions_performed = functions.into();
        self
    }
}

// ============================================================================
// TRUSTS
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrusteeKind {
    ProperPersonTrustee,
    CorporateTrustee,
    ProfessionalTrustee,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BeneficiaryKind {
    Named,
    Class,
    Discretionary,
}

/// Powers a protector may hold under the trust deed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProtectorPower {
    TrusteeAppointment,
    TrusteeRemoval,
    DistributionVeto,
    AddBeneficiary,
    RemoveBeneficiary,
    DirectDistribution,
    AmendDeed,
}

impl ProtectorPower {
    /// Powers that decide who receives trust assets
    pub fn is_dispositive(&self) -> bool {
        matches!(
            self,
            Self::DistributionVeto
                | Self::AddBeneficiary
                | Self::RemoveBeneficiary
                | Self::DirectDistribution
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrustRole {
    Settlor,
    Trustee {
        kind: TrusteeKind,
    },
    Beneficiary {
        kind: BeneficiaryKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        class_definition: Option<String>,
        /// Share of trust assets, when independently resolvable
        #[serde(default, skip_serializing_if = "Option::is_none")]
        share: Option<Decimal>,
    },
    Protector {
        #[serde(default)]
        powers: Vec<ProtectorPower>,
    },
}

impl TrustRole {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Settlor => "SETTLOR",
            Self::Trustee { .. } => "TRUSTEE",
            Self::Beneficiary { .. } => "BENEFICIARY",
            Self::Protector { .. } => "PROTECTOR",
        }
    }
}

/// A party attached to a trust
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustParty {
    pub trust: EntityId,
    /// Absent for an unnamed beneficiary class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub party: Option<EntityId>,
    #[serde(flatten)]
    pub role: TrustRole,
}

// ============================================================================
// PARTNERSHIPS
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartnerKind {
    GeneralPartner,
    LimitedPartner,
    ManagingPartner,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMechanism {
    ManagementAgreement,
    GpControl,
    InvestmentCommittee,
    VotingRights,
}

/// A partner in a partnership
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnershipParty {
    pub partnership: EntityId,
    pub partner: EntityId,
    pub kind: PartnerKind,
    #[serde(default)]
    pub capital_commitment: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_mechanism: Option<ControlMechanism>,
}

impl PartnershipParty {
    /// General or managing partner exercising control through a recorded mechanism
    pub fn has_control(&self) -> bool {
        matches!(
            self.kind,
            PartnerKind::GeneralPartner | PartnerKind::ManagingPartner
        ) && self.control_mechanism.is_some()
    }
}
