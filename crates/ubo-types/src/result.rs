//! UBO determination output records
//!
//! `UboResult` is derived data: it is recomputed from a graph snapshot and never
//! hand-edited. Every result carries the snapshot version it was computed against
//! and the set of entities it depends on, so consumers can detect staleness.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::cbu::{CbuId, CbuRole};
use crate::entity::{EntityId, EntityStatus, TerminusReason};
use crate::parties::ControlRoleTitle;

// ============================================================================
// CLASSIFICATION ENUMS
// ============================================================================

/// Workflow applied to a subject, chosen from its entity structure
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowType {
    StandardCorporate,
    TrustSpecific,
    PartnershipDualProng,
    RecursiveAnalysis,
}

impl WorkflowType {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            Self::StandardCorporate => "STANDARD_CORPORATE",
            Self::TrustSpecific => "TRUST_SPECIFIC",
            Self::PartnershipDualProng => "PARTNERSHIP_DUAL_PRONG",
            Self::RecursiveAnalysis => "RECURSIVE_ANALYSIS",
        }
    }
}

/// Regulatory framework applied for UBO identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegulatoryFramework {
    #[serde(rename = "EU_5MLD")]
    Eu5mld,
    #[serde(rename = "FATF_GUIDANCE")]
    FatfGuidance,
    #[serde(rename = "US_CDD")]
    UsCdd,
    #[serde(rename = "UK_MLR")]
    UkMlr,
    #[serde(rename = "TRUST_SPECIFIC")]
    TrustSpecific,
    #[serde(rename = "PARTNERSHIP_SPECIFIC")]
    PartnershipSpecific,
}

impl RegulatoryFramework {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            Self::Eu5mld => "EU_5MLD",
            Self::FatfGuidance => "FATF_GUIDANCE",
            Self::UsCdd => "US_CDD",
            Self::UkMlr => "UK_MLR",
            Self::TrustSpecific => "TRUST_SPECIFIC",
            Self::PartnershipSpecific => "PARTNERSHIP_SPECIFIC",
        }
    }
}

/// Per-CBU determination state machine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionState {
    Pending,
    Aggregating,
    Evaluating,
    Resolved,
    TerminatedNoUbo,
    Failed,
}

impl ResolutionState {
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Resolved | Self::TerminatedNoUbo | Self::Failed)
    }
}

/// Prong through which UBO status is achieved
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ProngType {
    #[serde(rename = "OWNERSHIP_PRONG")]
    Ownership,
    #[serde(rename = "CONTROL_PRONG")]
    Control,
    #[serde(rename = "DUAL_PRONG")]
    Dual,
}

impl ProngType {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            Self::Ownership => "OWNERSHIP_PRONG",
            Self::Control => "CONTROL_PRONG",
            Self::Dual => "DUAL_PRONG",
        }
    }

    pub fn merge(self, other: ProngType) -> ProngType {
        if self == other {
            self
        } else {
            ProngType::Dual
        }
    }
}

/// Why a person qualifies
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualifyingReason {
    OwnershipThreshold,
    SeniorManagingOfficial,
    TrustSettlor,
    TrustTrustee,
    NamedBeneficiary,
    ResolvableClassMember,
    ProtectorDispositiveControl,
    CapitalCommitmentThreshold,
    GeneralPartnerControl,
    LookThroughControl,
}

impl QualifyingReason {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            Self::OwnershipThreshold => "OWNERSHIP_THRESHOLD",
            Self::SeniorManagingOfficial => "SENIOR_MANAGING_OFFICIAL",
            Self::TrustSettlor => "TRUST_SETTLOR",
            Self::TrustTrustee => "TRUST_TRUSTEE",
            Self::NamedBeneficiary => "NAMED_BENEFICIARY",
            Self::ResolvableClassMember => "RESOLVABLE_CLASS_MEMBER",
            Self::ProtectorDispositiveControl => "PROTECTOR_DISPOSITIVE_CONTROL",
            Self::CapitalCommitmentThreshold => "CAPITAL_COMMITMENT_THRESHOLD",
            Self::GeneralPartnerControl => "GENERAL_PARTNER_CONTROL",
            Self::LookThroughControl => "LOOK_THROUGH_CONTROL",
        }
    }
}

/// Method used to pick the single control-prong individual
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SelectionMethod {
    /// Unique holder of the highest-priority rank
    FincenHierarchyRule,
    /// Tie at the top rank resolved by the similar-functions hierarchy table
    SimilarFunctionsAnalysis,
    /// Tie resolved by the earliest recorded source record
    TieBreakerApplied,
    /// Selected through a look-through entity rather than the subject itself
    FallbackRule,
}

// ============================================================================
// DETERMINATIONS
// ============================================================================

/// A candidate considered by the control prong but not selected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternativeCandidate {
    pub person: EntityId,
    pub role_title: ControlRoleTitle,
    pub priority_rank: u8,
    pub not_selected_reason: String,
}

/// Audit trail of a control-prong selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlSelection {
    pub method: SelectionMethod,
    pub role_title: ControlRoleTitle,
    pub priority_rank: u8,
    pub regulatory_citation: String,
    pub candidates_evaluated: usize,
    pub alternatives: Vec<AlternativeCandidate>,
    pub rationale: String,
}

/// One qualifying natural person
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UboDetermination {
    pub person: EntityId,
    pub prong: ProngType,
    pub reasons: BTreeSet<QualifyingReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregated_percentage: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<ControlSelection>,
}

/// Trust beneficiary class whose members are not individually resolvable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDescriptor {
    pub trust: EntityId,
    pub definition: String,
}

/// Nested analysis of a non-person party (corporate trustee, entity partner...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecursiveAnalysis {
    pub entity: EntityId,
    pub via: String,
    pub workflow_type: WorkflowType,
    pub persons: Vec<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminus: Option<TerminusReason>,
    pub incomplete: bool,
}

/// A contributing ownership chain from the subject up to an ancestor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipPath {
    /// Subject first, ancestor last
    pub nodes: Vec<EntityId>,
    pub effective_pct: Decimal,
}

// ============================================================================
// FINDINGS & OUTCOMES
// ============================================================================

/// Non-fatal observations made during a computation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Finding {
    CycleDetected { path: Vec<EntityId> },
    DepthExceeded { at: EntityId, max_depth: u8 },
    TerminusReached { entity: EntityId, reason: TerminusReason },
    UnresolvedParty { entity: EntityId, detail: String },
    /// Person skipped because they are deceased or the entity is dissolved
    ExcludedParty { entity: EntityId, status: EntityStatus },
}

/// Fatal failure kinds for a single CBU
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    AmbiguousControlSelection,
    PercentageSumViolation,
    MissingControlRole,
    Timeout,
    ValidationRejected,
    UnknownSubject,
    IllegalTransition,
    /// Engine-side fault unrelated to the facts (worker abort, bad request)
    Internal,
}

/// The single terminus of a computation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UboOutcome {
    Resolved {
        ubos: Vec<UboDetermination>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        class_descriptors: Vec<ClassDescriptor>,
    },
    TerminatedNoUbo {
        terminus: EntityId,
        reason: TerminusReason,
    },
    Failed {
        kind: FailureKind,
        message: String,
    },
}

impl UboOutcome {
    pub fn state(&self) -> ResolutionState {
        match self {
            Self::Resolved { .. } => ResolutionState::Resolved,
            Self::TerminatedNoUbo { .. } => ResolutionState::TerminatedNoUbo,
            Self::Failed { .. } => ResolutionState::Failed,
        }
    }
}

/// Output record per CBU
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UboResult {
    pub run_id: Uuid,
    pub cbu_id: CbuId,
    pub subject_entity: EntityId,
    pub snapshot_version: u64,
    pub computed_at: DateTime<Utc>,
    pub workflow_type: WorkflowType,
    pub regulatory_framework: RegulatoryFramework,
    pub threshold_pct: Decimal,
    pub state: ResolutionState,
    pub state_trail: Vec<ResolutionState>,
    /// Ancestor -> aggregated ownership percentage
    pub aggregated: BTreeMap<EntityId, Decimal>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<OwnershipPath>,
    pub outcome: UboOutcome,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recursive: Vec<RecursiveAnalysis>,
    pub incomplete: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub findings: Vec<Finding>,
    pub dependencies: BTreeSet<EntityId>,
    pub rationale: String,
}

impl UboResult {
    pub fn ubos(&self) -> &[UboDetermination] {
        match &self.outcome {
            UboOutcome::Resolved { ubos, .. } => ubos,
            _ => &[],
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.outcome {
            UboOutcome::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

// ============================================================================
// RESULT DIFF
// ============================================================================

/// A field of one person's determination that differs between two runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UboChange {
    pub person: EntityId,
    pub field: String,
    pub old_value: String,
    pub new_value: String,
}

/// Differences between two results for the same CBU
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UboResultDiff {
    pub cbu_id: CbuId,
    pub run_a: Uuid,
    pub run_b: Uuid,
    pub version_a: u64,
    pub version_b: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_change: Option<(ResolutionState, ResolutionState)>,
    pub added: Vec<EntityId>,
    pub removed: Vec<EntityId>,
    pub changed: Vec<UboChange>,
}

impl UboResultDiff {
    pub fn is_empty(&self) -> bool {
        self.state_change.is_none()
            && self.added.is_empty()
            && self.removed.is_empty()
            && self.changed.is_empty()
    }
}

// ============================================================================
// VALIDATION FINDINGS
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    UnknownSubject,
    UnresolvedRoleReference,
    SicavNotUmbrella,
    SicavIsFundEntity,
    MissingUltimateClient,
    MultipleUltimateClients,
    MultipleAssetOwners,
    InactiveRoleEntity,
}

/// A referential problem found in a CBU's role assignments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFinding {
    pub cbu_id: CbuId,
    pub code: ValidationCode,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<CbuRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntityId>,
    pub message: String,
}
