//! Error types for the UBO engine
//!
//! Fatal errors abort a single store operation or a single CBU computation.
//! Cycles, depth limits and validation findings are not errors: they are
//! reported as findings on the result.

use rust_decimal::Decimal;
use thiserror::Error;

use ubo_types::{CbuId, EdgeId, EntityId, FailureKind, ResolutionState, ValidationFinding};

pub type Result<T> = std::result::Result<T, UboError>;

/// Main error type for the engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UboError {
    #[error("Entity '{entity}' already exists with {field} '{existing}', refusing '{incoming}'")]
    DuplicateConflict {
        entity: EntityId,
        field: &'static str,
        existing: String,
        incoming: String,
    },

    #[error("Unknown entity '{entity}' referenced as {context}")]
    UnknownEntity {
        entity: EntityId,
        context: &'static str,
    },

    #[error("Unknown CBU '{0}'")]
    UnknownCbu(CbuId),

    #[error("Unknown edge '{0}' in supersedes reference")]
    UnknownEdge(EdgeId),

    #[error("Percentage {value} out of range for edge {owner} -> {owned}")]
    InvalidPercentage {
        owner: EntityId,
        owned: EntityId,
        value: Decimal,
    },

    #[error("Priority rank {rank} out of range 1..=10 for {person} on {entity}")]
    InvalidPriorityRank {
        entity: EntityId,
        person: EntityId,
        rank: u8,
    },

    #[error("Capital commitment {value} of {partner} in {partnership} is negative")]
    InvalidCommitment {
        partnership: EntityId,
        partner: EntityId,
        value: Decimal,
    },

    #[error("{entity} must be a natural person to act as {context}")]
    NotNaturalPerson {
        entity: EntityId,
        context: &'static str,
    },

    #[error("Ambiguous control selection for {entity} at rank {rank}: {candidates:?}")]
    AmbiguousControlSelection {
        entity: EntityId,
        rank: u8,
        candidates: Vec<EntityId>,
    },

    #[error("Aggregated ownership of {ancestor} in {subject} is {total}%, above 100%")]
    PercentageSumViolation {
        subject: EntityId,
        ancestor: EntityId,
        total: Decimal,
    },

    #[error("No control role recorded for {entity}")]
    MissingControlRole { entity: EntityId },

    #[error("Computation for {subject} exceeded its deadline after {elapsed_ms}ms")]
    Timeout { subject: EntityId, elapsed_ms: u64 },

    #[error("CBU '{cbu}' rejected with {} error finding(s)", findings.len())]
    ValidationRejected {
        cbu: CbuId,
        findings: Vec<ValidationFinding>,
    },

    #[error("Illegal state transition {from:?} -> {to:?}")]
    IllegalTransition {
        from: ResolutionState,
        to: ResolutionState,
    },

    #[error("Recursive depth {depth} outside {min}..={max}")]
    InvalidDepth { depth: u8, min: u8, max: u8 },

    #[error("Cannot diff results of different CBUs '{left}' and '{right}'")]
    DiffMismatch { left: CbuId, right: CbuId },

    #[error("Resolution worker for CBU '{cbu}' aborted: {detail}")]
    WorkerAborted { cbu: CbuId, detail: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl UboError {
    /// Failure kind recorded on a FAILED result, for errors that end a computation
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::AmbiguousControlSelection { .. } => FailureKind::AmbiguousControlSelection,
            Self::PercentageSumViolation { .. } => FailureKind::PercentageSumViolation,
            Self::MissingControlRole { .. } => FailureKind::MissingControlRole,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::ValidationRejected { .. } => FailureKind::ValidationRejected,
            Self::IllegalTransition { .. } => FailureKind::IllegalTransition,
            Self::UnknownEntity { .. } | Self::UnknownCbu(_) => FailureKind::UnknownSubject,
            // Fact-level rejections never reach a computation; if one does it is an engine fault
            Self::UnknownEdge(_)
            | Self::InvalidCommitment { .. }
            | Self::DuplicateConflict { .. }
            | Self::InvalidPercentage { .. }
            | Self::InvalidPriorityRank { .. }
            | Self::NotNaturalPerson { .. }
            | Self::InvalidDepth { .. }
            | Self::DiffMismatch { .. }
            | Self::WorkerAborted { .. }
            | Self::Config(_) => FailureKind::Internal,
        }
    }
}
