//! UBO Engine - ownership aggregation and ultimate beneficial owner resolution
//!
//! Resolves, for each Client Business Unit (CBU), the natural persons who
//! ultimately own or control its subject entity, with a full audit trail of
//! how each conclusion was reached.
//!
//! ## Flow
//!
//! Facts -> GraphStore (versioned log) -> pinned GraphSnapshot
//!       -> Aggregator (path-summed percentages)
//!       -> UboEngine (workflow dispatch, control prong, terminus handling)
//!       -> UboResult
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ubo_engine::{GraphStore, UboConfig, UboResolutionService};
//! use ubo_types::CbuId;
//!
//! let store = Arc::new(GraphStore::new());
//! let service = UboResolutionService::new(store, UboConfig::default());
//! let result = service.resolve_cbu(&CbuId::new("CBU-001"));
//! ```

// Core error handling
pub mod error;

// Engine configuration and YAML loader
pub mod config;

// Versioned fact log and snapshots
pub mod graph_store;

// Role/reference validation for CBUs
pub mod validator;

// Path-summed ownership aggregation
pub mod aggregation;

// Workflow dispatch, control prong, state machine
pub mod determination;

// Comparison of two results for one CBU
pub mod diff;

// YAML fact bundles
pub mod ingest;

// Batch resolution over a pinned snapshot
pub mod service;

pub use aggregation::{round_pct, Aggregation, Aggregator, AncestorShare};
pub use config::{ConfigLoader, ControlProngConfig, UboConfig};
pub use determination::{workflow_for, UboEngine};
pub use diff::diff_results;
pub use error::{Result, UboError};
pub use graph_store::{Applied, Direction, EdgeOutcome, Fact, GraphSnapshot, GraphStore};
pub use ingest::{FactBundle, IngestReport};
pub use service::UboResolutionService;
pub use validator::{validate_batch, validate_cbu};
