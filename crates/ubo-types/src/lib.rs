//! Shared UBO Types
//!
//! This crate is the single source of truth for every type that crosses the engine
//! boundary: ingestion facts going in, `UboResult` audit records coming out.
//!
//! ## Rules
//!
//! 1. Enums serialize as SCREAMING_SNAKE_CASE registry codes
//! 2. Tagged enums for polymorphic records: `#[serde(tag = "...")]`
//! 3. Percentages are `rust_decimal::Decimal`, never floats

pub mod cbu;
pub mod entity;
pub mod ownership;
pub mod parties;
pub mod result;

pub use cbu::*;
pub use entity::*;
pub use ownership::*;
pub use parties::*;
pub use result::*;
