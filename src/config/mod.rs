//! Engine configuration
//!
//! An explicit `UboConfig` is passed into every computation; nothing reads
//! configuration from globals. Defaults match the registry values used when no
//! file is present.

mod loader;

pub use loader::ConfigLoader;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use crate::error::{Result, UboError};
use ubo_types::{LinkType, RegulatoryFramework};

/// Citation recorded when no framework override applies
pub const DEFAULT_CITATION: &str = "31_CFR_1010_230";

/// Accepted recursive depths for aggregation
pub const DEPTH_RANGE: RangeInclusive<u8> = 1..=10;

/// On-disk layout: everything lives under a top-level `ubo:` key
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UboConfigFile {
    #[serde(default)]
    pub ubo: UboConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UboConfig {
    /// Minimum aggregated percentage for the ownership prong
    pub ownership_threshold: Decimal,
    /// Maximum hops followed upward from a subject (1..=10)
    pub recursive_depth: u8,
    pub regulatory_framework: RegulatoryFramework,
    /// Rounding slack allowed above 100% before a sum is fatal
    pub sum_tolerance: Decimal,
    /// Link types that contribute to aggregation
    pub counted_link_types: Vec<LinkType>,
    pub control_prong: ControlProngConfig,
    /// Per-framework threshold/citation overrides
    pub frameworks: BTreeMap<RegulatoryFramework, FrameworkRule>,
    /// Upper bound on concurrently resolving CBUs
    pub max_parallel: usize,
    /// Per-CBU deadline; none means unbounded
    pub deadline_ms: Option<u64>,
}

impl Default for UboConfig {
    fn default() -> Self {
        Self {
            ownership_threshold: Decimal::new(2500, 2),
            recursive_depth: 5,
            regulatory_framework: RegulatoryFramework::Eu5mld,
            sum_tolerance: Decimal::new(1, 2),
            counted_link_types: LinkType::ALL.to_vec(),
            control_prong: ControlProngConfig::default(),
            frameworks: BTreeMap::new(),
            max_parallel: 4,
            deadline_ms: Some(30_000),
        }
    }
}

/// FinCEN single-individual selection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlProngConfig {
    /// Role terms in descending seniority, matched against titles and function text
    pub hierarchy: Vec<String>,
    /// Secondary terms that identify similar-functions responsibilities
    pub similar_functions: Vec<String>,
    /// Break remaining ties by the earliest recorded source record
    pub creation_order_fallback: bool,
    pub citation: String,
}

impl Default for ControlProngConfig {
    fn default() -> Self {
        Self {
            hierarchy: [
                "CEO",
                "CFO",
                "COO",
                "PRESIDENT",
                "GENERAL_PARTNER",
                "MANAGING_MEMBER",
                "SIMILAR_FUNCTIONS",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            similar_functions: ["STRATEGIC_DECISIONS", "BOARD_REPORTING", "OPERATIONAL_OVERSIGHT"]
                .into_iter()
                .map(String::from)
                .collect(),
            creation_order_fallback: true,
            citation: DEFAULT_CITATION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ownership_threshold: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation: Option<String>,
}

impl UboConfig {
    pub fn validate(&self) -> Result<()> {
        if self.ownership_threshold < Decimal::ZERO
            || self.ownership_threshold > Decimal::ONE_HUNDRED
        {
            return Err(UboError::Config(format!(
                "ubo.ownership_threshold {} must be within 0..=100",
                self.ownership_threshold
            )));
        }
        if !DEPTH_RANGE.contains(&self.recursive_depth) {
            return Err(UboError::Config(format!(
                "ubo.recursive_depth {} must be within {}..={}",
                self.recursive_depth,
                DEPTH_RANGE.start(),
                DEPTH_RANGE.end()
            )));
        }
        if self.sum_tolerance < Decimal::ZERO {
            return Err(UboError::Config("ubo.sum_tolerance must not be negative".into()));
        }
        if self.counted_link_types.is_empty() {
            return Err(UboError::Config("ubo.counted_link_types is empty".into()));
        }
        if self.control_prong.hierarchy.is_empty() {
            return Err(UboError::Config("ubo.control_prong.hierarchy is empty".into()));
        }
        if self.max_parallel == 0 {
            return Err(UboError::Config("ubo.max_parallel must be at least 1".into()));
        }
        for (framework, rule) in &self.frameworks {
            if let Some(t) = rule.ownership_threshold {
                if t < Decimal::ZERO || t > Decimal::ONE_HUNDRED {
                    return Err(UboError::Config(format!(
                        "threshold {} for {} must be within 0..=100",
                        t,
                        framework.to_db_str()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn threshold_for(&self, framework: RegulatoryFramework) -> Decimal {
        self.frameworks
            .get(&framework)
            .and_then(|r| r.ownership_threshold)
            .unwrap_or(self.ownership_threshold)
    }

    pub fn citation_for(&self, framework: RegulatoryFramework) -> &str {
        self.frameworks
            .get(&framework)
            .and_then(|r| r.citation.as_deref())
            .unwrap_or(&self.control_prong.citation)
    }

    pub fn counts(&self, link_type: LinkType) -> bool {
        self.counted_link_types.contains(&link_type)
    }

    pub fn with_threshold(mut self, threshold: Decimal) -> Self {
        self.ownership_threshold = threshold;
        self
    }

    pub fn with_depth(mut self, depth: u8) -> Self {
        self.recursive_depth = depth;
        self
    }
}
