//! Aggregation Engine
//!
//! For a subject entity, finds every ancestor reachable upward through counted
//! ownership/control edges and computes its aggregated ownership:
//!
//! - parallel edges on the same owner/owned pair are summed first
//! - each path contributes the product of its edge fractions
//! - contributions are summed across paths and capped at 100.00
//!
//! A path revisiting an entity is discarded with a `CycleDetected` finding. A
//! branch that would exceed `max_depth` hops stops with `DepthExceeded` and the
//! aggregation is marked incomplete. Full precision is kept while summing;
//! reported percentages are rounded to two decimals.

use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use crate::config::{UboConfig, DEPTH_RANGE};
use crate::error::{Result, UboError};
use crate::graph_store::{Direction, GraphSnapshot};
use ubo_types::{EntityId, Finding, OwnershipPath, TerminusReason};

/// Aggregated position of one ancestor relative to the subject
#[derive(Debug, Clone, PartialEq)]
pub struct AncestorShare {
    pub entity: EntityId,
    /// Rounded to two decimals, capped at 100.00
    pub percentage: Decimal,
    /// Minimum hop distance from the subject
    pub distance: u8,
    pub is_natural_person: bool,
    pub terminus: Option<TerminusReason>,
    pub paths: Vec<OwnershipPath>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub subject: EntityId,
    pub max_depth: u8,
    pub ancestors: BTreeMap<EntityId, AncestorShare>,
    pub findings: Vec<Finding>,
    pub incomplete: bool,
    /// Every entity whose facts were read
    pub visited: BTreeSet<EntityId>,
}

impl Aggregation {
    pub fn percentage_of(&self, ancestor: &EntityId) -> Option<Decimal> {
        self.ancestors.get(ancestor).map(|a| a.percentage)
    }

    /// Ancestor -> aggregated percentage
    pub fn percentages(&self) -> BTreeMap<EntityId, Decimal> {
        self.ancestors
            .iter()
            .map(|(id, a)| (id.clone(), a.percentage))
            .collect()
    }

    /// Ancestors at or above `threshold`, highest share first, ties by id
    pub fn at_or_above(&self, threshold: Decimal) -> Vec<&AncestorShare> {
        let mut hits: Vec<&AncestorShare> = self
            .ancestors
            .values()
            .filter(|a| a.percentage >= threshold)
            .collect();
        hits.sort_by(|a, b| {
            b.percentage
                .cmp(&a.percentage)
                .then_with(|| a.entity.cmp(&b.entity))
        });
        hits
    }

    pub fn all_paths(&self) -> Vec<OwnershipPath> {
        self.ancestors
            .values()
            .flat_map(|a| a.paths.iter().cloned())
            .collect()
    }
}

/// Running totals before capping and rounding
struct Accumulator {
    raw: Decimal,
    distance: u8,
    paths: Vec<OwnershipPath>,
}

pub struct Aggregator<'a> {
    snapshot: &'a GraphSnapshot,
    config: &'a UboConfig,
    deadline: Option<Instant>,
    started: Instant,
}

impl<'a> Aggregator<'a> {
    pub fn new(snapshot: &'a GraphSnapshot, config: &'a UboConfig) -> Self {
        Self {
            snapshot,
            config,
            deadline: None,
            started: Instant::now(),
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Aggregate with the configured `recursive_depth`
    pub fn aggregate_default(&self, subject: &EntityId) -> Result<Aggregation> {
        self.aggregate(subject, self.config.recursive_depth)
    }

    pub fn aggregate(&self, subject: &EntityId, max_depth: u8) -> Result<Aggregation> {
        if !DEPTH_RANGE.contains(&max_depth) {
            return Err(UboError::InvalidDepth {
                depth: max_depth,
                min: *DEPTH_RANGE.start(),
                max: *DEPTH_RANGE.end(),
            });
        }
        if !self.snapshot.contains(subject) {
            return Err(UboError::UnknownEntity {
                entity: subject.clone(),
                context: "aggregation subject",
            });
        }

        let mut acc: BTreeMap<EntityId, Accumulator> = BTreeMap::new();
        let mut findings: Vec<Finding> = Vec::new();
        let mut incomplete = false;
        let mut visited: BTreeSet<EntityId> = BTreeSet::new();
        visited.insert(subject.clone());

        // DFS with path-based cycle detection
        // Stack entries: (current entity, path from subject, cumulative fraction)
        let mut stack: Vec<(EntityId, Vec<EntityId>, Decimal)> = Vec::new();
        self.check_deadline(subject)?;
        for (owner, fraction) in self.owner_fractions(subject).into_iter().rev() {
            if &owner == subject {
                push_finding(
                    &mut findings,
                    Finding::CycleDetected {
                        path: vec![subject.clone(), owner],
                    },
                );
                continue;
            }
            stack.push((owner.clone(), vec![subject.clone(), owner], fraction));
        }

        while let Some((current, path, cumulative)) = stack.pop() {
            self.check_deadline(subject)?;
            visited.insert(current.clone());

            let hops = (path.len() - 1) as u8;
            let entry = acc.entry(current.clone()).or_insert_with(|| Accumulator {
                raw: Decimal::ZERO,
                distance: hops,
                paths: Vec::new(),
            });
            entry.raw += cumulative * Decimal::ONE_HUNDRED;
            entry.distance = entry.distance.min(hops);
            entry.paths.push(OwnershipPath {
                nodes: path.clone(),
                effective_pct: round_pct(cumulative * Decimal::ONE_HUNDRED),
            });

            let Some(entity) = self.snapshot.entity(&current) else {
                continue;
            };
            if entity.is_natural_person() {
                continue;
            }

            let owners = self.owner_fractions(&current);
            if owners.is_empty() {
                if let Some(reason) = entity.ubo_terminus {
                    push_finding(
                        &mut findings,
                        Finding::TerminusReached {
                            entity: current.clone(),
                            reason,
                        },
                    );
                }
                continue;
            }

            for (owner, fraction) in owners.into_iter().rev() {
                if path.contains(&owner) {
                    let mut cycle_path = path.clone();
                    cycle_path.push(owner.clone());
                    tracing::warn!(
                        "ubo.aggregate: cycle detected in ownership graph: {:?}",
                        cycle_path.iter().map(EntityId::as_str).collect::<Vec<_>>()
                    );
                    push_finding(&mut findings, Finding::CycleDetected { path: cycle_path });
                    continue;
                }

                if hops >= max_depth {
                    tracing::warn!(
                        "ubo.aggregate: max depth {} reached at entity {}",
                        max_depth,
                        current
                    );
                    visited.insert(owner);
                    incomplete = true;
                    push_finding(
                        &mut findings,
                        Finding::DepthExceeded {
                            at: current.clone(),
                            max_depth,
                        },
                    );
                    continue;
                }

                let mut next_path = path.clone();
                next_path.push(owner.clone());
                stack.push((owner, next_path, cumulative * fraction));
            }
        }

        // ------------------------------------------------------------------
        // Sum check, cap and round
        // ------------------------------------------------------------------
        let ceiling = Decimal::ONE_HUNDRED + self.config.sum_tolerance;
        let mut ancestors = BTreeMap::new();
        for (id, mut entry) in acc {
            if entry.raw > ceiling {
                return Err(UboError::PercentageSumViolation {
                    subject: subject.clone(),
                    ancestor: id,
                    total: round_pct(entry.raw),
                });
            }
            let capped = entry.raw.min(Decimal::ONE_HUNDRED);
            entry.paths.sort_by(|a, b| a.nodes.cmp(&b.nodes));

            let entity = self.snapshot.entity(&id);
            ancestors.insert(
                id.clone(),
                AncestorShare {
                    entity: id,
                    percentage: round_pct(capped),
                    distance: entry.distance,
                    is_natural_person: entity.map(|e| e.is_natural_person()).unwrap_or(false),
                    terminus: entity.and_then(|e| e.ubo_terminus),
                    paths: entry.paths,
                },
            );
        }

        tracing::debug!(
            "ubo.aggregate: subject={} ancestors={} findings={} incomplete={}",
            subject,
            ancestors.len(),
            findings.len(),
            incomplete
        );

        Ok(Aggregation {
            subject: subject.clone(),
            max_depth,
            ancestors,
            findings,
            incomplete,
            visited,
        })
    }

    /// Counted owner edges of `entity`, parallel edges summed, as fractions
    fn owner_fractions(&self, entity: &EntityId) -> Vec<(EntityId, Decimal)> {
        let mut by_owner: BTreeMap<EntityId, Decimal> = BTreeMap::new();
        for (owner, edge) in self.snapshot.neighbors_of(entity, Direction::Owners) {
            if !self.config.counts(edge.link_type) {
                continue;
            }
            *by_owner.entry(owner.id.clone()).or_insert(Decimal::ZERO) += edge.fraction();
        }
        by_owner.into_iter().collect()
    }

    fn check_deadline(&self, subject: &EntityId) -> Result<()> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(UboError::Timeout {
                subject: subject.clone(),
                elapsed_ms: self.started.elapsed().as_millis() as u64,
            }),
            _ => Ok(()),
        }
    }
}

fn push_finding(findings: &mut Vec<Finding>, finding: Finding) {
    if !findings.contains(&finding) {
        findings.push(finding);
    }
}

pub fn round_pct(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
