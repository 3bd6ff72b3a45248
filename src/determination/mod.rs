//! UBO Determination Engine
//!
//! Drives one CBU through `PENDING -> AGGREGATING -> EVALUATING -> final`,
//! dispatching on the workflow chosen for the subject entity:
//!
//! | Subject type  | Workflow                 |
//! |---------------|--------------------------|
//! | TRUST         | TRUST_SPECIFIC           |
//! | PARTNERSHIP   | PARTNERSHIP_DUAL_PRONG   |
//! | anything else | STANDARD_CORPORATE       |
//!
//! Every computation ends in exactly one terminus: a UBO set, an explicit
//! no-UBO marker, or a failure. Errors never escape `determine`; they become
//! FAILED results carrying the failure kind and a rationale.

pub mod control_prong;
mod ownership_prong;
mod partnership;
pub mod state;
mod trust;

pub use control_prong::{select_single_individual, ControlPick};
pub use state::{validate_state_transition, ResolutionMachine, ALLOWED_TRANSITIONS};

use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::aggregation::{Aggregation, Aggregator};
use crate::config::UboConfig;
use crate::error::{Result, UboError};
use crate::graph_store::GraphSnapshot;
use crate::validator::{has_errors, validate_cbu};
use ubo_types::{
    Cbu, ControlRole, ControlSelection, EntityId, EntityType, Finding, ProngType,
    QualifyingReason, RecursiveAnalysis, RegulatoryFramework, ResolutionState, Severity,
    UboDetermination, UboOutcome, UboResult, WorkflowType,
};

/// Workflow for a subject when the CBU carries no override
pub fn workflow_for(entity_type: EntityType) -> WorkflowType {
    match entity_type {
        EntityType::Trust => WorkflowType::TrustSpecific,
        EntityType::Partnership => WorkflowType::PartnershipDualProng,
        _ => WorkflowType::StandardCorporate,
    }
}

/// Framework-resolved parameters for one computation
#[derive(Debug, Clone)]
pub(crate) struct Rules {
    pub framework: RegulatoryFramework,
    pub threshold: Decimal,
    pub citation: String,
}

/// Side output accumulated while evaluating
#[derive(Debug, Default)]
pub(crate) struct Trace {
    pub recursive: Vec<RecursiveAnalysis>,
    pub findings: Vec<Finding>,
    pub dependencies: BTreeSet<EntityId>,
    pub incomplete: bool,
}

impl Trace {
    pub fn finding(&mut self, finding: Finding) {
        if !self.findings.contains(&finding) {
            self.findings.push(finding);
        }
    }

    pub fn absorb(&mut self, aggregation: &Aggregation) {
        self.dependencies.extend(aggregation.visited.iter().cloned());
        for finding in &aggregation.findings {
            self.finding(finding.clone());
        }
        self.incomplete |= aggregation.incomplete;
    }

    pub fn unresolved(&mut self, entity: &EntityId, detail: impl Into<String>) {
        self.incomplete = true;
        self.finding(Finding::UnresolvedParty {
            entity: entity.clone(),
            detail: detail.into(),
        });
    }
}

/// Qualifying persons keyed by id, merging prongs and reasons per person
#[derive(Debug, Default)]
pub(crate) struct UboSet {
    by_person: BTreeMap<EntityId, UboDetermination>,
}

impl UboSet {
    pub fn add(
        &mut self,
        person: &EntityId,
        prong: ProngType,
        reason: QualifyingReason,
        percentage: Option<Decimal>,
    ) -> &mut UboDetermination {
        let entry = self
            .by_person
            .entry(person.clone())
            .or_insert_with(|| UboDetermination {
                person: person.clone(),
                prong,
                reasons: BTreeSet::new(),
                aggregated_percentage: None,
                selection: None,
            });
        entry.prong = entry.prong.merge(prong);
        entry.reasons.insert(reason);
        if let Some(pct) = percentage {
            entry.aggregated_percentage = Some(match entry.aggregated_percentage {
                Some(held) => held.max(pct),
                None => pct,
            });
        }
        entry
    }

    pub fn add_control(
        &mut self,
        person: &EntityId,
        reason: QualifyingReason,
        selection: Option<ControlSelection>,
    ) {
        let entry = self.add(person, ProngType::Control, reason, None);
        if entry.selection.is_none() {
            entry.selection = selection;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_person.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_person.len()
    }

    pub fn into_vec(self) -> Vec<UboDetermination> {
        self.by_person.into_values().collect()
    }
}

/// Outcome of a workflow plus its rationale
pub(crate) type Verdict = (UboOutcome, String);

/// Everything one computation accumulates before it becomes a `UboResult`
struct RunState {
    workflow: WorkflowType,
    rules: Rules,
    machine: ResolutionMachine,
    trace: Trace,
    aggregation: Option<Aggregation>,
}

#[derive(Clone, Copy)]
pub struct UboEngine<'a> {
    snapshot: &'a GraphSnapshot,
    config: &'a UboConfig,
    deadline: Option<Instant>,
}

impl<'a> UboEngine<'a> {
    pub fn new(snapshot: &'a GraphSnapshot, config: &'a UboConfig) -> Self {
        Self {
            snapshot,
            config,
            deadline: None,
        }
    }

    /// Explicit deadline; without one `ubo.deadline_ms` applies from the start of `determine`
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub(crate) fn snapshot(&self) -> &'a GraphSnapshot {
        self.snapshot
    }

    pub(crate) fn config(&self) -> &'a UboConfig {
        self.config
    }

    pub(crate) fn aggregator(&self) -> Aggregator<'a> {
        Aggregator::new(self.snapshot, self.config).with_deadline(self.deadline)
    }

    /// Resolve one CBU against the pinned snapshot
    pub fn determine(&self, cbu: &Cbu) -> UboResult {
        let started = Instant::now();
        let engine = UboEngine {
            deadline: self.deadline.or_else(|| {
                self.config
                    .deadline_ms
                    .map(|ms| started + Duration::from_millis(ms))
            }),
            ..*self
        };

        let mut state = self.begin(cbu);
        let (outcome, rationale) = match engine.run(cbu, &mut state) {
            Ok((outcome, rationale)) => match state.machine.advance(outcome.state()) {
                Ok(()) => (outcome, rationale),
                Err(e) => failed(&mut state.machine, e),
            },
            Err(e) => failed(&mut state.machine, e),
        };
        let result = self.finish(cbu, state, outcome, rationale);

        tracing::info!(
            "ubo.determine: cbu={} subject={} workflow={} state={:?} ubos={} incomplete={} in {}ms",
            result.cbu_id,
            result.subject_entity,
            result.workflow_type.to_db_str(),
            result.state,
            result.ubos().len(),
            result.incomplete,
            started.elapsed().as_millis()
        );
        result
    }

    /// FAILED result for a CBU whose computation never completed
    pub fn aborted(&self, cbu: &Cbu, error: UboError) -> UboResult {
        let mut state = self.begin(cbu);
        let (outcome, rationale) = failed(&mut state.machine, error);
        self.finish(cbu, state, outcome, rationale)
    }

    fn begin(&self, cbu: &Cbu) -> RunState {
        let framework = cbu
            .regulatory_framework
            .unwrap_or(self.config.regulatory_framework);
        let rules = Rules {
            framework,
            threshold: self.config.threshold_for(framework),
            citation: self.config.citation_for(framework).to_string(),
        };
        let subject_type = self.snapshot.entity(&cbu.subject).map(|e| e.entity_type);
        let workflow = cbu
            .workflow_override
            .or_else(|| subject_type.map(workflow_for))
            .unwrap_or(WorkflowType::StandardCorporate);

        let mut trace = Trace::default();
        trace.dependencies.insert(cbu.subject.clone());
        RunState {
            workflow,
            rules,
            machine: ResolutionMachine::new(),
            trace,
            aggregation: None,
        }
    }

    fn finish(
        &self,
        cbu: &Cbu,
        state: RunState,
        outcome: UboOutcome,
        rationale: String,
    ) -> UboResult {
        let RunState {
            workflow,
            rules,
            machine,
            trace,
            aggregation,
        } = state;
        UboResult {
            run_id: Uuid::new_v4(),
            cbu_id: cbu.id.clone(),
            subject_entity: cbu.subject.clone(),
            snapshot_version: self.snapshot.version(),
            computed_at: Utc::now(),
            workflow_type: workflow,
            regulatory_framework: rules.framework,
            threshold_pct: rules.threshold,
            state: machine.state(),
            state_trail: machine.into_trail(),
            aggregated: aggregation
                .as_ref()
                .map(Aggregation::percentages)
                .unwrap_or_default(),
            paths: aggregation
                .as_ref()
                .map(Aggregation::all_paths)
                .unwrap_or_default(),
            outcome,
            recursive: trace.recursive,
            incomplete: trace.incomplete,
            findings: trace.findings,
            dependencies: trace.dependencies,
            rationale,
        }
    }

    fn run(&self, cbu: &Cbu, state: &mut RunState) -> Result<Verdict> {
        // ------------------------------------------------------------------
        // 1. PENDING: subject must exist, role references must validate
        // ------------------------------------------------------------------
        let subject = self
            .snapshot
            .entity(&cbu.subject)
            .ok_or_else(|| UboError::UnknownEntity {
                entity: cbu.subject.clone(),
                context: "CBU subject",
            })?;

        state
            .trace
            .dependencies
            .extend(cbu.roles.iter().map(|r| r.entity.clone()));
        let findings = validate_cbu(self.snapshot, cbu);
        if has_errors(&findings) {
            return Err(UboError::ValidationRejected {
                cbu: cbu.id.clone(),
                findings: findings
                    .into_iter()
                    .filter(|f| f.severity == Severity::Error)
                    .collect(),
            });
        }

        // ------------------------------------------------------------------
        // 2. AGGREGATING
        // ------------------------------------------------------------------
        state.machine.advance(ResolutionState::Aggregating)?;
        let aggregation = self.aggregator().aggregate_default(&subject.id)?;
        state.trace.absorb(&aggregation);

        // ------------------------------------------------------------------
        // 3. EVALUATING
        // ------------------------------------------------------------------
        state.machine.advance(ResolutionState::Evaluating)?;

        let rules = &state.rules;
        let trace = &mut state.trace;
        let verdict = if let (Some(reason), false) =
            (subject.ubo_terminus, self.snapshot.has_owners(&subject.id))
        {
            trace.finding(Finding::TerminusReached {
                entity: subject.id.clone(),
                reason,
            });
            Ok((
                UboOutcome::TerminatedNoUbo {
                    terminus: subject.id.clone(),
                    reason,
                },
                format!(
                    "{} has no recorded owners and is marked {}: {}",
                    subject.id,
                    reason.to_db_str(),
                    reason.display_name()
                ),
            ))
        } else {
            match state.workflow {
                WorkflowType::TrustSpecific => {
                    self.evaluate_trust(subject, &aggregation, rules, trace)
                }
                WorkflowType::PartnershipDualProng => {
                    self.evaluate_partnership(subject, &aggregation, rules, trace)
                }
                WorkflowType::StandardCorporate | WorkflowType::RecursiveAnalysis => {
                    self.evaluate_standard(subject, &aggregation, rules, trace)
                }
            }
        };

        state.aggregation = Some(aggregation);
        verdict
    }

    /// True when `party` is a deceased person or a dissolved entity; records why
    pub(crate) fn excluded(&self, party: &EntityId, trace: &mut Trace) -> bool {
        match self.snapshot.entity(party) {
            Some(entity) if entity.status.is_terminal() => {
                trace.dependencies.insert(party.clone());
                trace.finding(Finding::ExcludedParty {
                    entity: party.clone(),
                    status: entity.status,
                });
                tracing::debug!("ubo.exclude: {} is {}", party, entity.status.to_db_str());
                true
            }
            _ => false,
        }
    }

    /// Control roles of `entity` still eligible for selection
    pub(crate) fn control_candidates(
        &self,
        entity: &EntityId,
        trace: &mut Trace,
    ) -> Vec<&'a ControlRole> {
        let roles: Vec<&'a ControlRole> = self.snapshot.control_roles_for(entity).collect();
        trace
            .dependencies
            .extend(roles.iter().map(|r| r.person.clone()));
        roles
            .into_iter()
            .filter(|r| !self.excluded(&r.person, trace))
            .collect()
    }

    /// Nested RECURSIVE_ANALYSIS of a non-person party (corporate trustee,
    /// corporate settlor, entity partner). Returns the natural persons found
    /// with their aggregated percentage in `entity` where ownership-based.
    ///
    /// Ambiguous or missing control data for the nested entity is recorded as
    /// an unresolved-party finding and marks the result incomplete rather than
    /// failing the whole CBU.
    pub(crate) fn look_through(
        &self,
        entity: &EntityId,
        via: &str,
        rules: &Rules,
        trace: &mut Trace,
    ) -> Result<Vec<(EntityId, Option<Decimal>)>> {
        trace.dependencies.insert(entity.clone());
        let Some(node) = self.snapshot.entity(entity) else {
            trace.unresolved(entity, format!("{} party is not in the graph", via));
            return Ok(Vec::new());
        };
        if self.excluded(entity, trace) {
            return Ok(Vec::new());
        }
        if node.is_natural_person() {
            return Ok(vec![(entity.clone(), None)]);
        }

        let mut analysis = RecursiveAnalysis {
            entity: entity.clone(),
            via: via.to_string(),
            workflow_type: WorkflowType::RecursiveAnalysis,
            persons: Vec::new(),
            terminus: None,
            incomplete: false,
        };

        if let (Some(reason), false) = (node.ubo_terminus, self.snapshot.has_owners(entity)) {
            analysis.terminus = Some(reason);
            trace.recursive.push(analysis);
            return Ok(Vec::new());
        }

        let depth = self.config.recursive_depth.saturating_sub(1).max(1);
        let nested = self.aggregator().aggregate(entity, depth)?;
        trace.absorb(&nested);
        analysis.incomplete = nested.incomplete;

        let mut persons: Vec<(EntityId, Option<Decimal>)> = nested
            .at_or_above(rules.threshold)
            .into_iter()
            .filter(|a| a.is_natural_person && !self.excluded(&a.entity, trace))
            .map(|a| (a.entity.clone(), Some(a.percentage)))
            .collect();

        if persons.is_empty() {
            if let Some(terminus) = terminus_ancestor(self.snapshot, &nested, rules.threshold) {
                analysis.terminus = Some(terminus.1);
            } else {
                let roles = self.control_candidates(entity, trace);
                match select_single_individual(
                    entity,
                    &roles,
                    &self.config.control_prong,
                    &rules.citation,
                ) {
                    Ok(pick) => persons.push((pick.person, None)),
                    Err(
                        e @ (UboError::AmbiguousControlSelection { .. }
                        | UboError::MissingControlRole { .. }),
                    ) => {
                        analysis.incomplete = true;
                        trace.unresolved(entity, e.to_string());
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        analysis.persons = persons.iter().map(|(p, _)| p.clone()).collect();
        tracing::debug!(
            "ubo.look-through: {} via {} found {} person(s)",
            entity,
            via,
            analysis.persons.len()
        );
        trace.recursive.push(analysis);
        Ok(persons)
    }
}

/// Terminus ancestor at or above threshold whose branch ended there
pub(crate) fn terminus_ancestor(
    snapshot: &GraphSnapshot,
    aggregation: &Aggregation,
    threshold: Decimal,
) -> Option<(EntityId, ubo_types::TerminusReason)> {
    aggregation
        .at_or_above(threshold)
        .into_iter()
        .find_map(|a| match a.terminus {
            Some(reason) if !snapshot.has_owners(&a.entity) => Some((a.entity.clone(), reason)),
            _ => None,
        })
}

fn failed(machine: &mut ResolutionMachine, error: UboError) -> Verdict {
    if let Err(illegal) = machine.fail() {
        tracing::error!("ubo.determine: {} while failing with {}", illegal, error);
    }
    tracing::warn!("ubo.determine: failed: {}", error);
    let message = error.to_string();
    (
        UboOutcome::Failed {
            kind: error.failure_kind(),
            message: message.clone(),
        },
        message,
    )
}
