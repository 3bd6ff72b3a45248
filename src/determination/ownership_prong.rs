//! STANDARD_CORPORATE workflow: ownership prong with control-prong fallback

use super::{select_single_individual, terminus_ancestor, Rules, Trace, UboEngine, UboSet, Verdict};
use crate::aggregation::Aggregation;
use crate::error::Result;
use ubo_types::{ClassDescriptor, Entity, Finding, ProngType, QualifyingReason, UboOutcome};

impl<'a> UboEngine<'a> {
    pub(super) fn evaluate_standard(
        &self,
        subject: &Entity,
        aggregation: &Aggregation,
        rules: &Rules,
        trace: &mut Trace,
    ) -> Result<Verdict> {
        let mut ubos = UboSet::default();

        // ------------------------------------------------------------------
        // 1. Natural persons at or above threshold
        // ------------------------------------------------------------------
        for share in aggregation.at_or_above(rules.threshold) {
            if share.is_natural_person && !self.excluded(&share.entity, trace) {
                ubos.add(
                    &share.entity,
                    ProngType::Ownership,
                    QualifyingReason::OwnershipThreshold,
                    Some(share.percentage),
                );
            }
        }
        if !ubos.is_empty() {
            let rationale = format!(
                "{} natural person(s) hold at least {}% of {} under {}",
                ubos.len(),
                rules.threshold,
                subject.id,
                rules.framework.to_db_str()
            );
            return Ok(resolved(ubos, Vec::new(), rationale));
        }

        // ------------------------------------------------------------------
        // 2. A qualifying ancestor that is itself a terminus
        // ------------------------------------------------------------------
        if let Some((terminus, reason)) =
            terminus_ancestor(self.snapshot(), aggregation, rules.threshold)
        {
            trace.finding(Finding::TerminusReached {
                entity: terminus.clone(),
                reason,
            });
            let rationale = format!(
                "{} holds at least {}% of {} and is {}; no natural person above it",
                terminus,
                rules.threshold,
                subject.id,
                reason.display_name()
            );
            return Ok((UboOutcome::TerminatedNoUbo { terminus, reason }, rationale));
        }

        // ------------------------------------------------------------------
        // 3. Control prong: single individual from the subject's roles
        // ------------------------------------------------------------------
        self.control_fallback(subject, rules, trace)
    }

    /// Select exactly one senior managing official of `subject`
    pub(super) fn control_fallback(
        &self,
        subject: &Entity,
        rules: &Rules,
        trace: &mut Trace,
    ) -> Result<Verdict> {
        let roles = self.control_candidates(&subject.id, trace);
        let pick = select_single_individual(
            &subject.id,
            &roles,
            &self.config().control_prong,
            &rules.citation,
        )?;
        let rationale = format!(
            "No natural person holds {}% or more of {}; control prong: {}",
            rules.threshold, subject.id, pick.selection.rationale
        );

        let mut ubos = UboSet::default();
        ubos.add_control(
            &pick.person,
            QualifyingReason::SeniorManagingOfficial,
            Some(pick.selection),
        );
        Ok(resolved(ubos, Vec::new(), rationale))
    }
}

pub(super) fn resolved(
    ubos: UboSet,
    class_descriptors: Vec<ClassDescriptor>,
    rationale: String,
) -> Verdict {
    (
        UboOutcome::Resolved {
            ubos: ubos.into_vec(),
            class_descriptors,
        },
        rationale,
    )
}
