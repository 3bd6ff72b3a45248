//! PARTNERSHIP_DUAL_PRONG workflow
//!
//! Ownership prong is weighted by capital commitment; control prong is the
//! general or managing partners holding a control mechanism. A person may
//! qualify under both, in which case the prong is recorded as DUAL.

use std::collections::BTreeMap;

use super::ownership_prong::resolved;
use super::{select_single_individual, Rules, Trace, UboEngine, UboSet, Verdict};
use crate::aggregation::{round_pct, Aggregation};
use crate::error::{Result, UboError};
use rust_decimal::Decimal;
use ubo_types::{
    Entity, EntityId, PartnershipParty, ProngType, QualifyingReason, RecursiveAnalysis,
    SelectionMethod, WorkflowType,
};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

impl<'a> UboEngine<'a> {
    pub(super) fn evaluate_partnership(
        &self,
        partnership: &Entity,
        aggregation: &Aggregation,
        rules: &Rules,
        trace: &mut Trace,
    ) -> Result<Verdict> {
        let parties: Vec<&PartnershipParty> = self
            .snapshot()
            .partnership_parties_for(&partnership.id)
            .collect();
        trace
            .dependencies
            .extend(parties.iter().map(|p| p.partner.clone()));

        let mut ubos = UboSet::default();

        // ------------------------------------------------------------------
        // 1. Ownership prong
        // ------------------------------------------------------------------
        let total: Decimal = parties.iter().map(|p| p.capital_commitment).sum();
        if total > Decimal::ZERO {
            for (person, pct) in self.commitment_shares(&parties, total, rules, trace)? {
                if pct >= rules.threshold {
                    ubos.add(
                        &person,
                        ProngType::Ownership,
                        QualifyingReason::CapitalCommitmentThreshold,
                        Some(pct),
                    );
                }
            }
        } else {
            tracing::debug!(
                "ubo.partnership: {} has no recorded commitments, using graph aggregation",
                partnership.id
            );
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
        }

        // ------------------------------------------------------------------
        // 2. Control prong
        // ------------------------------------------------------------------
        for party in parties.iter().filter(|p| p.has_control()) {
            self.general_partner_control(&mut ubos, party, rules, trace)?;
        }

        // ------------------------------------------------------------------
        // 3. Neither prong produced anyone: standard rules on the partnership
        // ------------------------------------------------------------------
        if ubos.is_empty() {
            return self.evaluate_standard(partnership, aggregation, rules, trace);
        }

        let rationale = format!(
            "Partnership {}: {} UBO(s) across ownership (commitment total {}) and control prongs under {}",
            partnership.id,
            ubos.len(),
            total,
            rules.framework.to_db_str()
        );
        Ok(resolved(ubos, Vec::new(), rationale))
    }

    /// Commitment-weighted share per natural person, looking through entity
    /// partners. Entity partners below threshold cannot yield a qualifying
    /// person and are not looked through.
    fn commitment_shares(
        &self,
        parties: &[&PartnershipParty],
        total: Decimal,
        rules: &Rules,
        trace: &mut Trace,
    ) -> Result<BTreeMap<EntityId, Decimal>> {
        let mut shares: BTreeMap<EntityId, Decimal> = BTreeMap::new();

        for party in parties {
            // Commitment of an excluded partner stays in the total
            if self.excluded(&party.partner, trace) {
                continue;
            }
            let share = party.capital_commitment * HUNDRED / total;
            let is_person = self
                .snapshot()
                .entity(&party.partner)
                .map(Entity::is_natural_person)
                .unwrap_or(false);

            if is_person {
                *shares.entry(party.partner.clone()).or_default() += share;
                continue;
            }
            if share < rules.threshold {
                continue;
            }

            for (person, nested) in self.look_through(&party.partner, "PARTNER", rules, trace)? {
                if let Some(nested) = nested {
                    *shares.entry(person).or_default() += share * nested / HUNDRED;
                }
            }
        }

        Ok(shares
            .into_iter()
            .map(|(person, pct)| (person, round_pct(pct)))
            .collect())
    }

    fn general_partner_control(
        &self,
        ubos: &mut UboSet,
        party: &PartnershipParty,
        rules: &Rules,
        trace: &mut Trace,
    ) -> Result<()> {
        let Some(partner) = self.snapshot().entity(&party.partner) else {
            trace.unresolved(&party.partner, "general partner is not in the graph");
            return Ok(());
        };
        if self.excluded(&partner.id, trace) {
            return Ok(());
        }
        if partner.is_natural_person() {
            ubos.add_control(&partner.id, QualifyingReason::GeneralPartnerControl, None);
            return Ok(());
        }

        // Entity GP: its own senior managing official controls the partnership
        let roles = self.control_candidates(&partner.id, trace);

        let mut analysis = RecursiveAnalysis {
            entity: partner.id.clone(),
            via: "GENERAL_PARTNER".to_string(),
            workflow_type: WorkflowType::RecursiveAnalysis,
            persons: Vec::new(),
            terminus: None,
            incomplete: false,
        };

        match select_single_individual(
            &partner.id,
            &roles,
            &self.config().control_prong,
            &rules.citation,
        ) {
            Ok(mut pick) => {
                pick.selection.method = SelectionMethod::FallbackRule;
                analysis.persons.push(pick.person.clone());
                ubos.add_control(
                    &pick.person,
                    QualifyingReason::GeneralPartnerControl,
                    Some(pick.selection),
                );
                ubos.add(
                    &pick.person,
                    ProngType::Control,
                    QualifyingReason::LookThroughControl,
                    None,
                );
            }
            Err(
                e @ (UboError::AmbiguousControlSelection { .. }
                | UboError::MissingControlRole { .. }),
            ) => {
                analysis.incomplete = true;
                trace.unresolved(&partner.id, e.to_string());
            }
            Err(e) => return Err(e),
        }

        trace.recursive.push(analysis);
        Ok(())
    }
}
