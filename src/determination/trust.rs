//! TRUST_SPECIFIC workflow
//!
//! Settlor and trustees are always UBOs. Named beneficiaries are UBOs; class
//! beneficiaries whose members cannot be individually resolved are reported as
//! a class descriptor. A protector qualifies only with dispositive powers.
//! Non-person settlors, trustees and beneficiaries are looked through.

use super::ownership_prong::resolved;
use super::{Rules, Trace, UboEngine, UboSet, Verdict};
use crate::aggregation::Aggregation;
use crate::error::Result;
use rust_decimal::Decimal;
use ubo_types::{
    BeneficiaryKind, ClassDescriptor, Entity, EntityId, ProngType, QualifyingReason, TrustRole,
};

impl<'a> UboEngine<'a> {
    pub(super) fn evaluate_trust(
        &self,
        trust: &Entity,
        aggregation: &Aggregation,
        rules: &Rules,
        trace: &mut Trace,
    ) -> Result<Verdict> {
        let mut ubos = UboSet::default();
        let mut descriptors: Vec<ClassDescriptor> = Vec::new();

        for party in self.snapshot().trust_parties_for(&trust.id) {
            if let Some(id) = &party.party {
                trace.dependencies.insert(id.clone());
            }

            match (&party.role, &party.party) {
                (TrustRole::Settlor, Some(settlor)) => {
                    self.add_party(
                        &mut ubos,
                        settlor,
                        "SETTLOR",
                        ProngType::Control,
                        QualifyingReason::TrustSettlor,
                        None,
                        rules,
                        trace,
                    )?;
                }
                (TrustRole::Trustee { .. }, Some(trustee)) => {
                    self.add_party(
                        &mut ubos,
                        trustee,
                        "TRUSTEE",
                        ProngType::Control,
                        QualifyingReason::TrustTrustee,
                        None,
                        rules,
                        trace,
                    )?;
                }
                (TrustRole::Protector { powers }, Some(protector)) => {
                    if powers.iter().any(|p| p.is_dispositive()) {
                        self.add_party(
                            &mut ubos,
                            protector,
                            "PROTECTOR",
                            ProngType::Control,
                            QualifyingReason::ProtectorDispositiveControl,
                            None,
                            rules,
                            trace,
                        )?;
                    } else {
                        tracing::debug!(
                            "ubo.trust: protector {} of {} holds no dispositive power",
                            protector,
                            trust.id
                        );
                    }
                }
                (
                    TrustRole::Beneficiary {
                        kind: BeneficiaryKind::Class,
                        class_definition,
                        share,
                    },
                    member,
                ) => match (member, share) {
                    (Some(member), Some(share)) => {
                        self.add_party(
                            &mut ubos,
                            member,
                            "CLASS_BENEFICIARY",
                            ProngType::Ownership,
                            QualifyingReason::ResolvableClassMember,
                            Some(*share),
                            rules,
                            trace,
                        )?;
                    }
                    _ => descriptors.push(ClassDescriptor {
                        trust: trust.id.clone(),
                        definition: class_definition
                            .clone()
                            .unwrap_or_else(|| "unnamed beneficiary class".to_string()),
                    }),
                },
                (TrustRole::Beneficiary { share, .. }, Some(beneficiary)) => {
                    self.add_party(
                        &mut ubos,
                        beneficiary,
                        "BENEFICIARY",
                        ProngType::Ownership,
                        QualifyingReason::NamedBeneficiary,
                        *share,
                        rules,
                        trace,
                    )?;
                }
                (TrustRole::Beneficiary { class_definition, .. }, None) => {
                    descriptors.push(ClassDescriptor {
                        trust: trust.id.clone(),
                        definition: class_definition
                            .clone()
                            .unwrap_or_else(|| "unnamed beneficiary".to_string()),
                    });
                }
                (role, None) => {
                    trace.unresolved(
                        &trust.id,
                        format!("{} recorded without a party", role.label()),
                    );
                }
            }
        }

        if ubos.is_empty() && descriptors.is_empty() {
            tracing::debug!(
                "ubo.trust: {} has no resolvable parties, falling back to ownership prong",
                trust.id
            );
            return self.evaluate_standard(trust, aggregation, rules, trace);
        }

        let rationale = format!(
            "Trust {}: {} party UBO(s), {} class descriptor(s) under {}",
            trust.id,
            ubos.len(),
            descriptors.len(),
            rules.framework.to_db_str()
        );
        Ok(resolved(ubos, descriptors, rationale))
    }

    /// Add a natural-person party directly, or look through an entity party
    #[allow(clippy::too_many_arguments)]
    fn add_party(
        &self,
        ubos: &mut UboSet,
        party: &EntityId,
        via: &str,
        prong: ProngType,
        reason: QualifyingReason,
        share: Option<Decimal>,
        rules: &Rules,
        trace: &mut Trace,
    ) -> Result<()> {
        let is_person = self
            .snapshot()
            .entity(party)
            .map(Entity::is_natural_person)
            .unwrap_or(false);
        if is_person {
            if !self.excluded(party, trace) {
                ubos.add(party, prong, reason, share);
            }
            return Ok(());
        }

        for (person, _) in self.look_through(party, via, rules, trace)? {
            let entry = ubos.add(&person, prong, reason, None);
            entry.reasons.insert(QualifyingReason::LookThroughControl);
        }
        Ok(())
    }
}
