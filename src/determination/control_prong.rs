//! FinCEN control prong: single-individual selection (31 CFR 1010.230)
//!
//! Exactly one natural person with significant responsibility to control,
//! manage or direct the entity is selected. Candidates are ordered by:
//!
//! 1. ascending `priority_rank`
//! 2. position of the role title, or a term in `functions_performed`, in the
//!    configured hierarchy; then the similar-functions term list
//! 3. earliest `recorded_at` (when `creation_order_fallback` is on)
//!
//! Anything still tied is `AmbiguousControlSelection`.

use std::collections::BTreeMap;

use crate::config::ControlProngConfig;
use crate::error::{Result, UboError};
use ubo_types::{AlternativeCandidate, ControlRole, ControlSelection, EntityId, SelectionMethod};

/// Selected person plus the audit trail of how they were chosen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPick {
    pub person: EntityId,
    pub selection: ControlSelection,
}

/// (hierarchy position, similar-functions position); lower is more senior
type Seniority = (usize, usize);

struct Candidate<'a> {
    role: &'a ControlRole,
    seniority: Seniority,
}

pub fn select_single_individual(
    entity: &EntityId,
    roles: &[&ControlRole],
    config: &ControlProngConfig,
    citation: &str,
) -> Result<ControlPick> {
    // ------------------------------------------------------------------
    // 1. One candidate per person, keeping their most senior record
    // ------------------------------------------------------------------
    let mut by_person: BTreeMap<&EntityId, Candidate<'_>> = BTreeMap::new();
    for role in roles
        .iter()
        .copied()
        .filter(|r| r.has_significant_responsibility)
    {
        let candidate = Candidate {
            role,
            seniority: seniority(role, config),
        };
        match by_person.get(&role.person) {
            Some(held) if sort_key(held) <= sort_key(&candidate) => {}
            _ => {
                by_person.insert(&role.person, candidate);
            }
        }
    }
    if by_person.is_empty() {
        return Err(UboError::MissingControlRole {
            entity: entity.clone(),
        });
    }

    // ------------------------------------------------------------------
    // 2. Sort by priority, then person id for deterministic output
    // ------------------------------------------------------------------
    let mut candidates: Vec<Candidate<'_>> = by_person.into_values().collect();
    candidates.sort_by(|a, b| {
        a.role
            .priority_rank
            .cmp(&b.role.priority_rank)
            .then_with(|| a.role.person.cmp(&b.role.person))
    });
    let evaluated = candidates.len();
    let top_rank = candidates[0].role.priority_rank;

    let mut tied: Vec<&Candidate<'_>> = candidates
        .iter()
        .filter(|c| c.role.priority_rank == top_rank)
        .collect();
    let mut method = SelectionMethod::FincenHierarchyRule;

    // ------------------------------------------------------------------
    // 3. Similar-functions hierarchy
    // ------------------------------------------------------------------
    if tied.len() > 1 {
        let best = tied.iter().map(|c| c.seniority).min().unwrap_or((0, 0));
        tied.retain(|c| c.seniority == best);
        method = SelectionMethod::SimilarFunctionsAnalysis;
    }

    // ------------------------------------------------------------------
    // 4. Earliest source record
    // ------------------------------------------------------------------
    if tied.len() > 1 && config.creation_order_fallback {
        if let Some(earliest) = tied.iter().map(|c| c.role.recorded_at).min() {
            tied.retain(|c| c.role.recorded_at == earliest);
        }
        method = SelectionMethod::TieBreakerApplied;
    }

    if tied.len() != 1 {
        let persons: Vec<EntityId> = tied.iter().map(|c| c.role.person.clone()).collect();
        tracing::warn!(
            "ubo.control-prong: {} ambiguous at rank {} between {:?}",
            entity,
            top_rank,
            persons.iter().map(EntityId::as_str).collect::<Vec<_>>()
        );
        return Err(UboError::AmbiguousControlSelection {
            entity: entity.clone(),
            rank: top_rank,
            candidates: persons,
        });
    }

    let chosen = tied[0];
    let alternatives = candidates
        .iter()
        .filter(|c| c.role.person != chosen.role.person)
        .map(|c| AlternativeCandidate {
            person: c.role.person.clone(),
            role_title: c.role.role_title,
            priority_rank: c.role.priority_rank,
            not_selected_reason: not_selected_reason(c, chosen),
        })
        .collect();

    let rationale = format!(
        "{} selected as {} at priority rank {} under {:?} from {} candidate(s) for {}",
        chosen.role.person,
        chosen.role.role_title.to_db_str(),
        top_rank,
        method,
        evaluated,
        entity
    );
    tracing::debug!("ubo.control-prong: {}", rationale);

    Ok(ControlPick {
        person: chosen.role.person.clone(),
        selection: ControlSelection {
            method,
            role_title: chosen.role.role_title,
            priority_rank: top_rank,
            regulatory_citation: citation.to_string(),
            candidates_evaluated: evaluated,
            alternatives,
            rationale,
        },
    })
}

fn sort_key<'a>(c: &Candidate<'a>) -> (u8, Seniority, chrono::DateTime<chrono::Utc>) {
    (c.role.priority_rank, c.seniority, c.role.recorded_at)
}

fn not_selected_reason(candidate: &Candidate<'_>, chosen: &Candidate<'_>) -> String {
    if candidate.role.priority_rank > chosen.role.priority_rank {
        format!("lower priority rank {}", candidate.role.priority_rank)
    } else if candidate.seniority > chosen.seniority {
        "ranked below in the similar-functions hierarchy".to_string()
    } else {
        "later source record".to_string()
    }
}

fn seniority(role: &ControlRole, config: &ControlProngConfig) -> Seniority {
    let tokens = tokenize(&role.functions_performed);
    let title = role.role_title.to_db_str();

    let hierarchy = config
        .hierarchy
        .iter()
        .position(|term| term == title || contains_term(&tokens, term))
        .unwrap_or(config.hierarchy.len());
    let similar = config
        .similar_functions
        .iter()
        .position(|term| contains_term(&tokens, term))
        .unwrap_or(config.similar_functions.len());
    (hierarchy, similar)
}

/// Uppercase alphanumeric words
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_uppercase)
        .collect()
}

/// `term` is a SCREAMING_SNAKE phrase; matches a contiguous run of tokens
fn contains_term(tokens: &[String], term: &str) -> bool {
    let words: Vec<&str> = term.split('_').filter(|w| !w.is_empty()).collect();
    if words.is_empty() || words.len() > tokens.len() {
        return false;
    }
    tokens
        .windows(words.len())
        .any(|window| window.iter().zip(&words).all(|(t, w)| t == w))
}
