//! Graph fixtures shared by the integration tests

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

use ubo_engine::GraphStore;
use ubo_types::{
    Cbu, CbuRole, ControlRole, ControlRoleTitle, Corroboration, EdgeAssertion, Entity,
    EntityType, LinkType, Provenance, TerminusReason,
};

pub fn pct(s: &str) -> Decimal {
    s.parse().expect("decimal literal")
}

pub fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub fn corp(store: &GraphStore, id: &str) {
    store
        .upsert_entity(Entity::new(id, id, "GB", EntityType::Corporation))
        .expect("corporation");
}

pub fn person(store: &GraphStore, id: &str) {
    store
        .upsert_entity(Entity::new(id, id, "GB", EntityType::NaturalPerson))
        .expect("person");
}

pub fn terminus(store: &GraphStore, id: &str, entity_type: EntityType, reason: TerminusReason) {
    store
        .upsert_entity(Entity::new(id, id, "GB", entity_type).with_terminus(reason))
        .expect("terminus entity");
}

pub fn assertion(owner: &str, owned: &str, percentage: &str, link: LinkType) -> EdgeAssertion {
    EdgeAssertion::new(
        owner,
        owned,
        pct(percentage),
        link,
        Provenance::new("registry", Corroboration::FullyCorroborated),
    )
}

pub fn own(store: &GraphStore, owner: &str, owned: &str, percentage: &str) {
    store
        .add_ownership_edge(assertion(owner, owned, percentage, LinkType::DirectShare))
        .expect("edge");
}

pub fn role(
    store: &GraphStore,
    entity: &str,
    person: &str,
    title: ControlRoleTitle,
    rank: u8,
    day: u32,
) {
    store
        .add_control_role(ControlRole::new(entity, person, title, rank, at(day)))
        .expect("control role");
}

/// CBU over `subject` with the subject as its single ultimate client
pub fn client_cbu(id: &str, subject: &str) -> Cbu {
    Cbu::new(id, subject, subject).with_role(CbuRole::UltimateClient, subject)
}
