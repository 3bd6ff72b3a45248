//! Entity identity records
//!
//! Entities are the nodes of the ownership graph: legal persons (companies, funds,
//! trusts, partnerships, foundations) and the natural persons that ultimately own or
//! control them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable opaque entity identifier (LEI, register number, internal key...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Legal form of an entity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Corporation,
    Llc,
    Partnership,
    Trust,
    Foundation,
    Fund,
    NaturalPerson,
}

impl EntityType {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            Self::Corporation => "CORPORATION",
            Self::Llc => "LLC",
            Self::Partnership => "PARTNERSHIP",
            Self::Trust => "TRUST",
            Self::Foundation => "FOUNDATION",
            Self::Fund => "FUND",
            Self::NaturalPerson => "NATURAL_PERSON",
        }
    }

    pub fn is_natural_person(&self) -> bool {
        matches!(self, Self::NaturalPerson)
    }
}

/// Reason UBO resolution ends at an entity without producing a natural person
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminusReason {
    /// Dispersed ownership, no identifiable controlling person
    NoKnownPerson,
    /// Listed on a regulated market
    PubliclyTraded,
    /// Regulated institution exempt from look-through
    RegulatedInstitution,
    /// State or sovereign owned
    GovernmentOwned,
}

impl TerminusReason {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            Self::NoKnownPerson => "NO_KNOWN_PERSON",
            Self::PubliclyTraded => "PUBLICLY_TRADED",
            Self::RegulatedInstitution => "REGULATED_INSTITUTION",
            Self::GovernmentOwned => "GOVERNMENT_OWNED",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::NoKnownPerson => "dispersed ownership with no known controlling person",
            Self::PubliclyTraded => "publicly traded on a regulated market",
            Self::RegulatedInstitution => "regulated institution exempt from look-through",
            Self::GovernmentOwned => "government or sovereign owned",
        }
    }
}

/// Fund structure category, used for SICAV/umbrella referential checks
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FundCategory {
    Umbrella,
    SubFund,
    Standalone,
}

/// Lifecycle status, the only part of an entity besides metadata that may be refreshed
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityStatus {
    #[default]
    Active,
    Dormant,
    Dissolved,
    /// Natural person recorded as deceased
    Deceased,
}

impl EntityStatus {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Dormant => "DORMANT",
            Self::Dissolved => "DISSOLVED",
            Self::Deceased => "DECEASED",
        }
    }

    /// Dissolved entities and deceased persons can no longer own or control anything
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Dissolved | Self::Deceased)
    }
}

/// Entity identity record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub legal_name: String,
    /// ISO 3166-1 alpha-2
    pub jurisdiction: String,
    pub entity_type: EntityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ubo_terminus: Option<TerminusReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fund_category: Option<FundCategory>,
    #[serde(default)]
    pub status: EntityStatus,
}

impl Entity {
    pub fn new(
        id: impl Into<String>,
        legal_name: impl Into<String>,
        jurisdiction: impl Into<String>,
        entity_type: EntityType,
    ) -> Self {
        Self {
            id: EntityId::new(id),
            legal_name: legal_name.into(),
            jurisdiction: jurisdiction.into(),
            entity_type,
            registration_number: None,
            ubo_terminus: None,
            fund_category: None,
            status: EntityStatus::Active,
        }
    }

    pub fn with_registration_number(mut self, number: impl Into<String>) -> Self {
        self.registration_number = Some(number.into());
        self
    }

    pub fn with_terminus(mut self, reason: TerminusReason) -> Self {
        self.ubo_terminus = Some(reason);
        self
    }

    pub fn with_fund_category(mut self, category: FundCategory) -> Self {
        self.fund_category = Some(category);
        self
    }

    pub fn is_natural_person(&self) -> bool {
        self.entity_type.is_natural_person()
    }

    pub fn is_umbrella(&self) -> bool {
        self.fund_category == Some(FundCategory::Umbrella)
    }

    pub fn with_status(mut self, status: EntityStatus) -> Self {
        self.status = status;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_serde_matches_db_str() {
        for t in [
            EntityType::Corporation,
            EntityType::Llc,
            EntityType::Partnership,
            EntityType::Trust,
            EntityType::Foundation,
            EntityType::Fund,
            EntityType::NaturalPerson,
        ] {
            let json = serde_json::to_value(t).expect("serializes");
            assert_eq!(json, t.to_db_str());
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(EntityStatus::Deceased.is_terminal());
        assert!(EntityStatus::Dissolved.is_terminal());
        assert!(!EntityStatus::Dormant.is_terminal());
        assert!(!EntityStatus::Active.is_terminal());
        let yaml = r#"
id: "P-1"
legal_name: "Pat"
jurisdiction: "GB"
entity_type: NATURAL_PERSON
status: DECEASED
"#;
        let person: Entity = serde_yaml::from_str(yaml).expect("person parses");
        assert_eq!(person.status, EntityStatus::Deceased);
    }

    #[test]
    fn test_entity_yaml_defaults() {
        let yaml = r#"
id: "LU-001"
legal_name: "Alpha SICAV"
jurisdiction: "LU"
entity_type: FUND
fund_category: UMBRELLA
"#;
        let entity: Entity = serde_yaml::from_str(yaml).expect("entity parses");
        assert!(entity.is_umbrella());
        assert_eq!(entity.status, EntityStatus::Active);
        assert!(entity.ubo_terminus.is_none());
    }
}
