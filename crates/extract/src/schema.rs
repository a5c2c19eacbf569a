use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed entity taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityType {
    Person,
    Org,
    Technology,
    Concept,
    Location,
    Date,
}

impl EntityType {
    pub const ALL: [EntityType; 6] = [
        EntityType::Person,
        EntityType::Org,
        EntityType::Technology,
        EntityType::Concept,
        EntityType::Location,
        EntityType::Date,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "PERSON",
            EntityType::Org => "ORG",
            EntityType::Technology => "TECHNOLOGY",
            EntityType::Concept => "CONCEPT",
            EntityType::Location => "LOCATION",
            EntityType::Date => "DATE",
        }
    }

    /// Lenient mapping for labels produced by a model.
    ///
    /// Common synonyms are folded into the taxonomy; anything unrecognised
    /// becomes `CONCEPT`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().replace([' ', '-'], "_").as_str() {
            "PERSON" | "PEOPLE" | "PER" => EntityType::Person,
            "ORG" | "ORGANIZATION" | "ORGANISATION" | "COMPANY" | "INSTITUTION" => EntityType::Org,
            "TECHNOLOGY" | "TECH" | "TOOL" | "FRAMEWORK" | "LIBRARY" | "PROGRAMMING_LANGUAGE" => {
                EntityType::Technology
            }
            "LOCATION" | "PLACE" | "CITY" | "COUNTRY" | "LOC" | "GPE" => EntityType::Location,
            "DATE" | "TIME" | "PERIOD" | "YEAR" => EntityType::Date,
            _ => EntityType::Concept,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = anyhow::Error;

    /// Strict parse: only the six taxonomy labels are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow::anyhow!("Unknown entity type: {}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedRelation {
    pub from: String,
    pub to: String,
    pub relation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub entities: Vec<ExtractedEntity>,
    pub relations: Vec<ExtractedRelation>,
    pub error: Option<String>,
}

impl ExtractionResult {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relations.is_empty()
    }
}
