use serde_json::{Map, Value};
use thiserror::Error;

use crate::normalizer::{normalize_name, normalize_relation, truncate_chars};
use crate::schema::{EntityType, ExtractedEntity, ExtractedRelation, ExtractionResult};

const MAX_DESCRIPTION_LENGTH: usize = 100;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("No JSON object found in response")]
    NoJsonObject,

    #[error("Invalid JSON response: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Parse a model reply into entities and relations.
///
/// Markdown fences and surrounding prose are tolerated: the JSON object is
/// taken from the first `{` to the last `}`. Items that fail validation are
/// dropped; only an unusable reply as a whole is an error.
pub fn parse_extraction(response: &str) -> Result<ExtractionResult, ParseError> {
    let body = strip_code_fences(response.trim());

    let start = body.find('{').ok_or(ParseError::NoJsonObject)?;
    let end = body.rfind('}').ok_or(ParseError::NoJsonObject)?;
    if end < start {
        return Err(ParseError::NoJsonObject);
    }

    let data: Map<String, Value> = serde_json::from_str(&body[start..=end])?;

    let entities = items(&data, "entities").filter_map(parse_entity).collect();
    let relations = items(&data, "relations").filter_map(parse_relation).collect();

    Ok(ExtractionResult {
        entities,
        relations,
        error: None,
    })
}

fn strip_code_fences(response: &str) -> &str {
    let fenced = response
        .split_once("```json")
        .or_else(|| response.split_once("```"));

    match fenced {
        Some((_, rest)) => rest.split("```").next().unwrap_or(rest),
        None => response,
    }
}

fn items<'a>(data: &'a Map<String, Value>, key: &str) -> impl Iterator<Item = &'a Value> {
    data.get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

/// A string field that is present and not blank.
fn required<'a>(item: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| item.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|value| !value.is_empty())
}

fn parse_entity(item: &Value) -> Option<ExtractedEntity> {
    let name = required(item, &["name"])?;
    let label = required(item, &["type"])?;

    let description = item
        .get("description")
        .and_then(Value::as_str)
        .map(|d| truncate_chars(d.trim(), MAX_DESCRIPTION_LENGTH))
        .unwrap_or_default();

    Some(ExtractedEntity {
        name: normalize_name(name),
        entity_type: EntityType::from_label(label),
        description,
    })
}

fn parse_relation(item: &Value) -> Option<ExtractedRelation> {
    let from = required(item, &["from", "source"])?;
    let to = required(item, &["to", "target"])?;

    Some(ExtractedRelation {
        from: normalize_name(from),
        to: normalize_name(to),
        relation: normalize_relation(item.get("relation").and_then(Value::as_str)),
    })
}
