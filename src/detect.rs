use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::model::{
    AttributeDescriptor, ChangeEvent, ChangeProperty, ChangeStatus, ChangeType, SchemaDocument,
    SchemaSnapshot, Severity,
};
use crate::sla;
use crate::util::sha256_hex;

const CHANGE_ID_DIGEST_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub hash: String,
    pub changed: bool,
    pub events: Vec<ChangeEvent>,
}

impl Detection {
    pub fn snapshot(&self, schema: SchemaDocument, now: DateTime<Utc>) -> SchemaSnapshot {
        SchemaSnapshot {
            hash: self.hash.clone(),
            schema,
            last_updated: now,
        }
    }
}

#[derive(Serialize)]
struct HashInput<'a> {
    attributes: Vec<&'a AttributeDescriptor>,
    version: &'a str,
    source: &'a str,
}

/// SHA-256 over the sorted-key JSON of `{attributes by name, version, source}`.
///
/// `extractedAt` and the error marker are left out so re-extraction alone never
/// changes the digest.
pub fn schema_hash(schema: &SchemaDocument) -> Result<String> {
    let mut attributes: Vec<&AttributeDescriptor> = schema.attributes.iter().collect();
    attributes.sort_by(|left, right| left.name.cmp(&right.name));

    let input = HashInput {
        attributes,
        version: &schema.version,
        source: &schema.source,
    };
    // Round-tripping through Value sorts every object key.
    let canonical = serde_json::to_value(&input)
        .and_then(|value| serde_json::to_string(&value))
        .with_context(|| format!("failed to serialize schema for hashing: {}", schema.source))?;

    Ok(sha256_hex(canonical.as_bytes()))
}

/// Compares `schema` against the stored snapshot without touching it.
pub fn detect_changes(
    source: &str,
    schema: &SchemaDocument,
    prior: Option<&SchemaSnapshot>,
    detected_at: DateTime<Utc>,
) -> Result<Detection> {
    let hash = schema_hash(schema)?;

    if prior.is_some_and(|snapshot| snapshot.hash == hash) {
        return Ok(Detection {
            hash,
            changed: false,
            events: Vec::new(),
        });
    }

    let previous = prior
        .map(|snapshot| snapshot.schema.attributes.as_slice())
        .unwrap_or_default();
    let events = diff_attributes(source, previous, &schema.attributes, detected_at);

    info!(
        source = %source,
        changes = events.len(),
        first_snapshot = prior.is_none(),
        "detected schema changes"
    );

    Ok(Detection {
        hash,
        changed: true,
        events,
    })
}

pub fn diff_attributes(
    source: &str,
    previous: &[AttributeDescriptor],
    current: &[AttributeDescriptor],
    detected_at: DateTime<Utc>,
) -> Vec<ChangeEvent> {
    let old_by_name = index_by_name(previous);
    let new_by_name = index_by_name(current);

    let mut drafts = Vec::new();

    for name in unique_names(current) {
        if !old_by_name.contains_key(name) {
            let attribute = new_by_name[name];
            drafts.push(Draft {
                change_type: ChangeType::AttributeAdded,
                attribute: name,
                property: None,
                old_value: None,
                new_value: None,
                details: Some(attribute),
                severity: added_severity(attribute.required),
            });
        }
    }

    for name in unique_names(previous) {
        if !new_by_name.contains_key(name) {
            let attribute = old_by_name[name];
            drafts.push(Draft {
                change_type: ChangeType::AttributeRemoved,
                attribute: name,
                property: None,
                old_value: None,
                new_value: None,
                details: Some(attribute),
                severity: removed_severity(attribute.required),
            });
        }
    }

    for name in unique_names(current) {
        let Some(before) = old_by_name.get(name) else {
            continue;
        };
        let after = new_by_name[name];
        for property in ChangeProperty::TRACKED {
            let old_value = property.value_of(before);
            let new_value = property.value_of(after);
            if old_value != new_value {
                let severity = modified_severity(property, &new_value);
                drafts.push(Draft {
                    change_type: ChangeType::AttributeModified,
                    attribute: name,
                    property: Some(property),
                    old_value: Some(old_value),
                    new_value: Some(new_value),
                    details: None,
                    severity,
                });
            }
        }
    }

    drafts
        .into_iter()
        .map(|draft| draft.into_event(source, detected_at))
        .collect()
}

pub fn added_severity(required: bool) -> Severity {
    if required {
        Severity::Major
    } else {
        Severity::Minor
    }
}

pub fn removed_severity(was_required: bool) -> Severity {
    if was_required {
        Severity::Critical
    } else {
        Severity::Major
    }
}

/// Only an optional-to-required flip is critical; every other edit is major.
pub fn modified_severity(property: ChangeProperty, new_value: &Value) -> Severity {
    if property == ChangeProperty::Required && *new_value == Value::Bool(true) {
        Severity::Critical
    } else {
        Severity::Major
    }
}

pub fn change_id(
    source: &str,
    detected_at: DateTime<Utc>,
    change_type: ChangeType,
    attribute: &str,
    property: Option<ChangeProperty>,
) -> String {
    let digest = sha256_hex(
        format!(
            "{}:{}:{}",
            change_type.as_str(),
            attribute,
            property.map(ChangeProperty::as_str).unwrap_or_default()
        )
        .as_bytes(),
    );
    format!(
        "{source}_{}_{}",
        detected_at.timestamp(),
        &digest[..CHANGE_ID_DIGEST_LEN]
    )
}

struct Draft<'a> {
    change_type: ChangeType,
    attribute: &'a str,
    property: Option<ChangeProperty>,
    old_value: Option<Value>,
    new_value: Option<Value>,
    details: Option<&'a AttributeDescriptor>,
    severity: Severity,
}

impl Draft<'_> {
    fn into_event(self, source: &str, detected_at: DateTime<Utc>) -> ChangeEvent {
        ChangeEvent {
            id: change_id(
                source,
                detected_at,
                self.change_type,
                self.attribute,
                self.property,
            ),
            source: source.to_string(),
            change_type: self.change_type,
            attribute: self.attribute.to_string(),
            property: self.property,
            old_value: self.old_value,
            new_value: self.new_value,
            details: self.details.cloned(),
            severity: self.severity,
            status: ChangeStatus::New,
            detected_at,
            sla_hours: sla::sla_hours(self.severity),
            eta: sla::eta(detected_at, self.severity),
            updated_at: None,
            notes: None,
        }
    }
}

// First occurrence wins, matching the order `unique_names` reports.
fn index_by_name(attributes: &[AttributeDescriptor]) -> HashMap<&str, &AttributeDescriptor> {
    let mut index = HashMap::with_capacity(attributes.len());
    for attribute in attributes {
        index.entry(attribute.name.as_str()).or_insert(attribute);
    }
    index
}

fn unique_names(attributes: &[AttributeDescriptor]) -> Vec<&str> {
    let mut seen = HashSet::new();
    attributes
        .iter()
        .map(|attribute| attribute.name.as_str())
        .filter(|name| seen.insert(*name))
        .collect()
}
