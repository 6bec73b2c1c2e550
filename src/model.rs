use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ReconcileError;

pub const DEFAULT_DATA_TYPE: &str = "string";

fn default_data_type() -> String {
    DEFAULT_DATA_TYPE.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeDescriptor {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default = "default_data_type")]
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirement_type: Option<String>,
}

impl AttributeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
            data_type: default_data_type(),
            max_length: None,
            description: None,
            property_group: None,
            product_type: None,
            source: None,
            schema: None,
            parent_field: None,
            requirement_type: None,
        }
    }

    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = data_type.into();
        self
    }
}

#[cfg(test)]
impl AttributeDescriptor {
    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_product_type(mut self, product_type: impl Into<String>) -> Self {
        self.product_type = Some(product_type.into());
        self
    }

    pub fn with_property_group(mut self, property_group: impl Into<String>) -> Self {
        self.property_group = Some(property_group.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_max_length(mut self, max_length: u64) -> Self {
        self.max_length = Some(max_length);
        self
    }
}

/// Per-source artifact written as `<source>_schema.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDocument {
    #[serde(default)]
    pub attributes: Vec<AttributeDescriptor>,
    #[serde(default)]
    pub extracted_at: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSnapshot {
    pub hash: String,
    pub schema: SchemaDocument,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeMapping {
    pub original_name: String,
    pub required: bool,
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&AttributeDescriptor> for AttributeMapping {
    fn from(descriptor: &AttributeDescriptor) -> Self {
        Self {
            original_name: descriptor.name.clone(),
            required: descriptor.required,
            data_type: descriptor.data_type.clone(),
            max_length: descriptor.max_length,
            property_group: descriptor.property_group.clone(),
            description: descriptor.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalAttribute {
    pub canonical_name: String,
    pub required: bool,
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub product_types: Vec<String>,
    pub property_groups: Vec<String>,
    pub sources: Vec<String>,
    pub mappings: BTreeMap<String, AttributeMapping>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductTypeSummary {
    pub count: usize,
    pub property_groups: Vec<String>,
}

/// Artifact written as `canonical_mapping.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalMapping {
    pub canonical_attributes: BTreeMap<String, CanonicalAttribute>,
    pub product_type_summary: BTreeMap<String, ProductTypeSummary>,
    pub generated_at: String,
    #[serde(rename = "sourceAPIs")]
    pub source_apis: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    AttributeAdded,
    AttributeRemoved,
    AttributeModified,
}

impl ChangeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AttributeAdded => "attribute_added",
            Self::AttributeRemoved => "attribute_removed",
            Self::AttributeModified => "attribute_modified",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeProperty {
    Required,
    DataType,
    MaxLength,
    Description,
}

impl ChangeProperty {
    pub const TRACKED: [ChangeProperty; 4] = [
        Self::Required,
        Self::DataType,
        Self::MaxLength,
        Self::Description,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::DataType => "dataType",
            Self::MaxLength => "maxLength",
            Self::Description => "description",
        }
    }

    pub fn value_of(self, descriptor: &AttributeDescriptor) -> Value {
        match self {
            Self::Required => Value::Bool(descriptor.required),
            Self::DataType => Value::String(descriptor.data_type.clone()),
            Self::MaxLength => descriptor.max_length.map(Value::from).unwrap_or(Value::Null),
            Self::Description => descriptor
                .description
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Major,
    Minor,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Self::Critical, Self::Major, Self::Minor];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Major => "major",
            Self::Minor => "minor",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "critical" => Some(Self::Critical),
            "major" => Some(Self::Major),
            "minor" => Some(Self::Minor),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    New,
    Acknowledged,
    Resolved,
}

impl ChangeStatus {
    pub const ALL: [ChangeStatus; 3] = [Self::New, Self::Acknowledged, Self::Resolved];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "new" => Some(Self::New),
            "acknowledged" => Some(Self::Acknowledged),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }

    pub fn can_transition_to(self, target: ChangeStatus) -> bool {
        matches!(
            (self, target),
            (Self::New, Self::Acknowledged)
                | (Self::New, Self::Resolved)
                | (Self::Acknowledged, Self::Resolved)
        )
    }
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub id: String,
    pub source: String,
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub attribute: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<ChangeProperty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<AttributeDescriptor>,
    pub severity: Severity,
    pub status: ChangeStatus,
    pub detected_at: DateTime<Utc>,
    pub sla_hours: u32,
    pub eta: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ChangeEvent {
    /// Applies a status transition; the event is left untouched on rejection.
    pub fn transition(
        &mut self,
        target: &str,
        now: DateTime<Utc>,
        notes: Option<&str>,
    ) -> Result<(), ReconcileError> {
        let rejected = || ReconcileError::UnknownStatusTransition {
            id: self.id.clone(),
            from: self.status,
            to: target.to_string(),
        };

        let next = ChangeStatus::parse(target).ok_or_else(rejected)?;
        if !self.status.can_transition_to(next) {
            return Err(rejected());
        }

        self.status = next;
        self.updated_at = Some(now);
        if let Some(notes) = notes.map(str::trim).filter(|notes| !notes.is_empty()) {
            self.notes = Some(notes.to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total_changes: usize,
    pub pending_changes: usize,
    pub overdue_changes: usize,
    pub resolved_changes: usize,
}

/// Artifact written as `change_report.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeReport {
    pub summary: ReportSummary,
    pub severity_breakdown: BTreeMap<String, usize>,
    pub status_breakdown: BTreeMap<String, usize>,
    pub source_breakdown: BTreeMap<String, usize>,
    pub generated_at: DateTime<Utc>,
}
