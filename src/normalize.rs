use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::ReconcileError;
use crate::model::{AttributeDescriptor, DEFAULT_DATA_TYPE};

#[cfg(test)]
mod tests;

const SAMPLE_ROOT: &str = "Item";
const SAMPLE_WRAPPER_KEYS: [&str; 5] = ["items", "offers", "products", "data", "results"];
const REQUIRED_BUCKET: &str = "REQUIRED";

/// Fully-qualified attribute names already emitted by one normalization call.
pub type Visited = HashSet<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentShape {
    AttributeList,
    ProductTypeDefinition,
    OpenApi,
    SampleRecords,
    Unrecognized,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedSchema {
    pub attributes: Vec<AttributeDescriptor>,
    pub warnings: Vec<String>,
}

impl NormalizedSchema {
    fn skip(&mut self, source: &str, err: ReconcileError) {
        warn!(source = %source, error = %err, "skipping schema fragment");
        self.warnings.push(err.to_string());
    }
}

struct Collector<'a> {
    source: &'a str,
    visited: &'a mut Visited,
    out: &'a mut NormalizedSchema,
}

impl Collector<'_> {
    fn emit(&mut self, mut descriptor: AttributeDescriptor) {
        if descriptor.name.trim().is_empty() {
            self.skip(ReconcileError::malformed(self.source, "attribute without a name"));
            return;
        }
        if descriptor.source.is_none() {
            descriptor.source = Some(self.source.to_string());
        }
        if self.visited.insert(descriptor.name.clone()) {
            self.out.attributes.push(descriptor);
        } else {
            debug!(source = %self.source, name = %descriptor.name, "duplicate attribute ignored");
        }
    }

    fn skip(&mut self, err: ReconcileError) {
        self.out.skip(self.source, err);
    }
}

pub struct Normalizer {
    ref_pattern: Regex,
}

impl Normalizer {
    pub fn new() -> Result<Self> {
        let ref_pattern = Regex::new(r"^#/(?:components/schemas|definitions)/([^/]+)$")
            .context("failed to compile $ref pattern")?;
        Ok(Self { ref_pattern })
    }

    pub fn normalize(&self, source: &str, document: &Value) -> NormalizedSchema {
        let mut visited = Visited::new();
        let mut out = NormalizedSchema::default();
        self.normalize_into(source, document, &mut visited, &mut out);
        out
    }

    pub fn normalize_into(
        &self,
        source: &str,
        document: &Value,
        visited: &mut Visited,
        out: &mut NormalizedSchema,
    ) {
        let mut collector = Collector {
            source,
            visited,
            out,
        };

        match detect_shape(document) {
            DocumentShape::AttributeList => collect_attribute_list(&mut collector, document),
            DocumentShape::ProductTypeDefinition => {
                self.collect_product_types(&mut collector, document)
            }
            DocumentShape::OpenApi => self.collect_openapi(&mut collector, document),
            DocumentShape::SampleRecords => collect_sample_records(&mut collector, document),
            DocumentShape::Unrecognized => collector.skip(ReconcileError::malformed(
                source,
                "document matches no recognized schema shape",
            )),
        }
    }

    fn collect_product_types(&self, collector: &mut Collector<'_>, document: &Value) {
        if let Some(definitions) = document.get("productTypes").and_then(Value::as_array) {
            for (idx, definition) in definitions.iter().enumerate() {
                match definition.as_object() {
                    Some(definition) => self.collect_product_type(collector, definition),
                    None => collector.skip(ReconcileError::malformed(
                        format!("productTypes[{idx}]"),
                        "expected an object",
                    )),
                }
            }
            return;
        }

        if let Some(definition) = document.as_object() {
            self.collect_product_type(collector, definition);
        }
    }

    fn collect_product_type(&self, collector: &mut Collector<'_>, definition: &Map<String, Value>) {
        let Some(product_type) =
            non_empty_str(definition, "productType").or_else(|| non_empty_str(definition, "name"))
        else {
            collector.skip(ReconcileError::malformed(
                "productTypes",
                "definition without productType",
            ));
            return;
        };

        let groups = definition
            .get("propertyGroups")
            .map(property_group_index)
            .unwrap_or_default();

        let tag = |mut descriptor: AttributeDescriptor, attribute: &str| {
            descriptor.product_type = Some(product_type.to_string());
            descriptor.property_group = groups.get(attribute).cloned();
            descriptor
        };

        match definition.get("requirements") {
            Some(Value::Object(buckets)) => {
                for (bucket, items) in buckets {
                    let Some(items) = items.as_array() else {
                        collector.skip(ReconcileError::malformed(
                            format!("{product_type}.requirements.{bucket}"),
                            "expected a list",
                        ));
                        continue;
                    };
                    for item in items {
                        let Some((attribute, mut descriptor)) =
                            requirement_descriptor(collector, product_type, item)
                        else {
                            continue;
                        };
                        descriptor.required = bucket.eq_ignore_ascii_case(REQUIRED_BUCKET);
                        descriptor.requirement_type = Some(bucket.clone());
                        collector.emit(tag(descriptor, attribute.as_str()));
                    }
                }
            }
            Some(Value::Array(items)) => {
                for item in items {
                    let Some((attribute, mut descriptor)) =
                        requirement_descriptor(collector, product_type, item)
                    else {
                        continue;
                    };
                    descriptor.required = item
                        .get("required")
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                    collector.emit(tag(descriptor, attribute.as_str()));
                }
            }
            Some(_) => collector.skip(ReconcileError::malformed(
                format!("{product_type}.requirements"),
                "expected an object or a list",
            )),
            None => {}
        }

        let schema = match definition.get("schema") {
            Some(Value::Object(schema)) => Some(schema.clone()),
            Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(schema)) => Some(schema),
                Ok(_) => {
                    collector.skip(ReconcileError::malformed(
                        format!("{product_type}.schema"),
                        "embedded schema is not an object",
                    ));
                    None
                }
                Err(err) => {
                    collector.skip(ReconcileError::malformed(
                        format!("{product_type}.schema"),
                        err.to_string(),
                    ));
                    None
                }
            },
            _ => None,
        };

        if let Some(schema) = schema {
            let required = required_names(&schema);
            for (attribute, property) in properties_of(&schema) {
                let Some(property) = property.as_object() else {
                    continue;
                };
                let descriptor = AttributeDescriptor {
                    required: required.contains(attribute.as_str()),
                    data_type: self.property_data_type(property),
                    max_length: positive_u64(property, "maxLength"),
                    description: non_empty_str(property, "description").map(str::to_string),
                    ..AttributeDescriptor::new(format!("{product_type}.{attribute}"))
                };
                collector.emit(tag(descriptor, attribute.as_str()));
            }
        }
    }

    fn collect_openapi(&self, collector: &mut Collector<'_>, document: &Value) {
        let schemas = document
            .pointer("/components/schemas")
            .or_else(|| document.get("definitions"))
            .and_then(Value::as_object);
        let Some(schemas) = schemas else {
            collector.skip(ReconcileError::malformed(
                "components.schemas",
                "expected an object of schemas",
            ));
            return;
        };

        for (schema_name, definition) in schemas {
            let Some(definition) = definition.as_object() else {
                collector.skip(ReconcileError::malformed(
                    schema_name.as_str(),
                    "schema definition is not an object",
                ));
                continue;
            };

            collector.emit(AttributeDescriptor {
                description: non_empty_str(definition, "description").map(str::to_string),
                schema: Some(schema_name.clone()),
                ..AttributeDescriptor::new(schema_name.as_str()).with_data_type("object")
            });

            if definition
                .get("properties")
                .is_some_and(|properties| !properties.is_object())
            {
                collector.skip(ReconcileError::malformed(
                    format!("{schema_name}.properties"),
                    "expected an object",
                ));
                continue;
            }

            let required = required_names(definition);
            for (property_name, property) in properties_of(definition) {
                let Some(property) = property.as_object() else {
                    collector.skip(ReconcileError::malformed(
                        format!("{schema_name}.{property_name}"),
                        "property definition is not an object",
                    ));
                    continue;
                };

                let name = format!("{schema_name}.{property_name}");
                collector.emit(AttributeDescriptor {
                    required: required.contains(property_name.as_str()),
                    data_type: self.property_data_type(property),
                    max_length: positive_u64(property, "maxLength"),
                    description: non_empty_str(property, "description").map(str::to_string),
                    schema: Some(schema_name.clone()),
                    ..AttributeDescriptor::new(name.as_str())
                });

                if let Some(target) = self.local_ref_target(property) {
                    match schemas.get(target).and_then(Value::as_object) {
                        Some(target_definition) => self.expand_one_hop(
                            collector,
                            &name,
                            property_name,
                            target_definition,
                            target,
                        ),
                        None => debug!(reference = %target, "unresolved $ref left opaque"),
                    }
                } else if property.get("type").and_then(Value::as_str) == Some("object")
                    && property.get("properties").is_some_and(Value::is_object)
                {
                    self.expand_one_hop(collector, &name, property_name, property, schema_name);
                }
            }
        }
    }

    // Nested properties keep their own references opaque; nothing recurses past here.
    fn expand_one_hop(
        &self,
        collector: &mut Collector<'_>,
        parent_name: &str,
        parent_field: &str,
        definition: &Map<String, Value>,
        schema_tag: &str,
    ) {
        let required = required_names(definition);
        for (nested_name, nested) in properties_of(definition) {
            let Some(nested) = nested.as_object() else {
                continue;
            };
            collector.emit(AttributeDescriptor {
                required: required.contains(nested_name.as_str()),
                data_type: self.property_data_type(nested),
                max_length: positive_u64(nested, "maxLength"),
                description: non_empty_str(nested, "description").map(str::to_string),
                schema: Some(schema_tag.to_string()),
                parent_field: Some(parent_field.to_string()),
                ..AttributeDescriptor::new(format!("{parent_name}.{nested_name}"))
            });
        }
    }

    pub fn property_data_type(&self, property: &Map<String, Value>) -> String {
        if let Some(reference) = property.get("$ref").and_then(Value::as_str) {
            return format!("ref:{}", self.ref_name(reference));
        }

        match property.get("type") {
            Some(Value::String(kind)) if kind == "array" => {
                let item_type = match property.get("items").and_then(Value::as_object) {
                    Some(items) => match items.get("$ref").and_then(Value::as_str) {
                        Some(reference) => format!("ref:{}", self.ref_name(reference)),
                        None => json_type_name(items.get("type")),
                    },
                    None => DEFAULT_DATA_TYPE.to_string(),
                };
                format!("array<{item_type}>")
            }
            kind => json_type_name(kind),
        }
    }

    fn local_ref_target<'v>(&self, property: &'v Map<String, Value>) -> Option<&'v str> {
        let reference = property.get("$ref").and_then(Value::as_str)?;
        self.ref_pattern
            .captures(reference)
            .and_then(|captures| captures.get(1))
            .map(|target| target.as_str())
    }

    fn ref_name<'r>(&self, reference: &'r str) -> &'r str {
        self.ref_pattern
            .captures(reference)
            .and_then(|captures| captures.get(1))
            .map(|target| target.as_str())
            .unwrap_or_else(|| reference.rsplit('/').next().unwrap_or(reference))
    }
}

pub fn detect_shape(document: &Value) -> DocumentShape {
    match document {
        Value::Object(map) => {
            if map.get("attributes").is_some_and(looks_like_attribute_list) {
                DocumentShape::AttributeList
            } else if map.get("requirements").is_some_and(looks_like_requirements)
                || map.get("productTypes").is_some_and(|types| {
                    types
                        .as_array()
                        .is_some_and(|types| types.iter().any(Value::is_object))
                })
            {
                DocumentShape::ProductTypeDefinition
            } else if document.pointer("/components/schemas").is_some()
                || map.get("definitions").is_some_and(Value::is_object)
            {
                DocumentShape::OpenApi
            } else if map.is_empty() {
                DocumentShape::Unrecognized
            } else {
                DocumentShape::SampleRecords
            }
        }
        Value::Array(items) if items.is_empty() => DocumentShape::Unrecognized,
        Value::Array(items) if items.iter().all(looks_like_attribute) => {
            DocumentShape::AttributeList
        }
        Value::Array(_) => DocumentShape::SampleRecords,
        _ => DocumentShape::Unrecognized,
    }
}

// An empty list still reads as an attribute list; a list of records without
// `name` fields is sample data that happens to use the key.
fn looks_like_attribute_list(value: &Value) -> bool {
    value
        .as_array()
        .is_some_and(|items| items.is_empty() || items.iter().any(looks_like_attribute))
}

fn looks_like_requirements(value: &Value) -> bool {
    match value {
        Value::Object(buckets) => !buckets.is_empty() && buckets.values().all(Value::is_array),
        Value::Array(items) => items
            .iter()
            .any(|item| item.get("name").is_some_and(Value::is_string)),
        _ => false,
    }
}

fn looks_like_attribute(item: &Value) -> bool {
    item.as_object().is_some_and(|item| {
        item.get("name").is_some_and(Value::is_string)
            && (item.contains_key("required")
                || item.contains_key("dataType")
                || item.contains_key("type"))
    })
}

fn collect_attribute_list(collector: &mut Collector<'_>, document: &Value) {
    let items = match document {
        Value::Array(items) => items,
        _ => match document.get("attributes") {
            Some(Value::Array(items)) => items,
            _ => {
                collector.skip(ReconcileError::malformed("attributes", "expected a list"));
                return;
            }
        },
    };

    for (idx, item) in items.iter().enumerate() {
        let Some(item) = item.as_object() else {
            collector.skip(ReconcileError::malformed(
                format!("attributes[{idx}]"),
                "expected an object",
            ));
            continue;
        };
        let Some(name) = non_empty_str(item, "name") else {
            collector.skip(ReconcileError::malformed(
                format!("attributes[{idx}]"),
                "attribute without a name",
            ));
            continue;
        };

        let data_type = non_empty_str(item, "dataType")
            .or_else(|| non_empty_str(item, "type"))
            .unwrap_or(DEFAULT_DATA_TYPE);

        collector.emit(AttributeDescriptor {
            required: item.get("required").and_then(Value::as_bool).unwrap_or(false),
            max_length: positive_u64(item, "maxLength"),
            description: non_empty_str(item, "description").map(str::to_string),
            property_group: item
                .get("propertyGroup")
                .or_else(|| item.get("propertyGroups"))
                .and_then(|groups| group_labels(groups).into_iter().next()),
            product_type: non_empty_str(item, "productType").map(str::to_string),
            source: non_empty_str(item, "source").map(str::to_string),
            schema: non_empty_str(item, "schema").map(str::to_string),
            parent_field: non_empty_str(item, "parentField").map(str::to_string),
            requirement_type: non_empty_str(item, "requirementType").map(str::to_string),
            ..AttributeDescriptor::new(name).with_data_type(data_type)
        });
    }
}

fn collect_sample_records(collector: &mut Collector<'_>, document: &Value) {
    let records: Vec<&Value> = match document {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => SAMPLE_WRAPPER_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
            .map(|items| items.iter().collect())
            .unwrap_or_else(|| vec![document]),
        _ => Vec::new(),
    };

    for (idx, record) in records.into_iter().enumerate() {
        let Some(record) = record.as_object() else {
            collector.skip(ReconcileError::malformed(
                format!("records[{idx}]"),
                "sample record is not an object",
            ));
            continue;
        };

        for (key, value) in record {
            let name = format!("{SAMPLE_ROOT}.{key}");
            collector.emit(
                AttributeDescriptor::new(name.as_str()).with_data_type(infer_data_type(value)),
            );

            // Objects, and the first element of an object array, expand one level.
            let nested = match value {
                Value::Object(nested) => Some(nested),
                Value::Array(items) => items.first().and_then(Value::as_object),
                _ => None,
            };
            for (nested_key, nested_value) in nested.into_iter().flatten() {
                collector.emit(AttributeDescriptor {
                    parent_field: Some(key.clone()),
                    ..AttributeDescriptor::new(format!("{name}.{nested_key}"))
                        .with_data_type(infer_data_type(nested_value))
                });
            }
        }
    }
}

pub fn infer_data_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(number) if number.is_i64() || number.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::Array(items) if items.first().is_some_and(Value::is_object) => "array<object>",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
        Value::String(_) => "string",
    }
}

/// Reads the schema version from `version` or an OpenAPI `info.version`.
pub fn document_version(document: &Value) -> String {
    let version = document
        .get("version")
        .or_else(|| document.pointer("/info/version"));
    match version {
        Some(Value::String(version)) => version.trim().to_string(),
        Some(Value::Number(version)) => version.to_string(),
        _ => String::new(),
    }
}

/// Flattens the string, list and map shapes a property-group field takes into labels.
pub fn group_labels(value: &Value) -> Vec<String> {
    match value {
        Value::String(label) if !label.trim().is_empty() => vec![label.trim().to_string()],
        Value::Array(items) => items.iter().flat_map(group_labels).collect(),
        Value::Object(map) => map
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty())
            .map(|name| vec![name.trim().to_string()])
            .unwrap_or_else(|| map.keys().cloned().collect()),
        _ => Vec::new(),
    }
}

/// Maps each property name to the first property group that lists it.
pub fn property_group_index(value: &Value) -> HashMap<String, String> {
    let entries: Vec<(String, &Value)> = match value {
        Value::Object(map) => map.iter().map(|(group, body)| (group.clone(), body)).collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                let group = item.get("name").and_then(Value::as_str)?;
                Some((group.to_string(), item))
            })
            .collect(),
        _ => Vec::new(),
    };

    let mut index = HashMap::new();
    for (group, body) in entries {
        let names = body
            .get("propertyNames")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str);
        for name in names {
            index.entry(name.to_string()).or_insert_with(|| group.clone());
        }
    }
    index
}

fn requirement_descriptor(
    collector: &mut Collector<'_>,
    product_type: &str,
    item: &Value,
) -> Option<(String, AttributeDescriptor)> {
    let Some(item) = item.as_object() else {
        collector.skip(ReconcileError::malformed(
            format!("{product_type}.requirements"),
            "requirement is not an object",
        ));
        return None;
    };
    let Some(attribute) = non_empty_str(item, "name") else {
        collector.skip(ReconcileError::malformed(
            format!("{product_type}.requirements"),
            "requirement without a name",
        ));
        return None;
    };
    let data_type = non_empty_str(item, "valueType")
        .or_else(|| non_empty_str(item, "type"))
        .unwrap_or(DEFAULT_DATA_TYPE);

    let descriptor = AttributeDescriptor {
        max_length: positive_u64(item, "maxLength"),
        description: non_empty_str(item, "description").map(str::to_string),
        ..AttributeDescriptor::new(format!("{product_type}.{attribute}")).with_data_type(data_type)
    };
    Some((attribute.to_string(), descriptor))
}

fn properties_of(definition: &Map<String, Value>) -> impl Iterator<Item = (&String, &Value)> {
    definition
        .get("properties")
        .and_then(Value::as_object)
        .into_iter()
        .flatten()
}

fn required_names(definition: &Map<String, Value>) -> HashSet<&str> {
    definition
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .collect()
}

fn json_type_name(kind: Option<&Value>) -> String {
    match kind {
        Some(Value::String(kind)) if !kind.trim().is_empty() => kind.trim().to_string(),
        Some(Value::Array(kinds)) => kinds
            .iter()
            .filter_map(Value::as_str)
            .find(|kind| *kind != "null")
            .unwrap_or(DEFAULT_DATA_TYPE)
            .to_string(),
        _ => DEFAULT_DATA_TYPE.to_string(),
    }
}

fn non_empty_str<'m>(map: &'m Map<String, Value>, key: &str) -> Option<&'m str> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn positive_u64(map: &Map<String, Value>, key: &str) -> Option<u64> {
    map.get(key)
        .and_then(Value::as_u64)
        .filter(|value| *value > 0)
}
