use std::collections::BTreeMap;

use crate::model::{
    AttributeDescriptor, AttributeMapping, CanonicalAttribute, CanonicalMapping,
    ProductTypeSummary,
};

const UNKNOWN_SOURCE: &str = "unknown";

/// Drops the product-type or schema prefix: `LUGGAGE.item_name` -> `item_name`.
pub fn canonical_name(name: &str) -> &str {
    match name.split_once('.') {
        Some((_, rest)) if !rest.is_empty() => rest,
        _ => name,
    }
}

/// Descriptors without a product type are keyed by their source tag.
pub fn mapping_key(descriptor: &AttributeDescriptor) -> &str {
    descriptor
        .product_type
        .as_deref()
        .or(descriptor.source.as_deref())
        .unwrap_or(UNKNOWN_SOURCE)
}

/// Folds descriptors into one record per canonical name.
///
/// `required` is OR-reduced and the tag lists only ever grow, so the fold is
/// order-independent for those. `dataType` and `description` keep whatever the
/// first descriptor for a name carried; later definitions never replace them.
#[derive(Debug, Clone, Default)]
pub struct CanonicalAggregator {
    attributes: BTreeMap<String, CanonicalAttribute>,
}

impl CanonicalAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, descriptor: &AttributeDescriptor) {
        let name = canonical_name(&descriptor.name);
        let key = mapping_key(descriptor);
        let source = descriptor.source.as_deref().unwrap_or(UNKNOWN_SOURCE);
        let mapping = AttributeMapping::from(descriptor);

        let Some(existing) = self.attributes.get_mut(name) else {
            self.attributes.insert(
                name.to_string(),
                CanonicalAttribute {
                    canonical_name: name.to_string(),
                    required: descriptor.required,
                    data_type: descriptor.data_type.clone(),
                    description: descriptor.description.clone(),
                    product_types: vec![key.to_string()],
                    property_groups: descriptor.property_group.iter().cloned().collect(),
                    sources: vec![source.to_string()],
                    mappings: BTreeMap::from([(key.to_string(), mapping)]),
                },
            );
            return;
        };

        existing.required |= descriptor.required;
        push_unique(&mut existing.product_types, key);
        if let Some(group) = descriptor.property_group.as_deref() {
            push_unique(&mut existing.property_groups, group);
        }
        push_unique(&mut existing.sources, source);
        existing.mappings.insert(key.to_string(), mapping);
    }

    pub fn extend<'a>(&mut self, descriptors: impl IntoIterator<Item = &'a AttributeDescriptor>) {
        for descriptor in descriptors {
            self.add(descriptor);
        }
    }

    pub fn attributes(&self) -> &BTreeMap<String, CanonicalAttribute> {
        &self.attributes
    }

    pub fn product_type_summary(&self) -> BTreeMap<String, ProductTypeSummary> {
        let mut summary = BTreeMap::<String, ProductTypeSummary>::new();
        for attribute in self.attributes.values() {
            for (product_type, mapping) in &attribute.mappings {
                let entry = summary.entry(product_type.clone()).or_default();
                entry.count += 1;
                if let Some(group) = mapping.property_group.as_deref() {
                    push_unique(&mut entry.property_groups, group);
                }
            }
        }
        summary
    }

    pub fn into_mapping(self, source_apis: Vec<String>, generated_at: String) -> CanonicalMapping {
        let product_type_summary = self.product_type_summary();
        CanonicalMapping {
            canonical_attributes: self.attributes,
            product_type_summary,
            generated_at,
            source_apis,
        }
    }
}

fn push_unique(values: &mut Vec<String>, value: &str) {
    if !values.iter().any(|existing| existing == value) {
        values.push(value.to_string());
    }
}
