use serde_json::json;

use super::*;

fn normalizer() -> Normalizer {
    Normalizer::new().expect("ref pattern should compile")
}

fn find<'a>(schema: &'a NormalizedSchema, name: &str) -> &'a AttributeDescriptor {
    schema
        .attributes
        .iter()
        .find(|attribute| attribute.name == name)
        .unwrap_or_else(|| panic!("missing attribute {name}"))
}

#[test]
fn flat_attribute_list_keeps_order_and_skips_bad_entries() {
    let document = json!({
        "attributes": [
            {"name": "title", "required": true, "dataType": "string", "maxLength": 255},
            {"name": "variants", "type": "array", "propertyGroups": ["offer", "details"]},
            "not-an-object",
            {"required": true},
            {"name": "title", "required": false},
            {"name": "price", "maxLength": -3, "source": "shopify_rest"}
        ],
        "version": "2024-01"
    });

    let schema = normalizer().normalize("shopify_admin_api", &document);

    let names: Vec<&str> = schema.attributes.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["title", "variants", "price"]);
    assert_eq!(schema.warnings.len(), 2);

    let title = find(&schema, "title");
    assert!(title.required);
    assert_eq!(title.max_length, Some(255));
    assert_eq!(title.source.as_deref(), Some("shopify_admin_api"));

    let variants = find(&schema, "variants");
    assert_eq!(variants.data_type, "array");
    assert_eq!(variants.property_group.as_deref(), Some("offer"));

    let price = find(&schema, "price");
    assert_eq!(price.data_type, "string");
    assert_eq!(price.max_length, None);
    assert_eq!(price.source.as_deref(), Some("shopify_rest"));
}

#[test]
fn openapi_schemas_expand_properties_and_one_ref_hop() {
    let document = json!({
        "info": {"version": "2022-04-01"},
        "components": {"schemas": {
            "Item": {
                "type": "object",
                "required": ["asin"],
                "properties": {
                    "asin": {"type": "string", "maxLength": 10},
                    "summaries": {"type": "array", "items": {"$ref": "#/components/schemas/Summary"}},
                    "dimensions": {"$ref": "#/components/schemas/Dimensions"},
                    "missing": {"$ref": "#/components/schemas/Nowhere"}
                }
            },
            "Dimensions": {
                "required": ["height"],
                "properties": {
                    "height": {"type": "number"},
                    "unit": {"$ref": "#/components/schemas/Unit"},
                    "parent": {"$ref": "#/components/schemas/Dimensions"}
                }
            },
            "Summary": {"properties": {"brand": {"type": "string"}}},
            "Unit": {"type": "string"}
        }}
    });

    let schema = normalizer().normalize("amazon_sp_api", &document);
    assert!(schema.warnings.is_empty());

    let item = find(&schema, "Item");
    assert_eq!(item.data_type, "object");
    assert!(!item.required);

    let asin = find(&schema, "Item.asin");
    assert!(asin.required);
    assert_eq!(asin.max_length, Some(10));
    assert_eq!(asin.schema.as_deref(), Some("Item"));

    assert_eq!(find(&schema, "Item.summaries").data_type, "array<ref:Summary>");
    assert_eq!(find(&schema, "Item.dimensions").data_type, "ref:Dimensions");
    assert_eq!(find(&schema, "Item.missing").data_type, "ref:Nowhere");

    let height = find(&schema, "Item.dimensions.height");
    assert!(height.required);
    assert_eq!(height.parent_field.as_deref(), Some("dimensions"));
    assert_eq!(height.schema.as_deref(), Some("Dimensions"));
    assert_eq!(find(&schema, "Item.dimensions.unit").data_type, "ref:Unit");
    assert_eq!(find(&schema, "Item.dimensions.parent").data_type, "ref:Dimensions");

    // The self-reference inside Dimensions resolves once and then stops.
    assert!(
        schema
            .attributes
            .iter()
            .all(|attribute| attribute.name.matches('.').count() <= 2)
    );
    assert!(
        !schema
            .attributes
            .iter()
            .any(|attribute| attribute.name.starts_with("Item.missing."))
    );
    assert_eq!(document_version(&document), "2022-04-01");
}

#[test]
fn swagger_definitions_and_inline_objects_are_recognized() {
    let document = json!({
        "definitions": {
            "Offer": {
                "properties": {
                    "price": {
                        "type": "object",
                        "required": ["amount"],
                        "properties": {"amount": {"type": "number"}, "currency": {"type": ["string", "null"]}}
                    },
                    "broken": 7
                }
            },
            "Legacy": "not a schema"
        }
    });

    assert_eq!(detect_shape(&document), DocumentShape::OpenApi);
    let schema = normalizer().normalize("mirakl_api", &document);

    assert_eq!(find(&schema, "Offer.price").data_type, "object");
    let amount = find(&schema, "Offer.price.amount");
    assert!(amount.required);
    assert_eq!(amount.parent_field.as_deref(), Some("price"));
    assert_eq!(find(&schema, "Offer.price.currency").data_type, "string");
    assert_eq!(schema.warnings.len(), 2);
}

#[test]
fn sample_records_infer_types_and_never_mark_required() {
    let document = json!({
        "offers": [
            {
                "sku": "A-1",
                "quantity": 4,
                "price": 12.5,
                "active": true,
                "discount": null,
                "tags": ["new"],
                "channels": [{"code": "web"}],
                "dimensions": {"height": 3, "unit": "cm"}
            },
            {"sku": "A-2", "brand": "Acme"},
            42
        ]
    });

    let schema = normalizer().normalize("mirakl_api", &document);

    let expected = [
        ("Item.sku", "string"),
        ("Item.quantity", "integer"),
        ("Item.price", "number"),
        ("Item.active", "boolean"),
        ("Item.discount", "null"),
        ("Item.tags", "array"),
        ("Item.channels", "array<object>"),
        ("Item.channels.code", "string"),
        ("Item.dimensions", "object"),
        ("Item.dimensions.height", "integer"),
        ("Item.dimensions.unit", "string"),
        ("Item.brand", "string"),
    ];
    for (name, data_type) in expected {
        assert_eq!(find(&schema, name).data_type, data_type, "{name}");
    }
    assert_eq!(schema.attributes.len(), expected.len());
    assert!(schema.attributes.iter().all(|attribute| !attribute.required));
    assert_eq!(schema.warnings.len(), 1);

    assert_eq!(
        find(&schema, "Item.channels.code").parent_field.as_deref(),
        Some("channels")
    );
    assert_eq!(
        find(&schema, "Item.dimensions.height").parent_field.as_deref(),
        Some("dimensions")
    );
    assert_eq!(find(&schema, "Item.sku").parent_field, None);
}

#[test]
fn sample_record_with_attributes_key_is_not_an_attribute_list() {
    let document = json!({
        "offer_id": 7,
        "sku": "A-1",
        "attributes": [{"code": "color", "value": "red"}]
    });

    assert_eq!(detect_shape(&document), DocumentShape::SampleRecords);
    let schema = normalizer().normalize("mirakl_api", &document);

    assert!(schema.warnings.is_empty());
    assert_eq!(find(&schema, "Item.offer_id").data_type, "integer");
    assert_eq!(find(&schema, "Item.attributes").data_type, "array<object>");
    let code = find(&schema, "Item.attributes.code");
    assert_eq!(code.parent_field.as_deref(), Some("attributes"));
    assert!(schema.attributes.iter().any(|a| a.name == "Item.attributes.value"));
}

#[test]
fn requirements_key_needs_requirement_shaped_content() {
    assert_eq!(
        detect_shape(&json!({"requirements": "see docs", "sku": "A-1"})),
        DocumentShape::SampleRecords
    );
    assert_eq!(
        detect_shape(&json!({"productType": "SHOES", "requirements": [{"name": "size"}]})),
        DocumentShape::ProductTypeDefinition
    );
    assert_eq!(
        detect_shape(&json!({"attributes": []})),
        DocumentShape::AttributeList
    );
}

#[test]
fn product_type_definitions_tag_groups_and_requirements() {
    let document = json!({
        "productTypes": [
            {
                "productType": "LUGGAGE",
                "propertyGroups": {
                    "offer": {"propertyNames": ["list_price"]},
                    "product_identity": {"propertyNames": ["item_name", "brand"]}
                },
                "requirements": {
                    "REQUIRED": [{"name": "item_name", "valueType": "string"}],
                    "OPTIONAL": [{"name": "list_price", "valueType": "number"}, {"valueType": "string"}]
                },
                "schema": "{\"required\":[\"brand\"],\"properties\":{\"brand\":{\"type\":\"string\"},\"item_name\":{\"type\":\"integer\"}}}"
            },
            {"requirements": []},
            "SHOES"
        ]
    });

    assert_eq!(detect_shape(&document), DocumentShape::ProductTypeDefinition);
    let schema = normalizer().normalize("amazon_sp_api", &document);

    let item_name = find(&schema, "LUGGAGE.item_name");
    assert!(item_name.required);
    assert_eq!(item_name.data_type, "string");
    assert_eq!(item_name.product_type.as_deref(), Some("LUGGAGE"));
    assert_eq!(item_name.property_group.as_deref(), Some("product_identity"));
    assert_eq!(item_name.requirement_type.as_deref(), Some("REQUIRED"));

    let list_price = find(&schema, "LUGGAGE.list_price");
    assert!(!list_price.required);
    assert_eq!(list_price.property_group.as_deref(), Some("offer"));

    let brand = find(&schema, "LUGGAGE.brand");
    assert!(brand.required);
    assert_eq!(brand.property_group.as_deref(), Some("product_identity"));

    assert_eq!(schema.attributes.len(), 3);
    // Nameless requirement, definition without productType, bare string entry.
    assert_eq!(schema.warnings.len(), 3);
    assert!(
        schema
            .warnings
            .iter()
            .any(|warning| warning.contains("requirement without a name"))
    );
}

#[test]
fn unrecognized_documents_degrade_to_empty_schema() {
    for document in [json!("oops"), json!(17), json!([]), json!({})] {
        let schema = normalizer().normalize("yahoo_shopping", &document);
        assert!(schema.attributes.is_empty());
        assert_eq!(schema.warnings.len(), 1);
    }

    let schema = normalizer().normalize("yahoo_shopping", &json!({"attributes": []}));
    assert!(schema.attributes.is_empty());
    assert!(schema.warnings.is_empty());
}

#[test]
fn normalization_is_deterministic() {
    let document = json!({
        "components": {"schemas": {
            "B": {"properties": {"z": {"type": "string"}, "a": {"type": "integer"}}},
            "A": {"properties": {"ref": {"$ref": "#/components/schemas/B"}}}
        }}
    });

    let normalizer = normalizer();
    let first = normalizer.normalize("amazon_sp_api", &document);
    let second = normalizer.normalize("amazon_sp_api", &document);
    assert_eq!(first, second);
}

#[test]
fn visited_set_is_shared_across_documents() {
    let normalizer = normalizer();
    let mut visited = Visited::new();
    let mut out = NormalizedSchema::default();

    normalizer.normalize_into(
        "google_merchant_center",
        &json!([{"name": "offerId", "required": true}]),
        &mut visited,
        &mut out,
    );
    normalizer.normalize_into(
        "google_merchant_center",
        &json!([{"name": "offerId", "required": false}, {"name": "gtin", "type": "string"}]),
        &mut visited,
        &mut out,
    );

    assert_eq!(out.attributes.len(), 2);
    assert!(out.attributes[0].required);
    assert!(visited.contains("gtin"));
}

#[test]
fn group_labels_unify_string_list_and_map_shapes() {
    assert_eq!(group_labels(&json!("offer")), vec!["offer"]);
    assert_eq!(group_labels(&json!(["offer", "", "safety"])), vec!["offer", "safety"]);
    assert_eq!(
        group_labels(&json!({"safety": {}, "offer": {}})),
        vec!["offer", "safety"]
    );
    assert_eq!(group_labels(&json!([{"name": "images"}])), vec!["images"]);
    assert!(group_labels(&json!(3)).is_empty());
}

#[test]
fn document_version_reads_top_level_or_info() {
    assert_eq!(document_version(&json!({"version": " 2024-01 "})), "2024-01");
    assert_eq!(document_version(&json!({"version": 3})), "3");
    assert_eq!(document_version(&json!({"info": {"version": "v1"}})), "v1");
    assert_eq!(document_version(&json!({})), "");
}
