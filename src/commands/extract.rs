use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use tracing::{debug, info, warn};

use crate::canonical::CanonicalAggregator;
use crate::cli::ExtractArgs;
use crate::model::{CanonicalMapping, SchemaDocument};
use crate::normalize::{Normalizer, document_version};
use crate::source::{RegisteredSource, discover_file_sources};
use crate::util::{ensure_directory, now_utc_string, write_json_pretty};

pub const MAPPING_FILE: &str = "canonical_mapping.json";

pub fn run(args: ExtractArgs) -> Result<()> {
    let raw_dir = args.raw_dir();
    let schemas_dir = args.schemas_dir();
    let mapping_path = args
        .mapping_path
        .clone()
        .unwrap_or_else(|| schemas_dir.join(MAPPING_FILE));

    let sources = discover_file_sources(&raw_dir)?;
    if sources.is_empty() {
        bail!("no raw source documents found in {}", raw_dir.display());
    }
    info!(raw_dir = %raw_dir.display(), sources = sources.len(), "extract started");

    let normalizer = Normalizer::new()?;
    let extracted_at = now_utc_string();
    let documents = extract_sources(&normalizer, &sources, &extracted_at);

    ensure_directory(&schemas_dir)?;
    for document in &documents {
        let path = schema_path(&schemas_dir, &document.source);
        write_json_pretty(&path, document)?;
        info!(path = %path.display(), "wrote schema document");
    }

    let mapping = build_canonical_mapping(&documents, now_utc_string());
    write_json_pretty(&mapping_path, &mapping)?;
    info!(
        path = %mapping_path.display(),
        canonical_attributes = mapping.canonical_attributes.len(),
        product_types = mapping.product_type_summary.len(),
        "wrote canonical mapping"
    );

    let failed = documents.iter().filter(|doc| doc.error.is_some()).count();
    info!(sources = documents.len(), failed, "extract completed");

    Ok(())
}

pub fn schema_path(schemas_dir: &Path, source: &str) -> PathBuf {
    schemas_dir.join(format!("{source}_schema.json"))
}

/// Fetches and normalizes every source in order. A failed fetch, or a document
/// nothing could be recovered from, yields a document with `error` set.
pub fn extract_sources(
    normalizer: &Normalizer,
    sources: &[RegisteredSource],
    extracted_at: &str,
) -> Vec<SchemaDocument> {
    sources
        .iter()
        .map(|source| {
            let mut document = SchemaDocument {
                attributes: Vec::new(),
                extracted_at: extracted_at.to_string(),
                source: source.tag.clone(),
                version: String::new(),
                error: None,
            };

            match source.adapter.fetch_document() {
                Ok(raw) => {
                    let normalized = normalizer.normalize(&source.tag, &raw);
                    info!(
                        source = %source.tag,
                        attributes = normalized.attributes.len(),
                        warnings = normalized.warnings.len(),
                        "normalized source"
                    );
                    document.version = document_version(&raw);
                    if normalized.attributes.is_empty() && !normalized.warnings.is_empty() {
                        warn!(source = %source.tag, "no attributes recovered from document");
                        document.error = Some(format!(
                            "no attributes recovered: {}",
                            normalized.warnings.join("; ")
                        ));
                    }
                    document.attributes = normalized.attributes;
                }
                Err(err) => {
                    warn!(source = %source.tag, error = %err, "source unavailable");
                    document.error = Some(err.to_string());
                }
            }

            document
        })
        .collect()
}

/// Aggregates every successfully extracted document. `sourceAPIs` still lists
/// the failed ones.
pub fn build_canonical_mapping(
    documents: &[SchemaDocument],
    generated_at: String,
) -> CanonicalMapping {
    let mut aggregator = CanonicalAggregator::new();
    for document in documents.iter().filter(|doc| doc.error.is_none()) {
        aggregator.extend(&document.attributes);
        debug!(
            source = %document.source,
            canonical_attributes = aggregator.attributes().len(),
            "merged source into canonical table"
        );
    }

    let source_apis = documents.iter().map(|doc| doc.source.clone()).collect();
    aggregator.into_mapping(source_apis, generated_at)
}
