use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::info;

use crate::cli::DiffArgs;
use crate::detect::{diff_attributes, schema_hash};
use crate::model::{ChangeEvent, SchemaDocument};
use crate::normalize::{Normalizer, document_version};
use crate::util::read_json_optional;

const FALLBACK_SOURCE: &str = "adhoc";

pub fn run(args: DiffArgs) -> Result<()> {
    let normalizer = Normalizer::new()?;
    let source_hint = args.source.as_deref();
    let old = load_document(&args.old, source_hint, args.raw.then_some(&normalizer))?;
    let new = load_document(&args.new, source_hint, args.raw.then_some(&normalizer))?;

    let source = source_hint
        .map(str::to_string)
        .or_else(|| (!new.source.is_empty()).then(|| new.source.clone()))
        .unwrap_or_else(|| FALLBACK_SOURCE.to_string());

    let events = compare_documents(&source, &old, &new, Utc::now())?;
    info!(source = %source, changes = events.len(), "diff completed");

    if args.json {
        let mut output = io::BufWriter::new(io::stdout().lock());
        serde_json::to_writer_pretty(&mut output, &events)
            .context("failed to serialize diff json output")?;
        writeln!(output)?;
        output.flush()?;
        return Ok(());
    }

    let mut output = io::BufWriter::new(io::stdout().lock());
    writeln!(output, "Changes: {}", events.len())?;
    for event in &events {
        writeln!(output, "{}", format_change(event))?;
    }
    output.flush()?;
    Ok(())
}

/// Events turning `old` into `new`; empty when both hash the same.
pub fn compare_documents(
    source: &str,
    old: &SchemaDocument,
    new: &SchemaDocument,
    detected_at: DateTime<Utc>,
) -> Result<Vec<ChangeEvent>> {
    if schema_hash(old)? == schema_hash(new)? {
        return Ok(Vec::new());
    }
    Ok(diff_attributes(
        source,
        &old.attributes,
        &new.attributes,
        detected_at,
    ))
}

fn load_document(
    path: &Path,
    source_hint: Option<&str>,
    normalizer: Option<&Normalizer>,
) -> Result<SchemaDocument> {
    let Some(normalizer) = normalizer else {
        return read_json_optional::<SchemaDocument>(path)?
            .with_context(|| format!("schema document not found: {}", path.display()));
    };

    let raw: Value = read_json_optional(path)?
        .with_context(|| format!("raw document not found: {}", path.display()))?;
    let source = source_hint.unwrap_or(FALLBACK_SOURCE);
    let normalized = normalizer.normalize(source, &raw);

    Ok(SchemaDocument {
        attributes: normalized.attributes,
        extracted_at: String::new(),
        source: source.to_string(),
        version: document_version(&raw),
        error: None,
    })
}

fn format_change(event: &ChangeEvent) -> String {
    match (&event.property, &event.old_value, &event.new_value) {
        (Some(property), Some(old), Some(new)) => format!(
            "[{}] {} {}.{}: {} -> {}",
            event.severity,
            event.change_type.as_str(),
            event.attribute,
            property.as_str(),
            old,
            new
        ),
        _ => format!(
            "[{}] {} {}",
            event.severity,
            event.change_type.as_str(),
            event.attribute
        ),
    }
}
