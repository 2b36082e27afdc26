use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::config::DataConfig;
use crate::constants::{
    COUNTRIES_BIG_COLLECTION, COUNTRIES_SMALL_COLLECTION, ID_WRAPPER_KEY, INSPECTIONS_COLLECTION,
    TERRACES_COLLECTION,
};
use crate::domain::Document;
use crate::error::{PipelineError, Result};
use crate::storage::{DocumentStore, Filter};

pub mod adapters;

pub use adapters::{adapter_for, SourceAdapter};

/// Outcome of loading one payload file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: u64,
    pub skipped_lines: u64,
}

/// Flattens nested `{"$oid": value}` identifier wrappers that some exports
/// embed, recursively over objects and arrays.
pub fn flatten_id_wrappers(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            if let Some(inner) = map.get(ID_WRAPPER_KEY) {
                return inner.clone();
            }
            Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, flatten_id_wrappers(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(flatten_id_wrappers).collect()),
        other => other,
    }
}

/// Reads a single-JSON-array payload file. Non-object entries are dropped
/// and counted.
pub fn read_json_array(path: &Path) -> Result<(Vec<Document>, u64)> {
    let content = fs::read_to_string(path)?;
    let parsed: Value = serde_json::from_str(&content)?;

    let entries = match parsed {
        Value::Array(entries) => entries,
        _ => {
            return Err(PipelineError::Store {
                message: format!("{} is not a JSON array", path.display()),
            })
        }
    };

    let mut docs = Vec::with_capacity(entries.len());
    let mut skipped = 0u64;
    for entry in entries {
        match flatten_id_wrappers(entry) {
            Value::Object(doc) => docs.push(doc),
            _ => skipped += 1,
        }
    }
    Ok((docs, skipped))
}

/// Reads a newline-delimited JSON payload file: one object per line. A line
/// that fails to parse is skipped and counted; the load continues.
pub fn read_jsonl(path: &Path) -> Result<(Vec<Document>, u64)> {
    let content = fs::read_to_string(path)?;

    let mut docs = Vec::new();
    let mut skipped = 0u64;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) => match flatten_id_wrappers(value) {
                Value::Object(doc) => docs.push(doc),
                _ => skipped += 1,
            },
            Err(e) => {
                warn!("Skipping malformed line in {}: {}", path.display(), e);
                skipped += 1;
            }
        }
    }
    Ok((docs, skipped))
}

/// Replace-contents load of a JSON-array payload, optionally run through a
/// source adapter before insertion.
pub async fn import_json_array(
    store: &dyn DocumentStore,
    collection: &str,
    path: &Path,
    adapter: Option<&dyn SourceAdapter>,
) -> Result<ImportSummary> {
    let (mut docs, skipped_lines) = read_json_array(path)?;
    if let Some(adapter) = adapter {
        docs = docs.into_iter().map(|d| adapter.adapt(d)).collect();
    }

    store.delete_many(collection, &Filter::empty()).await?;
    let inserted = store.insert_many(collection, docs).await?;

    info!(
        "Imported {} documents into {} ({} entries skipped)",
        inserted, collection, skipped_lines
    );
    Ok(ImportSummary {
        inserted,
        skipped_lines,
    })
}

/// Replace-contents load of a newline-delimited JSON payload.
pub async fn import_jsonl(
    store: &dyn DocumentStore,
    collection: &str,
    path: &Path,
) -> Result<ImportSummary> {
    let (docs, skipped_lines) = read_jsonl(path)?;

    store.delete_many(collection, &Filter::empty()).await?;
    let inserted = store.insert_many(collection, docs).await?;

    info!(
        "Imported {} documents into {} ({} lines skipped)",
        inserted, collection, skipped_lines
    );
    Ok(ImportSummary {
        inserted,
        skipped_lines,
    })
}

/// Writes a collection out as a pretty-printed JSON array.
pub async fn export_collection(
    store: &dyn DocumentStore,
    collection: &str,
    path: &Path,
) -> Result<u64> {
    let docs = store.find(collection, &Filter::empty(), None).await?;
    let count = docs.len() as u64;
    fs::write(path, serde_json::to_string_pretty(&docs)?)?;

    info!("Exported {} documents from {} to {}", count, collection, path.display());
    Ok(count)
}

/// Loads every configured payload file that exists on disk. A missing file
/// is reported and skipped, the load continues with what is available.
pub async fn load_payloads(
    store: &dyn DocumentStore,
    data: &DataConfig,
) -> Result<Vec<(String, ImportSummary)>> {
    let dir = Path::new(&data.dir);
    let mut loaded = Vec::new();

    let terraces_path = dir.join(&data.terraces_file);
    if terraces_path.exists() {
        let adapter = adapters::OpenDataJsonAdapter;
        let summary =
            import_json_array(store, TERRACES_COLLECTION, &terraces_path, Some(&adapter)).await?;
        loaded.push((TERRACES_COLLECTION.to_string(), summary));
    } else {
        warn!("Terrace dataset not found at {}", terraces_path.display());
    }

    let jsonl_payloads = [
        (INSPECTIONS_COLLECTION, &data.inspections_file),
        (COUNTRIES_SMALL_COLLECTION, &data.countries_small_file),
        (COUNTRIES_BIG_COLLECTION, &data.countries_big_file),
    ];
    for (collection, file) in jsonl_payloads {
        let path = dir.join(file);
        if path.exists() {
            let summary = import_jsonl(store, collection, &path).await?;
            loaded.push((collection.to_string(), summary));
        } else {
            warn!("Payload not found at {}", path.display());
        }
    }

    Ok(loaded)
}
