mod parser;

pub use parser::RawTable;

use super::fs::write_atomic;
use super::PipelineError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

/// Companion record written by the extractor next to each Bronze extract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BronzeMetadata {
    #[serde(
        serialize_with = "serialize_timestamp",
        deserialize_with = "deserialize_timestamp"
    )]
    pub snapshot_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub query_description: String,
}

/// One Bronze generation: the raw table plus its metadata, when the extractor wrote any.
#[derive(Debug, Clone)]
pub struct BronzeSnapshot {
    pub table: RawTable,
    pub metadata: Option<BronzeMetadata>,
}

pub fn read_table<R: Read>(reader: R) -> Result<RawTable, PipelineError> {
    parser::parse_table(reader).map_err(|source| PipelineError::csv("bronze extract", source))
}

pub fn read_table_from_path(path: &Path) -> Result<RawTable, PipelineError> {
    let file = std::fs::File::open(path).map_err(|source| PipelineError::io(path, source))?;
    parser::parse_table(file).map_err(|source| PipelineError::csv(path.display(), source))
}

/// Loads the extract and its metadata. A missing metadata file is tolerated; a malformed one is
/// not.
pub fn read_snapshot(path: &Path, meta_path: &Path) -> Result<BronzeSnapshot, PipelineError> {
    let table = read_table_from_path(path)?;

    let metadata = if meta_path.exists() {
        let raw =
            std::fs::read_to_string(meta_path).map_err(|source| PipelineError::io(meta_path, source))?;
        let metadata: BronzeMetadata = serde_json::from_str(&raw)
            .map_err(|source| PipelineError::metadata(meta_path, source))?;
        Some(metadata)
    } else {
        warn!(path = %meta_path.display(), "bronze metadata missing; snapshot timestamp unknown");
        None
    };

    info!(
        rows = table.len(),
        columns = table.headers().len(),
        path = %path.display(),
        "loaded bronze extract"
    );

    Ok(BronzeSnapshot { table, metadata })
}

/// Replaces the Bronze extract wholesale with `source` and records the snapshot metadata.
pub fn import_extract(
    source: &Path,
    bronze_path: &Path,
    meta_path: &Path,
    query_description: &str,
    snapshot_timestamp: DateTime<Utc>,
) -> Result<BronzeMetadata, PipelineError> {
    let content = std::fs::read(source).map_err(|err| PipelineError::io(source, err))?;

    // Reject files the parser cannot read before they overwrite the current generation.
    let table = parser::parse_table(content.as_slice())
        .map_err(|err| PipelineError::csv(source.display(), err))?;

    let metadata = BronzeMetadata {
        snapshot_timestamp,
        query_description: query_description.trim().to_string(),
    };
    let meta_json = serde_json::to_vec_pretty(&metadata)
        .map_err(|err| PipelineError::metadata(meta_path, err))?;

    write_atomic(bronze_path, &content)?;
    write_atomic(meta_path, &meta_json)?;

    info!(
        rows = table.len(),
        path = %bronze_path.display(),
        snapshot = %metadata.snapshot_timestamp,
        "imported bronze extract"
    );

    Ok(metadata)
}

fn serialize_timestamp<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parser::parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid snapshot timestamp '{raw}'")))
}
