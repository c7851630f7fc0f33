//! Bronze → Silver → Gold pipeline.
//!
//! Every stage is a synchronous function over in-memory tables. Nothing is written until the Gold
//! tables have been computed and checked, so a failing run leaves the previous Silver and Gold
//! generations untouched.

pub mod bronze;
pub mod domain;
pub(crate) mod fs;
pub mod gold;
pub mod query;
pub mod schema;
pub mod silver;

use crate::config::PipelineConfig;
use chrono::Utc;
use domain::{FactKey, GroupKey};
use gold::{BuildInfo, GoldManifest, GoldStore, RunStats};
use schema::SchemaViolation;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info};

/// A country identifier the dimension could not map, with the first data row it appeared on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmappedCountry {
    pub identifier: String,
    pub row: usize,
}

impl fmt::Display for UnmappedCountry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' (row {})", self.identifier, self.row)
    }
}

/// A fact key present on more than one data row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateKey {
    pub key: FactKey,
    pub rows: Vec<usize>,
}

impl fmt::Display for DuplicateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows: Vec<String> = self.rows.iter().map(usize::to_string).collect();
        write!(f, "{} at rows {}", self.key, rows.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RangeBreach {
    pub group: GroupKey,
    pub tax_to_gdp: f64,
}

impl fmt::Display for RangeBreach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.group, self.tax_to_gdp)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Schema(#[from] SchemaViolation),
    #[error("{} unmappable country identifier(s): {}", .0.len(), summarize(.0))]
    UnknownCountry(Vec<UnmappedCountry>),
    #[error("{} duplicated fact key(s): {}", .0.len(), summarize(.0))]
    DuplicateFact(Vec<DuplicateKey>),
    #[error("tax-to-GDP outside [0, 100] for {} group(s): {}", .0.len(), summarize(.0))]
    MetricRangeViolation(Vec<RangeBreach>),
    #[error("zero total revenue in {} group(s): {}", .0.len(), summarize(.0))]
    ZeroDenominator(Vec<GroupKey>),
    #[error(
        "composition of {group} reconciles to {total_units} units instead of {expected_units}"
    )]
    ReconciliationFailure {
        group: GroupKey,
        total_units: u64,
        expected_units: u64,
    },
    #[error("i/o failure on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed csv in {origin}: {source}")]
    Csv { origin: String, source: csv::Error },
    #[error("malformed metadata in {}: {source}", .path.display())]
    Metadata {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl PipelineError {
    pub(crate) fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn csv(origin: impl fmt::Display, source: csv::Error) -> Self {
        Self::Csv {
            origin: origin.to_string(),
            source,
        }
    }

    pub(crate) fn metadata(path: impl AsRef<Path>, source: serde_json::Error) -> Self {
        Self::Metadata {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Stable machine-readable identifier of the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Schema(_) => "schema_violation",
            Self::UnknownCountry(_) => "unknown_country",
            Self::DuplicateFact(_) => "duplicate_fact",
            Self::MetricRangeViolation(_) => "metric_range_violation",
            Self::ZeroDenominator(_) => "zero_denominator",
            Self::ReconciliationFailure { .. } => "reconciliation_failure",
            Self::Io { .. } => "io",
            Self::Csv { .. } => "csv",
            Self::Metadata { .. } => "metadata",
        }
    }

    /// True when the input data, not the environment or the code, is at fault.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Self::Schema(_)
                | Self::UnknownCountry(_)
                | Self::DuplicateFact(_)
                | Self::MetricRangeViolation(_)
                | Self::ZeroDenominator(_)
        )
    }
}

const SUMMARIZED_ITEMS: usize = 5;

fn summarize<T: fmt::Display>(items: &[T]) -> String {
    let mut parts: Vec<String> = items
        .iter()
        .take(SUMMARIZED_ITEMS)
        .map(ToString::to_string)
        .collect();
    if items.len() > SUMMARIZED_ITEMS {
        parts.push(format!("and {} more", items.len() - SUMMARIZED_ITEMS));
    }
    parts.join("; ")
}

/// Runs every stage against the configured locations and publishes a new Gold generation.
pub fn run(config: &PipelineConfig) -> Result<GoldManifest, PipelineError> {
    let result = run_stages(config);
    if let Err(err) = &result {
        error!(kind = err.kind(), "pipeline run failed: {err}");
    }
    result
}

fn run_stages(config: &PipelineConfig) -> Result<GoldManifest, PipelineError> {
    let snapshot = bronze::read_snapshot(&config.bronze_path, &config.bronze_meta_path())?;

    schema::validate(&snapshot.table, &schema::bronze_schema())?;
    let facts = silver::normalize(&snapshot.table)?;
    let tables = gold::build(&facts, config.share_precision)?;

    let staged_silver = silver::stage_silver(&config.silver_path, &facts)?;

    let stats = RunStats {
        bronze_rows: snapshot.table.len(),
        silver_rows: facts.len(),
        tax_to_gdp_rows: tables.tax_to_gdp.len(),
        composition_rows: tables.composition.len(),
        groups: tables.tax_to_gdp.len(),
    };
    let store = GoldStore::new(&config.gold_dir, config.gold_retain);
    let manifest = store.publish(
        &tables,
        BuildInfo {
            built_at: Utc::now(),
            bronze: snapshot.metadata,
            stats,
        },
    )?;
    staged_silver.commit()?;

    info!(
        generation = manifest.generation,
        silver_rows = manifest.stats.silver_rows,
        groups = manifest.stats.groups,
        "pipeline run complete"
    );
    Ok(manifest)
}
