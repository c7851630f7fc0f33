use super::GoldTables;
use crate::etl::bronze::BronzeMetadata;
use crate::etl::domain::{CompositionRow, TaxCode, TaxToGdpRow};
use crate::etl::fs::{csv_bytes, write_atomic};
use crate::etl::PipelineError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const MANIFEST_FILE: &str = "manifest.json";
const GENERATIONS_DIR: &str = "generations";
const TAX_TO_GDP_FILE: &str = "tax_to_gdp.csv";
const COMPOSITION_FILE: &str = "composition.csv";
const STAGING_PREFIX: &str = ".staging-";

/// Row counts of the run that produced a generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub bronze_rows: usize,
    pub silver_rows: usize,
    pub tax_to_gdp_rows: usize,
    pub composition_rows: usize,
    pub groups: usize,
}

/// Pointer to the published generation. Readers resolve both tables through it, so they never
/// pair files from different runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldManifest {
    pub generation: u64,
    pub built_at: DateTime<Utc>,
    pub snapshot_timestamp: Option<DateTime<Utc>>,
    pub query_description: Option<String>,
    pub share_precision: u32,
    pub tax_to_gdp: String,
    pub composition: String,
    pub stats: RunStats,
}

/// Provenance recorded alongside a published generation.
#[derive(Debug, Clone)]
pub struct BuildInfo {
    pub built_at: DateTime<Utc>,
    pub bronze: Option<BronzeMetadata>,
    pub stats: RunStats,
}

/// A published generation read back from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct GoldSnapshot {
    pub manifest: GoldManifest,
    pub tax_to_gdp: Vec<TaxToGdpRow>,
    pub composition: Vec<CompositionRow>,
}

/// Composition as persisted: shares carry exactly `share_precision` decimals.
#[derive(Serialize)]
struct CompositionRecord<'a> {
    country: &'a str,
    iso3: &'a str,
    year: i32,
    tax_code: TaxCode,
    share_pct: String,
}

#[derive(Debug, Clone)]
pub struct GoldStore {
    root: PathBuf,
    retain: usize,
}

impl GoldStore {
    pub fn new(root: impl Into<PathBuf>, retain: usize) -> Self {
        Self {
            root: root.into(),
            retain: retain.max(1),
        }
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    fn generations_dir(&self) -> PathBuf {
        self.root.join(GENERATIONS_DIR)
    }

    /// The published manifest, or `None` when nothing has been built yet.
    pub fn manifest(&self) -> Result<Option<GoldManifest>, PipelineError> {
        let path = self.manifest_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(PipelineError::io(&path, err)),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| PipelineError::metadata(&path, source))
    }

    /// Reads both tables of the published generation.
    pub fn load(&self) -> Result<Option<GoldSnapshot>, PipelineError> {
        let Some(manifest) = self.manifest()? else {
            return Ok(None);
        };
        let tax_to_gdp = read_rows(&self.root.join(&manifest.tax_to_gdp))?;
        let composition = read_rows(&self.root.join(&manifest.composition))?;
        Ok(Some(GoldSnapshot {
            manifest,
            tax_to_gdp,
            composition,
        }))
    }

    /// Writes a new immutable generation and switches the manifest to it.
    ///
    /// Both tables are staged in a hidden directory, the directory is renamed into place, and only
    /// then is the manifest replaced. A crash at any point leaves the previous manifest and the
    /// generation it names intact.
    pub fn publish(
        &self,
        tables: &GoldTables,
        info: BuildInfo,
    ) -> Result<GoldManifest, PipelineError> {
        let generations = self.generations_dir();
        fs::create_dir_all(&generations).map_err(|err| PipelineError::io(&generations, err))?;

        let previous = self.manifest()?.map(|manifest| manifest.generation);
        let on_disk = self.generation_numbers()?.into_iter().max();
        let generation = previous.max(on_disk).unwrap_or(0) + 1;
        let name = generation_name(generation);

        let tax_to_gdp = csv_bytes(&tables.tax_to_gdp, "gold tax_to_gdp")?;
        let records: Vec<CompositionRecord<'_>> = tables
            .composition
            .iter()
            .map(|row| CompositionRecord {
                country: &row.country,
                iso3: &row.iso3,
                year: row.year,
                tax_code: row.tax_code,
                share_pct: format!("{:.*}", tables.share_precision as usize, row.share_pct),
            })
            .collect();
        let composition = csv_bytes(&records, "gold composition")?;

        let staging = generations.join(format!("{STAGING_PREFIX}{name}"));
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(|err| PipelineError::io(&staging, err))?;
        }
        fs::create_dir_all(&staging).map_err(|err| PipelineError::io(&staging, err))?;
        for (file, bytes) in [(TAX_TO_GDP_FILE, &tax_to_gdp), (COMPOSITION_FILE, &composition)] {
            let path = staging.join(file);
            fs::write(&path, bytes).map_err(|err| PipelineError::io(&path, err))?;
        }

        let target = generations.join(&name);
        fs::rename(&staging, &target).map_err(|err| PipelineError::io(&target, err))?;

        let (snapshot_timestamp, query_description) = match info.bronze {
            Some(meta) => (Some(meta.snapshot_timestamp), Some(meta.query_description)),
            None => (None, None),
        };
        let manifest = GoldManifest {
            generation,
            built_at: info.built_at,
            snapshot_timestamp,
            query_description,
            share_precision: tables.share_precision,
            tax_to_gdp: format!("{GENERATIONS_DIR}/{name}/{TAX_TO_GDP_FILE}"),
            composition: format!("{GENERATIONS_DIR}/{name}/{COMPOSITION_FILE}"),
            stats: info.stats,
        };
        let manifest_path = self.manifest_path();
        let json = serde_json::to_vec_pretty(&manifest)
            .map_err(|source| PipelineError::metadata(&manifest_path, source))?;
        write_atomic(&manifest_path, &json)?;

        info!(
            generation,
            path = %target.display(),
            "published gold generation"
        );

        self.prune(generation);
        Ok(manifest)
    }

    fn generation_numbers(&self) -> Result<Vec<u64>, PipelineError> {
        let dir = self.generations_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(PipelineError::io(&dir, err)),
        };

        let mut numbers = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| PipelineError::io(&dir, err))?;
            if let Some(number) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<u64>().ok())
            {
                numbers.push(number);
            }
        }
        numbers.sort_unstable();
        Ok(numbers)
    }

    /// Removes generations older than the newest `retain`. Failures only cost disk space.
    fn prune(&self, published: u64) {
        let numbers = match self.generation_numbers() {
            Ok(numbers) => numbers,
            Err(err) => {
                warn!("skipping gold pruning: {err}");
                return;
            }
        };

        let stale = numbers.len().saturating_sub(self.retain);
        for number in numbers.into_iter().take(stale) {
            if number == published {
                continue;
            }
            let path = self.generations_dir().join(generation_name(number));
            match fs::remove_dir_all(&path) {
                Ok(()) => info!(generation = number, "pruned gold generation"),
                Err(err) => warn!(generation = number, "failed to prune gold generation: {err}"),
            }
        }
    }
}

fn generation_name(generation: u64) -> String {
    format!("{generation:06}")
}

fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, PipelineError> {
    let file = fs::File::open(path).map_err(|err| PipelineError::io(path, err))?;
    csv::Reader::from_reader(file)
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(|err| PipelineError::csv(path.display(), err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl::gold::build;
    use crate::etl::gold::tests::fact;
    use chrono::TimeZone;

    fn tables(precision: u32) -> GoldTables {
        build(
            &[
                fact("XXX", 2000, TaxCode::Pit, 10.0),
                fact("XXX", 2000, TaxCode::Vat, 5.0),
            ],
            precision,
        )
        .expect("builds")
    }

    fn info() -> BuildInfo {
        BuildInfo {
            built_at: Utc
                .with_ymd_and_hms(2025, 3, 2, 8, 0, 0)
                .single()
                .expect("timestamp"),
            bronze: None,
            stats: RunStats::default(),
        }
    }

    #[test]
    fn empty_store_is_not_built() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = GoldStore::new(dir.path().join("gold"), 3);
        assert_eq!(store.manifest().expect("manifest"), None);
        assert_eq!(store.load().expect("load"), None);
    }

    #[test]
    fn published_generation_reads_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = GoldStore::new(dir.path(), 3);
        let tables = tables(1);

        let manifest = store.publish(&tables, info()).expect("publish");
        assert_eq!(manifest.generation, 1);
        assert_eq!(manifest.tax_to_gdp, "generations/000001/tax_to_gdp.csv");

        let snapshot = store.load().expect("load").expect("built");
        assert_eq!(snapshot.manifest, manifest);
        assert_eq!(snapshot.tax_to_gdp, tables.tax_to_gdp);
        assert_eq!(snapshot.composition, tables.composition);
    }

    #[test]
    fn shares_are_written_with_fixed_decimals() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = GoldStore::new(dir.path(), 3);

        let manifest = store.publish(&tables(2), info()).expect("publish");
        let written = fs::read_to_string(dir.path().join(&manifest.composition)).expect("read");
        assert_eq!(
            written,
            "country,iso3,year,tax_code,share_pct\n\
Country XXX,XXX,2000,PIT,66.67\n\
Country XXX,XXX,2000,VAT,33.33\n"
        );
    }

    #[test]
    fn generations_advance_and_old_ones_are_pruned() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = GoldStore::new(dir.path(), 2);
        let tables = tables(1);

        for _ in 0..4 {
            store.publish(&tables, info()).expect("publish");
        }

        let manifest = store.manifest().expect("manifest").expect("built");
        assert_eq!(manifest.generation, 4);
        assert_eq!(store.generation_numbers().expect("list"), vec![3, 4]);
        assert!(fs::read_dir(store.generations_dir())
            .expect("read dir")
            .filter_map(Result::ok)
            .all(|entry| !entry.file_name().to_string_lossy().starts_with('.')));
    }

    #[test]
    fn bronze_provenance_lands_in_manifest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = GoldStore::new(dir.path(), 1);
        let mut info = info();
        let snapshot = Utc
            .with_ymd_and_hms(2025, 3, 1, 12, 30, 0)
            .single()
            .expect("timestamp");
        info.bronze = Some(BronzeMetadata {
            snapshot_timestamp: snapshot,
            query_description: "OECD REV PIT+VAT".to_string(),
        });

        let manifest = store.publish(&tables(1), info).expect("publish");
        assert_eq!(manifest.snapshot_timestamp, Some(snapshot));
        assert_eq!(manifest.query_description.as_deref(), Some("OECD REV PIT+VAT"));
    }

    #[test]
    fn manifest_pointing_at_missing_table_is_an_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = GoldStore::new(dir.path(), 3);
        let manifest = store.publish(&tables(1), info()).expect("publish");
        fs::remove_file(dir.path().join(&manifest.composition)).expect("remove");

        let error = store.load().expect_err("missing table");
        assert_eq!(error.kind(), "io");
    }

    #[test]
    fn corrupt_manifest_is_a_metadata_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(MANIFEST_FILE), "{ not json").expect("write");
        let store = GoldStore::new(dir.path(), 3);
        assert_eq!(store.manifest().expect_err("corrupt").kind(), "metadata");
    }
}
