mod mapping;
mod normalizer;

pub(crate) use normalizer::normalize_identifier;

use super::bronze::RawTable;
use super::domain::{Country, FactKey, FactRow, TaxCode};
use super::fs::{csv_bytes, StagedFile};
use super::schema::catalog::{COUNTRY, ISO3, TAX_TYPE, VALUE_PCT_GDP, YEAR};
use super::schema::{coerce, ColumnKind, SchemaViolation, Value, Violation, ViolationKind};
use super::{DuplicateKey, PipelineError, UnmappedCountry};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Resolves a raw country identifier (ISO2, ISO3, name or alias) against the country dimension.
pub fn resolve_country(identifier: &str) -> Option<&'static Country> {
    mapping::lookup(identifier)
}

/// Builds the Silver fact table from a Bronze table that passed schema validation.
///
/// Fails with `UnknownCountry` for every identifier the dimension cannot map and with
/// `DuplicateFact` for every `(iso3, year, tax_code)` key that occurs more than once. Output is
/// sorted by that key.
pub fn normalize(table: &RawTable) -> Result<Vec<FactRow>, PipelineError> {
    let columns = Columns::resolve(table)?;

    let mut facts: BTreeMap<FactKey, FactRow> = BTreeMap::new();
    let mut occurrences: BTreeMap<FactKey, Vec<usize>> = BTreeMap::new();
    let mut unmapped: BTreeMap<String, usize> = BTreeMap::new();
    let mut violations = Vec::new();

    for index in 0..table.len() {
        let row = index + 1;
        let mut cell = |column: &'static str, position: usize, kind: ColumnKind| {
            typed_cell(table, index, column, position, kind, &mut violations)
        };

        let country_cell = cell(COUNTRY, columns.country, ColumnKind::Text);
        let iso3_cell = match columns.iso3 {
            Some(position) => table.cell(index, position),
            None => None,
        };
        let year = cell(YEAR, columns.year, ColumnKind::Integer);
        let tax_type = cell(TAX_TYPE, columns.tax_type, ColumnKind::Text);
        let value = cell(VALUE_PCT_GDP, columns.value, ColumnKind::Float);

        let (
            Some(Value::Text(country_raw)),
            Some(Value::Integer(year)),
            Some(Value::Text(tax_type)),
            Some(Value::Float(value)),
        ) = (country_cell, year, tax_type, value)
        else {
            continue;
        };

        let Ok(tax_code) = tax_type.parse::<TaxCode>() else {
            violations.push(Violation {
                row: Some(row),
                column: TAX_TYPE,
                value: Some(tax_type.to_string()),
                kind: ViolationKind::NotMember {
                    allowed: TaxCode::CODES,
                },
            });
            continue;
        };

        let Ok(year) = i32::try_from(year) else {
            violations.push(Violation {
                row: Some(row),
                column: YEAR,
                value: Some(year.to_string()),
                kind: ViolationKind::OutOfRange {
                    min: f64::from(i32::MIN),
                    max: f64::from(i32::MAX),
                },
            });
            continue;
        };

        let country = match resolve_row_country(country_raw, iso3_cell) {
            Ok(country) => country,
            Err(identifier) => {
                unmapped.entry(identifier).or_insert(row);
                continue;
            }
        };

        let fact = FactRow {
            country: country.canonical_name.to_string(),
            iso3: country.iso3.to_string(),
            year,
            tax_code,
            value_pct_gdp: value,
        };
        let key = fact.key();
        occurrences.entry(key.clone()).or_default().push(row);
        facts.entry(key).or_insert(fact);
    }

    if !violations.is_empty() {
        return Err(PipelineError::Schema(SchemaViolation {
            schema: "bronze",
            violations,
        }));
    }

    if !unmapped.is_empty() {
        let countries = unmapped
            .into_iter()
            .map(|(identifier, row)| UnmappedCountry { identifier, row })
            .collect();
        return Err(PipelineError::UnknownCountry(countries));
    }

    let duplicates: Vec<DuplicateKey> = occurrences
        .into_iter()
        .filter(|(_, rows)| rows.len() > 1)
        .map(|(key, rows)| DuplicateKey { key, rows })
        .collect();
    if !duplicates.is_empty() {
        return Err(PipelineError::DuplicateFact(duplicates));
    }

    let facts: Vec<FactRow> = facts.into_values().collect();
    info!(
        bronze_rows = table.len(),
        silver_rows = facts.len(),
        "normalized bronze into silver"
    );
    Ok(facts)
}

/// Persists the Silver table, replacing any previous generation.
pub fn write_silver(path: &Path, facts: &[FactRow]) -> Result<(), PipelineError> {
    stage_silver(path, facts)?.commit()?;
    debug!(rows = facts.len(), path = %path.display(), "wrote silver table");
    Ok(())
}

/// Writes the Silver table beside `path` without replacing it yet.
pub(crate) fn stage_silver(path: &Path, facts: &[FactRow]) -> Result<StagedFile, PipelineError> {
    let bytes = csv_bytes(facts, "silver")?;
    StagedFile::write(path, &bytes)
}

struct Columns {
    country: usize,
    iso3: Option<usize>,
    year: usize,
    tax_type: usize,
    value: usize,
}

impl Columns {
    fn resolve(table: &RawTable) -> Result<Self, PipelineError> {
        let mut missing = Vec::new();
        let mut required = |name: &'static str| {
            let index = table.column_index(name);
            if index.is_none() {
                missing.push(Violation {
                    row: None,
                    column: name,
                    value: None,
                    kind: ViolationKind::MissingColumn,
                });
            }
            index
        };

        let country = required(COUNTRY);
        let year = required(YEAR);
        let tax_type = required(TAX_TYPE);
        let value = required(VALUE_PCT_GDP);

        match (country, year, tax_type, value) {
            (Some(country), Some(year), Some(tax_type), Some(value)) => Ok(Self {
                country,
                iso3: table.column_index(ISO3),
                year,
                tax_type,
                value,
            }),
            _ => Err(PipelineError::Schema(SchemaViolation {
                schema: "bronze",
                violations: missing,
            })),
        }
    }
}

fn typed_cell<'t>(
    table: &'t RawTable,
    index: usize,
    column: &'static str,
    position: usize,
    kind: ColumnKind,
    violations: &mut Vec<Violation>,
) -> Option<Value<'t>> {
    let Some(raw) = table.cell(index, position) else {
        violations.push(Violation {
            row: Some(index + 1),
            column,
            value: None,
            kind: ViolationKind::Null,
        });
        return None;
    };

    let value = coerce(raw, kind);
    if value.is_none() {
        violations.push(Violation {
            row: Some(index + 1),
            column,
            value: Some(raw.to_string()),
            kind: ViolationKind::NotCoercible { expected: kind },
        });
    }
    value
}

/// An explicit iso3 wins over the name, but a name that maps to a different country is a
/// conflict and leaves the row unmappable.
fn resolve_row_country(
    country_raw: &str,
    iso3_raw: Option<&str>,
) -> Result<&'static Country, String> {
    let by_name = mapping::lookup(country_raw);

    let Some(iso3_raw) = iso3_raw else {
        return by_name.ok_or_else(|| country_raw.to_string());
    };

    match (mapping::lookup_iso3(iso3_raw), by_name) {
        (Some(by_code), Some(by_name)) if by_code.iso3 != by_name.iso3 => {
            Err(format!("{country_raw} / {iso3_raw}"))
        }
        (Some(by_code), _) => Ok(by_code),
        (None, _) => Err(iso3_raw.to_string()),
    }
}
