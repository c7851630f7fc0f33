mod composition;
mod store;
mod tax_to_gdp;

pub use composition::{build_composition, reconcile, ReconcileError, Share};
pub use store::{BuildInfo, GoldManifest, GoldSnapshot, GoldStore, RunStats};
pub use tax_to_gdp::build_tax_to_gdp;

use super::domain::{CompositionRow, FactRow, GroupKey, TaxCode, TaxToGdpRow};
use super::{PipelineError, RangeBreach};
use std::collections::BTreeMap;
use tracing::info;

/// Both Gold metrics of one run, computed and checked but not yet published.
#[derive(Debug, Clone, PartialEq)]
pub struct GoldTables {
    pub tax_to_gdp: Vec<TaxToGdpRow>,
    pub composition: Vec<CompositionRow>,
    pub share_precision: u32,
}

/// The facts of one country-year, ordered by tax code.
#[derive(Debug, Clone)]
pub(crate) struct Group {
    pub country: String,
    pub entries: Vec<(TaxCode, f64)>,
}

pub(crate) fn group_facts(facts: &[FactRow]) -> BTreeMap<GroupKey, Group> {
    let mut groups: BTreeMap<GroupKey, Group> = BTreeMap::new();
    for fact in facts {
        groups
            .entry(fact.group())
            .or_insert_with(|| Group {
                country: fact.country.clone(),
                entries: Vec::new(),
            })
            .entries
            .push((fact.tax_code, fact.value_pct_gdp));
    }
    for group in groups.values_mut() {
        group.entries.sort_by_key(|(code, _)| *code);
    }
    groups
}

/// Computes both metrics and re-checks their invariants before anything is persisted.
pub fn build(facts: &[FactRow], share_precision: u32) -> Result<GoldTables, PipelineError> {
    let tax_to_gdp = build_tax_to_gdp(facts)?;
    let composition = build_composition(facts, share_precision)?;
    let tables = GoldTables {
        tax_to_gdp,
        composition,
        share_precision,
    };
    verify(&tables)?;

    info!(
        tax_to_gdp_rows = tables.tax_to_gdp.len(),
        composition_rows = tables.composition.len(),
        share_precision,
        "built gold tables"
    );
    Ok(tables)
}

/// Every composition group must total exactly 100 at the table's precision and every value must
/// be a percentage.
pub fn verify(tables: &GoldTables) -> Result<(), PipelineError> {
    let breaches: Vec<_> = tables
        .tax_to_gdp
        .iter()
        .filter(|row| !(0.0..=100.0).contains(&row.tax_to_gdp))
        .map(|row| RangeBreach {
            group: GroupKey {
                iso3: row.iso3.clone(),
                year: row.year,
            },
            tax_to_gdp: row.tax_to_gdp,
        })
        .collect();
    if !breaches.is_empty() {
        return Err(PipelineError::MetricRangeViolation(breaches));
    }

    let expected_units = 100 * 10u64.pow(tables.share_precision);
    let mut totals: BTreeMap<GroupKey, u64> = BTreeMap::new();
    for row in &tables.composition {
        let group = GroupKey {
            iso3: row.iso3.clone(),
            year: row.year,
        };
        if !(0.0..=100.0).contains(&row.share_pct) {
            return Err(PipelineError::ReconciliationFailure {
                group,
                total_units: row.share_units(tables.share_precision),
                expected_units,
            });
        }
        *totals.entry(group).or_default() += row.share_units(tables.share_precision);
    }

    match totals
        .into_iter()
        .find(|(_, total_units)| *total_units != expected_units)
    {
        Some((group, total_units)) => Err(PipelineError::ReconciliationFailure {
            group,
            total_units,
            expected_units,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn fact(iso3: &str, year: i32, tax_code: TaxCode, value: f64) -> FactRow {
        FactRow {
            country: format!("Country {iso3}"),
            iso3: iso3.to_string(),
            year,
            tax_code,
            value_pct_gdp: value,
        }
    }

    fn scenario() -> Vec<FactRow> {
        vec![
            fact("XXX", 2000, TaxCode::Pit, 10.0),
            fact("XXX", 2000, TaxCode::Vat, 5.0),
            fact("XXX", 2001, TaxCode::Pit, 12.0),
            fact("XXX", 2001, TaxCode::Vat, 6.0),
        ]
    }

    #[test]
    fn builds_reference_scenario() {
        let tables = build(&scenario(), 1).expect("builds");

        let totals: Vec<(i32, f64)> = tables
            .tax_to_gdp
            .iter()
            .map(|row| (row.year, row.tax_to_gdp))
            .collect();
        assert_eq!(totals, vec![(2000, 15.0), (2001, 18.0)]);

        let shares: Vec<(i32, TaxCode, f64)> = tables
            .composition
            .iter()
            .map(|row| (row.year, row.tax_code, row.share_pct))
            .collect();
        assert_eq!(
            shares,
            vec![
                (2000, TaxCode::Pit, 66.7),
                (2000, TaxCode::Vat, 33.3),
                (2001, TaxCode::Pit, 66.7),
                (2001, TaxCode::Vat, 33.3),
            ]
        );
    }

    #[test]
    fn groups_are_ordered_by_tax_code() {
        let facts = vec![
            fact("DEU", 2021, TaxCode::Vat, 6.9),
            fact("DEU", 2021, TaxCode::Cit, 2.1),
            fact("DEU", 2021, TaxCode::Pit, 9.8),
        ];
        let groups = group_facts(&facts);
        let codes: Vec<TaxCode> = groups
            .values()
            .flat_map(|group| group.entries.iter().map(|(code, _)| *code))
            .collect();
        assert_eq!(codes, vec![TaxCode::Cit, TaxCode::Pit, TaxCode::Vat]);
    }

    #[test]
    fn verify_rejects_groups_that_do_not_total_one_hundred() {
        let mut tables = build(&scenario(), 1).expect("builds");
        tables.composition[0].share_pct = 66.6;

        let error = verify(&tables).expect_err("unbalanced");
        match error {
            PipelineError::ReconciliationFailure {
                group,
                total_units,
                expected_units,
            } => {
                assert_eq!(group.year, 2000);
                assert_eq!(total_units, 999);
                assert_eq!(expected_units, 1000);
            }
            other => panic!("expected reconciliation failure, got {other:?}"),
        }
    }
}
