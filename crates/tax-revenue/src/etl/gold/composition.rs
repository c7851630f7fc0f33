//! Largest-remainder reconciliation of composition shares.
//!
//! Shares are carried as integer counts of the smallest unit `10^-precision`, so "sums to exactly
//! 100" is an integer equality rather than a float comparison. Heading values are fixed to whole
//! millionths of a percentage point first, which makes every quotient and remainder exact. Each
//! share is floored to a whole number of units, which leaves a residual of fewer units than there
//! are headings; those units go one at a time to the headings with the largest remainder, ties
//! going to the smaller tax code.

use super::group_facts;
use crate::etl::domain::{CompositionRow, FactRow, TaxCode};
use crate::etl::PipelineError;
use std::fmt;
use tracing::debug;

/// Heading values are reconciled as integer multiples of `1 / VALUE_SCALE` percent of GDP.
const VALUE_SCALE: f64 = 1e6;

/// One reconciled share, in units of `10^-precision` percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Share {
    pub tax_code: TaxCode,
    pub units: u64,
}

impl Share {
    pub fn percent(&self, precision: u32) -> f64 {
        self.units as f64 / 10f64.powi(precision as i32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileError {
    /// The headings sum to zero (or the group is empty), so no share is defined.
    ZeroTotal,
    /// Post-condition failure: the adjusted units do not total 100 percent.
    Unbalanced { total_units: u64, expected_units: u64 },
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroTotal => write!(f, "group total is zero"),
            Self::Unbalanced {
                total_units,
                expected_units,
            } => write!(
                f,
                "shares total {total_units} units, expected {expected_units}"
            ),
        }
    }
}

impl std::error::Error for ReconcileError {}

/// Splits 100 percent across `entries` proportionally to their values.
///
/// The result is ordered by tax code regardless of input order and always totals
/// `100 * 10^precision` units.
pub fn reconcile(entries: &[(TaxCode, f64)], precision: u32) -> Result<Vec<Share>, ReconcileError> {
    let mut ordered = entries.to_vec();
    ordered.sort_by_key(|(code, _)| *code);
    if ordered.is_empty() {
        return Err(ReconcileError::ZeroTotal);
    }

    let mut scaled = Vec::with_capacity(ordered.len());
    for (_, value) in &ordered {
        if !value.is_finite() {
            return Err(ReconcileError::ZeroTotal);
        }
        scaled.push((value.max(0.0) * VALUE_SCALE).round() as u128);
    }
    let total: u128 = scaled.iter().sum();
    if total == 0 {
        return Err(ReconcileError::ZeroTotal);
    }

    let expected_units = 100 * 10u64.pow(precision);

    let mut shares = Vec::with_capacity(ordered.len());
    let mut remainders = Vec::with_capacity(ordered.len());
    for ((tax_code, _), value) in ordered.iter().zip(&scaled) {
        let numerator = value * u128::from(expected_units);
        shares.push(Share {
            tax_code: *tax_code,
            units: (numerator / total) as u64,
        });
        remainders.push(numerator % total);
    }

    let floored: u64 = shares.iter().map(|share| share.units).sum();
    let residual = expected_units
        .checked_sub(floored)
        .filter(|residual| *residual as usize <= shares.len())
        .ok_or(ReconcileError::Unbalanced {
            total_units: floored,
            expected_units,
        })?;

    // Stable sort keeps ascending tax-code order among equal remainders.
    let mut ranking: Vec<usize> = (0..shares.len()).collect();
    ranking.sort_by(|a, b| remainders[*b].cmp(&remainders[*a]));
    for index in ranking.into_iter().take(residual as usize) {
        shares[index].units += 1;
    }

    let total_units: u64 = shares.iter().map(|share| share.units).sum();
    if total_units != expected_units {
        return Err(ReconcileError::Unbalanced {
            total_units,
            expected_units,
        });
    }
    Ok(shares)
}

/// One row per fact: the heading's reconciled share of its country-year total.
pub fn build_composition(
    facts: &[FactRow],
    precision: u32,
) -> Result<Vec<CompositionRow>, PipelineError> {
    let mut rows = Vec::with_capacity(facts.len());
    let mut zero_groups = Vec::new();

    for (group, members) in group_facts(facts) {
        let shares = match reconcile(&members.entries, precision) {
            Ok(shares) => shares,
            Err(ReconcileError::ZeroTotal) => {
                zero_groups.push(group);
                continue;
            }
            Err(ReconcileError::Unbalanced {
                total_units,
                expected_units,
            }) => {
                return Err(PipelineError::ReconciliationFailure {
                    group,
                    total_units,
                    expected_units,
                });
            }
        };
        debug!(%group, headings = shares.len(), "reconciled composition");

        rows.extend(shares.into_iter().map(|share| CompositionRow {
            country: members.country.clone(),
            iso3: group.iso3.clone(),
            year: group.year,
            tax_code: share.tax_code,
            share_pct: share.percent(precision),
        }));
    }

    if zero_groups.is_empty() {
        Ok(rows)
    } else {
        Err(PipelineError::ZeroDenominator(zero_groups))
    }
}
