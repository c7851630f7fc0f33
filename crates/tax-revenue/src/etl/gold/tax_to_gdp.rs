use super::group_facts;
use crate::etl::domain::{FactRow, TaxToGdpRow};
use crate::etl::{PipelineError, RangeBreach};
use tracing::debug;

/// Decimal places kept on summed ratios; drops the binary noise of float addition.
const RATIO_DECIMALS: i32 = 6;

/// One row per country-year: the sum of all tax headings, which must stay within `[0, 100]`.
pub fn build_tax_to_gdp(facts: &[FactRow]) -> Result<Vec<TaxToGdpRow>, PipelineError> {
    let mut rows = Vec::new();
    let mut breaches = Vec::new();

    for (group, members) in group_facts(facts) {
        let sum: f64 = members.entries.iter().map(|(_, value)| value).sum();
        let tax_to_gdp = round_to(sum, RATIO_DECIMALS);
        debug!(%group, tax_to_gdp, headings = members.entries.len(), "summed group");

        if !(0.0..=100.0).contains(&tax_to_gdp) {
            breaches.push(RangeBreach { group, tax_to_gdp });
            continue;
        }

        rows.push(TaxToGdpRow {
            country: members.country,
            iso3: group.iso3,
            year: group.year,
            tax_to_gdp,
        });
    }

    if breaches.is_empty() {
        Ok(rows)
    } else {
        Err(PipelineError::MetricRangeViolation(breaches))
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}
