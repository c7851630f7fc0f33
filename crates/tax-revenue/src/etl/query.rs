use super::domain::{CompositionRow, TaxToGdpRow};
use super::silver::{normalize_identifier, resolve_country};
use serde::Deserialize;

/// Optional filters over Gold rows. Absent (or blank) filters match everything.
///
/// `country` matches the canonical name case-insensitively and also accepts any identifier the
/// country dimension knows (ISO codes, aliases). `iso3` is case-insensitive; `year` is exact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MetricFilter {
    pub country: Option<String>,
    pub iso3: Option<String>,
    pub year: Option<i32>,
}

impl MetricFilter {
    pub fn matches(&self, country: &str, iso3: &str, year: i32) -> bool {
        self.matches_country(country, iso3)
            && non_blank(&self.iso3).map_or(true, |wanted| wanted.eq_ignore_ascii_case(iso3))
            && self.year.map_or(true, |wanted| wanted == year)
    }

    fn matches_country(&self, country: &str, iso3: &str) -> bool {
        let Some(wanted) = non_blank(&self.country) else {
            return true;
        };
        normalize_identifier(wanted) == normalize_identifier(country)
            || resolve_country(wanted).is_some_and(|resolved| resolved.iso3 == iso3)
    }

    pub fn tax_to_gdp(&self, rows: &[TaxToGdpRow]) -> Vec<TaxToGdpRow> {
        rows.iter()
            .filter(|row| self.matches(&row.country, &row.iso3, row.year))
            .cloned()
            .collect()
    }

    pub fn composition(&self, rows: &[CompositionRow]) -> Vec<CompositionRow> {
        rows.iter()
            .filter(|row| self.matches(&row.country, &row.iso3, row.year))
            .cloned()
            .collect()
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(country: &str, iso3: &str, year: i32, tax_to_gdp: f64) -> TaxToGdpRow {
        TaxToGdpRow {
            country: country.to_string(),
            iso3: iso3.to_string(),
            year,
            tax_to_gdp,
        }
    }

    fn rows() -> Vec<TaxToGdpRow> {
        vec![
            row("Germany", "DEU", 2020, 38.3),
            row("Germany", "DEU", 2021, 39.5),
            row("Türkiye", "TUR", 2021, 22.8),
        ]
    }

    #[test]
    fn absent_filters_return_everything() {
        assert_eq!(MetricFilter::default().tax_to_gdp(&rows()), rows());
    }

    #[test]
    fn country_match_ignores_case_and_accepts_aliases() {
        let by_name = MetricFilter {
            country: Some("gERMANY".to_string()),
            ..MetricFilter::default()
        };
        assert_eq!(by_name.tax_to_gdp(&rows()).len(), 2);

        let by_alias = MetricFilter {
            country: Some("Turkey".to_string()),
            ..MetricFilter::default()
        };
        assert_eq!(by_alias.tax_to_gdp(&rows()), vec![rows()[2].clone()]);
    }

    #[test]
    fn filters_combine() {
        let filter = MetricFilter {
            country: None,
            iso3: Some("deu".to_string()),
            year: Some(2021),
        };
        assert_eq!(filter.tax_to_gdp(&rows()), vec![rows()[1].clone()]);
    }

    #[test]
    fn blank_filters_are_ignored_and_unknowns_match_nothing() {
        let blank = MetricFilter {
            country: Some("  ".to_string()),
            ..MetricFilter::default()
        };
        assert_eq!(blank.tax_to_gdp(&rows()).len(), 3);

        let unknown = MetricFilter {
            country: Some("Atlantis".to_string()),
            ..MetricFilter::default()
        };
        assert!(unknown.tax_to_gdp(&rows()).is_empty());
    }
}
