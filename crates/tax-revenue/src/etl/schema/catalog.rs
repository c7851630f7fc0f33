use super::{Check, ColumnKind, ColumnSpec, TableSchema};
use crate::etl::domain::TaxCode;

pub const COUNTRY: &str = "country";
pub const ISO3: &str = "iso3";
pub const YEAR: &str = "year";
pub const TAX_TYPE: &str = "tax_type";
pub const VALUE_PCT_GDP: &str = "value_pct_gdp";

/// Contract for extracts landing in Bronze.
pub fn bronze_schema() -> TableSchema {
    TableSchema {
        name: "bronze",
        columns: vec![
            ColumnSpec::required(COUNTRY, ColumnKind::Text)
                .check(Check::Length { min: 2, max: 64 }),
            ColumnSpec::optional(ISO3, ColumnKind::Text).check(Check::Length { min: 3, max: 3 }),
            ColumnSpec::required(YEAR, ColumnKind::Integer).check(Check::Range {
                min: 1900.0,
                max: 2100.0,
            }),
            ColumnSpec::required(TAX_TYPE, ColumnKind::Text)
                .check(Check::Membership(TaxCode::CODES)),
            ColumnSpec::required(VALUE_PCT_GDP, ColumnKind::Float).check(Check::Range {
                min: 0.0,
                max: 100.0,
            }),
        ],
    }
}
