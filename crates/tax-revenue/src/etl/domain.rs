use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Closed set of revenue headings known at build time.
///
/// Ordering follows the code identifier (ascending ASCII), which is the canonical sort order of
/// the Silver table and the tie-break order of composition reconciliation. Presentation order is
/// [`TaxCode::display_order`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaxCode {
    Cit,
    Excise,
    Other,
    Payroll,
    Pit,
    Property,
    Ssc,
    Vat,
}

impl TaxCode {
    pub const ALL: [Self; 8] = [
        Self::Cit,
        Self::Excise,
        Self::Other,
        Self::Payroll,
        Self::Pit,
        Self::Property,
        Self::Ssc,
        Self::Vat,
    ];

    /// Code identifiers accepted by the Bronze schema.
    pub const CODES: &'static [&'static str] = &[
        "CIT", "EXCISE", "OTHER", "PAYROLL", "PIT", "PROPERTY", "SSC", "VAT",
    ];

    pub const fn code(self) -> &'static str {
        match self {
            Self::Cit => "CIT",
            Self::Excise => "EXCISE",
            Self::Other => "OTHER",
            Self::Payroll => "PAYROLL",
            Self::Pit => "PIT",
            Self::Property => "PROPERTY",
            Self::Ssc => "SSC",
            Self::Vat => "VAT",
        }
    }

    pub const fn display_order(self) -> u8 {
        match self {
            Self::Pit => 1,
            Self::Cit => 2,
            Self::Ssc => 3,
            Self::Payroll => 4,
            Self::Property => 5,
            Self::Vat => 6,
            Self::Excise => 7,
            Self::Other => 8,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Cit => "Corporate income tax",
            Self::Excise => "Excises",
            Self::Other => "Other taxes",
            Self::Payroll => "Payroll taxes",
            Self::Pit => "Personal income tax",
            Self::Property => "Property taxes",
            Self::Ssc => "Social security contributions",
            Self::Vat => "Value added tax",
        }
    }
}

impl Ord for TaxCode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.code().cmp(other.code())
    }
}

impl PartialOrd for TaxCode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TaxCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTaxCode(pub String);

impl fmt::Display for UnknownTaxCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown tax code '{}'", self.0)
    }
}

impl std::error::Error for UnknownTaxCode {}

impl FromStr for TaxCode {
    type Err = UnknownTaxCode;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        Self::ALL
            .into_iter()
            .find(|code| code.code().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownTaxCode(trimmed.to_string()))
    }
}

/// Country dimension entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Country {
    pub iso2: &'static str,
    pub iso3: &'static str,
    pub canonical_name: &'static str,
}

/// Silver fact: one tax heading of one country-year, as a percentage of GDP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRow {
    pub country: String,
    pub iso3: String,
    pub year: i32,
    pub tax_code: TaxCode,
    pub value_pct_gdp: f64,
}

impl FactRow {
    pub fn key(&self) -> FactKey {
        FactKey {
            iso3: self.iso3.clone(),
            year: self.year,
            tax_code: self.tax_code,
        }
    }

    pub fn group(&self) -> GroupKey {
        GroupKey {
            iso3: self.iso3.clone(),
            year: self.year,
        }
    }
}

/// Uniqueness key of the Silver table; its ordering is the canonical row order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FactKey {
    pub iso3: String,
    pub year: i32,
    pub tax_code: TaxCode,
}

impl fmt::Display for FactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.iso3, self.year, self.tax_code)
    }
}

/// A country-year, the grain of both Gold metrics.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub iso3: String,
    pub year: i32,
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.iso3, self.year)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxToGdpRow {
    pub country: String,
    pub iso3: String,
    pub year: i32,
    pub tax_to_gdp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionRow {
    pub country: String,
    pub iso3: String,
    pub year: i32,
    pub tax_code: TaxCode,
    pub share_pct: f64,
}

impl CompositionRow {
    /// Share expressed as a count of `10^-precision` units.
    pub fn share_units(&self, precision: u32) -> u64 {
        (self.share_pct * 10f64.powi(precision as i32)).round() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tax_codes_sort_by_identifier() {
        let mut codes = vec![TaxCode::Vat, TaxCode::Pit, TaxCode::Cit, TaxCode::Ssc];
        codes.sort();
        assert_eq!(
            codes,
            vec![TaxCode::Cit, TaxCode::Pit, TaxCode::Ssc, TaxCode::Vat]
        );
        let listed: Vec<&str> = TaxCode::ALL.iter().map(|code| code.code()).collect();
        assert_eq!(listed, TaxCode::CODES);
    }

    #[test]
    fn tax_code_parsing_is_case_insensitive() {
        assert_eq!(" vat ".parse::<TaxCode>(), Ok(TaxCode::Vat));
        assert_eq!("Pit".parse::<TaxCode>(), Ok(TaxCode::Pit));
        assert_eq!(
            "GST".parse::<TaxCode>(),
            Err(UnknownTaxCode("GST".to_string()))
        );
    }

    #[test]
    fn display_order_is_a_permutation() {
        let mut orders: Vec<u8> = TaxCode::ALL.iter().map(|code| code.display_order()).collect();
        orders.sort_unstable();
        assert_eq!(orders, (1..=8).collect::<Vec<u8>>());
    }
}
