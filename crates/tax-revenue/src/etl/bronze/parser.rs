use chrono::{DateTime, NaiveDate, Utc};
use std::io::Read;

/// Untyped table as delivered by the extractor. Cells are kept verbatim (trimmed) so the schema
/// validator can report exactly what arrived.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Header lookup ignores case and surrounding whitespace.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|header| header.trim().eq_ignore_ascii_case(name))
    }

    /// Cell at `row`/`column`; `None` when the cell is absent or blank.
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

pub(crate) fn parse_table<R: Read>(reader: R) -> Result<RawTable, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader
        .headers()?
        .iter()
        .map(|header| header.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(RawTable::new(headers, rows))
}

/// Accepts RFC 3339 timestamps and bare dates (taken as midnight UTC).
pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parse_table_trims_cells_and_bom() {
        let table = parse_table(Cursor::new(
            "\u{feff}country,iso3,year,tax_type,value_pct_gdp\n Germany , DEU ,2021, PIT ,9.8\n",
        ))
        .expect("parse");

        assert_eq!(table.headers()[0], "country");
        assert_eq!(table.column_index("ISO3"), Some(1));
        assert_eq!(table.cell(0, 0), Some("Germany"));
        assert_eq!(table.cell(0, 3), Some("PIT"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn blank_and_missing_cells_are_none() {
        let table = parse_table(Cursor::new("country,iso3,year\nFrance,,2020\nSpain\n"))
            .expect("parse");
        assert_eq!(table.cell(0, 1), None);
        assert_eq!(table.cell(1, 2), None);
        assert_eq!(table.cell(5, 0), None);
    }

    #[test]
    fn parse_timestamp_supports_rfc3339_and_date_strings() {
        let rfc = parse_timestamp("2025-09-24T10:00:00+02:00").expect("parse rfc");
        assert_eq!(rfc.to_rfc3339(), "2025-09-24T08:00:00+00:00");

        let date = parse_timestamp("2025-09-30").expect("parse date");
        assert_eq!(date.to_rfc3339(), "2025-09-30T00:00:00+00:00");

        assert!(parse_timestamp("  ").is_none());
        assert!(parse_timestamp("not-a-date").is_none());
    }
}
