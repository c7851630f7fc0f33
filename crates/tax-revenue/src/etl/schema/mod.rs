//! Declarative table validation.
//!
//! A [`TableSchema`] is data: a list of column specs, each with a kind, a nullability flag and a
//! list of [`Check`]s. [`validate`] interprets it over every cell and collects all violations
//! before failing, so one pass reports the complete defect set of an extract.

pub mod catalog;
mod rules;

pub use catalog::bronze_schema;
pub use rules::{coerce, Value};

use super::bronze::RawTable;
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Float,
}

impl ColumnKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Float => "float",
        }
    }
}

/// Domain rule attached to a column.
#[derive(Debug, Clone, PartialEq)]
pub enum Check {
    /// Inclusive numeric bounds.
    Range { min: f64, max: f64 },
    /// Case-insensitive membership in a closed set.
    Membership(&'static [&'static str]),
    /// Inclusive bounds on the character count.
    Length { min: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub nullable: bool,
    pub checks: Vec<Check>,
}

impl ColumnSpec {
    pub fn required(name: &'static str, kind: ColumnKind) -> Self {
        Self {
            name,
            kind,
            nullable: false,
            checks: Vec::new(),
        }
    }

    pub fn optional(name: &'static str, kind: ColumnKind) -> Self {
        Self {
            nullable: true,
            ..Self::required(name, kind)
        }
    }

    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: Vec<ColumnSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViolationKind {
    MissingColumn,
    Null,
    NotCoercible { expected: ColumnKind },
    OutOfRange { min: f64, max: f64 },
    NotMember { allowed: &'static [&'static str] },
    Length { min: usize, max: usize },
}

/// One failed rule. `row` is the 1-based data row (header excluded); `None` for table-level
/// problems such as a missing column.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub row: Option<usize>,
    pub column: &'static str,
    pub value: Option<String>,
    pub kind: ViolationKind,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.row {
            Some(row) => write!(f, "row {row}, column '{}': ", self.column)?,
            None => write!(f, "column '{}': ", self.column)?,
        }

        let value = self.value.as_deref().unwrap_or("");
        match &self.kind {
            ViolationKind::MissingColumn => write!(f, "column missing from header"),
            ViolationKind::Null => write!(f, "value is required"),
            ViolationKind::NotCoercible { expected } => {
                write!(f, "'{value}' is not a valid {}", expected.label())
            }
            ViolationKind::OutOfRange { min, max } => {
                write!(f, "{value} outside [{min}, {max}]")
            }
            ViolationKind::NotMember { allowed } => {
                write!(f, "'{value}' not in {{{}}}", allowed.join(", "))
            }
            ViolationKind::Length { min, max } => write!(
                f,
                "'{value}' has {} characters, expected {min}..={max}",
                value.chars().count()
            ),
        }
    }
}

/// Every rule violation found in one validation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaViolation {
    pub schema: &'static str,
    pub violations: Vec<Violation>,
}

const DISPLAYED_VIOLATIONS: usize = 5;

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} violation(s) of the {} schema",
            self.violations.len(),
            self.schema
        )?;
        for violation in self.violations.iter().take(DISPLAYED_VIOLATIONS) {
            write!(f, "; {violation}")?;
        }
        if self.violations.len() > DISPLAYED_VIOLATIONS {
            write!(
                f,
                "; and {} more",
                self.violations.len() - DISPLAYED_VIOLATIONS
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for SchemaViolation {}

/// Returns `table` unchanged when every cell satisfies `schema`.
pub fn validate<'a>(
    table: &'a RawTable,
    schema: &TableSchema,
) -> Result<&'a RawTable, SchemaViolation> {
    let mut violations = Vec::new();
    let mut resolved = Vec::with_capacity(schema.columns.len());

    for spec in &schema.columns {
        match table.column_index(spec.name) {
            Some(index) => resolved.push((spec, index)),
            None if spec.nullable => {}
            None => violations.push(Violation {
                row: None,
                column: spec.name,
                value: None,
                kind: ViolationKind::MissingColumn,
            }),
        }
    }

    for row in 0..table.len() {
        for (spec, index) in &resolved {
            rules::check_cell(spec, table.cell(row, *index), row + 1, &mut violations);
        }
    }

    if violations.is_empty() {
        return Ok(table);
    }

    for violation in &violations {
        warn!(schema = schema.name, "{violation}");
    }

    Err(SchemaViolation {
        schema: schema.name,
        violations,
    })
}
