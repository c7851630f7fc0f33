use super::{Check, ColumnKind, ColumnSpec, Violation, ViolationKind};

/// A cell after type coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<'a> {
    Text(&'a str),
    Integer(i64),
    Float(f64),
}

impl Value<'_> {
    fn as_number(&self) -> Option<f64> {
        match self {
            Value::Integer(value) => Some(*value as f64),
            Value::Float(value) => Some(*value),
            Value::Text(_) => None,
        }
    }
}

/// Coerces a non-blank cell to `kind`. Non-finite floats are not coercible.
pub fn coerce(raw: &str, kind: ColumnKind) -> Option<Value<'_>> {
    let trimmed = raw.trim();
    match kind {
        ColumnKind::Text => Some(Value::Text(trimmed)),
        ColumnKind::Integer => trimmed.parse::<i64>().ok().map(Value::Integer),
        ColumnKind::Float => trimmed
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map(Value::Float),
    }
}

pub(crate) fn check_cell(
    spec: &ColumnSpec,
    cell: Option<&str>,
    row: usize,
    violations: &mut Vec<Violation>,
) {
    let violation = |kind: ViolationKind, value: Option<&str>| Violation {
        row: Some(row),
        column: spec.name,
        value: value.map(str::to_string),
        kind,
    };

    let Some(raw) = cell else {
        if !spec.nullable {
            violations.push(violation(ViolationKind::Null, None));
        }
        return;
    };

    let Some(value) = coerce(raw, spec.kind) else {
        violations.push(violation(
            ViolationKind::NotCoercible {
                expected: spec.kind,
            },
            Some(raw),
        ));
        return;
    };

    for check in &spec.checks {
        if let Some(kind) = evaluate(check, &value) {
            violations.push(violation(kind, Some(raw)));
        }
    }
}

fn evaluate(check: &Check, value: &Value<'_>) -> Option<ViolationKind> {
    match check {
        Check::Range { min, max } => {
            let number = value.as_number()?;
            (number < *min || number > *max).then_some(ViolationKind::OutOfRange {
                min: *min,
                max: *max,
            })
        }
        Check::Membership(allowed) => {
            let Value::Text(text) = value else {
                return None;
            };
            let member = allowed
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(text));
            (!member).then_some(ViolationKind::NotMember { allowed: *allowed })
        }
        Check::Length { min, max } => {
            let Value::Text(text) = value else {
                return None;
            };
            let length = text.chars().count();
            (length < *min || length > *max).then_some(ViolationKind::Length {
                min: *min,
                max: *max,
            })
        }
    }
}
