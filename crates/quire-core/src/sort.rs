//! Multi-field sorting over metadata mappings.
//!
//! Sort specifications are short strings: a field name, optionally prefixed
//! with `-` for descending or `+` for ascending order, e.g. `["-date", "title"]`.

use std::cmp::Ordering;

use serde_json::Value;

use crate::content::Metadata;

/// Direction for a single sort field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// A parsed sort field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    pub name: String,
    pub direction: SortDirection,
}

impl SortField {
    /// Parse `-field`, `+field` or `field`.
    #[must_use]
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim();
        if let Some(name) = spec.strip_prefix('-') {
            Self {
                name: name.to_string(),
                direction: SortDirection::Descending,
            }
        } else {
            Self {
                name: spec.strip_prefix('+').unwrap_or(spec).to_string(),
                direction: SortDirection::Ascending,
            }
        }
    }
}

/// Split short field specs into parallel name and direction lists.
pub fn format_fields_for_sort_by_order<S: AsRef<str>>(
    specs: &[S],
) -> (Vec<String>, Vec<SortDirection>) {
    specs
        .iter()
        .map(|s| SortField::parse(s.as_ref()))
        .filter(|f| !f.name.is_empty())
        .map(|f| (f.name, f.direction))
        .unzip()
}

/// Parse short field specs into [`SortField`]s.
pub fn parse_sort_fields<S: AsRef<str>>(specs: &[S]) -> Vec<SortField> {
    let (names, directions) = format_fields_for_sort_by_order(specs);
    names
        .into_iter()
        .zip(directions)
        .map(|(name, direction)| SortField { name, direction })
        .collect()
}

/// Compare two metadata mappings field by field.
///
/// Missing or null values sort after present ones in either direction.
/// Returns `Ordering::Equal` when every field ties; callers break the tie.
#[must_use]
pub fn compare_by_fields(a: &Metadata, b: &Metadata, fields: &[SortField]) -> Ordering {
    for field in fields {
        let left = a.get(&field.name).filter(|v| !v.is_null());
        let right = b.get(&field.name).filter(|v| !v.is_null());

        let ordering = match (left, right) {
            (Some(l), Some(r)) => {
                let ord = compare_values(l, r);
                match field.direction {
                    SortDirection::Ascending => ord,
                    SortDirection::Descending => ord.reverse(),
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Natural ordering of metadata values: numbers (booleans as 0/1) before
/// strings, strings lexicographically, anything else by its JSON text.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (numeric(a), numeric(b)) {
        (Some(x), Some(y)) => return x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => return Ordering::Less,
        (None, Some(_)) => return Ordering::Greater,
        (None, None) => {}
    }

    match (a, b) {
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::String(_), _) => Ordering::Less,
        (_, Value::String(_)) => Ordering::Greater,
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}
