//! Backend-neutral filter predicates.
//!
//! Adapters receive a [`Filter`] tree and translate it into whatever their
//! store speaks. Stores without a query language can use
//! [`Filter::matches`] to evaluate it against rows in memory.

use crate::row::Row;
use crate::value::Value;
use regex::RegexBuilder;
use std::cmp::Ordering;
use std::fmt;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Get the operator symbol.
    pub const fn as_str(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// A predicate tree over named fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `field <op> value`
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    /// `field [NOT] IN (values...)`
    In {
        field: String,
        values: Vec<Value>,
        negated: bool,
    },
    /// `field [NOT] LIKE pattern`, `%` and `_` wildcards
    Like {
        field: String,
        pattern: String,
        negated: bool,
        case_insensitive: bool,
    },
    /// `field IS [NOT] NULL`
    IsNull { field: String, negated: bool },
    /// All children must match (empty = true)
    And(Vec<Filter>),
    /// Any child must match (empty = false)
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

/// Start a predicate on a field: `col("age").gt(18)`.
pub fn col(name: impl Into<String>) -> FieldRef {
    FieldRef { name: name.into() }
}

/// A field reference used to build predicates.
#[derive(Debug, Clone)]
pub struct FieldRef {
    name: String,
}

impl FieldRef {
    fn compare(self, op: CompareOp, value: impl Into<Value>) -> Filter {
        Filter::Compare {
            field: self.name,
            op,
            value: value.into(),
        }
    }

    pub fn eq(self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::Eq, value)
    }

    pub fn ne(self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::Ne, value)
    }

    pub fn lt(self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::Lt, value)
    }

    pub fn le(self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::Le, value)
    }

    pub fn gt(self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::Gt, value)
    }

    pub fn ge(self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::Ge, value)
    }

    pub fn in_list<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Filter {
        Filter::In {
            field: self.name,
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn not_in_list<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Filter {
        Filter::In {
            field: self.name,
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    pub fn like(self, pattern: impl Into<String>) -> Filter {
        Filter::Like {
            field: self.name,
            pattern: pattern.into(),
            negated: false,
            case_insensitive: false,
        }
    }

    pub fn not_like(self, pattern: impl Into<String>) -> Filter {
        Filter::Like {
            field: self.name,
            pattern: pattern.into(),
            negated: true,
            case_insensitive: false,
        }
    }

    /// Case-insensitive LIKE.
    pub fn ilike(self, pattern: impl Into<String>) -> Filter {
        Filter::Like {
            field: self.name,
            pattern: pattern.into(),
            negated: false,
            case_insensitive: true,
        }
    }

    pub fn is_null(self) -> Filter {
        Filter::IsNull {
            field: self.name,
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Filter {
        Filter::IsNull {
            field: self.name,
            negated: true,
        }
    }
}

impl Filter {
    /// Conjunction of all filters. A single filter is returned unchanged.
    pub fn all(filters: impl IntoIterator<Item = Filter>) -> Filter {
        let mut filters: Vec<Filter> = filters.into_iter().collect();
        if filters.len() == 1 {
            return filters.remove(0);
        }
        Filter::And(filters)
    }

    /// Disjunction of all filters. A single filter is returned unchanged.
    pub fn any(filters: impl IntoIterator<Item = Filter>) -> Filter {
        let mut filters: Vec<Filter> = filters.into_iter().collect();
        if filters.len() == 1 {
            return filters.remove(0);
        }
        Filter::Or(filters)
    }

    #[must_use]
    pub fn and(self, other: Filter) -> Filter {
        match self {
            Filter::And(mut children) => {
                children.push(other);
                Filter::And(children)
            }
            this => Filter::And(vec![this, other]),
        }
    }

    #[must_use]
    pub fn or(self, other: Filter) -> Filter {
        match self {
            Filter::Or(mut children) => {
                children.push(other);
                Filter::Or(children)
            }
            this => Filter::Or(vec![this, other]),
        }
    }

    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Filter {
        Filter::Not(Box::new(self))
    }

    /// Combine an optional base filter with another predicate.
    pub fn and_optional(base: Option<Filter>, other: Filter) -> Filter {
        match base {
            Some(base) => base.and(other),
            None => other,
        }
    }

    /// Evaluate the predicate against a row.
    ///
    /// Fields the row does not carry read as NULL. Comparisons involving NULL
    /// are false, as in SQL.
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Filter::Compare { field, op, value } => {
                let actual = row.get_by_name(field).unwrap_or(&Value::Null);
                compare_matches(actual, *op, value)
            }
            Filter::In {
                field,
                values,
                negated,
            } => {
                let actual = row.get_by_name(field).unwrap_or(&Value::Null);
                if actual.is_null() {
                    return false;
                }
                let found = values.iter().any(|v| actual.loosely_equals(v));
                found != *negated
            }
            Filter::Like {
                field,
                pattern,
                negated,
                case_insensitive,
            } => {
                let Some(text) = row.get_by_name(field).and_then(Value::as_str) else {
                    return false;
                };
                like_matches(text, pattern, *case_insensitive) != *negated
            }
            Filter::IsNull { field, negated } => {
                let is_null = row.get_by_name(field).is_none_or(Value::is_null);
                is_null != *negated
            }
            Filter::And(children) => children.iter().all(|f| f.matches(row)),
            Filter::Or(children) => children.iter().any(|f| f.matches(row)),
            Filter::Not(inner) => !inner.matches(row),
        }
    }

    /// Every field name the predicate reads, in first-seen order.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Filter::Compare { field, .. }
            | Filter::In { field, .. }
            | Filter::Like { field, .. }
            | Filter::IsNull { field, .. } => {
                if !out.contains(&field.as_str()) {
                    out.push(field);
                }
            }
            Filter::And(children) | Filter::Or(children) => {
                for child in children {
                    child.collect_fields(out);
                }
            }
            Filter::Not(inner) => inner.collect_fields(out),
        }
    }
}

fn compare_matches(actual: &Value, op: CompareOp, expected: &Value) -> bool {
    if actual.is_null() || expected.is_null() {
        return false;
    }
    let ordering = actual.compare(expected);
    match op {
        CompareOp::Eq => ordering == Some(Ordering::Equal),
        CompareOp::Ne => ordering != Some(Ordering::Equal),
        CompareOp::Lt => ordering == Some(Ordering::Less),
        CompareOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Gt => ordering == Some(Ordering::Greater),
        CompareOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
    }
}

/// Translate a LIKE pattern into an anchored regex and test `text`.
pub fn like_matches(text: &str, pattern: &str, case_insensitive: bool) -> bool {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    let mut literal = String::new();
    for ch in pattern.chars() {
        match ch {
            '%' | '_' => {
                re.push_str(&regex::escape(&literal));
                literal.clear();
                re.push_str(if ch == '%' { ".*" } else { "." });
            }
            other => literal.push(other),
        }
    }
    re.push_str(&regex::escape(&literal));
    re.push('$');

    match RegexBuilder::new(&re)
        .case_insensitive(case_insensitive)
        .dot_matches_new_line(true)
        .build()
    {
        Ok(compiled) => compiled.is_match(text),
        Err(err) => {
            tracing::warn!(pattern = pattern, error = %err, "LIKE pattern failed to compile");
            false
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Compare { field, op, value } => {
                write!(f, "{} {} {}", field, op.as_str(), value)
            }
            Filter::In {
                field,
                values,
                negated,
            } => {
                let list: Vec<String> = values.iter().map(ToString::to_string).collect();
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{} {}IN ({})", field, not, list.join(", "))
            }
            Filter::Like {
                field,
                pattern,
                negated,
                case_insensitive,
            } => {
                let not = if *negated { "NOT " } else { "" };
                let op = if *case_insensitive { "ILIKE" } else { "LIKE" };
                write!(f, "{} {}{} '{}'", field, not, op, pattern)
            }
            Filter::IsNull { field, negated } => {
                if *negated {
                    write!(f, "{} IS NOT NULL", field)
                } else {
                    write!(f, "{} IS NULL", field)
                }
            }
            Filter::And(children) => write_joined(f, children, " AND ", "TRUE"),
            Filter::Or(children) => write_joined(f, children, " OR ", "FALSE"),
            Filter::Not(inner) => write!(f, "NOT ({})", inner),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, children: &[Filter], sep: &str, empty: &str) -> fmt::Result {
    if children.is_empty() {
        return write!(f, "{}", empty);
    }
    let parts: Vec<String> = children.iter().map(|c| format!("({})", c)).collect();
    write!(f, "{}", parts.join(sep))
}
