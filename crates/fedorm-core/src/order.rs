//! Result ordering.

use crate::row::Row;
use crate::value::Value;
use std::cmp::Ordering;
use std::fmt;

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

/// NULLS FIRST/LAST ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

/// One ORDER BY term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    field: String,
    direction: OrderDirection,
    nulls: Option<NullsOrder>,
}

impl OrderBy {
    /// Create an ascending term.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Asc,
            nulls: None,
        }
    }

    /// Create a descending term.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Desc,
            nulls: None,
        }
    }

    #[must_use]
    pub fn nulls_first(mut self) -> Self {
        self.nulls = Some(NullsOrder::First);
        self
    }

    #[must_use]
    pub fn nulls_last(mut self) -> Self {
        self.nulls = Some(NullsOrder::Last);
        self
    }

    /// Parse `"name"`, `"name ASC"` or `"name DESC"` (case-insensitive keyword).
    ///
    /// Returns `None` for an empty string or an unknown direction keyword.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.split_whitespace();
        let field = parts.next()?;
        let term = match parts.next() {
            None => OrderBy::asc(field),
            Some(dir) if dir.eq_ignore_ascii_case("asc") => OrderBy::asc(field),
            Some(dir) if dir.eq_ignore_ascii_case("desc") => OrderBy::desc(field),
            Some(_) => return None,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(term)
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub const fn direction(&self) -> OrderDirection {
        self.direction
    }

    /// NULL placement; defaults to last for ascending, first for descending.
    pub fn effective_nulls(&self) -> NullsOrder {
        self.nulls.unwrap_or(match self.direction {
            OrderDirection::Asc => NullsOrder::Last,
            OrderDirection::Desc => NullsOrder::First,
        })
    }

    /// Compare two rows on this term.
    pub fn compare_rows(&self, a: &Row, b: &Row) -> Ordering {
        let left = a.get_by_name(&self.field).unwrap_or(&Value::Null);
        let right = b.get_by_name(&self.field).unwrap_or(&Value::Null);
        match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => match self.effective_nulls() {
                NullsOrder::First => Ordering::Less,
                NullsOrder::Last => Ordering::Greater,
            },
            (false, true) => match self.effective_nulls() {
                NullsOrder::First => Ordering::Greater,
                NullsOrder::Last => Ordering::Less,
            },
            (false, false) => {
                let ord = left.compare(right).unwrap_or(Ordering::Equal);
                match self.direction {
                    OrderDirection::Asc => ord,
                    OrderDirection::Desc => ord.reverse(),
                }
            }
        }
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.field)?;
        f.write_str(match self.direction {
            OrderDirection::Asc => " ASC",
            OrderDirection::Desc => " DESC",
        })?;
        if let Some(nulls) = self.nulls {
            f.write_str(match nulls {
                NullsOrder::First => " NULLS FIRST",
                NullsOrder::Last => " NULLS LAST",
            })?;
        }
        Ok(())
    }
}

/// Stable sort of rows by a list of terms, earlier terms taking precedence.
pub fn sort_rows(rows: &mut [Row], order: &[OrderBy]) {
    if order.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        order
            .iter()
            .map(|term| term.compare_rows(a, b))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}
