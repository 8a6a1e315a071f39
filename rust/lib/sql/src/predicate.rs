//! WHERE-clause assembly from sparse filter sets.
//!
//! Every piece of SQL text is `&'static str`; caller input can only enter a
//! query as a bound [`Value`]. Fragments use bare `?` placeholders which are
//! renumbered (`?1`, `?2`, ...) when the filter is rendered, so fragments
//! compose without tracking indices by hand.

use crate::traits::Value;

/// One predicate of a conjunctive WHERE clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column = value`
    Eq(&'static str, Value),
    /// `column >= value`
    AtLeast(&'static str, Value),
    /// `column <= value`
    AtMost(&'static str, Value),
    /// A static SQL fragment with one bound value per `?`.
    Fragment(&'static str, Vec<Value>),
}

impl Predicate {
    fn parts(&self) -> (String, Vec<Value>) {
        match self {
            Predicate::Eq(col, v) => (format!("{col} = ?"), vec![v.clone()]),
            Predicate::AtLeast(col, v) => (format!("{col} >= ?"), vec![v.clone()]),
            Predicate::AtMost(col, v) => (format!("{col} <= ?"), vec![v.clone()]),
            Predicate::Fragment(sql, params) => (format!("({sql})"), params.clone()),
        }
    }
}

/// A rendered clause and its parameters in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    /// `WHERE ...`, or empty when the filter has no predicates.
    pub clause: String,
    pub params: Vec<Value>,
    /// First placeholder index free for the statement's own parameters.
    pub next_index: usize,
}

/// An ordered list of predicates joined with `AND`.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// Render with placeholders numbered from `first_index`.
    pub fn render(&self, first_index: usize) -> Rendered {
        if self.predicates.is_empty() {
            return Rendered {
                clause: String::new(),
                params: Vec::new(),
                next_index: first_index,
            };
        }

        let mut next = first_index;
        let mut conditions = Vec::with_capacity(self.predicates.len());
        let mut params = Vec::new();

        for predicate in &self.predicates {
            let (sql, values) = predicate.parts();
            let placeholders = sql.matches('?').count();
            debug_assert_eq!(
                placeholders,
                values.len(),
                "placeholder count mismatch in {sql}"
            );
            conditions.push(number_placeholders(&sql, &mut next));
            params.extend(values);
        }

        Rendered {
            clause: format!("WHERE {}", conditions.join(" AND ")),
            params,
            next_index: next,
        }
    }
}

/// `?start, ?start+1, ...` for an `IN (...)` list of `n` values.
pub fn numbered_list(start: usize, n: usize) -> String {
    (start..start + n)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn number_placeholders(sql: &str, next: &mut usize) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    for c in sql.chars() {
        if c == '?' {
            out.push_str(&format!("?{}", *next));
            *next += 1;
        } else {
            out.push(c);
        }
    }
    out
}
