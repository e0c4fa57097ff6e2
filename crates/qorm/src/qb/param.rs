//! Binding storage and the SQL text writer.
//!
//! Every statement is rendered through one [`SqlWriter`]. Text and bindings
//! are appended together, so a placeholder's number is simply the binding
//! count at the moment it is written. Sub-selects render into the same writer
//! and therefore get numbers relative to where they are embedded, without
//! any string rewriting afterwards.

use crate::dialect::Dialect;
use crate::ident::quote_part;
use crate::value::Value;

/// Ordered binding list; index `i` belongs to the `i`-th placeholder.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Bindings {
    values: Vec<Value>,
}

impl Bindings {
    /// Create a new empty binding list.
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    /// Add a value and return its 1-based index.
    pub fn push(&mut self, value: Value) -> usize {
        self.values.push(value);
        self.values.len()
    }

    /// Get the current binding count.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Borrow the values in placeholder order.
    pub fn as_slice(&self) -> &[Value] {
        &self.values
    }

    /// Take the values.
    pub fn into_vec(self) -> Vec<Value> {
        self.values
    }
}

/// Accumulates SQL text and bindings for a single statement.
pub(crate) struct SqlWriter<'d> {
    dialect: &'d Dialect,
    sql: String,
    bindings: Bindings,
}

impl<'d> SqlWriter<'d> {
    pub(crate) fn new(dialect: &'d Dialect) -> Self {
        Self {
            dialect,
            sql: String::with_capacity(128),
            bindings: Bindings::new(),
        }
    }

    pub(crate) fn dialect(&self) -> &'d Dialect {
        self.dialect
    }

    /// Append raw SQL text.
    pub(crate) fn push(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    /// Append a quoted identifier reference.
    pub(crate) fn push_ident(&mut self, reference: &str) {
        let quoted = self.dialect.quote(reference);
        self.sql.push_str(&quoted);
    }

    /// Append one quoted name without dotted-path parsing (aliases).
    pub(crate) fn push_name(&mut self, name: &str) {
        let quoted = quote_part(name, self.dialect.identifier_quote);
        self.sql.push_str(&quoted);
    }

    /// Append a placeholder and record its binding.
    pub(crate) fn push_bind(&mut self, value: Value) {
        let idx = self.bindings.push(value);
        let placeholder = self.dialect.placeholder(idx);
        self.sql.push_str(&placeholder);
    }

    /// Append `(p1, p2, ...)` for the given values.
    pub(crate) fn push_bind_list<'v>(&mut self, values: impl IntoIterator<Item = &'v Value>) {
        self.push("(");
        for (i, v) in values.into_iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.push_bind(v.clone());
        }
        self.push(")");
    }

    /// Append a raw fragment, turning each `?` into a dialect placeholder.
    ///
    /// Markers inside `'...'` literals or `"..."` identifiers are text, not
    /// placeholders; a doubled quote re-enters the span. Markers beyond the
    /// supplied values are left as literal `?`.
    pub(crate) fn push_template(&mut self, sql: &str, values: &[Value]) {
        let mut params = values.iter();
        let mut quote: Option<char> = None;
        for ch in sql.chars() {
            match (quote, ch) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '\'' | '"') => quote = Some(ch),
                (None, '?') => {
                    if let Some(v) = params.next() {
                        self.push_bind(v.clone());
                        continue;
                    }
                }
                (None, _) => {}
            }
            self.sql.push(ch);
        }
    }

    pub(crate) fn finish(self) -> (String, Bindings) {
        (self.sql, self.bindings)
    }
}
