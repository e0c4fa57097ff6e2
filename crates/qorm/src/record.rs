//! Result rows and mapping into caller types.

use crate::error::{OrmError, OrmResult};
use crate::value::{FromValue, Value};
use serde::Serialize;
use std::collections::BTreeMap;

/// One result row: column name to value.
///
/// Records are immutable once built by an executor; column order is not
/// significant.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    values: BTreeMap<String, Value>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw value for a column, if present.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Typed value for a column.
    ///
    /// Missing columns are reported as a decode error.
    pub fn try_get<T: FromValue>(&self, column: &str) -> OrmResult<T> {
        let value = self
            .values
            .get(column)
            .ok_or_else(|| OrmError::decode(column, "column not present in record"))?;
        T::from_value(column, value)
    }

    /// Whether the record carries `column`.
    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    /// Column names in sorted order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Iterate over `(column, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Consume into the underlying map.
    pub fn into_map(self) -> BTreeMap<String, Value> {
        self.values
    }

    /// Return a new record with `other`'s columns layered over this one.
    pub fn merged(mut self, other: impl IntoIterator<Item = (String, Value)>) -> Self {
        self.values.extend(other);
        self
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> From<[(K, V); N]> for Record {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

/// Trait for types that can be built from a [`Record`].
pub trait FromRecord: Sized {
    /// Build an instance from a record.
    fn from_record(record: &Record) -> OrmResult<Self>;
}

impl FromRecord for Record {
    fn from_record(record: &Record) -> OrmResult<Self> {
        Ok(record.clone())
    }
}

type FieldSetter<T> = Box<dyn Fn(&mut T, &Value) -> OrmResult<()> + Send + Sync>;

/// Explicit column → field mapping table.
///
/// Used instead of runtime reflection: the caller lists which column feeds
/// which field.
///
/// ```ignore
/// #[derive(Default)]
/// struct User { id: i64, name: String }
///
/// let map = FieldMap::<User>::new()
///     .field("id", |u, v: i64| u.id = v)
///     .field("name", |u, v: String| u.name = v);
/// let users = qorm::table("users").get_mapped(&conn, &map).await?;
/// ```
pub struct FieldMap<T> {
    fields: Vec<(String, bool, FieldSetter<T>)>,
}

impl<T: Default> FieldMap<T> {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Map a required column onto a field.
    pub fn field<V, F>(mut self, column: &str, set: F) -> Self
    where
        V: FromValue,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        let col = column.to_string();
        self.fields.push((
            column.to_string(),
            true,
            Box::new(move |target, value| {
                set(target, V::from_value(&col, value)?);
                Ok(())
            }),
        ));
        self
    }

    /// Map a column that may be absent from the record.
    pub fn optional_field<V, F>(mut self, column: &str, set: F) -> Self
    where
        V: FromValue,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        let col = column.to_string();
        self.fields.push((
            column.to_string(),
            false,
            Box::new(move |target, value| {
                set(target, V::from_value(&col, value)?);
                Ok(())
            }),
        ));
        self
    }

    /// Apply the table to one record.
    pub fn map(&self, record: &Record) -> OrmResult<T> {
        let mut out = T::default();
        for (column, required, setter) in &self.fields {
            match record.get(column) {
                Some(value) => setter(&mut out, value)?,
                None if *required => {
                    return Err(OrmError::decode(
                        column.as_str(),
                        "column not present in record",
                    ));
                }
                None => {}
            }
        }
        Ok(out)
    }
}

impl<T: Default> Default for FieldMap<T> {
    fn default() -> Self {
        Self::new()
    }
}
