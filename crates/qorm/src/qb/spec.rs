//! In-memory model of one statement under construction.
//!
//! Nothing here performs I/O or validation. The builder mutates a
//! [`QuerySpec`]; the compiler reads it.

use crate::qb::expr::Group;
use crate::record::Record;
use crate::value::Value;

/// A FROM source or JOIN target.
#[derive(Clone, Debug, PartialEq)]
pub enum Source {
    /// `table [AS alias]`
    Table { name: String, alias: Option<String> },
    /// `(SELECT ...) AS alias`
    Sub { query: Box<QuerySpec>, alias: String },
}

impl Source {
    pub fn table(name: &str) -> Self {
        Source::Table {
            name: name.to_string(),
            alias: None,
        }
    }

    pub fn aliased(name: &str, alias: &str) -> Self {
        Source::Table {
            name: name.to_string(),
            alias: Some(alias.to_string()),
        }
    }
}

/// Aggregate functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Max,
    Min,
}

impl AggregateFn {
    pub fn as_sql(self) -> &'static str {
        match self {
            AggregateFn::Count => "COUNT",
            AggregateFn::Sum => "SUM",
            AggregateFn::Avg => "AVG",
            AggregateFn::Max => "MAX",
            AggregateFn::Min => "MIN",
        }
    }

    /// Lowercase suffix used for default `with_*` aliases.
    pub fn suffix(self) -> &'static str {
        match self {
            AggregateFn::Count => "count",
            AggregateFn::Sum => "sum",
            AggregateFn::Avg => "avg",
            AggregateFn::Max => "max",
            AggregateFn::Min => "min",
        }
    }
}

/// One entry of the SELECT list.
#[derive(Clone, Debug, PartialEq)]
pub enum SelectItem {
    /// Column reference, quoted per dialect.
    Column(String),
    /// Expression emitted verbatim.
    Raw(String),
    /// `FN(column) AS alias`
    Aggregate {
        function: AggregateFn,
        column: String,
        alias: String,
    },
    /// `(SELECT ...) AS alias`
    Sub { query: Box<QuerySpec>, alias: String },
}

/// Join kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    FullOuter,
}

impl JoinKind {
    pub fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL JOIN",
            JoinKind::FullOuter => "FULL OUTER JOIN",
        }
    }
}

/// `<kind> <target> ON <left> <operator> <right>`
#[derive(Clone, Debug, PartialEq)]
pub struct JoinSpec {
    pub kind: JoinKind,
    pub target: Source,
    pub left: String,
    pub operator: String,
    pub right: String,
}

/// Sort direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// One ORDER BY entry.
#[derive(Clone, Debug, PartialEq)]
pub enum OrderSpec {
    Column { column: String, direction: Direction },
    /// Maps to the dialect's random function.
    Random,
}

/// `UNION` or `UNION ALL`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnionKind {
    Distinct,
    All,
}

impl UnionKind {
    pub fn as_sql(self) -> &'static str {
        match self {
            UnionKind::Distinct => "UNION",
            UnionKind::All => "UNION ALL",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnionSpec {
    pub kind: UnionKind,
    pub query: QuerySpec,
}

/// Root aggregate for one statement.
#[derive(Clone, Debug, PartialEq)]
pub struct QuerySpec {
    pub sources: Vec<Source>,
    pub select: Vec<SelectItem>,
    pub distinct: bool,
    pub joins: Vec<JoinSpec>,
    pub wheres: Group,
    pub group_by: Vec<String>,
    pub havings: Group,
    pub orders: Vec<OrderSpec>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub unions: Vec<UnionSpec>,
    pub lock_for_update: bool,
    pub primary_key: String,
}

impl QuerySpec {
    /// Empty spec without any source.
    pub fn empty() -> Self {
        Self {
            sources: Vec::new(),
            select: Vec::new(),
            distinct: false,
            joins: Vec::new(),
            wheres: Group::new(),
            group_by: Vec::new(),
            havings: Group::new(),
            orders: Vec::new(),
            limit: None,
            offset: None,
            unions: Vec::new(),
            lock_for_update: false,
            primary_key: "id".to_string(),
        }
    }

    /// Spec selecting from `table`.
    pub fn new(table: &str) -> Self {
        let mut spec = Self::empty();
        if !table.is_empty() {
            spec.sources.push(Source::table(table));
        }
        spec
    }

    /// Name of the first plain table source, the target of write statements.
    pub fn table(&self) -> Option<&str> {
        self.sources.iter().find_map(|s| match s {
            Source::Table { name, .. } => Some(name.as_str()),
            Source::Sub { .. } => None,
        })
    }
}

impl Default for QuerySpec {
    fn default() -> Self {
        Self::empty()
    }
}

/// Insertion-ordered write payload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Fields {
    pairs: Vec<(String, Value)>,
}

impl Fields {
    pub fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    /// Set a column, replacing an existing entry in place.
    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    /// In-place variant of [`Fields::set`].
    pub fn insert(&mut self, column: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.pairs.iter_mut().find(|(c, _)| c == column) {
            Some(slot) => slot.1 = value,
            None => self.pairs.push((column.to_string(), value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.pairs.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|(c, _)| c.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.pairs.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Layer `other` over this payload; `other` wins on shared columns.
    pub fn merged(mut self, other: &Fields) -> Self {
        for (c, v) in other.iter() {
            self.insert(c, v.clone());
        }
        self
    }
}

impl<K: AsRef<str>, V: Into<Value>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (k, v) in iter {
            fields.insert(k.as_ref(), v);
        }
        fields
    }
}

impl<K: AsRef<str>, V: Into<Value>, const N: usize> From<[(K, V); N]> for Fields {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl From<Fields> for Record {
    fn from(fields: Fields) -> Self {
        fields.pairs.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_keep_insertion_order() {
        let f = Fields::from([("b", 1), ("a", 2)]).set("b", 3);
        assert_eq!(f.columns().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(f.get("b"), Some(&Value::Int(3)));
    }

    #[test]
    fn merged_overrides() {
        let f = Fields::from([("id", 5)]).merged(&Fields::from([("id", 6), ("n", 1)]));
        assert_eq!(f.get("id"), Some(&Value::Int(6)));
        assert_eq!(f.len(), 2);
    }

    #[test]
    fn table_skips_derived_sources() {
        let mut spec = QuerySpec::empty();
        spec.sources.push(Source::Sub {
            query: Box::new(QuerySpec::new("a")),
            alias: "x".into(),
        });
        spec.sources.push(Source::table("b"));
        assert_eq!(spec.table(), Some("b"));
    }
}
