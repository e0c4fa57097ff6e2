//! Boolean predicate tree for WHERE/HAVING clauses.
//!
//! A [`Group`] is an ordered list of `(Conjunction, PredicateNode)` pairs.
//! The conjunction of the first emitted child is never written, empty groups
//! vanish together with their conjunction, and a nested group is wrapped in
//! parentheses only when it emits more than one child:
//!
//! ```text
//! a = $1 AND (b = $2 OR c = $3)     nested group, two children
//! a = $1 OR b = $2                  nested group, one child: no parentheses
//! ```
//!
//! Where-family arguments arrive as a [`WhereArg`] and are resolved into a
//! node exactly once, in [`PredicateNode::resolve`]. Shapes that cannot be
//! compiled become [`PredicateNode::Malformed`], which fails at compile time
//! so that building a chain never fails.

use crate::error::{OrmError, OrmResult};
use crate::qb::builder::QueryBuilder;
use crate::qb::param::SqlWriter;
use crate::qb::select;
use crate::qb::spec::QuerySpec;
use crate::value::Value;
use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;

/// How a node attaches to the previous sibling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Conjunction {
    And,
    Or,
}

impl Conjunction {
    fn separator(self) -> &'static str {
        match self {
            Conjunction::And => " AND ",
            Conjunction::Or => " OR ",
        }
    }
}

/// Comparison operators accepted by where-family calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    NotLike,
    ILike,
    NotILike,
}

impl Operator {
    /// Recognize an operator token, case-insensitively.
    ///
    /// Inner whitespace is normalized, so `"NOT   like"` is accepted.
    pub fn parse(token: &str) -> Option<Self> {
        let normalized = token
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_lowercase();
        let op = match normalized.as_str() {
            "=" => Operator::Eq,
            "!=" | "<>" => Operator::Ne,
            "<" => Operator::Lt,
            "<=" => Operator::Lte,
            ">" => Operator::Gt,
            ">=" => Operator::Gte,
            "like" => Operator::Like,
            "not like" => Operator::NotLike,
            "ilike" => Operator::ILike,
            "not ilike" => Operator::NotILike,
            _ => return None,
        };
        Some(op)
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::ILike => "ILIKE",
            Operator::NotILike => "NOT ILIKE",
        }
    }
}

/// A node of the predicate tree.
#[derive(Clone, Debug, PartialEq)]
pub enum PredicateNode {
    /// `column op ?`
    Comparison {
        column: String,
        operator: Operator,
        value: Value,
    },
    /// `column [NOT] IN (?, ...)`; an empty list compiles to a constant.
    InList {
        column: String,
        values: Vec<Value>,
        negated: bool,
    },
    /// `column [NOT] IN (SELECT ...)`
    InSub {
        column: String,
        subquery: Box<QuerySpec>,
        negated: bool,
    },
    /// `column [NOT] BETWEEN ? AND ?`
    Between {
        column: String,
        low: Value,
        high: Value,
        negated: bool,
    },
    /// `column IS [NOT] NULL`
    NullCheck { column: String, negated: bool },
    /// `[NOT] EXISTS (SELECT ...)`
    Exists {
        subquery: Box<QuerySpec>,
        negated: bool,
    },
    /// Nested boolean group.
    Group(Group),
    /// SQL fragment whose `?` markers become placeholders in order. Always
    /// written in parentheses so an `OR` inside cannot leak out.
    Raw { sql: String, bindings: Vec<Value> },
    /// Invalid argument shape, reported when compiled.
    Malformed { column: String, reason: String },
}

impl PredicateNode {
    /// Resolve a where-family argument against `column`.
    pub fn resolve(column: &str, arg: WhereArg) -> Self {
        match arg {
            WhereArg::Value(value) => Self::compare(column, Operator::Eq, value),
            WhereArg::OperatorValue(token, value) => match Operator::parse(&token) {
                Some(op) => Self::compare(column, op, value),
                None => PredicateNode::Malformed {
                    column: column.to_string(),
                    reason: format!("unknown operator '{token}'"),
                },
            },
            WhereArg::List(_) => PredicateNode::Malformed {
                column: column.to_string(),
                reason: "a list argument is only accepted by where_in/where_not_in".to_string(),
            },
            WhereArg::Group(group) => PredicateNode::Group(group),
        }
    }

    /// Comparison node; `= NULL` and `!= NULL` turn into null checks.
    pub fn compare(column: &str, operator: Operator, value: Value) -> Self {
        match (operator, value.is_null()) {
            (Operator::Eq, true) => PredicateNode::NullCheck {
                column: column.to_string(),
                negated: false,
            },
            (Operator::Ne, true) => PredicateNode::NullCheck {
                column: column.to_string(),
                negated: true,
            },
            _ => PredicateNode::Comparison {
                column: column.to_string(),
                operator,
                value,
            },
        }
    }

    /// Whether the node writes nothing at all.
    fn is_vacant(&self) -> bool {
        matches!(self, PredicateNode::Group(g) if g.emitted_len() == 0)
    }

    pub(crate) fn write(&self, w: &mut SqlWriter<'_>) -> OrmResult<()> {
        match self {
            PredicateNode::Comparison {
                column,
                operator,
                value,
            } => {
                w.push_ident(column);
                w.push(" ");
                w.push(operator.as_sql());
                w.push(" ");
                w.push_bind(value.clone());
            }
            PredicateNode::InList {
                column,
                values,
                negated,
            } => {
                if values.is_empty() {
                    w.push(if *negated { "1 = 1" } else { "1 = 0" });
                } else {
                    w.push_ident(column);
                    w.push(if *negated { " NOT IN " } else { " IN " });
                    w.push_bind_list(values);
                }
            }
            PredicateNode::InSub {
                column,
                subquery,
                negated,
            } => {
                w.push_ident(column);
                w.push(if *negated { " NOT IN (" } else { " IN (" });
                select::write_select(subquery, w)?;
                w.push(")");
            }
            PredicateNode::Between {
                column,
                low,
                high,
                negated,
            } => {
                w.push_ident(column);
                w.push(if *negated { " NOT BETWEEN " } else { " BETWEEN " });
                w.push_bind(low.clone());
                w.push(" AND ");
                w.push_bind(high.clone());
            }
            PredicateNode::NullCheck { column, negated } => {
                w.push_ident(column);
                w.push(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            PredicateNode::Exists { subquery, negated } => {
                w.push(if *negated { "NOT EXISTS (" } else { "EXISTS (" });
                select::write_select(subquery, w)?;
                w.push(")");
            }
            PredicateNode::Group(group) => {
                if group.emitted_len() > 1 {
                    w.push("(");
                    group.write(w)?;
                    w.push(")");
                } else {
                    group.write(w)?;
                }
            }
            PredicateNode::Raw { sql, bindings } => {
                w.push("(");
                w.push_template(sql, bindings);
                w.push(")");
            }
            PredicateNode::Malformed { column, reason } => {
                return Err(OrmError::malformed(column.as_str(), reason.as_str()));
            }
        }
        Ok(())
    }
}

/// Ordered sequence of predicate nodes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Group {
    items: Vec<(Conjunction, PredicateNode)>,
}

impl Group {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Append a node.
    pub fn push(&mut self, conjunction: Conjunction, node: PredicateNode) {
        self.items.push((conjunction, node));
    }

    pub fn and(&mut self, node: PredicateNode) {
        self.push(Conjunction::And, node);
    }

    pub fn or(&mut self, node: PredicateNode) {
        self.push(Conjunction::Or, node);
    }

    /// Number of direct children, including vacant ones.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when nothing would be emitted.
    pub fn is_empty(&self) -> bool {
        self.emitted_len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Conjunction, PredicateNode)> {
        self.items.iter()
    }

    /// Number of direct children that write something.
    pub fn emitted_len(&self) -> usize {
        self.items.iter().filter(|(_, n)| !n.is_vacant()).count()
    }

    /// Wrap the current contents as one nested node of a fresh group.
    ///
    /// Used when extra conditions must be AND-ed onto a caller's tree without
    /// letting the caller's OR chain absorb them.
    pub fn scoped(self) -> Group {
        let mut outer = Group::new();
        if !self.is_empty() {
            outer.and(PredicateNode::Group(self));
        }
        outer
    }

    /// Write the children without surrounding parentheses.
    pub(crate) fn write(&self, w: &mut SqlWriter<'_>) -> OrmResult<()> {
        let mut first = true;
        for (conjunction, node) in &self.items {
            if node.is_vacant() {
                continue;
            }
            if !first {
                w.push(conjunction.separator());
            }
            node.write(w)?;
            first = false;
        }
        Ok(())
    }
}

/// Argument of a where-family call.
///
/// `From` conversions cover the common shapes:
///
/// | Rust argument | variant | meaning |
/// |---|---|---|
/// | `5`, `"x"`, `Value::Null` | `Value` | implicit `=` |
/// | `(">", 5)` | `OperatorValue` | explicit operator |
/// | `vec![1, 2]` | `List` | IN list, rejected by plain `where_` |
/// | `WhereArg::group(\|q\| ...)` | `Group` | nested group |
#[derive(Clone, Debug, PartialEq)]
pub enum WhereArg {
    Value(Value),
    OperatorValue(String, Value),
    List(Vec<Value>),
    Group(Group),
}

impl WhereArg {
    /// Explicit operator and comparand.
    pub fn op(token: &str, value: impl Into<Value>) -> Self {
        WhereArg::OperatorValue(token.to_string(), value.into())
    }

    /// List argument from any iterator.
    pub fn list<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        WhereArg::List(values.into_iter().map(Into::into).collect())
    }

    /// Nested group built by `f` on a fresh builder.
    pub fn group(f: impl FnOnce(QueryBuilder) -> QueryBuilder) -> Self {
        WhereArg::Group(f(QueryBuilder::nested()).into_spec().wheres)
    }
}

impl From<Value> for WhereArg {
    fn from(v: Value) -> Self {
        WhereArg::Value(v)
    }
}

impl From<(&str, Value)> for WhereArg {
    fn from((op, v): (&str, Value)) -> Self {
        WhereArg::OperatorValue(op.to_string(), v)
    }
}

impl From<Vec<Value>> for WhereArg {
    fn from(v: Vec<Value>) -> Self {
        WhereArg::List(v)
    }
}

impl From<Group> for WhereArg {
    fn from(g: Group) -> Self {
        WhereArg::Group(g)
    }
}

macro_rules! impl_where_arg {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<$t> for WhereArg {
                fn from(v: $t) -> Self {
                    WhereArg::Value(v.into())
                }
            }

            impl From<Option<$t>> for WhereArg {
                fn from(v: Option<$t>) -> Self {
                    WhereArg::Value(v.into())
                }
            }

            impl From<(&str, $t)> for WhereArg {
                fn from((op, v): (&str, $t)) -> Self {
                    WhereArg::OperatorValue(op.to_string(), v.into())
                }
            }
        )*
    };
}

macro_rules! impl_where_list {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<Vec<$t>> for WhereArg {
                fn from(v: Vec<$t>) -> Self {
                    WhereArg::List(v.into_iter().map(Into::into).collect())
                }
            }
        )*
    };
}

impl_where_arg!(
    bool,
    i8,
    i16,
    i32,
    i64,
    u8,
    u16,
    u32,
    f32,
    f64,
    &str,
    String,
    Uuid,
    DateTime<Utc>,
    NaiveDateTime,
);

// `Vec<u8>` stays a bytes comparand, so `u8` has no list form.
impl_where_list!(
    bool,
    i8,
    i16,
    i32,
    i64,
    u16,
    u32,
    f32,
    f64,
    &str,
    String,
    Uuid,
    DateTime<Utc>,
);

impl From<Vec<u8>> for WhereArg {
    fn from(v: Vec<u8>) -> Self {
        WhereArg::Value(Value::Bytes(v))
    }
}
