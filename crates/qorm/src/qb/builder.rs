//! Fluent query builder.
//!
//! Every method consumes and returns the builder so calls chain. No method
//! fails or performs I/O: invalid argument shapes are recorded in the tree
//! and reported when the query is compiled.

use crate::dialect::Dialect;
use crate::error::OrmResult;
use crate::qb::compile::{compile, CompiledQuery, StatementKind};
use crate::qb::expr::{Conjunction, PredicateNode, WhereArg};
use crate::qb::insert::InsertMode;
use crate::qb::paginate;
use crate::qb::spec::{
    AggregateFn, Direction, Fields, JoinKind, JoinSpec, OrderSpec, QuerySpec, SelectItem, Source,
    UnionKind, UnionSpec,
};
use crate::value::Value;

/// Fluent builder around one [`QuerySpec`].
///
/// # Example
/// ```ignore
/// use qorm::{table, WhereArg};
///
/// let q = table("users")
///     .select(&["id", "name"])
///     .where_("status", "active")
///     .or_where("age", (">", 60))
///     .where_group(|q| q.where_("role", "admin").or_where("role", "owner"))
///     .order_by_desc("created_at")
///     .limit(20);
/// let compiled = q.select_sql()?;
/// ```
#[derive(Clone, Debug)]
pub struct QueryBuilder {
    spec: QuerySpec,
    dialect: Dialect,
    relations: Vec<String>,
}

fn table_source(table: &str) -> Source {
    let table = table.trim();
    match table.to_ascii_lowercase().find(" as ") {
        Some(i) => Source::aliased(table[..i].trim(), table[i + 4..].trim()),
        None => Source::table(table),
    }
}

impl QueryBuilder {
    /// Start a query on `table` (`"users"` or `"users as u"`).
    pub fn new(table: &str) -> Self {
        let mut spec = QuerySpec::empty();
        if !table.trim().is_empty() {
            spec.sources.push(table_source(table));
        }
        Self {
            spec,
            dialect: Dialect::default(),
            relations: Vec::new(),
        }
    }

    /// Builder without a source, used for nested groups.
    pub(crate) fn nested() -> Self {
        Self::new("")
    }

    /// Compile with `dialect` instead of the default (postgres).
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn dialect_ref(&self) -> &Dialect {
        &self.dialect
    }

    /// The expression tree built so far.
    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn into_spec(self) -> QuerySpec {
        self.spec
    }

    /// First plain table source.
    pub fn table_name(&self) -> Option<&str> {
        self.spec.table()
    }

    /// Primary key column used by `find`, `chunk_by_id` and upserts. Defaults to `id`.
    pub fn primary_key(mut self, column: &str) -> Self {
        self.spec.primary_key = column.to_string();
        self
    }

    pub fn primary_key_name(&self) -> &str {
        &self.spec.primary_key
    }

    /// Copy of the spec with the caller's WHERE tree nested as one group,
    /// so extra AND conditions cannot be absorbed by an OR chain.
    pub(crate) fn scoped_spec(&self) -> QuerySpec {
        let mut spec = self.spec.clone();
        spec.wheres = std::mem::take(&mut spec.wheres).scoped();
        spec
    }

    // ==================== SELECT list ====================

    /// Replace the select list.
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.spec.select = columns
            .iter()
            .map(|c| SelectItem::Column((*c).to_string()))
            .collect();
        self
    }

    /// Append to the select list.
    pub fn add_select(mut self, columns: &[&str]) -> Self {
        self.spec
            .select
            .extend(columns.iter().map(|c| SelectItem::Column((*c).to_string())));
        self
    }

    /// Append an expression emitted verbatim.
    pub fn select_raw(mut self, expression: &str) -> Self {
        self.spec.select.push(SelectItem::Raw(expression.to_string()));
        self
    }

    /// Replace the select list with `(sub) AS alias`.
    pub fn select_sub(mut self, sub: QueryBuilder, alias: &str) -> Self {
        self.spec.select.clear();
        self.add_select_sub(sub, alias)
    }

    /// Append `(sub) AS alias` to the select list.
    pub fn add_select_sub(mut self, sub: QueryBuilder, alias: &str) -> Self {
        self.spec.select.push(SelectItem::Sub {
            query: Box::new(sub.spec),
            alias: alias.to_string(),
        });
        self
    }

    pub fn distinct(mut self) -> Self {
        self.spec.distinct = true;
        self
    }

    /// Append `FN(column) AS alias` without discarding the select list.
    pub fn with_aggregate(mut self, function: AggregateFn, column: &str, alias: &str) -> Self {
        self.spec.select.push(SelectItem::Aggregate {
            function,
            column: column.to_string(),
            alias: alias.to_string(),
        });
        self
    }

    fn with_default_alias(self, function: AggregateFn, column: &str) -> Self {
        let alias = if column.trim() == "*" {
            function.suffix().to_string()
        } else {
            format!("{}_{}", column.replace('.', "_"), function.suffix())
        };
        self.with_aggregate(function, column, &alias)
    }

    /// `COUNT(column) AS column_count`; `"*"` gives `COUNT(*) AS count`.
    pub fn with_count(self, column: &str) -> Self {
        self.with_default_alias(AggregateFn::Count, column)
    }

    pub fn with_sum(self, column: &str) -> Self {
        self.with_default_alias(AggregateFn::Sum, column)
    }

    pub fn with_avg(self, column: &str) -> Self {
        self.with_default_alias(AggregateFn::Avg, column)
    }

    pub fn with_max(self, column: &str) -> Self {
        self.with_default_alias(AggregateFn::Max, column)
    }

    pub fn with_min(self, column: &str) -> Self {
        self.with_default_alias(AggregateFn::Min, column)
    }

    // ==================== FROM ====================

    /// Replace the sources with one table.
    pub fn from(mut self, table: &str) -> Self {
        self.spec.sources = vec![table_source(table)];
        self
    }

    pub fn from_as(mut self, table: &str, alias: &str) -> Self {
        self.spec.sources = vec![Source::aliased(table, alias)];
        self
    }

    /// Replace the sources with several comma-joined tables.
    pub fn from_many(mut self, tables: &[&str]) -> Self {
        self.spec.sources = tables.iter().map(|t| table_source(t)).collect();
        self
    }

    /// Replace the sources with a derived table.
    pub fn from_sub(mut self, sub: QueryBuilder, alias: &str) -> Self {
        self.spec.sources = vec![Source::Sub {
            query: Box::new(sub.spec),
            alias: alias.to_string(),
        }];
        self
    }

    // ==================== JOIN ====================

    /// Add a join of any kind.
    pub fn join_kind(mut self, kind: JoinKind, table: &str, left: &str, operator: &str, right: &str) -> Self {
        self.spec.joins.push(JoinSpec {
            kind,
            target: table_source(table),
            left: left.to_string(),
            operator: operator.to_string(),
            right: right.to_string(),
        });
        self
    }

    /// INNER JOIN.
    pub fn join(self, table: &str, left: &str, operator: &str, right: &str) -> Self {
        self.join_kind(JoinKind::Inner, table, left, operator, right)
    }

    pub fn left_join(self, table: &str, left: &str, operator: &str, right: &str) -> Self {
        self.join_kind(JoinKind::Left, table, left, operator, right)
    }

    pub fn right_join(self, table: &str, left: &str, operator: &str, right: &str) -> Self {
        self.join_kind(JoinKind::Right, table, left, operator, right)
    }

    pub fn full_join(self, table: &str, left: &str, operator: &str, right: &str) -> Self {
        self.join_kind(JoinKind::Full, table, left, operator, right)
    }

    pub fn full_outer_join(self, table: &str, left: &str, operator: &str, right: &str) -> Self {
        self.join_kind(JoinKind::FullOuter, table, left, operator, right)
    }

    /// Join a derived table.
    pub fn join_sub(
        mut self,
        sub: QueryBuilder,
        alias: &str,
        kind: JoinKind,
        left: &str,
        operator: &str,
        right: &str,
    ) -> Self {
        self.spec.joins.push(JoinSpec {
            kind,
            target: Source::Sub {
                query: Box::new(sub.spec),
                alias: alias.to_string(),
            },
            left: left.to_string(),
            operator: operator.to_string(),
            right: right.to_string(),
        });
        self
    }

    // ==================== WHERE ====================

    fn push_where(mut self, conjunction: Conjunction, node: PredicateNode) -> Self {
        self.spec.wheres.push(conjunction, node);
        self
    }

    /// `column = value`, `column <op> value` or a nested group, depending on `arg`.
    ///
    /// ```ignore
    /// q.where_("status", "active")          // "status" = $1
    ///  .where_("age", (">=", 18))           // "age" >= $2
    ///  .where_("deleted_at", Value::Null)   // "deleted_at" IS NULL
    /// ```
    pub fn where_(self, column: &str, arg: impl Into<WhereArg>) -> Self {
        let node = PredicateNode::resolve(column, arg.into());
        self.push_where(Conjunction::And, node)
    }

    /// OR variant of [`QueryBuilder::where_`].
    pub fn or_where(self, column: &str, arg: impl Into<WhereArg>) -> Self {
        let node = PredicateNode::resolve(column, arg.into());
        self.push_where(Conjunction::Or, node)
    }

    /// Nested group built by `f`.
    pub fn where_group(self, f: impl FnOnce(QueryBuilder) -> QueryBuilder) -> Self {
        let group = f(QueryBuilder::nested()).spec.wheres;
        self.push_where(Conjunction::And, PredicateNode::Group(group))
    }

    pub fn or_where_group(self, f: impl FnOnce(QueryBuilder) -> QueryBuilder) -> Self {
        let group = f(QueryBuilder::nested()).spec.wheres;
        self.push_where(Conjunction::Or, PredicateNode::Group(group))
    }

    /// AND an equality for every pair of `fields`.
    pub fn where_fields(mut self, fields: &Fields) -> Self {
        for (column, value) in fields.iter() {
            self = self.where_(column, value.clone());
        }
        self
    }

    /// Shortcut for `where_(column, ("=", value))`.
    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.where_(column, WhereArg::op("=", value))
    }

    pub fn ne(self, column: &str, value: impl Into<Value>) -> Self {
        self.where_(column, WhereArg::op("!=", value))
    }

    pub fn gt(self, column: &str, value: impl Into<Value>) -> Self {
        self.where_(column, WhereArg::op(">", value))
    }

    pub fn gte(self, column: &str, value: impl Into<Value>) -> Self {
        self.where_(column, WhereArg::op(">=", value))
    }

    pub fn lt(self, column: &str, value: impl Into<Value>) -> Self {
        self.where_(column, WhereArg::op("<", value))
    }

    pub fn lte(self, column: &str, value: impl Into<Value>) -> Self {
        self.where_(column, WhereArg::op("<=", value))
    }

    pub fn like(self, column: &str, pattern: impl Into<Value>) -> Self {
        self.where_(column, WhereArg::op("like", pattern))
    }

    pub fn not_like(self, column: &str, pattern: impl Into<Value>) -> Self {
        self.where_(column, WhereArg::op("not like", pattern))
    }

    fn in_node(column: &str, values: WhereArg, negated: bool) -> PredicateNode {
        match values {
            WhereArg::List(values) => PredicateNode::InList {
                column: column.to_string(),
                values,
                negated,
            },
            WhereArg::Value(value) => PredicateNode::InList {
                column: column.to_string(),
                values: vec![value],
                negated,
            },
            WhereArg::OperatorValue(..) | WhereArg::Group(_) => PredicateNode::Malformed {
                column: column.to_string(),
                reason: "IN expects a list of values".to_string(),
            },
        }
    }

    /// `column IN (...)`. An empty list never matches.
    pub fn where_in(self, column: &str, values: impl Into<WhereArg>) -> Self {
        let node = Self::in_node(column, values.into(), false);
        self.push_where(Conjunction::And, node)
    }

    pub fn or_where_in(self, column: &str, values: impl Into<WhereArg>) -> Self {
        let node = Self::in_node(column, values.into(), false);
        self.push_where(Conjunction::Or, node)
    }

    /// `column NOT IN (...)`. An empty list always matches.
    pub fn where_not_in(self, column: &str, values: impl Into<WhereArg>) -> Self {
        let node = Self::in_node(column, values.into(), true);
        self.push_where(Conjunction::And, node)
    }

    pub fn or_where_not_in(self, column: &str, values: impl Into<WhereArg>) -> Self {
        let node = Self::in_node(column, values.into(), true);
        self.push_where(Conjunction::Or, node)
    }

    /// `column IN (SELECT ...)`.
    pub fn where_in_sub(self, column: &str, sub: QueryBuilder) -> Self {
        let node = PredicateNode::InSub {
            column: column.to_string(),
            subquery: Box::new(sub.spec),
            negated: false,
        };
        self.push_where(Conjunction::And, node)
    }

    pub fn where_not_in_sub(self, column: &str, sub: QueryBuilder) -> Self {
        let node = PredicateNode::InSub {
            column: column.to_string(),
            subquery: Box::new(sub.spec),
            negated: true,
        };
        self.push_where(Conjunction::And, node)
    }

    fn between_node(column: &str, low: Value, high: Value, negated: bool) -> PredicateNode {
        PredicateNode::Between {
            column: column.to_string(),
            low,
            high,
            negated,
        }
    }

    pub fn where_between(self, column: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        let node = Self::between_node(column, low.into(), high.into(), false);
        self.push_where(Conjunction::And, node)
    }

    pub fn or_where_between(self, column: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        let node = Self::between_node(column, low.into(), high.into(), false);
        self.push_where(Conjunction::Or, node)
    }

    pub fn where_not_between(self, column: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        let node = Self::between_node(column, low.into(), high.into(), true);
        self.push_where(Conjunction::And, node)
    }

    pub fn or_where_not_between(self, column: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        let node = Self::between_node(column, low.into(), high.into(), true);
        self.push_where(Conjunction::Or, node)
    }

    fn null_node(column: &str, negated: bool) -> PredicateNode {
        PredicateNode::NullCheck {
            column: column.to_string(),
            negated,
        }
    }

    pub fn where_null(self, column: &str) -> Self {
        self.push_where(Conjunction::And, Self::null_node(column, false))
    }

    pub fn or_where_null(self, column: &str) -> Self {
        self.push_where(Conjunction::Or, Self::null_node(column, false))
    }

    pub fn where_not_null(self, column: &str) -> Self {
        self.push_where(Conjunction::And, Self::null_node(column, true))
    }

    pub fn or_where_not_null(self, column: &str) -> Self {
        self.push_where(Conjunction::Or, Self::null_node(column, true))
    }

    fn exists_node(sub: QueryBuilder, negated: bool) -> PredicateNode {
        PredicateNode::Exists {
            subquery: Box::new(sub.spec),
            negated,
        }
    }

    /// `EXISTS (sub)`; the subquery keeps its own tree and is numbered in place.
    pub fn where_exists(self, sub: QueryBuilder) -> Self {
        self.push_where(Conjunction::And, Self::exists_node(sub, false))
    }

    pub fn or_where_exists(self, sub: QueryBuilder) -> Self {
        self.push_where(Conjunction::Or, Self::exists_node(sub, false))
    }

    pub fn where_not_exists(self, sub: QueryBuilder) -> Self {
        self.push_where(Conjunction::And, Self::exists_node(sub, true))
    }

    pub fn or_where_not_exists(self, sub: QueryBuilder) -> Self {
        self.push_where(Conjunction::Or, Self::exists_node(sub, true))
    }

    /// Raw condition; each `?` outside quotes becomes the dialect placeholder
    /// for the next binding. The fragment is emitted in parentheses.
    pub fn where_raw(self, sql: &str, bindings: impl IntoIterator<Item = Value>) -> Self {
        let node = PredicateNode::Raw {
            sql: sql.to_string(),
            bindings: bindings.into_iter().collect(),
        };
        self.push_where(Conjunction::And, node)
    }

    pub fn or_where_raw(self, sql: &str, bindings: impl IntoIterator<Item = Value>) -> Self {
        let node = PredicateNode::Raw {
            sql: sql.to_string(),
            bindings: bindings.into_iter().collect(),
        };
        self.push_where(Conjunction::Or, node)
    }

    // ==================== GROUP BY / HAVING ====================

    pub fn group_by(mut self, columns: &[&str]) -> Self {
        self.spec
            .group_by
            .extend(columns.iter().map(|c| (*c).to_string()));
        self
    }

    /// Same argument dispatch as [`QueryBuilder::where_`], against HAVING.
    pub fn having(mut self, column: &str, arg: impl Into<WhereArg>) -> Self {
        let node = PredicateNode::resolve(column, arg.into());
        self.spec.havings.push(Conjunction::And, node);
        self
    }

    pub fn or_having(mut self, column: &str, arg: impl Into<WhereArg>) -> Self {
        let node = PredicateNode::resolve(column, arg.into());
        self.spec.havings.push(Conjunction::Or, node);
        self
    }

    pub fn having_raw(mut self, sql: &str, bindings: impl IntoIterator<Item = Value>) -> Self {
        self.spec.havings.and(PredicateNode::Raw {
            sql: sql.to_string(),
            bindings: bindings.into_iter().collect(),
        });
        self
    }

    // ==================== ORDER / LIMIT ====================

    pub fn order_by(self, column: &str) -> Self {
        self.order_by_dir(column, Direction::Asc)
    }

    pub fn order_by_desc(self, column: &str) -> Self {
        self.order_by_dir(column, Direction::Desc)
    }

    pub fn order_by_dir(mut self, column: &str, direction: Direction) -> Self {
        self.spec.orders.push(OrderSpec::Column {
            column: column.to_string(),
            direction,
        });
        self
    }

    /// ORDER BY the dialect's random function.
    pub fn in_random_order(mut self) -> Self {
        self.spec.orders.push(OrderSpec::Random);
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.spec.limit = Some(n);
        self
    }

    /// Alias for `limit`.
    pub fn take(self, n: u64) -> Self {
        self.limit(n)
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.spec.offset = Some(n);
        self
    }

    /// Alias for `offset`.
    pub fn skip(self, n: u64) -> Self {
        self.offset(n)
    }

    /// LIMIT/OFFSET for a 1-based page; both arguments are clamped to >= 1.
    pub fn for_page(mut self, page: u64, per_page: u64) -> Self {
        let page = page.max(1);
        let per_page = per_page.max(1);
        self.spec.limit = Some(paginate::sql_count(per_page));
        self.spec.offset = Some(paginate::page_offset(page, per_page));
        self
    }

    // ==================== UNION / LOCK ====================

    pub fn union(mut self, other: QueryBuilder) -> Self {
        self.spec.unions.push(UnionSpec {
            kind: UnionKind::Distinct,
            query: other.spec,
        });
        self
    }

    pub fn union_all(mut self, other: QueryBuilder) -> Self {
        self.spec.unions.push(UnionSpec {
            kind: UnionKind::All,
            query: other.spec,
        });
        self
    }

    /// Append `FOR UPDATE` to SELECTs.
    pub fn lock_for_update(mut self) -> Self {
        self.spec.lock_for_update = true;
        self
    }

    // ==================== Eager loading ====================

    /// Request relations by tag; resolved by the registry given to `get_with`.
    pub fn with(mut self, relations: &[&str]) -> Self {
        self.relations
            .extend(relations.iter().map(|r| (*r).to_string()));
        self
    }

    pub fn relations(&self) -> &[String] {
        &self.relations
    }

    // ==================== Conditional segments ====================

    /// Apply `f` only when `condition` holds.
    pub fn when(self, condition: bool, f: impl FnOnce(Self) -> Self) -> Self {
        if condition { f(self) } else { self }
    }

    /// Apply `f` when `condition` holds, `otherwise` when it does not.
    pub fn when_else(
        self,
        condition: bool,
        f: impl FnOnce(Self) -> Self,
        otherwise: impl FnOnce(Self) -> Self,
    ) -> Self {
        if condition { f(self) } else { otherwise(self) }
    }

    // ==================== Compilation ====================

    /// Compile the current tree as `kind`.
    pub fn compile(&self, kind: StatementKind<'_>) -> OrmResult<CompiledQuery> {
        compile(&self.spec, kind, &self.dialect)
    }

    /// SELECT text.
    pub fn to_sql(&self) -> OrmResult<String> {
        Ok(self.select_sql()?.sql)
    }

    /// SELECT bindings in placeholder order.
    pub fn bindings(&self) -> OrmResult<Vec<Value>> {
        Ok(self.select_sql()?.bindings)
    }

    pub fn select_sql(&self) -> OrmResult<CompiledQuery> {
        self.compile(StatementKind::Select)
    }

    pub fn select_for_update_sql(&self) -> OrmResult<CompiledQuery> {
        self.compile(StatementKind::SelectForUpdate)
    }

    pub fn insert_sql(&self, rows: &[Fields]) -> OrmResult<CompiledQuery> {
        self.compile(StatementKind::Insert(rows, InsertMode::Plain))
    }

    pub fn insert_ignore_sql(&self, rows: &[Fields]) -> OrmResult<CompiledQuery> {
        self.compile(StatementKind::Insert(rows, InsertMode::Ignore))
    }

    pub fn insert_replace_sql(&self, rows: &[Fields]) -> OrmResult<CompiledQuery> {
        self.compile(StatementKind::Insert(rows, InsertMode::Replace))
    }

    /// Single-row INSERT.
    pub fn create_sql(&self, fields: &Fields) -> OrmResult<CompiledQuery> {
        self.compile(StatementKind::Insert(std::slice::from_ref(fields), InsertMode::Plain))
    }

    pub fn update_sql(&self, fields: &Fields) -> OrmResult<CompiledQuery> {
        self.compile(StatementKind::Update(fields))
    }

    pub fn delete_sql(&self) -> OrmResult<CompiledQuery> {
        self.compile(StatementKind::Delete)
    }
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::nested()
    }
}
