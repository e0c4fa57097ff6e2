//! Terminal operations: compile, hand the statement to an [`Executor`], map
//! the result.
//!
//! Every fallible operation returns [`OrmResult`]. The `*_or_panic` variants
//! at the bottom of this file are generated from those and panic on the same
//! failures.

use crate::client::{ExecResult, Executor};
use crate::error::{OrmError, OrmResult};
use crate::ident::Ident;
use crate::qb::builder::QueryBuilder;
use crate::qb::compile::{compile, CompiledQuery, StatementKind};
use crate::qb::expr::PredicateNode;
use crate::qb::insert::InsertMode;
use crate::qb::select::AGGREGATE_ALIAS;
use crate::qb::spec::{AggregateFn, Fields, QuerySpec, SelectItem};
use crate::record::{FieldMap, FromRecord, Record};
use crate::value::{FromValue, Value};

/// What `update_or_insert` ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

impl UpsertOutcome {
    pub fn is_created(self) -> bool {
        self == UpsertOutcome::Created
    }
}

fn log_statement(kind: &StatementKind<'_>, compiled: &CompiledQuery) {
    tracing::debug!(
        target: "qorm.sql",
        kind = kind.label(),
        sql = %compiled.sql,
        param_count = compiled.bindings.len(),
        "executing statement"
    );
}

/// Key a column comes back under (`users.id` -> `id`, `x as y` -> `y`).
pub(crate) fn result_key(column: &str) -> &str {
    Ident::parse(column).output_name().unwrap_or(column)
}

fn take_column(record: &Record, column: &str) -> Value {
    match record.get(result_key(column)) {
        Some(value) => value.clone(),
        None if record.len() == 1 => record.iter().next().map(|(_, v)| v.clone()).unwrap_or_default(),
        None => Value::Null,
    }
}

fn not_found(spec: &QuerySpec) -> OrmError {
    OrmError::not_found(format!("no rows in '{}'", spec.table().unwrap_or("query")))
}

/// Ordering only picks which match a lookup returns; writes hit every match.
fn unordered(mut spec: QuerySpec) -> QuerySpec {
    spec.orders.clear();
    spec
}

fn missing_generated_key() -> OrmError {
    OrmError::Other("executor did not report a generated key".to_string())
}

impl QueryBuilder {
    pub(crate) async fn fetch<E: Executor>(
        &self,
        conn: &E,
        spec: &QuerySpec,
        kind: StatementKind<'_>,
    ) -> OrmResult<Vec<Record>> {
        let compiled = compile(spec, kind, self.dialect_ref())?;
        log_statement(&kind, &compiled);
        conn.query(&compiled.sql, &compiled.bindings).await
    }

    pub(crate) async fn execute<E: Executor>(
        &self,
        conn: &E,
        spec: &QuerySpec,
        kind: StatementKind<'_>,
    ) -> OrmResult<ExecResult> {
        let compiled = compile(spec, kind, self.dialect_ref())?;
        log_statement(&kind, &compiled);
        conn.exec(&compiled.sql, &compiled.bindings).await
    }

    /// Scoped copy of the spec with `column = value` AND-ed on for each pair.
    fn matching(&self, attributes: &Fields) -> QuerySpec {
        let mut spec = self.scoped_spec();
        for (column, value) in attributes.iter() {
            spec.wheres
                .and(PredicateNode::resolve(column, value.clone().into()));
        }
        spec
    }

    async fn first_of<E: Executor>(&self, conn: &E, mut spec: QuerySpec) -> OrmResult<Option<Record>> {
        spec.limit = Some(1);
        let rows = self.fetch(conn, &spec, StatementKind::Select).await?;
        Ok(rows.into_iter().next())
    }

    // ==================== Reads ====================

    /// All rows.
    pub async fn get<E: Executor>(&self, conn: &E) -> OrmResult<Vec<Record>> {
        self.fetch(conn, self.spec(), StatementKind::Select).await
    }

    /// All rows, locked with `FOR UPDATE`.
    pub async fn select_for_update<E: Executor>(&self, conn: &E) -> OrmResult<Vec<Record>> {
        self.fetch(conn, self.spec(), StatementKind::SelectForUpdate).await
    }

    /// All rows mapped through [`FromRecord`].
    pub async fn get_as<T: FromRecord, E: Executor>(&self, conn: &E) -> OrmResult<Vec<T>> {
        let rows = self.get(conn).await?;
        rows.iter().map(T::from_record).collect()
    }

    /// All rows mapped through an explicit [`FieldMap`].
    pub async fn get_mapped<T: Default, E: Executor>(
        &self,
        conn: &E,
        map: &FieldMap<T>,
    ) -> OrmResult<Vec<T>> {
        let rows = self.get(conn).await?;
        rows.iter().map(|r| map.map(r)).collect()
    }

    /// First row, if any (`LIMIT 1`).
    pub async fn first<E: Executor>(&self, conn: &E) -> OrmResult<Option<Record>> {
        self.first_of(conn, self.spec().clone()).await
    }

    /// First row, or whatever `fallback` produces.
    pub async fn first_or<E, F>(&self, conn: &E, fallback: F) -> OrmResult<Record>
    where
        E: Executor,
        F: FnOnce() -> Record + Send,
    {
        Ok(self.first(conn).await?.unwrap_or_else(fallback))
    }

    /// First row, or [`OrmError::NotFound`].
    pub async fn first_or_fail<E: Executor>(&self, conn: &E) -> OrmResult<Record> {
        self.first(conn).await?.ok_or_else(|| not_found(self.spec()))
    }

    /// First row matching one extra condition.
    pub async fn first_where<E: Executor>(
        &self,
        conn: &E,
        column: &str,
        arg: impl Into<crate::qb::expr::WhereArg>,
    ) -> OrmResult<Option<Record>> {
        let mut spec = self.scoped_spec();
        spec.wheres.and(PredicateNode::resolve(column, arg.into()));
        self.first_of(conn, spec).await
    }

    /// Row whose primary key equals `key`.
    pub async fn find<E: Executor>(&self, conn: &E, key: impl Into<Value>) -> OrmResult<Option<Record>> {
        let mut spec = self.scoped_spec();
        let pk = spec.primary_key.clone();
        let key: Value = key.into();
        spec.wheres.and(PredicateNode::resolve(&pk, key.into()));
        self.first_of(conn, spec).await
    }

    /// One column of the first row.
    pub async fn value<E: Executor>(&self, conn: &E, column: &str) -> OrmResult<Option<Value>> {
        let mut spec = self.spec().clone();
        spec.select = vec![SelectItem::Column(column.to_string())];
        Ok(self
            .first_of(conn, spec)
            .await?
            .map(|record| take_column(&record, column)))
    }

    /// One column of every row.
    pub async fn pluck<E: Executor>(&self, conn: &E, column: &str) -> OrmResult<Vec<Value>> {
        let mut spec = self.spec().clone();
        spec.select = vec![SelectItem::Column(column.to_string())];
        let rows = self.fetch(conn, &spec, StatementKind::Select).await?;
        Ok(rows.iter().map(|r| take_column(r, column)).collect())
    }

    /// Whether at least one row matches.
    pub async fn exists<E: Executor>(&self, conn: &E) -> OrmResult<bool> {
        Ok(self.first(conn).await?.is_some())
    }

    /// Run `FN(column)` and decode the single result.
    pub async fn aggregate<T: FromValue, E: Executor>(
        &self,
        conn: &E,
        function: AggregateFn,
        column: &str,
    ) -> OrmResult<T> {
        let rows = self
            .fetch(conn, self.spec(), StatementKind::Aggregate(function, column))
            .await?;
        let value = rows
            .first()
            .and_then(|r| r.get(AGGREGATE_ALIAS))
            .cloned()
            .unwrap_or_default();
        T::from_value(AGGREGATE_ALIAS, &value)
    }

    /// `COUNT(*)`.
    pub async fn count<E: Executor>(&self, conn: &E) -> OrmResult<i64> {
        self.count_column(conn, "*").await
    }

    /// `COUNT(column)`.
    pub async fn count_column<E: Executor>(&self, conn: &E, column: &str) -> OrmResult<i64> {
        let n: Option<i64> = self.aggregate(conn, AggregateFn::Count, column).await?;
        Ok(n.unwrap_or(0))
    }

    /// `SUM(column)`; 0 when no rows match.
    pub async fn sum<E: Executor>(&self, conn: &E, column: &str) -> OrmResult<f64> {
        let n: Option<f64> = self.aggregate(conn, AggregateFn::Sum, column).await?;
        Ok(n.unwrap_or(0.0))
    }

    /// `AVG(column)`; `None` when no rows match.
    pub async fn avg<E: Executor>(&self, conn: &E, column: &str) -> OrmResult<Option<f64>> {
        self.aggregate(conn, AggregateFn::Avg, column).await
    }

    pub async fn max<E: Executor>(&self, conn: &E, column: &str) -> OrmResult<Value> {
        self.aggregate(conn, AggregateFn::Max, column).await
    }

    pub async fn min<E: Executor>(&self, conn: &E, column: &str) -> OrmResult<Value> {
        self.aggregate(conn, AggregateFn::Min, column).await
    }

    // ==================== Writes ====================

    /// Insert one or more rows; returns the affected row count.
    pub async fn insert<E: Executor>(&self, conn: &E, rows: &[Fields]) -> OrmResult<u64> {
        let kind = StatementKind::Insert(rows, InsertMode::Plain);
        Ok(self.execute(conn, self.spec(), kind).await?.rows_affected)
    }

    /// Insert rows, skipping those that hit a unique constraint.
    pub async fn insert_or_ignore<E: Executor>(&self, conn: &E, rows: &[Fields]) -> OrmResult<u64> {
        let kind = StatementKind::Insert(rows, InsertMode::Ignore);
        Ok(self.execute(conn, self.spec(), kind).await?.rows_affected)
    }

    /// Insert rows, overwriting those that hit a unique constraint.
    pub async fn insert_or_replace<E: Executor>(&self, conn: &E, rows: &[Fields]) -> OrmResult<u64> {
        let kind = StatementKind::Insert(rows, InsertMode::Replace);
        Ok(self.execute(conn, self.spec(), kind).await?.rows_affected)
    }

    /// Insert one row and return the generated primary key.
    pub async fn insert_get_id<E: Executor>(&self, conn: &E, fields: &Fields) -> OrmResult<i64> {
        let result = self
            .execute(conn, self.spec(), StatementKind::InsertGetId(fields))
            .await?;
        result.last_insert_id.ok_or_else(missing_generated_key)
    }

    /// Insert one row and return it as a record.
    ///
    /// When `fields` carries no primary key the generated one is read back
    /// and added to the record; an executor that reports none is an error.
    pub async fn create<E: Executor>(&self, conn: &E, fields: &Fields) -> OrmResult<Record> {
        let pk = self.primary_key_name().to_string();
        if fields.contains(&pk) {
            self.insert(conn, std::slice::from_ref(fields)).await?;
            return Ok(fields.clone().into());
        }
        let id = self.insert_get_id(conn, fields).await?;
        let mut created = fields.clone();
        created.insert(&pk, id);
        Ok(created.into())
    }

    /// First row matching `attributes`, or a new row built from
    /// `attributes` layered with `values`.
    pub async fn first_or_create<E: Executor>(
        &self,
        conn: &E,
        attributes: &Fields,
        values: &Fields,
    ) -> OrmResult<Record> {
        if let Some(found) = self.first_of(conn, self.matching(attributes)).await? {
            return Ok(found);
        }
        self.create(conn, &attributes.clone().merged(values)).await
    }

    /// Update matching rows; returns the affected row count.
    pub async fn update<E: Executor>(&self, conn: &E, fields: &Fields) -> OrmResult<u64> {
        Ok(self
            .execute(conn, self.spec(), StatementKind::Update(fields))
            .await?
            .rows_affected)
    }

    /// Update the rows matching `attributes` with `values`, or insert
    /// `attributes + values` when none match.
    ///
    /// Not atomic: run it inside [`Executor::transaction`] when concurrent
    /// writers matter.
    pub async fn update_or_insert<E: Executor>(
        &self,
        conn: &E,
        attributes: &Fields,
        values: &Fields,
    ) -> OrmResult<UpsertOutcome> {
        let spec = self.matching(attributes);
        if self.first_of(conn, spec.clone()).await?.is_none() {
            let row = attributes.clone().merged(values);
            self.execute(conn, &spec, StatementKind::Insert(std::slice::from_ref(&row), InsertMode::Plain))
                .await?;
            return Ok(UpsertOutcome::Created);
        }
        if !values.is_empty() {
            self.execute(conn, &unordered(spec), StatementKind::Update(values)).await?;
        }
        Ok(UpsertOutcome::Updated)
    }

    /// Like `update_or_insert` but returns the resulting record.
    pub async fn update_or_create<E: Executor>(
        &self,
        conn: &E,
        attributes: &Fields,
        values: &Fields,
    ) -> OrmResult<Record> {
        let spec = self.matching(attributes);
        match self.first_of(conn, spec.clone()).await? {
            Some(found) => {
                if !values.is_empty() {
                    self.execute(conn, &unordered(spec), StatementKind::Update(values)).await?;
                }
                Ok(found.merged(Record::from(values.clone())))
            }
            None => self.create(conn, &attributes.clone().merged(values)).await,
        }
    }

    /// Delete matching rows; returns the affected row count.
    pub async fn delete<E: Executor>(&self, conn: &E) -> OrmResult<u64> {
        Ok(self
            .execute(conn, self.spec(), StatementKind::Delete)
            .await?
            .rows_affected)
    }
}

/// Generates a panicking twin for each listed `OrmResult` operation.
macro_rules! impl_or_panic {
    ($( $name:ident => $inner:ident ( $($arg:ident : $ty:ty),* ) -> $ret:ty; )*) => {
        impl QueryBuilder {
            $(
                #[doc = concat!("Like [`QueryBuilder::", stringify!($inner), "`], panicking on error.")]
                pub async fn $name<E: Executor>(&self, conn: &E $(, $arg: $ty)*) -> $ret {
                    match self.$inner(conn $(, $arg)*).await {
                        Ok(value) => value,
                        Err(err) => panic!("{} failed: {}", stringify!($inner), err),
                    }
                }
            )*
        }
    };
}

impl_or_panic! {
    get_or_panic => get() -> Vec<Record>;
    first_or_panic => first() -> Option<Record>;
    first_or_fail_or_panic => first_or_fail() -> Record;
    find_or_panic => find(key: Value) -> Option<Record>;
    value_or_panic => value(column: &str) -> Option<Value>;
    pluck_or_panic => pluck(column: &str) -> Vec<Value>;
    exists_or_panic => exists() -> bool;
    count_or_panic => count() -> i64;
    sum_or_panic => sum(column: &str) -> f64;
    avg_or_panic => avg(column: &str) -> Option<f64>;
    max_or_panic => max(column: &str) -> Value;
    min_or_panic => min(column: &str) -> Value;
    insert_or_panic => insert(rows: &[Fields]) -> u64;
    insert_get_id_or_panic => insert_get_id(fields: &Fields) -> i64;
    create_or_panic => create(fields: &Fields) -> Record;
    update_or_panic => update(fields: &Fields) -> u64;
    update_or_insert_or_panic => update_or_insert(attributes: &Fields, values: &Fields) -> UpsertOutcome;
    delete_or_panic => delete() -> u64;
}
