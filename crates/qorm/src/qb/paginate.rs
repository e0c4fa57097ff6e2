//! Offset pagination and chunked iteration.

use crate::client::Executor;
use crate::error::{OrmError, OrmResult};
use crate::qb::builder::QueryBuilder;
use crate::qb::compile::StatementKind;
use crate::qb::exec::result_key;
use crate::qb::expr::{PredicateNode, WhereArg};
use crate::qb::spec::{AggregateFn, Direction, OrderSpec, QuerySpec};
use crate::record::Record;
use crate::value::Value;
use serde::Serialize;
use std::future::Future;
use std::ops::ControlFlow;

/// Largest LIMIT/OFFSET every supported dialect accepts (signed 64-bit).
const MAX_SQL_COUNT: u64 = i64::MAX as u64;

/// Clamp a row count into the range SQL integers hold.
pub(crate) fn sql_count(n: u64) -> u64 {
    n.min(MAX_SQL_COUNT)
}

/// OFFSET of 1-based `page`; saturates instead of overflowing.
pub(crate) fn page_offset(page: u64, per_page: u64) -> u64 {
    sql_count(page.saturating_sub(1).saturating_mul(per_page))
}

/// One page of results plus the total row count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T = Record> {
    pub items: Vec<T>,
    pub total: u64,
    pub per_page: u64,
    pub current_page: u64,
}

impl<T> Page<T> {
    /// Number of the last page; 1 for an empty result.
    pub fn last_page(&self) -> u64 {
        self.total.div_ceil(self.per_page.max(1)).max(1)
    }

    pub fn has_more(&self) -> bool {
        self.current_page < self.last_page()
    }

    /// Map the items, keeping the paging metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            per_page: self.per_page,
            current_page: self.current_page,
        }
    }
}

/// Page without a total: one extra row is fetched to tell whether more exist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimplePage<T = Record> {
    pub items: Vec<T>,
    pub per_page: u64,
    pub current_page: u64,
    pub has_more: bool,
}

/// Primary-key cursor for `chunk_by_id`. Lives for one chunk call.
#[derive(Debug, Clone)]
struct CursorState {
    last_seen: Option<Value>,
    direction: Direction,
    size: u64,
}

impl CursorState {
    fn new(direction: Direction, size: u64) -> Self {
        Self {
            last_seen: None,
            direction,
            size,
        }
    }

    /// Spec for the next page: `pk > last` (or `<`), ordered by pk only.
    fn page_spec(&self, base: &QuerySpec) -> QuerySpec {
        let mut spec = base.clone();
        let pk = spec.primary_key.clone();
        if let Some(last) = &self.last_seen {
            let token = match self.direction {
                Direction::Asc => ">",
                Direction::Desc => "<",
            };
            spec.wheres
                .and(PredicateNode::resolve(&pk, WhereArg::op(token, last.clone())));
        }
        spec.orders = vec![OrderSpec::Column {
            column: pk,
            direction: self.direction,
        }];
        spec.limit = Some(sql_count(self.size));
        spec.offset = None;
        spec
    }

    /// Remember the key of the last row in `rows`.
    fn advance(&mut self, rows: &[Record], pk: &str) -> OrmResult<()> {
        let key = rows
            .last()
            .and_then(|row| row.get(result_key(pk)))
            .filter(|v| !v.is_null())
            .ok_or_else(|| {
                OrmError::validation(format!(
                    "chunk_by_id: rows must carry a non-null '{pk}' column"
                ))
            })?;
        self.last_seen = Some(key.clone());
        Ok(())
    }
}

fn check_size(size: u64) -> OrmResult<()> {
    if size == 0 {
        return Err(OrmError::validation("chunk size must be at least 1"));
    }
    Ok(())
}

impl QueryBuilder {
    /// Count of rows the current filters match, ignoring order and paging.
    async fn total<E: Executor>(&self, conn: &E) -> OrmResult<u64> {
        let mut spec = self.spec().clone();
        spec.orders.clear();
        spec.limit = None;
        spec.offset = None;
        let rows = self
            .fetch(conn, &spec, StatementKind::Aggregate(AggregateFn::Count, "*"))
            .await?;
        let count = rows
            .first()
            .map(|r| r.try_get::<Option<u64>>(crate::qb::select::AGGREGATE_ALIAS))
            .transpose()?
            .flatten();
        Ok(count.unwrap_or(0))
    }

    /// Fetch page `page` (1-based) of `per_page` rows, plus the total.
    ///
    /// Both arguments are clamped to at least 1.
    pub async fn paginate<E: Executor>(&self, conn: &E, per_page: u64, page: u64) -> OrmResult<Page> {
        let per_page = per_page.max(1);
        let page = page.max(1);
        let total = self.total(conn).await?;
        let items = if total == 0 {
            Vec::new()
        } else {
            let mut spec = self.spec().clone();
            spec.limit = Some(sql_count(per_page));
            spec.offset = Some(page_offset(page, per_page));
            self.fetch(conn, &spec, StatementKind::Select).await?
        };
        Ok(Page {
            items,
            total,
            per_page,
            current_page: page,
        })
    }

    /// Like `paginate` without the count query.
    pub async fn simple_paginate<E: Executor>(
        &self,
        conn: &E,
        per_page: u64,
        page: u64,
    ) -> OrmResult<SimplePage> {
        let per_page = per_page.max(1);
        let page = page.max(1);
        let mut spec = self.spec().clone();
        spec.limit = Some(sql_count(per_page.saturating_add(1)));
        spec.offset = Some(page_offset(page, per_page));
        let mut items = self.fetch(conn, &spec, StatementKind::Select).await?;
        let has_more = items.len() as u64 > per_page;
        items.truncate(usize::try_from(per_page).unwrap_or(usize::MAX));
        Ok(SimplePage {
            items,
            per_page,
            current_page: page,
            has_more,
        })
    }

    /// Walk the result in pages of `size` rows using LIMIT/OFFSET.
    ///
    /// The handler gets each non-empty page and its 1-based index. Iteration
    /// stops on a short page, on `ControlFlow::Break` or on the first handler
    /// error. Rows inserted or deleted while chunking shift the offsets, so
    /// rows can be skipped or seen twice; use [`chunk_by_id`](Self::chunk_by_id)
    /// when the table is being written to.
    pub async fn chunk<E, F, Fut>(&self, conn: &E, size: u64, mut handler: F) -> OrmResult<()>
    where
        E: Executor,
        F: FnMut(Vec<Record>, usize) -> Fut + Send,
        Fut: Future<Output = OrmResult<ControlFlow<()>>> + Send,
    {
        check_size(size)?;
        let mut spec = self.spec().clone();
        if spec.orders.is_empty() {
            spec.orders.push(OrderSpec::Column {
                column: spec.primary_key.clone(),
                direction: Direction::Asc,
            });
        }
        spec.limit = Some(sql_count(size));

        let mut page = 1usize;
        loop {
            spec.offset = Some(page_offset(page as u64, size));
            let rows = self.fetch(conn, &spec, StatementKind::Select).await?;
            let fetched = rows.len() as u64;
            if fetched == 0 {
                return Ok(());
            }
            if handler(rows, page).await?.is_break() || fetched < size {
                return Ok(());
            }
            page += 1;
        }
    }

    /// Walk the result in pages of `size` rows, ascending by primary key.
    ///
    /// Each page asks for `pk > last_seen` instead of an offset, so
    /// concurrent writes cannot make it skip rows. Existing ORDER BY clauses
    /// are replaced.
    pub async fn chunk_by_id<E, F, Fut>(&self, conn: &E, size: u64, handler: F) -> OrmResult<()>
    where
        E: Executor,
        F: FnMut(Vec<Record>, usize) -> Fut + Send,
        Fut: Future<Output = OrmResult<ControlFlow<()>>> + Send,
    {
        self.chunk_by_cursor(conn, CursorState::new(Direction::Asc, size), handler)
            .await
    }

    /// `chunk_by_id` walking from the highest key down.
    pub async fn chunk_by_id_desc<E, F, Fut>(&self, conn: &E, size: u64, handler: F) -> OrmResult<()>
    where
        E: Executor,
        F: FnMut(Vec<Record>, usize) -> Fut + Send,
        Fut: Future<Output = OrmResult<ControlFlow<()>>> + Send,
    {
        self.chunk_by_cursor(conn, CursorState::new(Direction::Desc, size), handler)
            .await
    }

    async fn chunk_by_cursor<E, F, Fut>(
        &self,
        conn: &E,
        mut cursor: CursorState,
        mut handler: F,
    ) -> OrmResult<()>
    where
        E: Executor,
        F: FnMut(Vec<Record>, usize) -> Fut + Send,
        Fut: Future<Output = OrmResult<ControlFlow<()>>> + Send,
    {
        check_size(cursor.size)?;
        let base = self.scoped_spec();
        let pk = base.primary_key.clone();

        let mut page = 1usize;
        loop {
            let spec = cursor.page_spec(&base);
            let rows = self.fetch(conn, &spec, StatementKind::Select).await?;
            let fetched = rows.len() as u64;
            if fetched == 0 {
                return Ok(());
            }
            cursor.advance(&rows, &pk)?;
            if handler(rows, page).await?.is_break() || fetched < cursor.size {
                return Ok(());
            }
            page += 1;
        }
    }
}
