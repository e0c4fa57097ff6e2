//! In-memory executor for integration tests.
//!
//! Understands the subset of postgres-dialect SQL the builder emits for
//! single-table statements: AND-only WHERE chains, ORDER BY on one column,
//! LIMIT/OFFSET, `COUNT(*)` aggregates, multi-row INSERT, UPDATE and DELETE.

#![allow(dead_code)]

use qorm::{ExecResult, Executor, OrmError, OrmResult, Record, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct State {
    tables: HashMap<String, Vec<Record>>,
    next_id: i64,
    statements: Vec<String>,
    omit_generated_keys: bool,
}

#[derive(Clone, Default)]
pub struct MockExecutor {
    state: Arc<Mutex<State>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        init_tracing();
        Self::default()
    }

    /// Seed `table` with `rows`; generated ids continue after the largest `id`.
    pub fn seed(&self, table: &str, rows: Vec<Record>) {
        let mut state = self.state.lock().unwrap();
        let max = rows
            .iter()
            .filter_map(|r| r.get("id").and_then(Value::as_i64))
            .max()
            .unwrap_or(0);
        state.next_id = state.next_id.max(max);
        state.tables.insert(table.to_string(), rows);
    }

    pub fn rows(&self, table: &str) -> Vec<Record> {
        let state = self.state.lock().unwrap();
        state.tables.get(table).cloned().unwrap_or_default()
    }

    /// Behave like a driver that never reports generated keys.
    pub fn omit_generated_keys(self) -> Self {
        self.state.lock().unwrap().omit_generated_keys = true;
        self
    }

    /// Every statement run so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.state.lock().unwrap().statements.clone()
    }

    fn run_select(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<Record>> {
        let body = sql.strip_prefix("SELECT ").ok_or_else(|| unsupported(sql))?;
        let (projection, rest) = body.split_once(" FROM ").ok_or_else(|| unsupported(sql))?;
        let (rest, offset) = cut(rest, " OFFSET ");
        let (rest, limit) = cut(rest, " LIMIT ");
        let (rest, order) = cut(rest, " ORDER BY ");
        let (table, filter) = cut(rest, " WHERE ");

        let state = self.state.lock().unwrap();
        let conditions = parse_conditions(filter, params)?;
        let mut rows: Vec<Record> = state
            .tables
            .get(unquote(table))
            .map(|rows| rows.iter().filter(|r| matches_all(r, &conditions)).cloned().collect())
            .unwrap_or_default();

        if projection == r#"COUNT(*) AS "aggregate""# {
            return Ok(vec![Record::from([("aggregate", rows.len() as i64)])]);
        }

        if let Some(order) = order {
            let (column, direction) = order.rsplit_once(' ').ok_or_else(|| unsupported(sql))?;
            let column = unquote(column);
            rows.sort_by(|a, b| {
                let ord = compare(a.get(column), b.get(column)).unwrap_or(Ordering::Equal);
                if direction == "DESC" { ord.reverse() } else { ord }
            });
        }
        let offset: usize = offset.map(str::parse::<usize>).transpose().map_err(|_| unsupported(sql))?.unwrap_or(0);
        let limit: usize = limit.map(str::parse::<usize>).transpose().map_err(|_| unsupported(sql))?.unwrap_or(usize::MAX);
        let rows = rows.into_iter().skip(offset).take(limit);

        if projection == "*" {
            return Ok(rows.collect());
        }
        let columns: Vec<&str> = projection.split(", ").map(unquote).collect();
        Ok(rows
            .map(|r| {
                columns
                    .iter()
                    .map(|c| (c.to_string(), r.get(c).cloned().unwrap_or_default()))
                    .collect()
            })
            .collect())
    }

    fn run_insert(&self, sql: &str, params: &[Value]) -> OrmResult<ExecResult> {
        let body = sql.strip_prefix("INSERT INTO ").ok_or_else(|| unsupported(sql))?;
        let (body, returning) = cut(body, " RETURNING ");
        let (table, rest) = body.split_once(" (").ok_or_else(|| unsupported(sql))?;
        let (columns, values) = rest.split_once(") VALUES (").ok_or_else(|| unsupported(sql))?;
        let columns: Vec<&str> = columns.split(", ").map(unquote).collect();
        let values = values.strip_suffix(')').ok_or_else(|| unsupported(sql))?;

        let mut state = self.state.lock().unwrap();
        let mut last_id = None;
        let mut inserted = Vec::new();
        for group in values.split("), (") {
            let mut row: Vec<(String, Value)> = Vec::new();
            for (column, token) in columns.iter().zip(group.split(", ")) {
                row.push((column.to_string(), param(token, params)?));
            }
            let mut record: Record = row.into_iter().collect();
            match record.get("id").and_then(Value::as_i64) {
                Some(id) => {
                    state.next_id = state.next_id.max(id);
                    last_id = Some(id);
                }
                None => {
                    state.next_id += 1;
                    last_id = Some(state.next_id);
                    record = record.merged([("id".to_string(), Value::Int(state.next_id))]);
                }
            }
            inserted.push(record);
        }
        let count = inserted.len() as u64;
        state
            .tables
            .entry(unquote(table).to_string())
            .or_default()
            .extend(inserted);
        Ok(ExecResult {
            last_insert_id: returning.and(last_id).filter(|_| !state.omit_generated_keys),
            rows_affected: count,
        })
    }

    fn run_update(&self, sql: &str, params: &[Value]) -> OrmResult<ExecResult> {
        let body = sql.strip_prefix("UPDATE ").ok_or_else(|| unsupported(sql))?;
        let (table, rest) = body.split_once(" SET ").ok_or_else(|| unsupported(sql))?;
        let (sets, filter) = cut(rest, " WHERE ");
        let mut assignments = Vec::new();
        for set in sets.split(", ") {
            let (column, token) = set.split_once(" = ").ok_or_else(|| unsupported(sql))?;
            assignments.push((unquote(column).to_string(), param(token, params)?));
        }
        let conditions = parse_conditions(filter, params)?;

        let mut state = self.state.lock().unwrap();
        let mut count = 0;
        if let Some(rows) = state.tables.get_mut(unquote(table)) {
            for row in rows.iter_mut().filter(|r| matches_all(r, &conditions)) {
                *row = row.clone().merged(assignments.clone());
                count += 1;
            }
        }
        Ok(ExecResult {
            last_insert_id: None,
            rows_affected: count,
        })
    }

    fn run_delete(&self, sql: &str, params: &[Value]) -> OrmResult<ExecResult> {
        let body = sql.strip_prefix("DELETE FROM ").ok_or_else(|| unsupported(sql))?;
        let (table, filter) = cut(body, " WHERE ");
        let conditions = parse_conditions(filter, params)?;

        let mut state = self.state.lock().unwrap();
        let mut count = 0;
        if let Some(rows) = state.tables.get_mut(unquote(table)) {
            let before = rows.len();
            rows.retain(|r| !matches_all(r, &conditions));
            count = (before - rows.len()) as u64;
        }
        Ok(ExecResult {
            last_insert_id: None,
            rows_affected: count,
        })
    }

    fn record(&self, sql: &str) {
        self.state.lock().unwrap().statements.push(sql.to_string());
    }
}

impl Executor for MockExecutor {
    type Tx = MockExecutor;

    async fn query(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<Record>> {
        self.record(sql);
        self.run_select(sql, params)
    }

    async fn exec(&self, sql: &str, params: &[Value]) -> OrmResult<ExecResult> {
        self.record(sql);
        if sql.starts_with("INSERT") {
            self.run_insert(sql, params)
        } else if sql.starts_with("UPDATE") {
            self.run_update(sql, params)
        } else if sql.starts_with("DELETE") {
            self.run_delete(sql, params)
        } else {
            Err(unsupported(sql))
        }
    }

    async fn transaction<F, Fut, T>(&self, f: F) -> OrmResult<T>
    where
        F: FnOnce(Self::Tx) -> Fut + Send,
        Fut: Future<Output = OrmResult<T>> + Send,
        T: Send,
    {
        let snapshot = self.state.lock().unwrap().tables.clone();
        self.record("BEGIN");
        match f(self.clone()).await {
            Ok(value) => {
                self.record("COMMIT");
                Ok(value)
            }
            Err(cause) => {
                self.state.lock().unwrap().tables = snapshot;
                self.record("ROLLBACK");
                Err(OrmError::transaction(cause, None))
            }
        }
    }
}

fn unsupported(sql: &str) -> OrmError {
    OrmError::Other(format!("mock executor cannot run: {sql}"))
}

/// Split `s` at the last `keyword`.
fn cut<'a>(s: &'a str, keyword: &str) -> (&'a str, Option<&'a str>) {
    match s.rfind(keyword) {
        Some(i) => (&s[..i], Some(&s[i + keyword.len()..])),
        None => (s, None),
    }
}

fn unquote(s: &str) -> &str {
    s.trim().trim_matches('"')
}

fn param(token: &str, params: &[Value]) -> OrmResult<Value> {
    token
        .trim()
        .strip_prefix('$')
        .and_then(|n| n.parse::<usize>().ok())
        .and_then(|n| params.get(n - 1))
        .cloned()
        .ok_or_else(|| OrmError::Other(format!("bad placeholder {token}")))
}

enum Condition {
    Compare(String, String, Value),
    In(String, Vec<Value>),
    Null(String, bool),
}

fn parse_conditions(filter: Option<&str>, params: &[Value]) -> OrmResult<Vec<Condition>> {
    let Some(filter) = filter else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for part in filter.split(" AND ") {
        let part = part.trim().trim_start_matches('(').trim_end_matches(')');
        if let Some(column) = part.strip_suffix(" IS NOT NULL") {
            out.push(Condition::Null(unquote(column).to_string(), true));
        } else if let Some(column) = part.strip_suffix(" IS NULL") {
            out.push(Condition::Null(unquote(column).to_string(), false));
        } else if let Some((column, list)) = part.split_once(" IN (") {
            let values = list
                .split(", ")
                .map(|t| param(t, params))
                .collect::<OrmResult<Vec<_>>>()?;
            out.push(Condition::In(unquote(column).to_string(), values));
        } else {
            let mut tokens = part.splitn(3, ' ');
            match (tokens.next(), tokens.next(), tokens.next()) {
                (Some(column), Some(op), Some(token)) => out.push(Condition::Compare(
                    unquote(column).to_string(),
                    op.to_string(),
                    param(token, params)?,
                )),
                _ => return Err(OrmError::Other(format!("cannot parse condition {part}"))),
            }
        }
    }
    Ok(out)
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Option<Ordering> {
    match (a?, b?) {
        (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (x, y) => x.as_f64()?.partial_cmp(&y.as_f64()?),
    }
}

fn matches_all(row: &Record, conditions: &[Condition]) -> bool {
    conditions.iter().all(|c| match c {
        Condition::Null(column, negated) => {
            row.get(column).is_none_or(Value::is_null) != *negated
        }
        Condition::In(column, values) => values
            .iter()
            .any(|v| compare(row.get(column), Some(v)) == Some(Ordering::Equal)),
        Condition::Compare(column, op, value) => {
            let ord = compare(row.get(column), Some(value));
            match (op.as_str(), ord) {
                ("=", Some(o)) => o == Ordering::Equal,
                ("!=", Some(o)) => o != Ordering::Equal,
                ("<", Some(o)) => o == Ordering::Less,
                ("<=", Some(o)) => o != Ordering::Greater,
                (">", Some(o)) => o == Ordering::Greater,
                (">=", Some(o)) => o != Ordering::Less,
                _ => false,
            }
        }
    })
}
