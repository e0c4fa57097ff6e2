//! Query timing, logging and statistics.
//!
//! [`InstrumentedExecutor`] wraps any [`Executor`] and reports every statement
//! through `tracing` under the `qorm.sql` target:
//!
//! ```ignore
//! use qorm::monitor::{InstrumentedExecutor, MonitorConfig};
//! use std::time::Duration;
//!
//! let conn = InstrumentedExecutor::new(conn).with_config(
//!     MonitorConfig::new()
//!         .with_slow_query_threshold(Duration::from_millis(200))
//!         .enable_monitoring(),
//! );
//! qorm::table("users").where_("id", 1).first(&conn).await?;
//! println!("{:?}", conn.stats());
//! ```

use crate::client::{ExecResult, Executor};
use crate::error::OrmResult;
use crate::record::Record;
use crate::value::Value;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::Level;

/// Emit a tracing event at a level chosen at runtime.
macro_rules! event_at {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            Level::ERROR => tracing::error!($($arg)+),
            Level::WARN => tracing::warn!($($arg)+),
            Level::INFO => tracing::info!($($arg)+),
            Level::DEBUG => tracing::debug!($($arg)+),
            Level::TRACE => tracing::trace!($($arg)+),
        }
    };
}

/// The kind of statement, detected from its text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Select,
    Insert,
    Update,
    Delete,
    /// DDL, transaction control and anything else.
    Other,
}

impl QueryType {
    /// Classify by the first keyword, skipping whitespace, comments and
    /// opening parentheses (union heads start with `(`).
    pub fn from_sql(sql: &str) -> Self {
        let mut s = sql;
        loop {
            let before = s.len();
            s = s.trim_start().trim_start_matches('(');
            if let Some(rest) = s.strip_prefix("--") {
                s = rest.find('\n').map_or("", |pos| &rest[pos + 1..]);
            } else if let Some(rest) = s.strip_prefix("/*") {
                s = rest.find("*/").map_or("", |pos| &rest[pos + 2..]);
            }
            if s.len() == before {
                break;
            }
        }

        let keyword: String = s
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_ascii_uppercase();
        match keyword.as_str() {
            "SELECT" | "WITH" => QueryType::Select,
            "INSERT" | "REPLACE" => QueryType::Insert,
            "UPDATE" => QueryType::Update,
            "DELETE" => QueryType::Delete,
            _ => QueryType::Other,
        }
    }
}

/// Monitoring switches.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Statements slower than this are logged at WARN.
    pub slow_query_threshold: Option<Duration>,
    /// When false the wrapper only forwards calls.
    pub monitoring_enabled: bool,
    /// Truncate logged SQL to this many bytes. `None` disables truncation.
    pub max_sql_length: Option<usize>,
    /// Level of the per-statement completion event.
    pub level: Level,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            slow_query_threshold: None,
            monitoring_enabled: false,
            max_sql_length: Some(200),
            level: Level::DEBUG,
        }
    }
}

impl MonitorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = Some(threshold);
        self
    }

    pub fn enable_monitoring(mut self) -> Self {
        self.monitoring_enabled = true;
        self
    }

    pub fn disable_monitoring(mut self) -> Self {
        self.monitoring_enabled = false;
        self
    }

    pub fn max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    pub fn no_truncate(mut self) -> Self {
        self.max_sql_length = None;
        self
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }
}

/// Counters collected by an [`InstrumentedExecutor`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryStats {
    pub total_queries: u64,
    pub failed_queries: u64,
    pub total_duration: Duration,
    pub select_count: u64,
    pub insert_count: u64,
    pub update_count: u64,
    pub delete_count: u64,
    pub other_count: u64,
    pub max_duration: Duration,
    pub slowest_query: Option<String>,
}

impl QueryStats {
    fn record(&mut self, query_type: QueryType, sql: &str, elapsed: Duration, ok: bool) {
        self.total_queries += 1;
        self.total_duration = self.total_duration.saturating_add(elapsed);
        match query_type {
            QueryType::Select => self.select_count += 1,
            QueryType::Insert => self.insert_count += 1,
            QueryType::Update => self.update_count += 1,
            QueryType::Delete => self.delete_count += 1,
            QueryType::Other => self.other_count += 1,
        }
        if !ok {
            self.failed_queries += 1;
        }
        if elapsed > self.max_duration || self.slowest_query.is_none() {
            self.max_duration = elapsed;
            self.slowest_query = Some(sql.to_string());
        }
    }
}

fn truncate_sql(sql: &str, max: Option<usize>) -> String {
    match max {
        Some(max) if sql.len() > max => {
            let mut end = max;
            while !sql.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &sql[..end])
        }
        _ => sql.to_string(),
    }
}

/// Executor wrapper that times, logs and counts every statement.
///
/// Transactions started through the wrapper are instrumented too and feed
/// the same statistics.
#[derive(Debug, Clone)]
pub struct InstrumentedExecutor<E> {
    inner: E,
    config: MonitorConfig,
    stats: Arc<Mutex<QueryStats>>,
}

impl<E> InstrumentedExecutor<E> {
    /// Wrap `inner` with monitoring enabled and default settings.
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            config: MonitorConfig::new().enable_monitoring(),
            stats: Arc::new(Mutex::new(QueryStats::default())),
        }
    }

    pub fn with_config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    pub fn into_inner(self) -> E {
        self.inner
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> QueryStats {
        self.stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn reset_stats(&self) {
        *self
            .stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = QueryStats::default();
    }

    fn observe<T>(&self, sql: &str, param_count: usize, started: Instant, result: &OrmResult<T>) {
        if !self.config.monitoring_enabled {
            return;
        }
        let elapsed = started.elapsed();
        let query_type = QueryType::from_sql(sql);
        let logged_sql = truncate_sql(sql, self.config.max_sql_length);

        self.stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .record(query_type, sql, elapsed, result.is_ok());

        match result {
            Ok(_) => event_at!(
                self.config.level,
                target: "qorm.sql",
                query_type = ?query_type,
                param_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                sql = %logged_sql,
                "query completed"
            ),
            Err(error) => tracing::warn!(
                target: "qorm.sql",
                query_type = ?query_type,
                param_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                sql = %logged_sql,
                %error,
                "query failed"
            ),
        }

        if let Some(threshold) = self.config.slow_query_threshold {
            if elapsed > threshold {
                tracing::warn!(
                    target: "qorm.sql",
                    query_type = ?query_type,
                    elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                    threshold_ms = threshold.as_secs_f64() * 1000.0,
                    sql = %logged_sql,
                    "slow query"
                );
            }
        }
    }
}

impl<E: Executor> Executor for InstrumentedExecutor<E> {
    type Tx = InstrumentedExecutor<E::Tx>;

    async fn query(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<Record>> {
        let started = Instant::now();
        let result = self.inner.query(sql, params).await;
        self.observe(sql, params.len(), started, &result);
        result
    }

    async fn exec(&self, sql: &str, params: &[Value]) -> OrmResult<ExecResult> {
        let started = Instant::now();
        let result = self.inner.exec(sql, params).await;
        self.observe(sql, params.len(), started, &result);
        result
    }

    async fn transaction<F, Fut, T>(&self, f: F) -> OrmResult<T>
    where
        F: FnOnce(Self::Tx) -> Fut + Send,
        Fut: Future<Output = OrmResult<T>> + Send,
        T: Send,
    {
        let config = self.config.clone();
        let stats = Arc::clone(&self.stats);
        self.inner
            .transaction(move |tx| {
                f(InstrumentedExecutor {
                    inner: tx,
                    config,
                    stats,
                })
            })
            .await
    }
}
