//! Executor capability used by terminal operations.

use crate::error::OrmResult;
use crate::record::Record;
use crate::value::Value;
use std::future::Future;

/// Metadata returned by a write statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Generated key, when the driver reports one.
    pub last_insert_id: Option<i64>,
    pub rows_affected: u64,
}

/// Something that can run compiled SQL.
///
/// Bindings are passed in placeholder order; `params[i]` belongs to the
/// `i`-th placeholder in `sql`. Connections and transactions both implement
/// this trait, so every terminal operation works inside a transaction by
/// passing the transaction executor instead.
///
/// Timeouts and retries, if any, are the implementation's business.
pub trait Executor: Send + Sync {
    /// Executor handed to a transaction body.
    type Tx: Executor;

    /// Run a statement that returns rows.
    fn query(
        &self,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = OrmResult<Vec<Record>>> + Send;

    /// Run a statement for its side effects.
    fn exec(&self, sql: &str, params: &[Value]) -> impl Future<Output = OrmResult<ExecResult>> + Send;

    /// Run `f` inside a transaction.
    ///
    /// Commits when `f` returns `Ok`. When it returns `Err` the transaction is
    /// rolled back and the error comes back wrapped in
    /// [`OrmError::TransactionFailed`](crate::OrmError::TransactionFailed).
    fn transaction<F, Fut, T>(&self, f: F) -> impl Future<Output = OrmResult<T>> + Send
    where
        F: FnOnce(Self::Tx) -> Fut + Send,
        Fut: Future<Output = OrmResult<T>> + Send,
        T: Send;
}
