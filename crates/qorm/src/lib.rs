//! # qorm
//!
//! A fluent SQL query builder and compiler with pluggable executors.
//!
//! ## Features
//!
//! - **One pass compilation**: SQL text and bindings are written together, so
//!   placeholder numbers match binding positions through subqueries and unions
//! - **Dialects**: identifier quoting, placeholder style, upsert syntax and
//!   random ordering come from a [`Dialect`] value, not from the builder
//! - **Deferred errors**: building never fails; malformed predicates surface
//!   when the query is compiled
//! - **Executor seam**: any [`Executor`] runs the compiled SQL, and the same
//!   trait covers transactions
//! - **Monitoring**: [`InstrumentedExecutor`] logs statements through `tracing`
//!   and keeps per-type statistics
//!
//! ## Example
//!
//! ```ignore
//! use qorm::{table, Fields};
//!
//! let active = table("users")
//!     .select(&["id", "name"])
//!     .where_("status", "active")
//!     .where_group(|q| q.where_("age", (">=", 18)).or_where("verified", true))
//!     .order_by("name")
//!     .get(&conn)
//!     .await?;
//!
//! let page = table("orders").where_("user_id", 7).paginate(&conn, 20, 1).await?;
//!
//! conn.transaction(|tx| async move {
//!     table("accounts").where_("id", 1).update(&tx, &Fields::new().set("balance", 90)).await?;
//!     table("accounts").where_("id", 2).update(&tx, &Fields::new().set("balance", 110)).await?;
//!     Ok(())
//! })
//! .await?;
//! ```

pub mod client;
pub mod config;
pub mod dialect;
pub mod eager;
pub mod error;
pub mod ident;
pub mod migrate;
pub mod monitor;
pub mod qb;
pub mod record;
pub mod value;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use client::{ExecResult, Executor};
pub use config::DialectRegistry;
pub use dialect::{Dialect, PlaceholderStyle, UpsertSyntax};
pub use eager::{Relation, RelationRegistry};
pub use error::{OrmError, OrmResult};
pub use migrate::Migration;
pub use monitor::{InstrumentedExecutor, MonitorConfig, QueryStats, QueryType};
pub use qb::{
    AggregateFn, CompiledQuery, Direction, Fields, JoinKind, Page, QueryBuilder, SimplePage,
    StatementKind, UpsertOutcome, WhereArg,
};
pub use record::{FieldMap, FromRecord, Record};
pub use value::{FromValue, Value};

#[cfg(feature = "postgres")]
pub use postgres::PgExecutor;

/// Start a query on `name` with the default (postgres) dialect.
///
/// Use [`Dialect::table`] to start one for another dialect.
pub fn table(name: &str) -> QueryBuilder {
    QueryBuilder::new(name)
}
