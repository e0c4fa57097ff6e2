//! Query builder and SQL compiler.
//!
//! A [`QueryBuilder`] records a [`QuerySpec`] expression tree. Compiling it
//! walks the tree once through a single writer that emits SQL text and the
//! binding list together, so placeholder numbers always line up with binding
//! positions, including inside subqueries and unions.
//!
//! # Usage
//!
//! ```ignore
//! use qorm::{table, Fields};
//!
//! // SELECT
//! let users = table("users")
//!     .where_("status", "active")
//!     .where_group(|q| q.where_("age", (">", 18)).or_where("verified", true))
//!     .order_by_desc("created_at")
//!     .limit(20)
//!     .get(&conn)
//!     .await?;
//!
//! // INSERT
//! let id = table("users")
//!     .insert_get_id(&conn, &Fields::new().set("name", "alice"))
//!     .await?;
//!
//! // UPDATE
//! table("users")
//!     .where_("id", id)
//!     .update(&conn, &Fields::new().set("status", "inactive"))
//!     .await?;
//!
//! // SQL only
//! let compiled = table("users").where_in("id", vec![1, 2, 3]).select_sql()?;
//! assert_eq!(compiled.sql, r#"SELECT * FROM "users" WHERE "id" IN ($1, $2, $3)"#);
//! ```

mod builder;
mod compile;
mod delete;
mod exec;
mod expr;
mod insert;
mod paginate;
mod param;
mod select;
mod spec;
mod update;


pub use builder::QueryBuilder;
pub use compile::{compile, CompiledQuery, StatementKind};
pub use exec::UpsertOutcome;
pub use expr::{Conjunction, Group, Operator, PredicateNode, WhereArg};
pub use insert::InsertMode;
pub use paginate::{Page, SimplePage};
pub use param::Bindings;
pub use select::AGGREGATE_ALIAS;
pub use spec::{
    AggregateFn, Direction, Fields, JoinKind, JoinSpec, OrderSpec, QuerySpec, SelectItem, Source,
    UnionKind, UnionSpec,
};
