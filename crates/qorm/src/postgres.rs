//! [`Executor`] over a `tokio_postgres::Client`.
//!
//! This is glue only: transport, TLS and pooling stay with tokio-postgres
//! and whoever created the client.
//!
//! ```ignore
//! use qorm::postgres::PgExecutor;
//! use tokio_postgres::NoTls;
//!
//! let (client, connection) = tokio_postgres::connect("postgres://...", NoTls).await?;
//! tokio::spawn(async move { let _ = connection.await; });
//!
//! let conn = PgExecutor::new(client);
//! let users = qorm::table("users").where_("active", true).get(&conn).await?;
//! ```

use crate::client::{ExecResult, Executor};
use crate::error::{OrmError, OrmResult};
use crate::record::Record;
use crate::value::Value;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::error::Error;
use std::future::Future;
use std::sync::Arc;
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, ToSql, Type};
use tokio_postgres::{Client, Row};
use uuid::Uuid;

/// Wrap a driver error as [`OrmError::ExecutionFailed`].
pub fn from_db_error(err: tokio_postgres::Error) -> OrmError {
    if let Some(db_err) = err.as_db_error() {
        tracing::debug!(
            target: "qorm.sql",
            code = db_err.code().code(),
            constraint = db_err.constraint().unwrap_or("-"),
            "database error"
        );
    }
    OrmError::execution(err)
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => b.to_sql(ty, out),
            Value::Int(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                Type::FLOAT4 => (*i as f32).to_sql(ty, out),
                Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                Type::TEXT | Type::VARCHAR | Type::BPCHAR => i.to_string().to_sql(ty, out),
                _ => i.to_sql(ty, out),
            },
            Value::Float(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                _ => f.to_sql(ty, out),
            },
            Value::Text(s) => match *ty {
                Type::UUID => Uuid::parse_str(s)?.to_sql(ty, out),
                Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(s)?.to_sql(ty, out),
                _ => s.as_str().to_sql(ty, out),
            },
            Value::Bytes(b) => b.as_slice().to_sql(ty, out),
            Value::Json(j) => j.to_sql(ty, out),
            Value::Uuid(u) => u.to_sql(ty, out),
            Value::Timestamp(t) => match *ty {
                Type::TIMESTAMP => t.naive_utc().to_sql(ty, out),
                _ => t.to_sql(ty, out),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Text rendering of a binary `NUMERIC` cell; exact, no float rounding.
struct PgNumeric(String);

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        let word = |at: usize| {
            raw.get(at..at + 2)
                .map(|b| u16::from_be_bytes([b[0], b[1]]))
                .ok_or("truncated numeric")
        };
        let ndigits = usize::from(word(0)?);
        let weight = i32::from(word(2)? as i16);
        let sign = word(4)?;
        let dscale = usize::from(word(6)?);
        if sign == 0xC000 {
            return Ok(PgNumeric("NaN".to_string()));
        }
        let digits = (0..ndigits)
            .map(|i| word(8 + 2 * i))
            .collect::<Result<Vec<u16>, _>>()?;
        let digit = |idx: i32| {
            usize::try_from(idx)
                .ok()
                .and_then(|i| digits.get(i).copied())
                .unwrap_or(0)
        };

        let mut out = String::new();
        if sign == 0x4000 {
            out.push('-');
        }
        if weight < 0 {
            out.push('0');
        } else {
            out.push_str(&digit(0).to_string());
            for idx in 1..=weight {
                out.push_str(&format!("{:04}", digit(idx)));
            }
        }
        if dscale > 0 {
            let mut frac = String::new();
            let mut idx = weight + 1;
            while frac.len() < dscale {
                frac.push_str(&format!("{:04}", digit(idx)));
                idx += 1;
            }
            frac.truncate(dscale);
            out.push('.');
            out.push_str(&frac);
        }
        Ok(PgNumeric(out))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

fn cell<'a, T: FromSql<'a>>(
    row: &'a Row,
    idx: usize,
    name: &str,
    wrap: impl FnOnce(T) -> Value,
) -> OrmResult<Value> {
    row.try_get::<_, Option<T>>(idx)
        .map(|v| v.map_or(Value::Null, wrap))
        .map_err(|e| OrmError::decode(name, e.to_string()))
}

/// Convert a driver row into a [`Record`], choosing the Rust type by column type.
pub fn decode_row(row: &Row) -> OrmResult<Record> {
    let mut pairs = Vec::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let name = column.name();
        let value = match *column.type_() {
            Type::BOOL => cell(row, idx, name, Value::Bool)?,
            Type::INT2 => cell(row, idx, name, |v: i16| Value::Int(v.into()))?,
            Type::INT4 => cell(row, idx, name, |v: i32| Value::Int(v.into()))?,
            Type::INT8 => cell(row, idx, name, Value::Int)?,
            Type::FLOAT4 => cell(row, idx, name, |v: f32| Value::Float(v.into()))?,
            Type::FLOAT8 => cell(row, idx, name, Value::Float)?,
            Type::BYTEA => cell(row, idx, name, Value::Bytes)?,
            Type::JSON | Type::JSONB => cell(row, idx, name, Value::Json)?,
            Type::UUID => cell(row, idx, name, Value::Uuid)?,
            Type::TIMESTAMPTZ => cell(row, idx, name, |v: DateTime<Utc>| Value::from(v))?,
            Type::TIMESTAMP => cell(row, idx, name, |v: NaiveDateTime| Value::Timestamp(v.and_utc()))?,
            Type::NUMERIC => cell(row, idx, name, |v: PgNumeric| Value::Text(v.0))?,
            Type::DATE => cell(row, idx, name, |v: NaiveDate| Value::Text(v.to_string()))?,
            _ => cell(row, idx, name, Value::Text).map_err(|_| {
                OrmError::decode(name, format!("unsupported column type {}", column.type_()))
            })?,
        };
        pairs.push((name.to_string(), value));
    }
    Ok(pairs.into_iter().collect())
}

fn as_params(values: &[Value]) -> Vec<&(dyn ToSql + Sync)> {
    values.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
}

fn has_returning(sql: &str) -> bool {
    sql.to_ascii_uppercase().contains(" RETURNING ")
}

/// Executor backed by one tokio-postgres connection.
///
/// Transactions issue `BEGIN`/`COMMIT`/`ROLLBACK` on the same connection and
/// hand the body an executor one level deeper; a transaction started from
/// that executor becomes a savepoint. The body must not share the connection
/// with unrelated concurrent work.
#[derive(Clone)]
pub struct PgExecutor {
    client: Arc<Client>,
    depth: usize,
}

impl PgExecutor {
    pub fn new(client: Client) -> Self {
        Self::from_arc(Arc::new(client))
    }

    pub fn from_arc(client: Arc<Client>) -> Self {
        Self { client, depth: 0 }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Number of enclosing transactions; 0 outside any.
    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// Begin, commit and rollback statements for a transaction opened at `depth`.
fn tx_statements(depth: usize) -> [String; 3] {
    if depth == 0 {
        ["BEGIN".into(), "COMMIT".into(), "ROLLBACK".into()]
    } else {
        let name = format!("qorm_sp_{depth}");
        [
            format!("SAVEPOINT {name}"),
            format!("RELEASE SAVEPOINT {name}"),
            format!("ROLLBACK TO SAVEPOINT {name}"),
        ]
    }
}

impl Executor for PgExecutor {
    type Tx = PgExecutor;

    async fn query(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<Record>> {
        let refs = as_params(params);
        let rows = self.client.query(sql, &refs).await.map_err(from_db_error)?;
        rows.iter().map(decode_row).collect()
    }

    async fn exec(&self, sql: &str, params: &[Value]) -> OrmResult<ExecResult> {
        let refs = as_params(params);
        if !has_returning(sql) {
            let rows_affected = self.client.execute(sql, &refs).await.map_err(from_db_error)?;
            return Ok(ExecResult {
                last_insert_id: None,
                rows_affected,
            });
        }

        let rows = self.client.query(sql, &refs).await.map_err(from_db_error)?;
        let last_insert_id = rows.first().and_then(|row| {
            row.try_get::<_, i64>(0)
                .ok()
                .or_else(|| row.try_get::<_, i32>(0).ok().map(i64::from))
        });
        Ok(ExecResult {
            last_insert_id,
            rows_affected: rows.len() as u64,
        })
    }

    async fn transaction<F, Fut, T>(&self, f: F) -> OrmResult<T>
    where
        F: FnOnce(Self::Tx) -> Fut + Send,
        Fut: Future<Output = OrmResult<T>> + Send,
        T: Send,
    {
        let [begin, commit, rollback] = tx_statements(self.depth);
        self.client.batch_execute(&begin).await.map_err(from_db_error)?;
        let tx = PgExecutor {
            client: Arc::clone(&self.client),
            depth: self.depth + 1,
        };
        let cause = match f(tx).await {
            Ok(value) => match self.client.batch_execute(&commit).await {
                Ok(()) => return Ok(value),
                Err(err) => from_db_error(err),
            },
            Err(cause) => cause,
        };
        let rollback_error = self
            .client
            .batch_execute(&rollback)
            .await
            .err()
            .map(|e| e.to_string());
        Err(OrmError::transaction(cause, rollback_error))
    }
}
