//! Schema migrations as plain statement blocks.
//!
//! There is no history table: callers decide which migrations are pending
//! and pass only those.

use crate::client::Executor;
use crate::error::OrmResult;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One migration: statements to apply and statements to revert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Migration {
    pub name: String,
    /// Connection name the migration targets.
    pub connection: String,
    pub created_at: DateTime<Utc>,
    pub up: Vec<String>,
    pub down: Vec<String>,
}

impl Migration {
    pub fn new(name: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            connection: "default".to_string(),
            created_at,
            up: Vec::new(),
            down: Vec::new(),
        }
    }

    pub fn connection(mut self, connection: &str) -> Self {
        self.connection = connection.to_string();
        self
    }

    /// Append a statement to the up block.
    pub fn up(mut self, sql: &str) -> Self {
        self.up.push(sql.to_string());
        self
    }

    /// Append a statement to the down block.
    pub fn down(mut self, sql: &str) -> Self {
        self.down.push(sql.to_string());
        self
    }
}

/// `(name, statements)` in execution order.
type Plan = Vec<(String, Vec<String>)>;

fn plan_up(migrations: &[Migration]) -> Plan {
    let mut ordered: Vec<&Migration> = migrations.iter().collect();
    ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
    ordered
        .into_iter()
        .map(|m| (m.name.clone(), m.up.clone()))
        .collect()
}

fn plan_down(migrations: &[Migration]) -> Plan {
    let mut ordered: Vec<&Migration> = migrations.iter().collect();
    ordered.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.name.cmp(&a.name)));
    ordered
        .into_iter()
        .map(|m| (m.name.clone(), m.down.clone()))
        .collect()
}

async fn apply<E: Executor>(conn: &E, direction: &'static str, plan: Plan) -> OrmResult<usize> {
    let count = plan.len();
    conn.transaction(move |tx| async move {
        for (name, statements) in plan {
            tracing::info!(target: "qorm.migrate", migration = %name, direction, "applying migration");
            for sql in &statements {
                tx.exec(sql, &[]).await?;
            }
        }
        Ok(count)
    })
    .await
}

/// Apply the up blocks, oldest first, inside one transaction.
///
/// Returns the number of migrations applied. On failure nothing is kept.
pub async fn run_up<E: Executor>(conn: &E, migrations: &[Migration]) -> OrmResult<usize> {
    apply(conn, "up", plan_up(migrations)).await
}

/// Apply the down blocks, newest first, inside one transaction.
pub async fn run_down<E: Executor>(conn: &E, migrations: &[Migration]) -> OrmResult<usize> {
    apply(conn, "down", plan_down(migrations)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ExecResult;
    use crate::error::OrmError;
    use crate::record::Record;
    use crate::value::Value;
    use chrono::TimeZone;
    use std::future::Future;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder {
        log: Arc<Mutex<Vec<String>>>,
        fail_on: Option<&'static str>,
    }

    impl Executor for Recorder {
        type Tx = Recorder;

        async fn query(&self, _sql: &str, _params: &[Value]) -> OrmResult<Vec<Record>> {
            Ok(Vec::new())
        }

        async fn exec(&self, sql: &str, _params: &[Value]) -> OrmResult<ExecResult> {
            if self.fail_on == Some(sql) {
                return Err(OrmError::Other(format!("cannot run {sql}")));
            }
            self.log.lock().unwrap().push(sql.to_string());
            Ok(ExecResult::default())
        }

        async fn transaction<F, Fut, T>(&self, f: F) -> OrmResult<T>
        where
            F: FnOnce(Self::Tx) -> Fut + Send,
            Fut: Future<Output = OrmResult<T>> + Send,
            T: Send,
        {
            self.log.lock().unwrap().push("BEGIN".into());
            match f(self.clone()).await {
                Ok(v) => {
                    self.log.lock().unwrap().push("COMMIT".into());
                    Ok(v)
                }
                Err(e) => {
                    self.log.lock().unwrap().push("ROLLBACK".into());
                    Err(OrmError::transaction(e, None))
                }
            }
        }
    }

    fn migrations() -> Vec<Migration> {
        let day = |d| Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap();
        vec![
            Migration::new("add_email", day(2))
                .up("ALTER TABLE users ADD email TEXT")
                .down("ALTER TABLE users DROP email"),
            Migration::new("create_users", day(1))
                .up("CREATE TABLE users (id BIGINT)")
                .down("DROP TABLE users"),
        ]
    }

    #[tokio::test]
    async fn up_runs_oldest_first() {
        let conn = Recorder::default();
        assert_eq!(run_up(&conn, &migrations()).await.unwrap(), 2);
        assert_eq!(
            *conn.log.lock().unwrap(),
            vec![
                "BEGIN",
                "CREATE TABLE users (id BIGINT)",
                "ALTER TABLE users ADD email TEXT",
                "COMMIT"
            ]
        );
    }

    #[tokio::test]
    async fn down_runs_newest_first() {
        let conn = Recorder::default();
        run_down(&conn, &migrations()).await.unwrap();
        assert_eq!(
            *conn.log.lock().unwrap(),
            vec!["BEGIN", "ALTER TABLE users DROP email", "DROP TABLE users", "COMMIT"]
        );
    }

    #[tokio::test]
    async fn failure_rolls_back() {
        let conn = Recorder {
            fail_on: Some("ALTER TABLE users ADD email TEXT"),
            ..Recorder::default()
        };
        let err = run_up(&conn, &migrations()).await.unwrap_err();
        assert!(matches!(err, OrmError::TransactionFailed { .. }));
        assert_eq!(conn.log.lock().unwrap().last().map(String::as_str), Some("ROLLBACK"));
    }
}
