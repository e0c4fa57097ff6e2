//! INSERT compilation, including insert-or-ignore and insert-or-replace.

use crate::dialect::UpsertSyntax;
use crate::error::{OrmError, OrmResult};
use crate::qb::param::SqlWriter;
use crate::qb::spec::{Fields, QuerySpec};

/// Conflict behavior of an INSERT.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum InsertMode {
    #[default]
    Plain,
    /// Skip rows that violate a unique constraint.
    Ignore,
    /// Overwrite rows that violate a unique constraint.
    Replace,
}

pub(crate) fn write_insert(
    spec: &QuerySpec,
    rows: &[Fields],
    mode: InsertMode,
    returning: bool,
    w: &mut SqlWriter<'_>,
) -> OrmResult<()> {
    let table = spec
        .table()
        .ok_or_else(|| OrmError::validation("INSERT needs a table source"))?;
    let first = rows
        .first()
        .ok_or_else(|| OrmError::validation("INSERT needs at least one row"))?;
    if first.is_empty() {
        return Err(OrmError::validation("INSERT row has no columns"));
    }
    let columns: Vec<&str> = first.columns().collect();
    check_columns(&columns, rows)?;

    let upsert = w.dialect().upsert;
    w.push(match (mode, upsert) {
        (InsertMode::Ignore, UpsertSyntax::MySql) => "INSERT IGNORE INTO ",
        (InsertMode::Ignore, UpsertSyntax::Sqlite) => "INSERT OR IGNORE INTO ",
        (InsertMode::Replace, UpsertSyntax::MySql) => "REPLACE INTO ",
        (InsertMode::Replace, UpsertSyntax::Sqlite) => "INSERT OR REPLACE INTO ",
        _ => "INSERT INTO ",
    });
    w.push_ident(table);

    w.push(" (");
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            w.push(", ");
        }
        w.push_ident(column);
    }
    w.push(") VALUES ");

    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            w.push(", ");
        }
        // Emitted in the first row's column order; presence was checked above.
        w.push_bind_list(columns.iter().filter_map(|c| row.get(c)));
    }

    if upsert == UpsertSyntax::Postgres {
        match mode {
            InsertMode::Plain => {}
            InsertMode::Ignore => w.push(" ON CONFLICT DO NOTHING"),
            InsertMode::Replace => {
                let pk = spec.primary_key.as_str();
                w.push(" ON CONFLICT (");
                w.push_ident(pk);
                w.push(")");
                let updates: Vec<&&str> = columns.iter().filter(|c| **c != pk).collect();
                if updates.is_empty() {
                    w.push(" DO NOTHING");
                } else {
                    w.push(" DO UPDATE SET ");
                    for (i, column) in updates.iter().enumerate() {
                        if i > 0 {
                            w.push(", ");
                        }
                        w.push_ident(column);
                        w.push(" = EXCLUDED.");
                        w.push_ident(column);
                    }
                }
            }
        }
    }

    if returning {
        w.push(" RETURNING ");
        w.push_ident(&spec.primary_key);
    }
    Ok(())
}

/// Every row must carry exactly the first row's column set.
fn check_columns(expected: &[&str], rows: &[Fields]) -> OrmResult<()> {
    for (i, row) in rows.iter().enumerate().skip(1) {
        let same = row.len() == expected.len() && expected.iter().all(|c| row.contains(c));
        if !same {
            return Err(OrmError::InconsistentColumns {
                row: i,
                expected: expected.join(", "),
                got: row.columns().collect::<Vec<_>>().join(", "),
            });
        }
    }
    Ok(())
}
