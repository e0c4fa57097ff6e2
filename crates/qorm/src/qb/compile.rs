//! Statement compilation entry point.

use crate::dialect::Dialect;
use crate::error::OrmResult;
use crate::qb::insert::{self, InsertMode};
use crate::qb::param::SqlWriter;
use crate::qb::spec::{AggregateFn, Fields, QuerySpec};
use crate::qb::{delete, select, update};
use crate::value::Value;

/// Which statement to compile from a [`QuerySpec`].
#[derive(Clone, Copy, Debug)]
pub enum StatementKind<'a> {
    Select,
    SelectForUpdate,
    /// `SELECT FN(column) AS "aggregate"`; the select list is discarded.
    Aggregate(AggregateFn, &'a str),
    Insert(&'a [Fields], InsertMode),
    /// Single-row insert that reads back the generated key where the dialect
    /// supports `RETURNING`.
    InsertGetId(&'a Fields),
    Update(&'a Fields),
    Delete,
}

impl StatementKind<'_> {
    /// Short label used in log events.
    pub fn label(&self) -> &'static str {
        match self {
            StatementKind::Select => "select",
            StatementKind::SelectForUpdate => "select_for_update",
            StatementKind::Aggregate(..) => "aggregate",
            StatementKind::Insert(..) | StatementKind::InsertGetId(_) => "insert",
            StatementKind::Update(_) => "update",
            StatementKind::Delete => "delete",
        }
    }
}

/// SQL text plus bindings in placeholder order.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub bindings: Vec<Value>,
}

/// Compile `spec` as `kind` for `dialect`.
///
/// This is a pure function: the same inputs always produce the same text and
/// binding sequence.
pub fn compile(spec: &QuerySpec, kind: StatementKind<'_>, dialect: &Dialect) -> OrmResult<CompiledQuery> {
    let mut w = SqlWriter::new(dialect);
    match kind {
        StatementKind::Select => select::write_select(spec, &mut w)?,
        StatementKind::SelectForUpdate => select::write_select_for_update(spec, &mut w)?,
        StatementKind::Aggregate(function, column) => {
            select::write_aggregate(spec, function, column, &mut w)?
        }
        StatementKind::Insert(rows, mode) => insert::write_insert(spec, rows, mode, false, &mut w)?,
        StatementKind::InsertGetId(fields) => insert::write_insert(
            spec,
            std::slice::from_ref(fields),
            InsertMode::Plain,
            dialect.returning_id,
            &mut w,
        )?,
        StatementKind::Update(fields) => update::write_update(spec, fields, &mut w)?,
        StatementKind::Delete => delete::write_delete(spec, &mut w)?,
    }
    let (sql, bindings) = w.finish();
    Ok(CompiledQuery {
        sql,
        bindings: bindings.into_vec(),
    })
}
