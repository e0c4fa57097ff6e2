//! UPDATE compilation.

use crate::error::{OrmError, OrmResult};
use crate::qb::param::SqlWriter;
use crate::qb::select::write_condition;
use crate::qb::spec::{Fields, QuerySpec, Source};

pub(crate) fn write_update(
    spec: &QuerySpec,
    fields: &Fields,
    w: &mut SqlWriter<'_>,
) -> OrmResult<()> {
    if fields.is_empty() {
        return Err(OrmError::validation("UPDATE needs at least one column"));
    }
    reject_read_clauses(spec, "UPDATE")?;
    w.push("UPDATE ");
    write_target(spec, "UPDATE", w)?;
    w.push(" SET ");
    for (i, (column, value)) in fields.iter().enumerate() {
        if i > 0 {
            w.push(", ");
        }
        w.push_ident(column);
        w.push(" = ");
        w.push_bind(value.clone());
    }
    write_condition(" WHERE ", &spec.wheres, w)
}

/// UPDATE and DELETE only carry a target and WHERE; any read-only clause on
/// the spec is refused rather than dropped.
pub(crate) fn reject_read_clauses(spec: &QuerySpec, verb: &str) -> OrmResult<()> {
    let clause = if !spec.joins.is_empty() {
        Some("JOIN")
    } else if !spec.orders.is_empty() {
        Some("ORDER BY")
    } else if spec.limit.is_some() {
        Some("LIMIT")
    } else if spec.offset.is_some() {
        Some("OFFSET")
    } else if !spec.group_by.is_empty() || !spec.havings.is_empty() {
        Some("GROUP BY/HAVING")
    } else if !spec.unions.is_empty() {
        Some("UNION")
    } else {
        None
    };
    match clause {
        Some(clause) => Err(OrmError::validation(format!("{verb} does not support {clause}"))),
        None => Ok(()),
    }
}

/// `table [AS alias]` of the first plain table source.
pub(crate) fn write_target(spec: &QuerySpec, verb: &str, w: &mut SqlWriter<'_>) -> OrmResult<()> {
    let source = spec
        .sources
        .iter()
        .find(|s| matches!(s, Source::Table { .. }));
    match source {
        Some(Source::Table { name, alias }) => {
            w.push_ident(name);
            if let Some(alias) = alias {
                w.push(" AS ");
                w.push_name(alias);
            }
            Ok(())
        }
        _ => Err(OrmError::validation(format!("{verb} needs a table source"))),
    }
}
