//! SELECT compilation.
//!
//! Clause order is fixed: select list, FROM, joins, WHERE, GROUP BY, HAVING,
//! ORDER BY, LIMIT, OFFSET, FOR UPDATE, then the UNION blocks.

use crate::error::OrmResult;
use crate::ident::Ident;
use crate::qb::expr::Group;
use crate::qb::param::SqlWriter;
use crate::qb::spec::{AggregateFn, OrderSpec, QuerySpec, SelectItem, Source};

/// What the SELECT list is made of.
#[derive(Clone, Copy, Debug)]
enum Projection<'a> {
    /// The spec's own select list (`*` when empty).
    List,
    /// `FN(column) AS "aggregate"`, replacing the select list.
    Aggregate(AggregateFn, &'a str),
}

/// Alias of the single column produced by aggregate queries.
pub const AGGREGATE_ALIAS: &str = "aggregate";

/// Write a full SELECT, unions included.
pub(crate) fn write_select(spec: &QuerySpec, w: &mut SqlWriter<'_>) -> OrmResult<()> {
    write_statement(spec, Projection::List, false, w)
}

/// SELECT ... FOR UPDATE.
pub(crate) fn write_select_for_update(spec: &QuerySpec, w: &mut SqlWriter<'_>) -> OrmResult<()> {
    write_statement(spec, Projection::List, true, w)
}

/// Aggregate over the spec.
///
/// Grouped, distinct or unioned queries produce several rows per group, so
/// the full query is wrapped as a derived table and aggregated from outside.
/// Everything else keeps its clauses and only swaps the select list.
pub(crate) fn write_aggregate(
    spec: &QuerySpec,
    function: AggregateFn,
    column: &str,
    w: &mut SqlWriter<'_>,
) -> OrmResult<()> {
    let grouped = !spec.group_by.is_empty() || spec.distinct;
    let wrap = !spec.unions.is_empty() || (grouped && function == AggregateFn::Count);
    if !wrap {
        return write_statement(spec, Projection::Aggregate(function, column), false, w);
    }

    let mut inner = spec.clone();
    if inner.select.is_empty() && !inner.group_by.is_empty() {
        inner.select = inner
            .group_by
            .iter()
            .map(|c| SelectItem::Column(c.clone()))
            .collect();
    }
    let outer_column = Ident::parse(column).output_name().unwrap_or(column).to_string();

    w.push("SELECT ");
    write_aggregate_item(function, &outer_column, AGGREGATE_ALIAS, w);
    w.push(" FROM (");
    write_select(&inner, w)?;
    w.push(") AS ");
    w.push_name("aggregate_table");
    Ok(())
}

fn write_statement(
    spec: &QuerySpec,
    projection: Projection<'_>,
    for_update: bool,
    w: &mut SqlWriter<'_>,
) -> OrmResult<()> {
    let wrap_head = !spec.unions.is_empty()
        && (!spec.orders.is_empty() || spec.limit.is_some() || spec.offset.is_some());
    if wrap_head {
        w.push("(");
    }

    w.push("SELECT ");
    if spec.distinct {
        w.push("DISTINCT ");
    }
    match projection {
        Projection::List => write_list(&spec.select, w)?,
        Projection::Aggregate(function, column) => {
            write_aggregate_item(function, column, AGGREGATE_ALIAS, w)
        }
    }

    if !spec.sources.is_empty() {
        w.push(" FROM ");
        for (i, source) in spec.sources.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            write_source(source, w)?;
        }
    }

    for join in &spec.joins {
        w.push(" ");
        w.push(join.kind.as_sql());
        w.push(" ");
        write_source(&join.target, w)?;
        w.push(" ON ");
        w.push_ident(&join.left);
        w.push(" ");
        w.push(join.operator.trim());
        w.push(" ");
        w.push_ident(&join.right);
    }

    write_condition(" WHERE ", &spec.wheres, w)?;

    if !spec.group_by.is_empty() {
        w.push(" GROUP BY ");
        for (i, column) in spec.group_by.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.push_ident(column);
        }
    }

    write_condition(" HAVING ", &spec.havings, w)?;

    if !spec.orders.is_empty() {
        w.push(" ORDER BY ");
        for (i, order) in spec.orders.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            match order {
                OrderSpec::Column { column, direction } => {
                    w.push_ident(column);
                    w.push(" ");
                    w.push(direction.as_sql());
                }
                OrderSpec::Random => {
                    let random = w.dialect().random();
                    w.push(&random);
                }
            }
        }
    }

    if let Some(limit) = spec.limit {
        w.push(&format!(" LIMIT {limit}"));
    }
    if let Some(offset) = spec.offset {
        w.push(&format!(" OFFSET {offset}"));
    }
    if for_update || spec.lock_for_update {
        w.push(" FOR UPDATE");
    }

    if wrap_head {
        w.push(")");
    }

    for union in &spec.unions {
        w.push(" ");
        w.push(union.kind.as_sql());
        w.push(" (");
        write_select(&union.query, w)?;
        w.push(")");
    }
    Ok(())
}

/// Write ` WHERE <group>` (or HAVING) when the group emits anything.
pub(crate) fn write_condition(
    keyword: &str,
    group: &Group,
    w: &mut SqlWriter<'_>,
) -> OrmResult<()> {
    if group.is_empty() {
        return Ok(());
    }
    w.push(keyword);
    group.write(w)
}

fn write_list(items: &[SelectItem], w: &mut SqlWriter<'_>) -> OrmResult<()> {
    if items.is_empty() {
        w.push("*");
        return Ok(());
    }
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            w.push(", ");
        }
        match item {
            SelectItem::Column(column) => w.push_ident(column),
            SelectItem::Raw(sql) => w.push(sql),
            SelectItem::Aggregate {
                function,
                column,
                alias,
            } => write_aggregate_item(*function, column, alias, w),
            SelectItem::Sub { query, alias } => {
                w.push("(");
                write_select(query, w)?;
                w.push(") AS ");
                w.push_name(alias);
            }
        }
    }
    Ok(())
}

fn write_aggregate_item(function: AggregateFn, column: &str, alias: &str, w: &mut SqlWriter<'_>) {
    w.push(function.as_sql());
    w.push("(");
    w.push_ident(column);
    w.push(") AS ");
    w.push_name(alias);
}

fn write_source(source: &Source, w: &mut SqlWriter<'_>) -> OrmResult<()> {
    match source {
        Source::Table { name, alias } => {
            w.push_ident(name);
            if let Some(alias) = alias {
                w.push(" AS ");
                w.push_name(alias);
            }
        }
        Source::Sub { query, alias } => {
            w.push("(");
            write_select(query, w)?;
            w.push(") AS ");
            w.push_name(alias);
        }
    }
    Ok(())
}
