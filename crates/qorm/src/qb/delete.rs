//! DELETE compilation.
//!
//! A DELETE without conditions removes every row of the table; there is no
//! implicit guard. Joins, ordering and paging are refused with a validation
//! error.

use crate::error::OrmResult;
use crate::qb::param::SqlWriter;
use crate::qb::select::write_condition;
use crate::qb::spec::QuerySpec;
use crate::qb::update::{reject_read_clauses, write_target};

pub(crate) fn write_delete(spec: &QuerySpec, w: &mut SqlWriter<'_>) -> OrmResult<()> {
    reject_read_clauses(spec, "DELETE")?;
    w.push("DELETE FROM ");
    write_target(spec, "DELETE", w)?;
    write_condition(" WHERE ", &spec.wheres, w)
}
