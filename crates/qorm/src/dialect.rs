//! SQL dialect hook points.
//!
//! A [`Dialect`] is the only state the compiler depends on. It covers the
//! syntax that differs between the supported databases:
//!
//! | | Postgres | MySQL | SQLite |
//! |---|---|---|---|
//! | identifier quote | `"` | `` ` `` | `"` |
//! | placeholder | `$1, $2` | `?` | `?` |
//! | insert-or-ignore | `ON CONFLICT DO NOTHING` | `INSERT IGNORE` | `INSERT OR IGNORE` |
//! | insert-or-replace | `ON CONFLICT (pk) DO UPDATE` | `REPLACE INTO` | `INSERT OR REPLACE` |
//! | random order | `RANDOM()` | `RAND()` | `RANDOM()` |

use crate::ident::Ident;
use serde::{Deserialize, Serialize};

/// Placeholder style for bound parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderStyle {
    /// `?` for every parameter.
    Positional,
    /// `$1, $2, ...` numbered in text order.
    Numbered,
}

/// How insert-or-ignore / insert-or-replace statements are spelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertSyntax {
    /// `INSERT IGNORE INTO` / `REPLACE INTO`
    MySql,
    /// `INSERT OR IGNORE INTO` / `INSERT OR REPLACE INTO`
    Sqlite,
    /// `ON CONFLICT DO NOTHING` / `ON CONFLICT (pk) DO UPDATE SET ...`
    Postgres,
}

/// Syntax configuration for one SQL dialect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialect {
    /// Dialect name, used for logging and registry lookups.
    pub name: String,
    /// Character used to quote identifiers.
    pub identifier_quote: char,
    /// Placeholder style.
    pub placeholder: PlaceholderStyle,
    /// Insert-or-ignore / insert-or-replace spelling.
    pub upsert: UpsertSyntax,
    /// Function used by `in_random_order()`, without parentheses.
    pub random_function: String,
    /// Whether `insert_get_id` must append `RETURNING <pk>` to read the new id.
    #[serde(default)]
    pub returning_id: bool,
}

impl Dialect {
    /// PostgreSQL.
    pub fn postgres() -> Self {
        Self {
            name: "postgres".to_string(),
            identifier_quote: '"',
            placeholder: PlaceholderStyle::Numbered,
            upsert: UpsertSyntax::Postgres,
            random_function: "RANDOM".to_string(),
            returning_id: true,
        }
    }

    /// MySQL / MariaDB.
    pub fn mysql() -> Self {
        Self {
            name: "mysql".to_string(),
            identifier_quote: '`',
            placeholder: PlaceholderStyle::Positional,
            upsert: UpsertSyntax::MySql,
            random_function: "RAND".to_string(),
            returning_id: false,
        }
    }

    /// SQLite.
    pub fn sqlite() -> Self {
        Self {
            name: "sqlite".to_string(),
            identifier_quote: '"',
            placeholder: PlaceholderStyle::Positional,
            upsert: UpsertSyntax::Sqlite,
            random_function: "RANDOM".to_string(),
            returning_id: false,
        }
    }

    /// Quote an identifier reference (see [`crate::ident`]).
    pub fn quote(&self, reference: &str) -> String {
        Ident::parse(reference).render(self.identifier_quote)
    }

    /// Placeholder text for the parameter at 1-based `index`.
    pub fn placeholder(&self, index: usize) -> String {
        match self.placeholder {
            PlaceholderStyle::Positional => "?".to_string(),
            PlaceholderStyle::Numbered => format!("${index}"),
        }
    }

    /// Random ordering expression, e.g. `RANDOM()`.
    pub fn random(&self) -> String {
        format!("{}()", self.random_function)
    }

    /// Start a query builder on `table` with this dialect.
    pub fn table(&self, table: &str) -> crate::qb::QueryBuilder {
        crate::qb::QueryBuilder::new(table).dialect(self.clone())
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Self::postgres()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_follow_style() {
        assert_eq!(Dialect::postgres().placeholder(3), "$3");
        assert_eq!(Dialect::mysql().placeholder(3), "?");
    }

    #[test]
    fn quoting_follows_dialect() {
        assert_eq!(Dialect::mysql().quote("users.name"), "`users`.`name`");
        assert_eq!(Dialect::sqlite().quote("users.name"), r#""users"."name""#);
    }

    #[test]
    fn random_function() {
        assert_eq!(Dialect::mysql().random(), "RAND()");
        assert_eq!(Dialect::postgres().random(), "RANDOM()");
    }
}
