//! Explicit dialect registry and TOML configuration.
//!
//! There is no process-wide registry: whoever constructs executors and
//! builders owns a [`DialectRegistry`] and passes it along.
//!
//! ```toml
//! default = "mysql"
//!
//! [dialects.mysql]
//! name = "mysql"
//! identifier_quote = "`"
//! placeholder = "positional"
//! upsert = "my_sql"
//! random_function = "RAND"
//!
//! [dialects.cockroach]
//! name = "cockroach"
//! identifier_quote = "\""
//! placeholder = "numbered"
//! upsert = "postgres"
//! random_function = "RANDOM"
//! returning_id = true
//! ```

use crate::dialect::Dialect;
use crate::error::{OrmError, OrmResult};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct RegistryFile {
    default: Option<String>,
    #[serde(default)]
    dialects: BTreeMap<String, Dialect>,
}

/// Named dialects.
#[derive(Debug, Clone)]
pub struct DialectRegistry {
    dialects: BTreeMap<String, Dialect>,
    default: String,
}

impl DialectRegistry {
    /// Create an empty registry whose default name is `postgres`.
    pub fn new() -> Self {
        Self {
            dialects: BTreeMap::new(),
            default: "postgres".to_string(),
        }
    }

    /// Registry with `postgres`, `mysql` and `sqlite` registered.
    pub fn with_defaults() -> Self {
        Self::new()
            .register("postgres", Dialect::postgres())
            .register("mysql", Dialect::mysql())
            .register("sqlite", Dialect::sqlite())
    }

    /// Register (or replace) a dialect under `name`.
    pub fn register(mut self, name: &str, dialect: Dialect) -> Self {
        self.dialects.insert(name.to_string(), dialect);
        self
    }

    /// Change the name returned by [`DialectRegistry::default_dialect`].
    pub fn set_default(mut self, name: &str) -> Self {
        self.default = name.to_string();
        self
    }

    /// Look up a dialect by name.
    pub fn get(&self, name: &str) -> OrmResult<&Dialect> {
        self.dialects
            .get(name)
            .ok_or_else(|| OrmError::config(format!("unknown dialect '{name}'")))
    }

    /// The configured default dialect.
    pub fn default_dialect(&self) -> OrmResult<&Dialect> {
        self.get(&self.default)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.dialects.keys().map(String::as_str)
    }

    /// Parse a TOML document, layering its dialects over the built-in ones.
    pub fn from_toml_str(raw: &str) -> OrmResult<Self> {
        let file: RegistryFile = toml::from_str(raw)
            .map_err(|e| OrmError::config(format!("failed to parse dialect config: {e}")))?;

        let mut registry = Self::with_defaults();
        for (name, dialect) in file.dialects {
            registry = registry.register(&name, dialect);
        }
        if let Some(default) = file.default {
            registry.get(&default)?;
            registry.default = default;
        }
        Ok(registry)
    }
}

impl Default for DialectRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{PlaceholderStyle, UpsertSyntax};

    #[test]
    fn defaults_are_registered() {
        let r = DialectRegistry::with_defaults();
        assert_eq!(r.names().collect::<Vec<_>>(), vec!["mysql", "postgres", "sqlite"]);
        assert_eq!(r.default_dialect().unwrap(), &Dialect::postgres());
    }

    #[test]
    fn unknown_dialect_is_config_error() {
        let err = DialectRegistry::new().get("oracle").unwrap_err();
        assert!(matches!(err, OrmError::Config(_)));
    }

    #[test]
    fn toml_layers_over_defaults() {
        let raw = r#"
            default = "cockroach"

            [dialects.cockroach]
            name = "cockroach"
            identifier_quote = '"'
            placeholder = "numbered"
            upsert = "postgres"
            random_function = "RANDOM"
            returning_id = true
        "#;
        let r = DialectRegistry::from_toml_str(raw).unwrap();
        let d = r.default_dialect().unwrap();
        assert_eq!(d.name, "cockroach");
        assert_eq!(d.placeholder, PlaceholderStyle::Numbered);
        assert_eq!(d.upsert, UpsertSyntax::Postgres);
        assert!(r.get("mysql").is_ok());
    }

    #[test]
    fn toml_with_unknown_default_fails() {
        let err = DialectRegistry::from_toml_str("default = \"nope\"").unwrap_err();
        assert!(matches!(err, OrmError::Config(_)));
    }
}
