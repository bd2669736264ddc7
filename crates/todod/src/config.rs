//! Database configuration from the environment.
//!
//! Each setting is read from its primary variable, then its alternate,
//! then a default. The first defined value wins.

use std::fmt;

use anyhow::Context;
use sqlx::postgres::PgConnectOptions;

const PRODUCTION: &str = "production";

/// Resolved Postgres connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub environment: String,
}

impl DatabaseConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let setting = |primary: &str, alternate: &str, default: &str| {
            lookup(primary)
                .or_else(|| lookup(alternate))
                .unwrap_or_else(|| default.to_string())
        };

        let raw_port = setting("DATABASE_PORT", "DB_PORT", "5432");
        let port = raw_port
            .trim()
            .parse()
            .with_context(|| format!("invalid database port {raw_port:?}"))?;

        Ok(Self {
            host: setting("DATABASE_HOST", "DB_HOST", "localhost"),
            port,
            user: setting("DATABASE_USER", "DB_USERNAME", "todo_user"),
            password: setting("DATABASE_PASSWORD", "DB_PASSWORD", "todo_password"),
            database: setting("DATABASE_NAME", "DB_DATABASE", "todo_db"),
            environment: lookup("APP_ENV")
                .or_else(|| lookup("NODE_ENV"))
                .unwrap_or_else(|| "development".to_string()),
        })
    }

    /// Whether the `todos` table should be created on startup.
    pub fn schema_sync(&self) -> bool {
        self.environment != PRODUCTION
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let password = if self.password.is_empty() { "(empty)" } else { "***" };
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &password)
            .field("database", &self.database)
            .field("environment", &self.environment)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolve(vars: &[(&str, &str)]) -> anyhow::Result<DatabaseConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DatabaseConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = resolve(&[]).unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5432);
        assert_eq!(config.user, "todo_user");
        assert_eq!(config.password, "todo_password");
        assert_eq!(config.database, "todo_db");
        assert!(config.schema_sync());
    }

    #[test]
    fn primary_names_win_over_alternates() {
        let config = resolve(&[
            ("DATABASE_HOST", "db.internal"),
            ("DB_HOST", "ignored"),
            ("DB_PORT", "6543"),
            ("DB_USERNAME", "alt_user"),
            ("DATABASE_NAME", "todos"),
            ("DB_DATABASE", "ignored"),
        ])
        .unwrap();

        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, 6543);
        assert_eq!(config.user, "alt_user");
        assert_eq!(config.database, "todos");
    }

    #[test]
    fn production_disables_schema_sync() {
        let config = resolve(&[("APP_ENV", "production")]).unwrap();
        assert!(!config.schema_sync());
    }

    #[test]
    fn node_env_is_an_environment_fallback() {
        let config = resolve(&[("NODE_ENV", "production")]).unwrap();
        assert_eq!(config.environment, "production");
        assert!(!config.schema_sync());

        let config = resolve(&[("APP_ENV", "staging"), ("NODE_ENV", "production")]).unwrap();
        assert_eq!(config.environment, "staging");
        assert!(config.schema_sync());
    }

    #[test]
    fn bad_port_is_an_error() {
        let err = resolve(&[("DATABASE_PORT", "postgres")]).unwrap_err();
        assert!(err.to_string().contains("invalid database port"));
    }

    #[test]
    fn debug_redacts_password() {
        let config = resolve(&[("DATABASE_PASSWORD", "hunter2")]).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("***"));
    }
}
