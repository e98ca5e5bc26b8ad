//! Storage configuration types.

use serde::Deserialize;

/// Storage type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// SQLite, in-memory by default.
    #[default]
    Sqlite,
    Postgres,
    Mysql,
}

/// Storage configuration (discriminated union).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type discriminator.
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// Connection pool size. Ignored for in-memory SQLite, which needs a
    /// single shared connection.
    pub max_connections: u32,
    /// SQLite-specific configuration.
    pub sqlite: SqliteConfig,
    /// PostgreSQL-specific configuration.
    pub postgres: PostgresConfig,
    /// MySQL-specific configuration.
    pub mysql: MysqlConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::Sqlite,
            max_connections: 5,
            sqlite: SqliteConfig::default(),
            postgres: PostgresConfig::default(),
            mysql: MysqlConfig::default(),
        }
    }
}

/// SQLite-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database file path, or `:memory:`.
    pub path: String,
    /// How long a writer waits for the database lock before reporting busy.
    pub busy_timeout_ms: u64,
}

impl SqliteConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn is_in_memory(&self) -> bool {
        self.path == ":memory:"
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            busy_timeout_ms: 5_000,
        }
    }
}

/// PostgreSQL-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    /// PostgreSQL connection URI.
    pub uri: String,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            uri: "postgres://localhost:5432/airtime".to_string(),
        }
    }
}

/// MySQL-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MysqlConfig {
    /// MySQL connection URI.
    pub uri: String,
}

impl Default for MysqlConfig {
    fn default() -> Self {
        Self {
            uri: "mysql://localhost:3306/airtime".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_default() {
        let storage = StorageConfig::default();
        assert_eq!(storage.storage_type, StorageType::Sqlite);
        assert!(storage.sqlite.is_in_memory());
        assert_eq!(storage.postgres.uri, "postgres://localhost:5432/airtime");
        assert_eq!(storage.mysql.uri, "mysql://localhost:3306/airtime");
    }

    #[test]
    fn test_file_backed_sqlite_is_not_in_memory() {
        let config = SqliteConfig {
            path: "/var/lib/airtime/ledger.db".to_string(),
            ..SqliteConfig::default()
        };
        assert!(!config.is_in_memory());
    }
}
