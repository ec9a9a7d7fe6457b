use serde::{Deserialize, Serialize};

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,

    /// Connection pool size. A plan run holds one connection for its lock
    /// and transaction.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Pool checkout timeout in seconds.
    #[serde(default = "default_pool_timeout")]
    pub pool_timeout_secs: u64,

    /// Statement timeout in seconds, 0 disables it.
    #[serde(default)]
    pub statement_timeout_secs: u64,

    /// Schema whose relations are considered by table lookups.
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Advisory lock key held for the duration of a plan run.
    #[serde(default = "default_lock_id")]
    pub advisory_lock_id: i64,

    /// How long to wait for another run to release the advisory lock.
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            pool_size: default_pool_size(),
            pool_timeout_secs: default_pool_timeout(),
            statement_timeout_secs: 0,
            schema: default_schema(),
            advisory_lock_id: default_lock_id(),
            lock_timeout_secs: default_lock_timeout(),
        }
    }
}

fn default_pool_size() -> u32 {
    2
}

fn default_pool_timeout() -> u64 {
    30
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_lock_id() -> i64 {
    0x5047_5348_4946 // "PGSHIF"
}

fn default_lock_timeout() -> u64 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_database_config() {
        let config = DatabaseConfig::default();
        assert_eq!(config.pool_size, 2);
        assert_eq!(config.pool_timeout_secs, 30);
        assert_eq!(config.statement_timeout_secs, 0);
        assert_eq!(config.schema, "public");
        assert_eq!(config.lock_timeout_secs, 300);
    }

    #[test]
    fn test_parse_database_config() {
        let toml = r#"
            url = "postgres://localhost/test"
            pool_size = 3
            advisory_lock_id = 42
        "#;

        let config: DatabaseConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.pool_size, 3);
        assert_eq!(config.advisory_lock_id, 42);
        assert_eq!(config.schema, "public");
    }
}
