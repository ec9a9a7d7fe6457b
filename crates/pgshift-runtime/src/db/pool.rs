use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};

use pgshift_core::config::DatabaseConfig;
use pgshift_core::error::{PgShiftError, Result};

/// Connection pool for the database being migrated.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    config: DatabaseConfig,
}

impl Database {
    /// Create a new database connection from configuration.
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        let pool = Self::create_pool(config)
            .await
            .map_err(|e| PgShiftError::Database(format!("Failed to connect: {}", e)))?;

        Ok(Self {
            pool,
            config: config.clone(),
        })
    }

    async fn create_pool(config: &DatabaseConfig) -> sqlx::Result<PgPool> {
        let mut options = PgConnectOptions::from_str(&config.url)?;
        if config.statement_timeout_secs > 0 {
            options = options.options([(
                "statement_timeout",
                format!("{}s", config.statement_timeout_secs),
            )]);
        }

        PgPoolOptions::new()
            .max_connections(config.pool_size.max(1))
            .acquire_timeout(Duration::from_secs(config.pool_timeout_secs))
            .connect_with(options)
            .await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Open the outer transaction a migration runs in.
    ///
    /// Schema operations take `&mut *tx`; savepoints they open nest inside it.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        Ok(self.pool.begin().await?)
    }

    /// Check database connectivity.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| PgShiftError::Database(format!("Health check failed: {}", e)))?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_url_is_reported() {
        let config = DatabaseConfig {
            url: "not a url".to_string(),
            ..Default::default()
        };

        let err = Database::from_config(&config).await.err().unwrap();
        assert!(matches!(err, PgShiftError::Database(_)));
    }
}
