//! The connection handle schema operations run on.

use sqlx::{Connection, PgConnection};
use tracing::{debug, error};

use pgshift_core::error::Result;

/// A statement failure that was rolled back to its savepoint.
pub type SavepointResult = std::result::Result<(), sqlx::Error>;

/// Borrowed connection inside the caller's transaction.
///
/// The cursor never begins, commits or rolls back the outer transaction.
/// It only opens savepoints nested in it, and every savepoint is either
/// released or rolled back before the call that opened it returns.
///
/// The caller must have opened its transaction through sqlx (`pool.begin()`
/// or `conn.begin()`) so that nested `begin()` calls become `SAVEPOINT`s.
pub struct Cursor<'c> {
    conn: &'c mut PgConnection,
}

impl<'c> Cursor<'c> {
    pub fn new(conn: &'c mut PgConnection) -> Self {
        Self { conn }
    }

    /// The underlying connection, for typed catalog queries.
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut *self.conn
    }

    /// Execute one statement. Failures are logged and propagated.
    pub async fn execute(&mut self, sql: &str) -> Result<u64> {
        match sqlx::raw_sql(sql).execute(&mut *self.conn).await {
            Ok(done) => Ok(done.rows_affected()),
            Err(e) => {
                error!(target: "pgshift::sql", %sql, error = %e, "bad query");
                Err(e.into())
            }
        }
    }

    /// Execute one statement without logging a failure. For probes whose
    /// failure is an expected answer.
    pub async fn execute_quiet(&mut self, sql: &str) -> Result<u64> {
        let done = sqlx::raw_sql(sql).execute(&mut *self.conn).await?;
        Ok(done.rows_affected())
    }

    /// Run statements inside a savepoint.
    ///
    /// If one of them fails, the savepoint is rolled back and the database
    /// error comes back in the inner result; the outer transaction stays
    /// usable. The outer result only fails when the savepoint itself cannot
    /// be opened, released or rolled back.
    pub async fn savepoint(&mut self, statements: &[String]) -> Result<SavepointResult> {
        self.run_savepoint(statements, true).await
    }

    /// [`Cursor::savepoint`] without logging the failing statement.
    pub async fn savepoint_quiet(&mut self, statements: &[String]) -> Result<SavepointResult> {
        self.run_savepoint(statements, false).await
    }

    async fn run_savepoint(
        &mut self,
        statements: &[String],
        log_exceptions: bool,
    ) -> Result<SavepointResult> {
        let mut sp = self.conn.begin().await?;

        for sql in statements {
            if let Err(e) = sqlx::raw_sql(sql).execute(&mut *sp).await {
                if log_exceptions {
                    error!(target: "pgshift::sql", %sql, error = %e, "bad query");
                } else {
                    debug!(target: "pgshift::sql", %sql, error = %e, "probe refused");
                }
                sp.rollback().await?;
                return Ok(Err(e));
            }
        }

        sp.commit().await?;
        Ok(Ok(()))
    }

    /// `server_version_num` of the connected engine, e.g. `160002`.
    pub async fn server_version_num(&mut self) -> Result<i32> {
        let version: i32 = sqlx::query_scalar("SELECT current_setting('server_version_num')::int4")
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(version)
    }
}
