//! Testing utilities for schema migrations.
//!
//! Catalog behavior is only meaningful against a real PostgreSQL, so tests
//! run on isolated databases rather than mocks. Pure helpers are tested
//! without a connection.

pub mod db;

pub use db::{IsolatedTestDb, TestDatabase, TEST_DATABASE_URL};
