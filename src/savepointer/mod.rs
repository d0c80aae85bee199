//! Savepoint statement providers.
//!
//! A [`Savepointer`] turns a savepoint name into the three statements the
//! executor issues for a nesting level: create, rollback-to and release. One
//! provider exists per SQL dialect, plus [`MockSavepointer`] for tests.

mod mock;
mod mssql;
mod mysql;
mod name;
mod postgres;
mod sqlite;

use std::fmt;

pub use mock::{MockSavepointer, UNKNOWN_SAVEPOINT_NAME};
pub use mssql::MsSqlSavepointer;
pub use mysql::MySqlSavepointer;
pub use name::generate_name;
pub use postgres::PostgresSavepointer;
pub use sqlite::SqliteSavepointer;

/// Builds the SQL statements for managing savepoints in one dialect.
///
/// Implementations are shared read-only between every context of a chain and
/// between unrelated chains, hence the `Send + Sync` bound.
pub trait Savepointer: Send + Sync + fmt::Debug {
    /// Returns a statement that creates the named savepoint.
    fn create(&self, name: &str) -> String;

    /// Returns a statement that rolls back to the named savepoint.
    fn rollback(&self, name: &str) -> String;

    /// Returns a statement that releases the named savepoint.
    ///
    /// Dialects without a release statement return an empty string, and the
    /// executor skips the step.
    fn release(&self, name: &str) -> String;
}

pub mod quote {
    //! Identifier quoting for each dialect.
    pub use super::mssql::quote as mssql;
    pub use super::mysql::quote as mysql;
    pub use super::postgres::quote as postgres;
    pub use super::sqlite::quote as sqlite;
}
