//! # sqlx-atomic
//!
//! Nested atomic units of work over a single SQLx connection.
//!
//! The outermost [`atomic`] call opens a real transaction; every call nested
//! inside it opens a savepoint instead. A failure deep in the call tree is
//! undone back to the nearest enclosing savepoint, without aborting the work
//! done by outer levels.
//!
//! ## Features
//!
//! - **Transactions and savepoints**: one entry point, the nesting level decides
//! - **Two-slot errors**: [`AtomicError`] keeps the unit of work's error apart
//!   from a failure of the executor itself (begin, savepoint, commit, rollback)
//! - **Panic safety**: a panicking unit of work is rolled back, then the panic
//!   continues to unwind
//! - **Dialects**: savepoint statements for MySQL, PostgreSQL, SQLite and
//!   SQL Server, plus a recording mock for tests
//! - **Call scope**: cancellation and deadline shared by every level
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! sqlx = { version = "0.8", features = ["mysql", "runtime-tokio"] }
//! sqlx-atomic = "0.1"
//! ```
//!
//! ## Examples
//!
//! ### Nested Units of Work
//!
//! ```rust,no_run
//! use sqlx::{Connection, MySql, MySqlConnection};
//! use sqlx_atomic::{Error, Querier};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut conn = MySqlConnection::connect("mysql://localhost/test").await?;
//! let mut q = Querier::<MySql>::new(&mut conn);
//!
//! q.atomic(|tx| {
//!     Box::pin(async move {
//!         // BEGIN
//!         tx.execute(sqlx::query("INSERT INTO users (name) VALUES (?)").bind("Alice"))
//!             .await?;
//!
//!         // SAVEPOINT ...; if the audit insert fails only it is undone
//!         let audit = tx
//!             .atomic(|sp| {
//!                 Box::pin(async move {
//!                     sp.execute(sqlx::query("INSERT INTO audit_log (action) VALUES (?)").bind("created"))
//!                         .await?;
//!                     Ok::<_, Error>(())
//!                 })
//!             })
//!             .await;
//!         if let Err(e) = audit {
//!             eprintln!("audit skipped: {e}");
//!         }
//!
//!         Ok::<_, Error>(())
//!         // COMMIT
//!     })
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Configuration
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use sqlx::{Connection, MySql, MySqlConnection};
//! use sqlx_atomic::{Dialect, IsolationLevel, Querier, Scope, TxOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut conn = MySqlConnection::connect("mysql://localhost/test").await?;
//! let dialect: Dialect = "mariadb".parse()?;
//! let q = Querier::<MySql>::builder()
//!     .connection(&mut conn)
//!     .dialect(dialect)
//!     .tx_options(TxOptions::default().isolation(IsolationLevel::Serializable))
//!     .scope(Scope::new().with_timeout(Duration::from_secs(5)))
//!     .build()?;
//! # drop(q);
//! # Ok(())
//! # }
//! ```
//!
//! ## How It Works
//!
//! 1. **Querier**: the execution context; it borrows the connection and knows
//!    whether it sits at the root, in the transaction or in a savepoint
//! 2. **Copy on descent**: every `atomic` call builds a fresh child `Querier`,
//!    the parent is never mutated and is borrowed until the child finishes
//! 3. **Exit protocol**: commit/release on success, rollback otherwise, one
//!    statement per level
//!
//! ## Limitations
//!
//! - A `Querier` and its children are single-owner; statements on one
//!   connection are strictly sequential
//! - Distributed or two-phase transactions are not supported
//!
//! ## License
//!
//! Licensed under either of Apache License, Version 2.0 or MIT license at your option.

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod savepointer;
pub mod scope;

pub use backend::Backend;
pub use config::{Dialect, IsolationLevel, TxOptions, UnknownDialect};
pub use context::{Level, Querier, QuerierBuilder};
pub use error::{AtomicError, Error, Result};
pub use executor::{atomic, WorkFuture};
pub use savepointer::Savepointer;
pub use scope::Scope;

/// Convenience re-exports for common use cases
pub mod prelude {
    pub use crate::context::Querier;
    pub use crate::error::{AtomicError, Error, Result};
    pub use crate::executor::{atomic, WorkFuture};
    pub use crate::savepointer::Savepointer;
}
