use crate::backend::Backend;
use crate::config::{Dialect, TxOptions};
use crate::error::{AtomicError, Error, Result};
use crate::executor::{self, WorkFuture};
use crate::savepointer::Savepointer;
use crate::scope::Scope;
use sqlx::Execute;
use std::fmt;
use std::sync::Arc;

/// Position of a [`Querier`] in the transaction/savepoint stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Level {
    /// No transaction has been opened yet
    Root,
    /// Inside the outermost transaction (nesting level 0)
    Transaction,
    /// Inside a savepoint at nesting level `depth` (1 or more)
    Savepoint { name: String, depth: usize },
}

impl Level {
    /// Nesting depth, `None` before a transaction is opened.
    pub fn depth(&self) -> Option<usize> {
        match self {
            Self::Root => None,
            Self::Transaction => Some(0),
            Self::Savepoint { depth, .. } => Some(*depth),
        }
    }
}

/// Execution context for atomic units of work on one SQLx connection.
///
/// A root `Querier` borrows a connection the caller acquired and has no
/// transaction. Each call to [`atomic`](Querier::atomic) hands its unit of
/// work a child `Querier` one level deeper: the first level opens a
/// transaction, every level below it a savepoint. Children borrow the
/// connection from their parent, so the parent is unusable until the child's
/// work has completed and its level has been committed, released or rolled back.
///
/// The `Querier` never closes the connection.
///
/// # Examples
///
/// ```rust,no_run
/// use sqlx::{Connection, Sqlite, SqliteConnection};
/// use sqlx_atomic::{Error, Querier};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut conn = SqliteConnection::connect("sqlite::memory:").await?;
/// let mut q = Querier::<Sqlite>::new(&mut conn);
///
/// q.atomic(|q| {
///     Box::pin(async move {
///         q.execute(sqlx::query("INSERT INTO users (name) VALUES (?)").bind("Alice"))
///             .await?;
///         Ok::<_, Error>(())
///     })
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub struct Querier<'c, DB: Backend> {
    pub(crate) conn: Option<&'c mut DB::Connection>,
    pub(crate) level: Level,
    pub(crate) savepointer: Arc<dyn Savepointer>,
    pub(crate) tx_options: TxOptions,
    pub(crate) scope: Scope,
}

impl<'c, DB: Backend> Querier<'c, DB> {
    /// Creates a root context on `conn` using the backend's savepoint dialect,
    /// default transaction options and an unbounded scope.
    pub fn new(conn: &'c mut DB::Connection) -> Self {
        Self {
            conn: Some(conn),
            level: Level::Root,
            savepointer: DB::dialect().savepointer(),
            tx_options: TxOptions::default(),
            scope: Scope::default(),
        }
    }

    /// Starts building a root context with custom settings.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use sqlx::{Connection, Sqlite, SqliteConnection};
    /// use sqlx_atomic::savepointer::MockSavepointer;
    /// use sqlx_atomic::Querier;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut conn = SqliteConnection::connect("sqlite::memory:").await?;
    /// let q = Querier::<Sqlite>::builder()
    ///     .connection(&mut conn)
    ///     .savepointer(MockSavepointer::new(true))
    ///     .build()?;
    /// # drop(q);
    /// # Ok(())
    /// # }
    /// ```
    pub fn builder() -> QuerierBuilder<'c, DB> {
        QuerierBuilder::default()
    }

    /// Position of this context in the transaction/savepoint stack.
    pub fn level(&self) -> &Level {
        &self.level
    }

    /// Returns `true` once inside the transaction or one of its savepoints.
    pub fn in_transaction(&self) -> bool {
        self.level != Level::Root
    }

    /// Name of the savepoint this context runs in, if any.
    pub fn savepoint_name(&self) -> Option<&str> {
        match &self.level {
            Level::Savepoint { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Savepoint statement provider shared with every child.
    pub fn savepointer(&self) -> &Arc<dyn Savepointer> {
        &self.savepointer
    }

    /// Options applied when this context begins the transaction.
    pub fn tx_options(&self) -> &TxOptions {
        &self.tx_options
    }

    /// Cancellation and deadline every statement runs under.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Gives the connection back, leaving this context unusable.
    ///
    /// Every later operation fails with [`Error::InvalidQuerier`].
    pub fn detach(&mut self) -> Option<&'c mut DB::Connection> {
        self.conn.take()
    }

    /// Returns the active connection for use as a SQLx `Executor`.
    ///
    /// Statements run this way are not bounded by the context's [`Scope`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidQuerier`] if the connection was detached.
    pub fn as_executor(&mut self) -> Result<&mut DB::Connection> {
        self.conn.as_deref_mut().ok_or(Error::InvalidQuerier)
    }

    /// Executes a statement on the active transaction, savepoint or connection.
    pub async fn execute<'q, E>(&mut self, query: E) -> Result<DB::QueryResult>
    where
        E: 'q + Execute<'q, DB>,
    {
        let conn = self.conn.as_deref_mut().ok_or(Error::InvalidQuerier)?;
        self.scope.run(DB::execute(conn, query)).await
    }

    /// Runs a query and returns every row.
    pub async fn fetch_all<'q, E>(&mut self, query: E) -> Result<Vec<DB::Row>>
    where
        E: 'q + Execute<'q, DB>,
    {
        let conn = self.conn.as_deref_mut().ok_or(Error::InvalidQuerier)?;
        self.scope.run(DB::fetch_all(conn, query)).await
    }

    /// Runs a query expected to return exactly one row.
    pub async fn fetch_one<'q, E>(&mut self, query: E) -> Result<DB::Row>
    where
        E: 'q + Execute<'q, DB>,
    {
        let conn = self.conn.as_deref_mut().ok_or(Error::InvalidQuerier)?;
        self.scope.run(DB::fetch_one(conn, query)).await
    }

    /// Runs a query returning at most one row.
    pub async fn fetch_optional<'q, E>(&mut self, query: E) -> Result<Option<DB::Row>>
    where
        E: 'q + Execute<'q, DB>,
    {
        let conn = self.conn.as_deref_mut().ok_or(Error::InvalidQuerier)?;
        self.scope.run(DB::fetch_optional(conn, query)).await
    }

    /// Runs `work` atomically one level below this context.
    ///
    /// See [`atomic`](crate::atomic) for the full protocol.
    pub async fn atomic<F, T, E>(&mut self, work: F) -> std::result::Result<T, AtomicError<E>>
    where
        F: for<'a> FnOnce(&'a mut Querier<'_, DB>) -> WorkFuture<'a, T, E>,
    {
        executor::run(self, work).await
    }
}

impl<DB: Backend> fmt::Debug for Querier<'_, DB> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Querier")
            .field("backend", &DB::LABEL)
            .field("connected", &self.conn.is_some())
            .field("level", &self.level)
            .field("savepointer", &self.savepointer)
            .field("tx_options", &self.tx_options)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Builder for a root [`Querier`].
pub struct QuerierBuilder<'c, DB: Backend> {
    conn: Option<&'c mut DB::Connection>,
    savepointer: Option<Arc<dyn Savepointer>>,
    tx_options: TxOptions,
    scope: Scope,
}

impl<DB: Backend> Default for QuerierBuilder<'_, DB> {
    fn default() -> Self {
        Self {
            conn: None,
            savepointer: None,
            tx_options: TxOptions::default(),
            scope: Scope::default(),
        }
    }
}

impl<'c, DB: Backend> QuerierBuilder<'c, DB> {
    /// Connection the root context borrows. Required.
    pub fn connection(mut self, conn: &'c mut DB::Connection) -> Self {
        self.conn = Some(conn);
        self
    }

    /// Uses a specific savepoint provider, e.g. a [`MockSavepointer`](crate::savepointer::MockSavepointer).
    pub fn savepointer(mut self, savepointer: impl Savepointer + 'static) -> Self {
        self.savepointer = Some(Arc::new(savepointer));
        self
    }

    /// Uses the savepoint provider of `dialect`.
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.savepointer = Some(dialect.savepointer());
        self
    }

    /// Options for the transaction the root context begins.
    pub fn tx_options(mut self, options: TxOptions) -> Self {
        self.tx_options = options;
        self
    }

    /// Scope shared by the root context and all its children.
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Builds the root context.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NeedsConnection`] if no connection was given.
    pub fn build(self) -> Result<Querier<'c, DB>> {
        let conn = self.conn.ok_or(Error::NeedsConnection)?;
        Ok(Querier {
            conn: Some(conn),
            level: Level::Root,
            savepointer: self
                .savepointer
                .unwrap_or_else(|| DB::dialect().savepointer()),
            tx_options: self.tx_options,
            scope: self.scope,
        })
    }
}
