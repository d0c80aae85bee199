use crate::backend::Backend;
use crate::context::{Level, Querier};
use crate::config::TxOptions;
use crate::error::{AtomicError, Error};
use crate::savepointer::Savepointer;
use crate::scope::Scope;
use futures_util::FutureExt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Future returned by a unit of work.
pub type WorkFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Runs `work` atomically relative to the nesting level of `querier`.
///
/// This is the extension point behind [`Querier::atomic`]; most code should
/// call the method instead. The protocol per call:
///
/// - `querier` is `None`: fails with [`Error::NilQuerier`] in the `atomic` slot.
/// - `querier` has no connection: fails with [`Error::InvalidQuerier`].
/// - `work` is `None`: returns `Ok(None)` without issuing any statement.
/// - Entry: a root context begins a transaction with its [`TxOptions`];
///   any other context creates a savepoint under a freshly generated name. If
///   that fails, `work` is never invoked and the failure is returned in the
///   `atomic` slot.
/// - `work` runs with a child context one level deeper.
/// - Exit, on error or panic: rolls back to the savepoint, or rolls back the
///   whole transaction at the top level. A rollback failure lands in the
///   `atomic` slot next to the work's error. A panic is re-raised once the
///   rollback has been attempted.
/// - Exit, on success: releases the savepoint (skipped when the dialect has no
///   release statement), or commits at the top level. A failure lands in the
///   `atomic` slot.
///
/// [`TxOptions`]: crate::TxOptions
///
/// # Examples
///
/// ```rust,no_run
/// use sqlx::{Connection, Row, Sqlite, SqliteConnection};
/// use sqlx_atomic::{atomic, Error, Querier, WorkFuture};
///
/// fn answer<'a>(q: &'a mut Querier<'_, Sqlite>) -> WorkFuture<'a, i64, Error> {
///     Box::pin(async move {
///         let row = q.fetch_one("SELECT 42").await?;
///         Ok(row.try_get(0)?)
///     })
/// }
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut conn = SqliteConnection::connect("sqlite::memory:").await?;
/// let mut q = Querier::<Sqlite>::new(&mut conn);
///
/// assert_eq!(atomic(Some(&mut q), Some(answer)).await?, Some(42));
/// # Ok(())
/// # }
/// ```
pub async fn atomic<DB, F, T, E>(
    querier: Option<&mut Querier<'_, DB>>,
    work: Option<F>,
) -> Result<Option<T>, AtomicError<E>>
where
    DB: Backend,
    F: for<'a> FnOnce(&'a mut Querier<'_, DB>) -> WorkFuture<'a, T, E>,
{
    let Some(querier) = querier else {
        return Err(AtomicError::infra(Error::NilQuerier));
    };
    if querier.conn.is_none() {
        return Err(AtomicError::infra(Error::InvalidQuerier));
    }
    match work {
        Some(work) => run(querier, work).await.map(Some),
        None => Ok(None),
    }
}

pub(crate) async fn run<DB, F, T, E>(
    querier: &mut Querier<'_, DB>,
    work: F,
) -> Result<T, AtomicError<E>>
where
    DB: Backend,
    F: for<'a> FnOnce(&'a mut Querier<'_, DB>) -> WorkFuture<'a, T, E>,
{
    let Querier {
        conn,
        level,
        savepointer,
        tx_options,
        scope,
    } = querier;
    let Some(conn) = conn.as_deref_mut() else {
        return Err(AtomicError::infra(Error::InvalidQuerier));
    };
    let frame = Frame {
        savepointer,
        tx_options,
        scope,
    };

    match level {
        Level::Root => in_transaction(&frame, conn, work).await,
        Level::Transaction => in_savepoint(&frame, conn, 1, work).await,
        Level::Savepoint { depth, .. } => in_savepoint(&frame, conn, *depth + 1, work).await,
    }
}

/// Settings every child inherits unchanged from its parent.
struct Frame<'p> {
    savepointer: &'p Arc<dyn Savepointer>,
    tx_options: &'p TxOptions,
    scope: &'p Scope,
}

impl Frame<'_> {
    fn child<'n, DB: Backend>(&self, conn: &'n mut DB::Connection, level: Level) -> Querier<'n, DB> {
        Querier {
            conn: Some(conn),
            level,
            savepointer: Arc::clone(self.savepointer),
            tx_options: self.tx_options.clone(),
            scope: self.scope.clone(),
        }
    }
}

/// Top level: BEGIN, run, then COMMIT or ROLLBACK.
async fn in_transaction<DB, F, T, E>(
    frame: &Frame<'_>,
    conn: &mut DB::Connection,
    work: F,
) -> Result<T, AtomicError<E>>
where
    DB: Backend,
    F: for<'a> FnOnce(&'a mut Querier<'_, DB>) -> WorkFuture<'a, T, E>,
{
    let scope = frame.scope;
    let mut tx = scope
        .run(DB::begin(conn, frame.tx_options))
        .await
        .map_err(AtomicError::<E>::infra)?;
    debug!(backend = DB::LABEL, "began transaction");

    let outcome = {
        let mut child = frame.child::<DB>(&mut *tx, Level::Transaction);
        AssertUnwindSafe(async { work(&mut child).await })
            .catch_unwind()
            .await
    };

    match outcome {
        Ok(Ok(value)) => {
            scope.run(tx.commit()).await.map_err(AtomicError::<E>::infra)?;
            debug!(backend = DB::LABEL, "committed transaction");
            Ok(value)
        }
        Ok(Err(err)) => {
            warn!(backend = DB::LABEL, "unit of work failed, rolling back transaction");
            let atomic = scope.run(tx.rollback()).await.err();
            if atomic.is_none() {
                debug!(backend = DB::LABEL, "rolled back transaction");
            }
            Err(AtomicError::new(Some(err), atomic))
        }
        Err(payload) => {
            warn!(backend = DB::LABEL, "unit of work panicked, rolling back transaction");
            match scope.run(tx.rollback()).await {
                Ok(()) => debug!(backend = DB::LABEL, "rolled back transaction"),
                Err(e) => error!(backend = DB::LABEL, error = %e, "rollback after panic failed"),
            }
            panic::resume_unwind(payload)
        }
    }
}

/// Nested level: SAVEPOINT, run, then RELEASE or ROLLBACK TO.
async fn in_savepoint<DB, F, T, E>(
    frame: &Frame<'_>,
    conn: &mut DB::Connection,
    depth: usize,
    work: F,
) -> Result<T, AtomicError<E>>
where
    DB: Backend,
    F: for<'a> FnOnce(&'a mut Querier<'_, DB>) -> WorkFuture<'a, T, E>,
{
    let scope = frame.scope;
    let savepointer = frame.savepointer;
    let name = crate::savepointer::generate_name();

    let create = savepointer.create(&name);
    scope
        .run(DB::execute(&mut *conn, create.as_str()))
        .await
        .map_err(AtomicError::<E>::infra)?;
    debug!(depth, savepoint = %name, "created savepoint");

    let outcome = {
        let level = Level::Savepoint {
            name: name.clone(),
            depth,
        };
        let mut child = frame.child::<DB>(&mut *conn, level);
        AssertUnwindSafe(async { work(&mut child).await })
            .catch_unwind()
            .await
    };

    match outcome {
        Ok(Ok(value)) => {
            let release = savepointer.release(&name);
            if release.is_empty() {
                return Ok(value);
            }
            scope
                .run(DB::execute(&mut *conn, release.as_str()))
                .await
                .map_err(AtomicError::<E>::infra)?;
            debug!(depth, savepoint = %name, "released savepoint");
            Ok(value)
        }
        Ok(Err(err)) => {
            warn!(depth, savepoint = %name, "unit of work failed, rolling back to savepoint");
            let rollback = savepointer.rollback(&name);
            let atomic = scope
                .run(DB::execute(&mut *conn, rollback.as_str()))
                .await
                .err();
            if atomic.is_none() {
                debug!(depth, savepoint = %name, "rolled back to savepoint");
            }
            Err(AtomicError::new(Some(err), atomic))
        }
        Err(payload) => {
            warn!(depth, savepoint = %name, "unit of work panicked, rolling back to savepoint");
            let rollback = savepointer.rollback(&name);
            match scope.run(DB::execute(&mut *conn, rollback.as_str())).await {
                Ok(_) => debug!(depth, savepoint = %name, "rolled back to savepoint"),
                Err(e) => error!(depth, savepoint = %name, error = %e, "rollback after panic failed"),
            }
            panic::resume_unwind(payload)
        }
    }
}
