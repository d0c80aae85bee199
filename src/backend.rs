//! Binding between the executor and the SQLx drivers.
//!
//! The executor only needs a handful of capabilities from a driver: begin a
//! transaction with options, and run the three kinds of query on a borrowed
//! connection. [`Backend`] exposes exactly those for each supported
//! `sqlx::Database`.

use crate::config::{Dialect, TxOptions};
use crate::error::Result;
use futures_util::future::BoxFuture;
use sqlx::{Database, Execute, Transaction};

/// A SQLx database the executor can drive.
pub trait Backend: Database {
    /// Short name used in logs and errors
    const LABEL: &'static str;

    /// Dialect whose savepoint statements this database understands
    fn dialect() -> Dialect;

    /// Begins a transaction on `conn`, applying `options`.
    fn begin<'c>(
        conn: &'c mut Self::Connection,
        options: &'c TxOptions,
    ) -> BoxFuture<'c, Result<Transaction<'c, Self>>>;

    /// Executes a statement, returning how many rows it touched.
    fn execute<'e, 'q: 'e, E>(
        conn: &'e mut Self::Connection,
        query: E,
    ) -> BoxFuture<'e, std::result::Result<Self::QueryResult, sqlx::Error>>
    where
        E: 'q + Execute<'q, Self>;

    /// Runs a query and collects every row.
    fn fetch_all<'e, 'q: 'e, E>(
        conn: &'e mut Self::Connection,
        query: E,
    ) -> BoxFuture<'e, std::result::Result<Vec<Self::Row>, sqlx::Error>>
    where
        E: 'q + Execute<'q, Self>;

    /// Runs a query that must return exactly one row.
    fn fetch_one<'e, 'q: 'e, E>(
        conn: &'e mut Self::Connection,
        query: E,
    ) -> BoxFuture<'e, std::result::Result<Self::Row, sqlx::Error>>
    where
        E: 'q + Execute<'q, Self>;

    /// Runs a query that returns at most one row.
    fn fetch_optional<'e, 'q: 'e, E>(
        conn: &'e mut Self::Connection,
        query: E,
    ) -> BoxFuture<'e, std::result::Result<Option<Self::Row>, sqlx::Error>>
    where
        E: 'q + Execute<'q, Self>;
}

/// Forwards the query capabilities to SQLx's `Executor` impl for
/// `&mut <DB as Database>::Connection`.
macro_rules! forward_executor {
    ($db:ty) => {
        fn execute<'e, 'q: 'e, E>(
            conn: &'e mut <$db as sqlx::Database>::Connection,
            query: E,
        ) -> BoxFuture<'e, std::result::Result<<$db as sqlx::Database>::QueryResult, sqlx::Error>>
        where
            E: 'q + Execute<'q, $db>,
        {
            sqlx::Executor::execute(conn, query)
        }

        fn fetch_all<'e, 'q: 'e, E>(
            conn: &'e mut <$db as sqlx::Database>::Connection,
            query: E,
        ) -> BoxFuture<'e, std::result::Result<Vec<<$db as sqlx::Database>::Row>, sqlx::Error>>
        where
            E: 'q + Execute<'q, $db>,
        {
            sqlx::Executor::fetch_all(conn, query)
        }

        fn fetch_one<'e, 'q: 'e, E>(
            conn: &'e mut <$db as sqlx::Database>::Connection,
            query: E,
        ) -> BoxFuture<'e, std::result::Result<<$db as sqlx::Database>::Row, sqlx::Error>>
        where
            E: 'q + Execute<'q, $db>,
        {
            sqlx::Executor::fetch_one(conn, query)
        }

        fn fetch_optional<'e, 'q: 'e, E>(
            conn: &'e mut <$db as sqlx::Database>::Connection,
            query: E,
        ) -> BoxFuture<'e, std::result::Result<Option<<$db as sqlx::Database>::Row>, sqlx::Error>>
        where
            E: 'q + Execute<'q, $db>,
        {
            sqlx::Executor::fetch_optional(conn, query)
        }
    };
}

#[cfg(feature = "mysql")]
mod mysql {
    use super::*;
    use sqlx::{Connection, MySql, MySqlConnection};

    impl Backend for MySql {
        const LABEL: &'static str = "mysql";

        fn dialect() -> Dialect {
            Dialect::MySql
        }

        // MySQL applies `SET TRANSACTION` to the next transaction only, so it
        // must precede BEGIN.
        fn begin<'c>(
            conn: &'c mut MySqlConnection,
            options: &'c TxOptions,
        ) -> BoxFuture<'c, Result<Transaction<'c, MySql>>> {
            Box::pin(async move {
                if let Some(characteristics) = options.characteristics() {
                    let stmt = format!("SET TRANSACTION {characteristics}");
                    sqlx::Executor::execute(&mut *conn, stmt.as_str()).await?;
                }
                Ok(conn.begin().await?)
            })
        }

        forward_executor!(MySql);
    }
}

#[cfg(feature = "postgres")]
mod postgres {
    use super::*;
    use sqlx::{Connection, PgConnection, Postgres};

    impl Backend for Postgres {
        const LABEL: &'static str = "postgres";

        fn dialect() -> Dialect {
            Dialect::Postgres
        }

        // PostgreSQL wants `SET TRANSACTION` as the first statement inside
        // the transaction.
        fn begin<'c>(
            conn: &'c mut PgConnection,
            options: &'c TxOptions,
        ) -> BoxFuture<'c, Result<Transaction<'c, Postgres>>> {
            Box::pin(async move {
                let mut tx = conn.begin().await?;
                if let Some(characteristics) = options.characteristics() {
                    let stmt = format!("SET TRANSACTION {characteristics}");
                    sqlx::Executor::execute(&mut *tx, stmt.as_str()).await?;
                }
                Ok(tx)
            })
        }

        forward_executor!(Postgres);
    }
}

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;
    use crate::error::Error;
    use sqlx::{Connection, Sqlite, SqliteConnection};

    impl Backend for Sqlite {
        const LABEL: &'static str = "sqlite";

        fn dialect() -> Dialect {
            Dialect::Sqlite
        }

        fn begin<'c>(
            conn: &'c mut SqliteConnection,
            options: &'c TxOptions,
        ) -> BoxFuture<'c, Result<Transaction<'c, Sqlite>>> {
            Box::pin(async move {
                if !options.is_default() {
                    return Err(Error::UnsupportedTxOptions(Self::LABEL));
                }
                Ok(conn.begin().await?)
            })
        }

        forward_executor!(Sqlite);
    }
}
