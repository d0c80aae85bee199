//! Caller-supplied configuration: transaction options and dialect selection.

use crate::savepointer::{
    MsSqlSavepointer, MySqlSavepointer, PostgresSavepointer, Savepointer, SqliteSavepointer,
};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Transaction isolation levels understood by MySQL and PostgreSQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    fn as_sql(self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

/// Options applied when the outermost `atomic` call begins its transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxOptions {
    /// Isolation level, or the server default when `None`
    pub isolation: Option<IsolationLevel>,
    /// Start the transaction read-only
    pub read_only: bool,
}

impl TxOptions {
    /// Sets the isolation level.
    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = Some(level);
        self
    }

    /// Marks the transaction read-only.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Returns `true` when nothing beyond a plain `BEGIN` is needed.
    pub fn is_default(&self) -> bool {
        self.isolation.is_none() && !self.read_only
    }

    /// The characteristics list of a `SET TRANSACTION` statement, if any.
    pub fn characteristics(&self) -> Option<String> {
        let mut parts = Vec::with_capacity(2);
        if let Some(level) = self.isolation {
            parts.push(format!("ISOLATION LEVEL {}", level.as_sql()));
        }
        if self.read_only {
            parts.push("READ ONLY".to_string());
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

/// SQL dialect, used to pick a savepoint statement provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    MySql,
    Postgres,
    Sqlite,
    MsSql,
}

impl Dialect {
    /// Returns the stateless savepoint provider for this dialect.
    pub fn savepointer(self) -> Arc<dyn Savepointer> {
        match self {
            Self::MySql => Arc::new(MySqlSavepointer),
            Self::Postgres => Arc::new(PostgresSavepointer),
            Self::Sqlite => Arc::new(SqliteSavepointer),
            Self::MsSql => Arc::new(MsSqlSavepointer),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MySql => "mysql",
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
            Self::MsSql => "mssql",
        })
    }
}

/// Error returned when a dialect name is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown SQL dialect: {0}")]
pub struct UnknownDialect(pub String);

impl FromStr for Dialect {
    type Err = UnknownDialect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Self::MySql),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            "mssql" | "sqlserver" => Ok(Self::MsSql),
            _ => Err(UnknownDialect(s.to_string())),
        }
    }
}
