use super::Savepointer;

/// Quotes a SQL Server identifier.
///
/// <https://docs.microsoft.com/en-us/sql/relational-databases/databases/database-identifiers>
pub fn quote(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Savepoint statements for SQL Server.
///
/// Savepoint names are limited to 32 characters; generated names fit.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsSqlSavepointer;

impl Savepointer for MsSqlSavepointer {
    /// <https://docs.microsoft.com/en-us/sql/t-sql/language-elements/save-transaction-transact-sql>
    fn create(&self, name: &str) -> String {
        format!("SAVE TRANSACTION {};", quote(name))
    }

    /// <https://docs.microsoft.com/en-us/sql/t-sql/language-elements/rollback-work-transact-sql>
    fn rollback(&self, name: &str) -> String {
        format!("ROLLBACK TRANSACTION {};", quote(name))
    }

    /// SQL Server has no way to release a savepoint.
    fn release(&self, _name: &str) -> String {
        String::new()
    }
}
