use super::Savepointer;

/// Quotes a MySQL identifier.
///
/// <https://dev.mysql.com/doc/refman/8.0/en/identifiers.html>
pub fn quote(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Savepoint statements for MySQL.
///
/// <https://dev.mysql.com/doc/refman/8.0/en/savepoint.html>
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlSavepointer;

impl Savepointer for MySqlSavepointer {
    fn create(&self, name: &str) -> String {
        format!("SAVEPOINT {};", quote(name))
    }

    fn rollback(&self, name: &str) -> String {
        format!("ROLLBACK TO {};", quote(name))
    }

    fn release(&self, name: &str) -> String {
        format!("RELEASE SAVEPOINT {};", quote(name))
    }
}
