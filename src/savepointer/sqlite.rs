use super::Savepointer;

/// Quotes a SQLite identifier.
///
/// <https://www.sqlite.org/lang_keywords.html>
pub fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Savepoint statements for SQLite.
///
/// <https://www.sqlite.org/lang_savepoint.html>
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteSavepointer;

impl Savepointer for SqliteSavepointer {
    fn create(&self, name: &str) -> String {
        format!("SAVEPOINT {};", quote(name))
    }

    fn rollback(&self, name: &str) -> String {
        format!("ROLLBACK TO {};", quote(name))
    }

    fn release(&self, name: &str) -> String {
        format!("RELEASE {};", quote(name))
    }
}
