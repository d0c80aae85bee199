use super::Savepointer;

/// Quotes a PostgreSQL identifier.
///
/// <https://www.postgresql.org/docs/current/sql-syntax-lexical.html#SQL-SYNTAX-IDENTIFIERS>
pub fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Savepoint statements for PostgreSQL.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresSavepointer;

impl Savepointer for PostgresSavepointer {
    /// <https://www.postgresql.org/docs/current/sql-savepoint.html>
    fn create(&self, name: &str) -> String {
        format!("SAVEPOINT {};", quote(name))
    }

    /// <https://www.postgresql.org/docs/current/sql-rollback-to.html>
    fn rollback(&self, name: &str) -> String {
        format!("ROLLBACK TO {};", quote(name))
    }

    /// <https://www.postgresql.org/docs/current/sql-release-savepoint.html>
    fn release(&self, name: &str) -> String {
        format!("RELEASE {};", quote(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements() {
        let sp = PostgresSavepointer;
        assert_eq!(sp.create("a"), r#"SAVEPOINT "a";"#);
        assert_eq!(sp.rollback("a"), r#"ROLLBACK TO "a";"#);
        assert_eq!(sp.release("a"), r#"RELEASE "a";"#);
    }

    #[test]
    fn test_quote_doubles_quotes() {
        assert_eq!(quote(r#"needs "quotes""#), r#""needs ""quotes""""#);
    }
}
