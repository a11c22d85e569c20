//! SQL dialect detection
//!
//! The dialect is reported in metadata only; type normalization never
//! depends on it.

use std::fmt;

/// Detected SQL dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    /// PostgreSQL
    PostgreSql,
    /// MySQL / MariaDB
    MySql,
    /// SQLite
    Sqlite,
    /// Microsoft SQL Server
    SqlServer,
    /// No dialect-specific marker found
    Generic,
}

impl SqlDialect {
    /// Stable identifier
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PostgreSql => "postgresql",
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
            Self::SqlServer => "sqlserver",
            Self::Generic => "generic",
        }
    }

    /// Detect by counting dialect markers; ties go to the earlier dialect
    #[must_use]
    pub fn detect(text: &str) -> Self {
        let upper = text.to_ascii_uppercase();
        let count = |markers: &[&str]| markers.iter().filter(|m| upper.contains(*m)).count();

        let scores = [
            (
                Self::PostgreSql,
                count(&[
                    "SERIAL", "JSONB", "BYTEA", "TIMESTAMPTZ", "::", "CREATE EXTENSION",
                    "WITH TIME ZONE", "$$", "CITEXT",
                ]),
            ),
            (
                Self::MySql,
                count(&["AUTO_INCREMENT", "ENGINE=", "ENGINE =", "`", "UNSIGNED", "CHARSET", "TINYINT(1)"]),
            ),
            (
                Self::Sqlite,
                count(&["AUTOINCREMENT", "WITHOUT ROWID", "PRAGMA "]),
            ),
            (
                Self::SqlServer,
                count(&["IDENTITY(", "NVARCHAR", "[DBO]", "\nGO", "DATETIME2", "UNIQUEIDENTIFIER"]),
            ),
        ];

        let mut best = (Self::Generic, 0usize);
        for (dialect, score) in scores {
            if score > best.1 {
                best = (dialect, score);
            }
        }
        best.0
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_dialects() {
        assert_eq!(
            SqlDialect::detect("CREATE TABLE t (id SERIAL PRIMARY KEY, doc JSONB);"),
            SqlDialect::PostgreSql
        );
        assert_eq!(
            SqlDialect::detect("CREATE TABLE `t` (id INT AUTO_INCREMENT) ENGINE=InnoDB;"),
            SqlDialect::MySql
        );
        assert_eq!(
            SqlDialect::detect("CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT);"),
            SqlDialect::Sqlite
        );
        assert_eq!(
            SqlDialect::detect("CREATE TABLE [dbo].[t] (id INT IDENTITY(1,1), n NVARCHAR(10));"),
            SqlDialect::SqlServer
        );
        assert_eq!(SqlDialect::detect("CREATE TABLE t (id INT);"), SqlDialect::Generic);
    }
}
