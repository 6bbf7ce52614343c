//! Catalog connections: the driver seam the catalog talks through.

use super::query::{ParamStyle, Row, SqlValue};
use crate::error::CatalogError;

/// A relational store with parameterized statements and transactions.
pub trait CatalogConnection: Send {
    /// Placeholder style, fixed for the lifetime of the connection.
    fn param_style(&self) -> ParamStyle;

    /// Run one statement, returning the number of affected rows.
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<usize, CatalogError>;

    /// Run several `;`-separated statements without parameters.
    fn execute_batch(&mut self, sql: &str) -> Result<(), CatalogError>;

    fn fetch_one(&mut self, sql: &str, params: &[SqlValue]) -> Result<Option<Row>, CatalogError> {
        Ok(self.fetch_all(sql, params)?.into_iter().next())
    }

    fn fetch_all(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, CatalogError>;

    fn begin(&mut self) -> Result<(), CatalogError> {
        self.execute_batch("BEGIN;")
    }

    fn commit(&mut self) -> Result<(), CatalogError> {
        self.execute_batch("COMMIT;")
    }

    fn rollback(&mut self) -> Result<(), CatalogError> {
        self.execute_batch("ROLLBACK;")
    }
}

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteConnection;

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;
    use rusqlite::types::Value;
    use std::path::Path;

    /// SQLite catalog connection (qmark placeholders).
    pub struct SqliteConnection {
        conn: rusqlite::Connection,
    }

    impl SqliteConnection {
        pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
            let conn = rusqlite::Connection::open(path)?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(Self { conn })
        }

        pub fn open_in_memory() -> Result<Self, CatalogError> {
            let conn = rusqlite::Connection::open_in_memory()?;
            Ok(Self { conn })
        }
    }

    fn to_value(value: &SqlValue) -> Value {
        match value {
            SqlValue::Null => Value::Null,
            SqlValue::Integer(v) => Value::Integer(*v),
            SqlValue::Real(v) => Value::Real(*v),
            SqlValue::Text(v) => Value::Text(v.clone()),
        }
    }

    fn from_value(value: Value) -> SqlValue {
        match value {
            Value::Null | Value::Blob(_) => SqlValue::Null,
            Value::Integer(v) => SqlValue::Integer(v),
            Value::Real(v) => SqlValue::Real(v),
            Value::Text(v) => SqlValue::Text(v),
        }
    }

    impl CatalogConnection for SqliteConnection {
        fn param_style(&self) -> ParamStyle {
            ParamStyle::Qmark
        }

        fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<usize, CatalogError> {
            let changed = self
                .conn
                .execute(sql, rusqlite::params_from_iter(params.iter().map(to_value)))?;
            Ok(changed)
        }

        fn execute_batch(&mut self, sql: &str) -> Result<(), CatalogError> {
            self.conn.execute_batch(sql)?;
            Ok(())
        }

        fn fetch_all(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, CatalogError> {
            let mut stmt = self.conn.prepare(sql)?;
            let columns: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(str::to_string)
                .collect();
            let mut rows = stmt.query(rusqlite::params_from_iter(params.iter().map(to_value)))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut values = Vec::with_capacity(columns.len());
                for i in 0..columns.len() {
                    values.push(from_value(row.get::<_, Value>(i)?));
                }
                out.push(Row::new(columns.clone(), values));
            }
            Ok(out)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_sqlite_round_trip() {
            let mut conn = SqliteConnection::open_in_memory().unwrap();
            conn.execute_batch("CREATE TABLE t (id TEXT PRIMARY KEY, v REAL);")
                .unwrap();
            let n = conn
                .execute(
                    "INSERT INTO t (id, v) VALUES (?, ?);",
                    &["a".into(), SqlValue::Real(2.5)],
                )
                .unwrap();
            assert_eq!(n, 1);
            let row = conn
                .fetch_one("SELECT id, v FROM t WHERE id = ?;", &["a".into()])
                .unwrap()
                .unwrap();
            assert_eq!(row.optional_real("v"), Some(2.5));
            assert!(conn
                .fetch_one("SELECT id FROM t WHERE id = ?;", &["b".into()])
                .unwrap()
                .is_none());
        }

        #[test]
        fn test_sqlite_rollback() {
            let mut conn = SqliteConnection::open_in_memory().unwrap();
            conn.execute_batch("CREATE TABLE t (id TEXT PRIMARY KEY);").unwrap();
            conn.begin().unwrap();
            conn.execute("INSERT INTO t (id) VALUES (?);", &["a".into()])
                .unwrap();
            conn.rollback().unwrap();
            assert!(conn.fetch_all("SELECT id FROM t;", &[]).unwrap().is_empty());
        }

        #[test]
        fn test_sqlite_duplicate_key_is_error() {
            let mut conn = SqliteConnection::open_in_memory().unwrap();
            conn.execute_batch("CREATE TABLE t (id TEXT PRIMARY KEY);").unwrap();
            conn.execute("INSERT INTO t (id) VALUES (?);", &["a".into()])
                .unwrap();
            let err = conn
                .execute("INSERT INTO t (id) VALUES (?);", &["a".into()])
                .unwrap_err();
            assert!(matches!(err, CatalogError::Sql(_)));
        }
    }
}
