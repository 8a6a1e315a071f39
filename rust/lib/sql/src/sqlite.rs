use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::functions::FunctionFlags;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, ToSql};
use tracing::debug;

use crate::error::SQLError;
use crate::fold::fold_text;
use crate::traits::{Row, SQLExecutor, SQLStore, Value};

/// SqliteStore is a SQLStore implementation backed by rusqlite (bundled SQLite).
///
/// Foreign keys are enforced and a `fold(text)` SQL function is registered
/// for case- and accent-insensitive matching.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self, SQLError> {
        let conn = Connection::open(path).map_err(|e| SQLError::Connection(e.to_string()))?;

        // Enable WAL mode for better concurrent read performance.
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| SQLError::Connection(e.to_string()))?;

        debug!("opened sqlite database at {}", path.display());
        Self::prepare(conn)
    }

    /// Create an in-memory SQLite database (useful for tests).
    pub fn open_in_memory() -> Result<Self, SQLError> {
        let conn =
            Connection::open_in_memory().map_err(|e| SQLError::Connection(e.to_string()))?;
        Self::prepare(conn)
    }

    fn prepare(conn: Connection) -> Result<Self, SQLError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| SQLError::Connection(e.to_string()))?;
        register_functions(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SQLError> {
        self.conn
            .lock()
            .map_err(|e| SQLError::Connection(e.to_string()))
    }
}

/// Register the scalar functions the stores rely on.
fn register_functions(conn: &Connection) -> Result<(), SQLError> {
    conn.create_scalar_function(
        "fold",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let folded = match ctx.get_raw(0) {
                ValueRef::Null => None,
                ValueRef::Integer(i) => Some(i.to_string()),
                ValueRef::Real(f) => Some(f.to_string()),
                ValueRef::Text(t) | ValueRef::Blob(t) => {
                    Some(fold_text(&String::from_utf8_lossy(t)))
                }
            };
            Ok(folded)
        },
    )
    .map_err(|e| SQLError::Connection(e.to_string()))
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::from(rusqlite::types::Null),
            Value::Integer(i) => ToSqlOutput::from(*i),
            Value::Real(f) => ToSqlOutput::from(*f),
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
            Value::Blob(b) => ToSqlOutput::from(b.as_slice()),
        })
    }
}

/// Statement execution on a borrowed connection (plain or in a transaction).
struct ConnExecutor<'c> {
    conn: &'c Connection,
}

impl SQLExecutor for ConnExecutor<'_> {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError> {
        query_on(self.conn, sql, params)
    }

    fn exec(&self, sql: &str, params: &[Value]) -> Result<u64, SQLError> {
        exec_on(self.conn, sql, params)
    }

    fn exec_batch(&self, sql: &str) -> Result<(), SQLError> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| SQLError::Execution(e.to_string()))
    }
}

impl SQLExecutor for SqliteStore {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError> {
        let conn = self.lock()?;
        query_on(&conn, sql, params)
    }

    fn exec(&self, sql: &str, params: &[Value]) -> Result<u64, SQLError> {
        let conn = self.lock()?;
        exec_on(&conn, sql, params)
    }

    fn exec_batch(&self, sql: &str) -> Result<(), SQLError> {
        let conn = self.lock()?;
        conn.execute_batch(sql)
            .map_err(|e| SQLError::Execution(e.to_string()))
    }
}

impl SQLStore for SqliteStore {
    fn transaction(
        &self,
        body: &mut dyn FnMut(&dyn SQLExecutor) -> bool,
    ) -> Result<bool, SQLError> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| SQLError::Transaction(e.to_string()))?;

        let commit = body(&ConnExecutor { conn: &tx });

        if commit {
            tx.commit()
                .map_err(|e| SQLError::Transaction(e.to_string()))?;
        } else {
            tx.rollback()
                .map_err(|e| SQLError::Transaction(e.to_string()))?;
            debug!("transaction rolled back");
        }
        Ok(commit)
    }
}

fn query_on(conn: &Connection, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| SQLError::Query(e.to_string()))?;

    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            let mut columns = Vec::with_capacity(column_names.len());
            for (i, name) in column_names.iter().enumerate() {
                columns.push((name.clone(), row_value_at(row, i)?));
            }
            Ok(Row { columns })
        })
        .map_err(|e| SQLError::Query(e.to_string()))?;

    let mut result = Vec::new();
    for row in rows {
        result.push(row.map_err(|e| SQLError::Query(e.to_string()))?);
    }
    Ok(result)
}

fn exec_on(conn: &Connection, sql: &str, params: &[Value]) -> Result<u64, SQLError> {
    let affected = conn
        .execute(sql, rusqlite::params_from_iter(params.iter()))
        .map_err(|e| SQLError::Execution(e.to_string()))?;
    Ok(affected as u64)
}

/// Extract a Value from a rusqlite row at a given column index.
fn row_value_at(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Value> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::in_transaction;

    fn store_with_table() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .exec_batch(
                "CREATE TABLE parent (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
                 CREATE TABLE child (
                     parent_id INTEGER NOT NULL REFERENCES parent(id),
                     label TEXT
                 );",
            )
            .unwrap();
        store
    }

    fn count(store: &SqliteStore, table: &str) -> i64 {
        let rows = store
            .query(&format!("SELECT COUNT(*) AS cnt FROM {table}"), &[])
            .unwrap();
        rows[0].get_i64("cnt").unwrap()
    }

    #[test]
    fn query_decodes_column_types() {
        let store = store_with_table();
        store
            .exec(
                "INSERT INTO parent (id, name) VALUES (?1, ?2)",
                &[Value::Integer(1), Value::Text("100.00".into())],
            )
            .unwrap();

        let rows = store
            .query("SELECT id, name, NULL AS empty_col, 1.5 AS ratio FROM parent", &[])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_i64("id"), Some(1));
        // Numeric-looking text stays text.
        assert_eq!(rows[0].get_str("name"), Some("100.00"));
        assert_eq!(rows[0].get("empty_col"), Some(&Value::Null));
        assert_eq!(rows[0].get_f64("ratio"), Some(1.5));
    }

    #[test]
    fn transaction_commits_on_ok() {
        let store = store_with_table();
        let id: Result<i64, SQLError> = in_transaction(&store, |tx| {
            tx.exec("INSERT INTO parent (id, name) VALUES (7, 'a')", &[])?;
            tx.exec("INSERT INTO child (parent_id, label) VALUES (7, 'x')", &[])?;
            Ok(7)
        });
        assert_eq!(id.unwrap(), 7);
        assert_eq!(count(&store, "parent"), 1);
        assert_eq!(count(&store, "child"), 1);
    }

    #[test]
    fn transaction_rolls_back_on_err() {
        let store = store_with_table();
        let result: Result<(), SQLError> = in_transaction(&store, |tx| {
            tx.exec("INSERT INTO parent (id, name) VALUES (1, 'a')", &[])?;
            // Violates the foreign key: parent 99 does not exist.
            tx.exec("INSERT INTO child (parent_id, label) VALUES (99, 'x')", &[])?;
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(count(&store, "parent"), 0);
        assert_eq!(count(&store, "child"), 0);
    }

    #[test]
    fn fold_function_is_registered() {
        let store = SqliteStore::open_in_memory().unwrap();
        let rows = store
            .query("SELECT fold(?1) AS f, fold(NULL) AS n", &[Value::Text("Cooperativa JARDÍN Azuayo".into())])
            .unwrap();
        assert_eq!(rows[0].get_str("f"), Some("cooperativa jardin azuayo"));
        assert_eq!(rows[0].get("n"), Some(&Value::Null));
    }

    #[test]
    fn open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("test.db")).unwrap();
        store.exec_batch("CREATE TABLE t (v TEXT)").unwrap();
        let affected = store
            .exec("INSERT INTO t (v) VALUES (?1)", &[Value::from(Some("x"))])
            .unwrap();
        assert_eq!(affected, 1);
    }
}
