use crate::error::SQLError;

/// A dynamically-typed SQL parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A row returned from a SQL query: column name to value.
#[derive(Debug, Clone)]
pub struct Row {
    pub columns: Vec<(String, Value)>,
}

impl Row {
    /// Get a column value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Get a text column value by name.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(Value::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get a text column as an owned string, `None` for NULL or empty text.
    pub fn get_string(&self, name: &str) -> Option<String> {
        self.get_str(name)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// Get an integer column value by name.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Some(Value::Integer(i)) => Some(*i),
            _ => None,
        }
    }

    /// Get a real column value by name. Integers widen.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        match self.get(name) {
            Some(Value::Real(f)) => Some(*f),
            Some(Value::Integer(i)) => Some(*i as f64),
            _ => None,
        }
    }
}

/// Statement execution against a connection or an open transaction.
pub trait SQLExecutor {
    /// Execute a query and return rows.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError>;

    /// Execute a statement (INSERT/UPDATE/DELETE) and return affected row count.
    fn exec(&self, sql: &str, params: &[Value]) -> Result<u64, SQLError>;

    /// Execute several `;`-separated statements without parameters.
    fn exec_batch(&self, sql: &str) -> Result<(), SQLError>;
}

/// SQLStore provides a SQL execution interface backed by an embedded database.
pub trait SQLStore: SQLExecutor + Send + Sync {
    /// Run `body` inside one transaction.
    ///
    /// `body` returns `true` to commit and `false` to roll back. No other
    /// statement on this store interleaves with the body. Returns whether the
    /// transaction was committed.
    fn transaction(
        &self,
        body: &mut dyn FnMut(&dyn SQLExecutor) -> bool,
    ) -> Result<bool, SQLError>;
}

/// Run `f` inside a transaction on `store`, committing only if it returns `Ok`.
///
/// Errors from `f` are returned unchanged after the rollback; failures to
/// begin or finish the transaction convert through `From<SQLError>`.
pub fn in_transaction<T, E, F>(store: &dyn SQLStore, f: F) -> Result<T, E>
where
    E: From<SQLError>,
    F: FnOnce(&dyn SQLExecutor) -> Result<T, E>,
{
    let mut f = Some(f);
    let mut outcome: Option<Result<T, E>> = None;

    store.transaction(&mut |tx| match f.take() {
        Some(f) => {
            let result = f(tx);
            let commit = result.is_ok();
            outcome = Some(result);
            commit
        }
        None => false,
    })?;

    outcome.unwrap_or_else(|| {
        Err(SQLError::Transaction("transaction body did not run".into()).into())
    })
}
