pub mod error;
pub mod fold;
pub mod predicate;
pub mod sqlite;
pub mod traits;

pub use error::SQLError;
pub use fold::{contains_pattern, fold_text};
pub use predicate::{Filter, Predicate, Rendered, numbered_list};
pub use sqlite::SqliteStore;
pub use traits::{Row, SQLExecutor, SQLStore, Value, in_transaction};
