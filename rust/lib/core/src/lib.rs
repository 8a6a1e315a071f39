pub mod config;
pub mod error;
pub mod types;

pub use config::ServiceConfig;
pub use error::{Cause, FieldErrors, ServiceError};
pub use types::{Page, PageRequest, now_rfc3339};
