mod reports;
mod schema;
mod types;

pub use schema::Database;
pub use types::{CatalogEntry, DatabaseError, Report, ReportEntry};
