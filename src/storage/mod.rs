use anyhow::Result;
use async_trait::async_trait;

use crate::models::OutputRow;

mod sqlite;
pub use sqlite::SqliteRowStore;

/// Destination for finished rows.
#[async_trait]
pub trait RowSink: Send + Sync {
    async fn migrate(&self) -> Result<()>;
    /// Persists the rows of one keyword and returns how many were written.
    async fn write_rows(&self, rows: &[OutputRow]) -> Result<usize>;
}
