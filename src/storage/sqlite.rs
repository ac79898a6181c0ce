use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::models::{OutputRow, OUTPUT_COLUMNS};
use crate::storage::RowSink;

pub struct SqliteRowStore {
    conn: Arc<Mutex<Connection>>,
    run_id: String,
}

impl SqliteRowStore {
    pub async fn new(db_path: &Path, run_id: impl Into<String>) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(db_path).context("Failed to open SQLite database")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            run_id: run_id.into(),
        })
    }

    pub fn in_memory(run_id: impl Into<String>) -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            run_id: run_id.into(),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("SQLite connection lock poisoned"))
    }

    /// Rows stored for `keyword` in this run, in insertion order.
    pub fn rows_for_keyword(&self, keyword: &str) -> Result<Vec<OutputRow>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM product_rows WHERE run_id = ?1 AND input_keyword = ?2 ORDER BY id",
            OUTPUT_COLUMNS.join(", ")
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![self.run_id, keyword], |row| {
                Ok(OutputRow {
                    input_keyword: row.get(0)?,
                    product_name: row.get(1)?,
                    description: row.get(2)?,
                    price: row.get(3)?,
                    currency: row.get(4)?,
                    image_url: row.get(5)?,
                    image_local_path: row.get(6)?,
                    store_name: row.get(7)?,
                    product_url: row.get(8)?,
                    source_site: row.get(9)?,
                    scraped_at: row.get(10)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

#[async_trait]
impl RowSink for SqliteRowStore {
    async fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;

        let columns = OUTPUT_COLUMNS
            .iter()
            .map(|c| format!("{c} TEXT NOT NULL DEFAULT ''"))
            .collect::<Vec<_>>()
            .join(",\n                ");
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS product_rows (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                {columns}
            )"
            ),
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_run_keyword ON product_rows(run_id, input_keyword)",
            [],
        )?;

        info!("Database migration completed");
        Ok(())
    }

    async fn write_rows(&self, rows: &[OutputRow]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let placeholders = (1..=OUTPUT_COLUMNS.len() + 1)
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO product_rows (run_id, {}) VALUES ({})",
            OUTPUT_COLUMNS.join(", "),
            placeholders
        );

        {
            let mut stmt = tx.prepare(&sql)?;
            for row in rows {
                let values = std::iter::once(self.run_id.as_str()).chain(row.values());
                stmt.execute(params_from_iter(values))?;
            }
        }
        tx.commit()?;

        debug!(rows = rows.len(), run_id = %self.run_id, "Rows written");
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(keyword: &str, name: &str) -> OutputRow {
        OutputRow {
            input_keyword: keyword.into(),
            product_name: name.into(),
            price: "150000".into(),
            currency: "IDR".into(),
            product_url: format!("https://www.tokopedia.com/shop/{name}"),
            source_site: "tokopedia".into(),
            scraped_at: "2024-05-01T08:30:00Z".into(),
            ..OutputRow::default()
        }
    }

    #[tokio::test]
    async fn rows_round_trip_per_run_and_keyword() {
        let store = SqliteRowStore::in_memory("run-1").unwrap();
        assert_eq!(store.run_id(), "run-1");
        store.migrate().await.unwrap();
        store.migrate().await.unwrap();

        let written = store
            .write_rows(&[row("mouse", "mouse-a"), row("mouse", "mouse-b"), row("laptop", "laptop-a")])
            .await
            .unwrap();
        assert_eq!(written, 3);

        let mice = store.rows_for_keyword("mouse").unwrap();
        assert_eq!(mice, vec![row("mouse", "mouse-a"), row("mouse", "mouse-b")]);
        assert!(store.rows_for_keyword("keyboard").unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_batches_are_a_no_op() {
        let store = SqliteRowStore::in_memory("run-2").unwrap();
        store.migrate().await.unwrap();
        assert_eq!(store.write_rows(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn database_file_is_created_with_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output").join("product_scout.db");
        let store = SqliteRowStore::new(&path, "run-3").await.unwrap();
        store.migrate().await.unwrap();
        assert!(path.exists());
    }
}
