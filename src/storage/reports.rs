use anyhow::Result;
use chrono::Utc;
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{CatalogEntry, CatalogRow, Report, ReportEntry};

impl Database {
    // ========================================================================
    // Report Operations
    // ========================================================================

    /// Insert one per-file processing report. Returns the new row id.
    pub async fn insert_report(&self, report: &ReportEntry) -> Result<i64> {
        let processed_at = Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO reports (
                filename, offers_total, availability_updates, labels_added,
                images_deleted, images_inserted, images_promo_inserted,
                offers_deleted, processed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(&report.filename)
        .bind(report.offers_total)
        .bind(report.availability_updates)
        .bind(report.labels_added)
        .bind(report.images_deleted)
        .bind(report.images_inserted)
        .bind(report.images_promo_inserted)
        .bind(report.offers_deleted)
        .bind(processed_at)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Replace the catalog snapshot for a feed file.
    ///
    /// Prior rows for the filename are deleted in the same transaction, so
    /// re-running a feed refreshes its snapshot instead of accumulating
    /// stale offers. Batch INSERT in chunks of 100 keeps large feeds to a
    /// handful of statements.
    pub async fn insert_catalog(&self, filename: &str, entries: &[CatalogEntry]) -> Result<()> {
        const BATCH_SIZE: usize = 100;
        let recorded_at = Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM catalog WHERE filename = ?")
            .bind(filename)
            .execute(&mut *tx)
            .await?;

        for chunk in entries.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT INTO catalog (filename, offer_id, name, available, recorded_at) ",
            );

            builder.push_values(chunk, |mut b, entry| {
                b.push_bind(filename)
                    .push_bind(&entry.offer_id)
                    .push_bind(&entry.name)
                    .push_bind(&entry.available)
                    .push_bind(recorded_at);
            });

            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// All stored reports for a feed file, oldest first
    pub async fn get_reports(&self, filename: &str) -> Result<Vec<Report>> {
        let reports = sqlx::query_as::<_, Report>(
            r#"
            SELECT id, filename, offers_total, availability_updates,
                   labels_added, images_deleted, images_inserted,
                   images_promo_inserted, offers_deleted, processed_at
            FROM reports
            WHERE filename = ?
            ORDER BY id
        "#,
        )
        .bind(filename)
        .fetch_all(&self.pool)
        .await?;
        Ok(reports)
    }

    /// The stored catalog snapshot for a feed file, in insertion order
    pub async fn get_catalog(&self, filename: &str) -> Result<Vec<CatalogEntry>> {
        let rows: Vec<CatalogRow> = sqlx::query_as(
            r#"
            SELECT offer_id, name, available
            FROM catalog
            WHERE filename = ?
            ORDER BY id
        "#,
        )
        .bind(filename)
        .fetch_all(&self.pool)
        .await?;

        let entries = rows
            .into_iter()
            .map(|(offer_id, name, available)| CatalogEntry {
                offer_id,
                name,
                available,
            })
            .collect();
        Ok(entries)
    }
}
