//! Store abstraction and the SQLite implementation.
//!
//! [`ScanStore`] composes the repository traits; the coordinator only
//! ever sees `Arc<dyn ScanStore>`. PostgreSQL is the production
//! backend. SQLite backs the test suite and small single-node
//! deployments; it runs on a single pooled connection, so the skip-lock
//! queue semantics of the PostgreSQL backend degrade to plain serialized
//! claims, which preserves the at-most-one-in-flight guarantee.

use crate::error::{StoreError, StoreResult};
use crate::models::*;
use crate::repos::{
    AggregatedLocation, BatchRepo, ClaimedBatch, ClientRepo, ClientWithStats, CompletedBatch,
    FileRepo, RecordPage, RecordRepo, SessionRepo, StatsRepo, StatsSnapshot,
};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// The composed store interface.
#[async_trait]
pub trait ScanStore:
    FileRepo + BatchRepo + ClientRepo + SessionRepo + RecordRepo + StatsRepo + Send + Sync
{
    /// Run database migrations.
    async fn migrate(&self) -> StoreResult<()>;

    /// Check database connectivity.
    async fn health_check(&self) -> StoreResult<()>;
}

/// SQLite schema (embedded).
const SQLITE_SCHEMA: &str = include_str!("sqlite_schema.sql");

/// SQLite-based store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (or create) a SQLite store at `path` and run migrations.
    pub async fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Config(format!("create {}: {e}", parent.display())))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // A single connection avoids "database is locked" flakes; SQLite
        // only permits one writer anyway.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl ScanStore for SqliteStore {
    async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(SQLITE_SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

mod sqlite_impl {
    use super::*;
    use locmap_core::api::LocRecord;
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[async_trait]
    impl FileRepo for SqliteStore {
        async fn upsert_file(&self, filename: &str, url: &str, size_bytes: i64) -> StoreResult<()> {
            sqlx::query(
                r#"
                INSERT INTO domain_files (filename, url, size_bytes)
                VALUES (?1, ?2, ?3)
                ON CONFLICT (filename) DO UPDATE SET
                    url = excluded.url,
                    size_bytes = excluded.size_bytes
                "#,
            )
            .bind(filename)
            .bind(url)
            .bind(size_bytes)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn next_file_to_feed(
            &self,
            now: OffsetDateTime,
        ) -> StoreResult<Option<DomainFileRow>> {
            // Single-writer backend: a plain select-then-promote is
            // race-free here, unlike the SKIP LOCKED dance in PostgreSQL.
            let mut file = sqlx::query_as::<_, DomainFileRow>(
                r#"
                SELECT * FROM domain_files
                WHERE status IN ('processing', 'pending')
                AND NOT (feeding_complete = 1 AND batches_completed < batches_created)
                ORDER BY
                    CASE status WHEN 'processing' THEN 0 ELSE 1 END,
                    filename
                LIMIT 1
                "#,
            )
            .fetch_optional(&self.pool)
            .await?;

            if let Some(ref mut f) = file
                && f.status == "pending"
            {
                sqlx::query(
                    "UPDATE domain_files SET status = 'processing', started_at = ?2 WHERE id = ?1",
                )
                .bind(f.id)
                .bind(now)
                .execute(&self.pool)
                .await?;
                f.status = "processing".to_string();
                f.started_at = Some(now);
            }

            Ok(file)
        }

        async fn current_processing_file(&self) -> StoreResult<Option<DomainFileRow>> {
            let row = sqlx::query_as::<_, DomainFileRow>(
                "SELECT * FROM domain_files WHERE status = 'processing' ORDER BY started_at LIMIT 1",
            )
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn get_file(&self, file_id: i64) -> StoreResult<Option<DomainFileRow>> {
            let row =
                sqlx::query_as::<_, DomainFileRow>("SELECT * FROM domain_files WHERE id = ?1")
                    .bind(file_id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn mark_feeding_complete(&self, file_id: i64) -> StoreResult<()> {
            sqlx::query("UPDATE domain_files SET feeding_complete = 1 WHERE id = ?1")
                .bind(file_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn try_close_file(&self, file_id: i64, now: OffsetDateTime) -> StoreResult<bool> {
            let result = sqlx::query(
                r#"
                UPDATE domain_files
                SET status = 'complete', completed_at = ?2
                WHERE id = ?1
                AND feeding_complete = 1
                AND batches_created = batches_completed
                AND status = 'processing'
                "#,
            )
            .bind(file_id)
            .bind(now)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn reset_all_files(&self) -> StoreResult<i64> {
            let result = sqlx::query(
                r#"
                UPDATE domain_files
                SET status = 'pending',
                    processed_lines = 0,
                    batches_created = 0,
                    batches_completed = 0,
                    feeding_complete = 0,
                    started_at = NULL,
                    completed_at = NULL
                "#,
            )
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() as i64)
        }
    }

    #[async_trait]
    impl BatchRepo for SqliteStore {
        async fn create_batch_and_advance(
            &self,
            file_id: i64,
            line_start: i64,
            line_end: i64,
            domains: &str,
        ) -> StoreResult<()> {
            let mut tx = self.pool.begin().await?;

            sqlx::query(
                "INSERT INTO scan_batches (file_id, line_start, line_end, domains) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(file_id)
            .bind(line_start)
            .bind(line_end)
            .bind(domains)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                UPDATE domain_files
                SET processed_lines = ?2, batches_created = batches_created + 1
                WHERE id = ?1
                "#,
            )
            .bind(file_id)
            .bind(line_end)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(())
        }

        async fn create_manual_batch(&self, domains: &str) -> StoreResult<()> {
            sqlx::query(
                "INSERT INTO scan_batches (file_id, line_start, line_end, domains) VALUES (NULL, 0, 0, ?1)",
            )
            .bind(domains)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn claim_batch(
            &self,
            scanner_id: Uuid,
            session_id: &str,
            now: OffsetDateTime,
        ) -> StoreResult<Option<ClaimedBatch>> {
            // One statement keeps select-and-mark atomic on the single
            // writer connection.
            let row: Option<(i64, String)> = sqlx::query_as(
                r#"
                UPDATE scan_batches
                SET status = 'in_flight', assigned_at = ?1, scanner_id = ?2, session_id = ?3
                WHERE id = (
                    SELECT id FROM scan_batches WHERE status = 'pending' ORDER BY id LIMIT 1
                )
                RETURNING id, domains
                "#,
            )
            .bind(now)
            .bind(scanner_id)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

            Ok(row.map(|(id, domains)| ClaimedBatch { id, domains }))
        }

        async fn complete_batch(&self, batch_id: i64) -> StoreResult<Option<CompletedBatch>> {
            let mut tx = self.pool.begin().await?;

            let row: Option<(Option<i64>, Option<OffsetDateTime>)> =
                sqlx::query_as("SELECT file_id, assigned_at FROM scan_batches WHERE id = ?1")
                    .bind(batch_id)
                    .fetch_optional(&mut *tx)
                    .await?;

            let Some((file_id, assigned_at)) = row else {
                tx.rollback().await?;
                return Ok(None);
            };

            sqlx::query("DELETE FROM scan_batches WHERE id = ?1")
                .bind(batch_id)
                .execute(&mut *tx)
                .await?;

            if let Some(file_id) = file_id {
                sqlx::query(
                    "UPDATE domain_files SET batches_completed = batches_completed + 1 WHERE id = ?1",
                )
                .bind(file_id)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            Ok(Some(CompletedBatch {
                file_id,
                assigned_at,
            }))
        }

        async fn pending_batch_count(&self) -> StoreResult<i64> {
            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM scan_batches WHERE status = 'pending'")
                    .fetch_one(&self.pool)
                    .await?;
            Ok(count)
        }

        async fn reclaim_dead_sessions(&self, cutoff: OffsetDateTime) -> StoreResult<i64> {
            let result = sqlx::query(
                r#"
                UPDATE scan_batches
                SET status = 'pending', assigned_at = NULL, scanner_id = NULL, session_id = NULL
                WHERE status = 'in_flight'
                AND session_id IN (
                    SELECT id FROM scanner_sessions WHERE last_heartbeat < ?1
                )
                "#,
            )
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() as i64)
        }

        async fn reclaim_stale_unsessioned(&self, cutoff: OffsetDateTime) -> StoreResult<i64> {
            let result = sqlx::query(
                r#"
                UPDATE scan_batches
                SET status = 'pending', assigned_at = NULL, scanner_id = NULL
                WHERE status = 'in_flight'
                AND session_id IS NULL
                AND assigned_at < ?1
                "#,
            )
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() as i64)
        }

        async fn delete_all_batches(&self) -> StoreResult<i64> {
            let result = sqlx::query("DELETE FROM scan_batches")
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() as i64)
        }

        async fn get_batch(&self, batch_id: i64) -> StoreResult<Option<ScanBatchRow>> {
            let row = sqlx::query_as::<_, ScanBatchRow>("SELECT * FROM scan_batches WHERE id = ?1")
                .bind(batch_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }
    }

    #[async_trait]
    impl ClientRepo for SqliteStore {
        async fn create_client(&self, client: &ScannerClientRow) -> StoreResult<()> {
            sqlx::query(
                r#"
                INSERT INTO scanner_clients (id, name, token_hash, created_at, last_heartbeat)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(client.id)
            .bind(&client.name)
            .bind(&client.token_hash)
            .bind(client.created_at)
            .bind(client.last_heartbeat)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;
            Ok(())
        }

        async fn get_client_by_token_hash(
            &self,
            token_hash: &str,
        ) -> StoreResult<Option<ScannerClientRow>> {
            let row = sqlx::query_as::<_, ScannerClientRow>(
                "SELECT * FROM scanner_clients WHERE token_hash = ?1",
            )
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn list_clients(&self) -> StoreResult<Vec<ClientWithStats>> {
            let rows: Vec<(Uuid, String, String, OffsetDateTime, Option<OffsetDateTime>, i64)> =
                sqlx::query_as(
                    r#"
                    SELECT c.id, c.name, c.token_hash, c.created_at, c.last_heartbeat,
                           COUNT(b.id) AS in_flight_batches
                    FROM scanner_clients c
                    LEFT JOIN scan_batches b ON b.scanner_id = c.id AND b.status = 'in_flight'
                    GROUP BY c.id
                    ORDER BY c.created_at
                    "#,
                )
                .fetch_all(&self.pool)
                .await?;

            Ok(rows
                .into_iter()
                .map(
                    |(id, name, token_hash, created_at, last_heartbeat, in_flight_batches)| {
                        ClientWithStats {
                            client: ScannerClientRow {
                                id,
                                name,
                                token_hash,
                                created_at,
                                last_heartbeat,
                            },
                            in_flight_batches,
                        }
                    },
                )
                .collect())
        }

        async fn delete_client(&self, client_id: Uuid) -> StoreResult<()> {
            let result = sqlx::query("DELETE FROM scanner_clients WHERE id = ?1")
                .bind(client_id)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound(format!(
                    "client {client_id} not found"
                )));
            }
            Ok(())
        }

        async fn touch_client(&self, client_id: Uuid, now: OffsetDateTime) -> StoreResult<()> {
            sqlx::query("UPDATE scanner_clients SET last_heartbeat = ?2 WHERE id = ?1")
                .bind(client_id)
                .bind(now)
                .execute(&self.pool)
                .await?;
            Ok(())
        }
    }

    #[async_trait]
    impl SessionRepo for SqliteStore {
        async fn upsert_session(
            &self,
            session_id: &str,
            client_id: Uuid,
            now: OffsetDateTime,
        ) -> StoreResult<()> {
            sqlx::query(
                r#"
                INSERT INTO scanner_sessions (id, client_id, created_at, last_heartbeat)
                VALUES (?1, ?2, ?3, ?3)
                ON CONFLICT (id) DO UPDATE SET last_heartbeat = excluded.last_heartbeat
                "#,
            )
            .bind(session_id)
            .bind(client_id)
            .bind(now)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn get_session(&self, session_id: &str) -> StoreResult<Option<ScannerSessionRow>> {
            let row = sqlx::query_as::<_, ScannerSessionRow>(
                "SELECT * FROM scanner_sessions WHERE id = ?1",
            )
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn count_active_sessions(&self, cutoff: OffsetDateTime) -> StoreResult<i64> {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM scanner_sessions WHERE last_heartbeat >= ?1",
            )
            .bind(cutoff)
            .fetch_one(&self.pool)
            .await?;
            Ok(count)
        }
    }

    #[async_trait]
    impl RecordRepo for SqliteStore {
        async fn upsert_loc_record(
            &self,
            root_domain: &str,
            record: &LocRecord,
            now: OffsetDateTime,
        ) -> StoreResult<()> {
            sqlx::query(
                r#"
                INSERT INTO loc_records (
                    id, fqdn, root_domain, raw_record, latitude, longitude,
                    altitude_m, size_m, horiz_prec_m, vert_prec_m, first_seen_at, last_seen_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
                ON CONFLICT (fqdn) DO UPDATE SET
                    root_domain = excluded.root_domain,
                    raw_record = excluded.raw_record,
                    latitude = excluded.latitude,
                    longitude = excluded.longitude,
                    altitude_m = excluded.altitude_m,
                    size_m = excluded.size_m,
                    horiz_prec_m = excluded.horiz_prec_m,
                    vert_prec_m = excluded.vert_prec_m,
                    last_seen_at = excluded.last_seen_at
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&record.fqdn)
            .bind(root_domain)
            .bind(&record.raw_record)
            .bind(record.latitude)
            .bind(record.longitude)
            .bind(record.altitude_m)
            .bind(record.size_m)
            .bind(record.horiz_prec_m)
            .bind(record.vert_prec_m)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;
            Ok(())
        }

        async fn get_record_by_fqdn(&self, fqdn: &str) -> StoreResult<Option<LocRecordRow>> {
            let row =
                sqlx::query_as::<_, LocRecordRow>("SELECT * FROM loc_records WHERE fqdn = ?1")
                    .bind(fqdn)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn list_records(
            &self,
            limit: i64,
            offset: i64,
            root_domain: Option<&str>,
        ) -> StoreResult<RecordPage> {
            let (total, records) = match root_domain {
                Some(domain) => {
                    let total: i64 = sqlx::query_scalar(
                        "SELECT COUNT(*) FROM loc_records WHERE root_domain = ?1",
                    )
                    .bind(domain)
                    .fetch_one(&self.pool)
                    .await?;
                    let records = sqlx::query_as::<_, LocRecordRow>(
                        r#"
                        SELECT * FROM loc_records
                        WHERE root_domain = ?1
                        ORDER BY last_seen_at DESC
                        LIMIT ?2 OFFSET ?3
                        "#,
                    )
                    .bind(domain)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await?;
                    (total, records)
                }
                None => {
                    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM loc_records")
                        .fetch_one(&self.pool)
                        .await?;
                    let records = sqlx::query_as::<_, LocRecordRow>(
                        "SELECT * FROM loc_records ORDER BY last_seen_at DESC LIMIT ?1 OFFSET ?2",
                    )
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await?;
                    (total, records)
                }
            };

            Ok(RecordPage { records, total })
        }

        async fn aggregated_locations(&self) -> StoreResult<Vec<AggregatedLocation>> {
            // SQLite has no array_agg; newline-join and split client-side.
            let rows: Vec<(
                f64,
                f64,
                f64,
                String,
                String,
                String,
                i64,
                OffsetDateTime,
                OffsetDateTime,
            )> = sqlx::query_as(
                r#"
                SELECT latitude, longitude, altitude_m, raw_record,
                       group_concat(fqdn, char(10)) AS fqdns,
                       group_concat(DISTINCT root_domain) AS root_domains,
                       COUNT(*) AS count,
                       MIN(first_seen_at) AS first_seen,
                       MAX(last_seen_at) AS last_seen
                FROM loc_records
                GROUP BY latitude, longitude, altitude_m, raw_record
                ORDER BY count DESC, raw_record
                "#,
            )
            .fetch_all(&self.pool)
            .await?;

            Ok(rows
                .into_iter()
                .map(
                    |(
                        latitude,
                        longitude,
                        altitude_m,
                        raw_record,
                        fqdns,
                        root_domains,
                        count,
                        first_seen,
                        last_seen,
                    )| {
                        let mut fqdns: Vec<String> =
                            fqdns.split('\n').map(str::to_string).collect();
                        fqdns.sort();
                        let root_domains =
                            root_domains.split(',').map(str::to_string).collect();
                        AggregatedLocation {
                            latitude,
                            longitude,
                            altitude_m,
                            raw_record,
                            fqdns,
                            root_domains,
                            count,
                            first_seen,
                            last_seen,
                        }
                    },
                )
                .collect())
        }
    }

    #[async_trait]
    impl StatsRepo for SqliteStore {
        async fn stats_snapshot(
            &self,
            heartbeat_cutoff: OffsetDateTime,
        ) -> StoreResult<StatsSnapshot> {
            let row: (i64, i64, i64, i64, i64, i64, i64, i64, i64, i64) = sqlx::query_as(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM domain_files) AS files_total,
                    (SELECT COUNT(*) FROM domain_files WHERE status = 'pending') AS files_pending,
                    (SELECT COUNT(*) FROM domain_files WHERE status = 'processing') AS files_processing,
                    (SELECT COUNT(*) FROM domain_files WHERE status = 'complete') AS files_complete,
                    (SELECT COUNT(*) FROM scan_batches WHERE status = 'pending') AS batches_pending,
                    (SELECT COUNT(*) FROM scan_batches WHERE status = 'in_flight') AS batches_in_flight,
                    (SELECT COUNT(*) FROM loc_records) AS loc_records_total,
                    (SELECT COUNT(DISTINCT root_domain) FROM loc_records) AS root_domains_with_loc,
                    (SELECT COUNT(*) FROM scanner_clients) AS scanners_total,
                    (SELECT COUNT(*) FROM scanner_sessions WHERE last_heartbeat >= ?1) AS scanners_active
                "#,
            )
            .bind(heartbeat_cutoff)
            .fetch_one(&self.pool)
            .await?;

            Ok(StatsSnapshot {
                files_total: row.0,
                files_pending: row.1,
                files_processing: row.2,
                files_complete: row.3,
                batches_pending: row.4,
                batches_in_flight: row.5,
                loc_records_total: row.6,
                root_domains_with_loc: row.7,
                scanners_total: row.8,
                scanners_active: row.9,
            })
        }
    }
}
