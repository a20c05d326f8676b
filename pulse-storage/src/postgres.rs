//! PostgreSQL metric store

use crate::{models::*, schema::SCHEMA_DDL, Result};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use pulse_core::{derive_duration_seconds, derive_throughput, parse_address_name, MetricField};
use sqlx::{postgres::PgPoolOptions, Acquire, PgPool, Postgres, QueryBuilder, Transaction};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{instrument, warn};

/// PostgreSQL bind-parameter hard limit; bulk inserts chunk below it.
const BIND_LIMIT: usize = 65_535;

/// Configuration for the PostgreSQL connection pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            min_connections: 1,
            acquire_timeout_secs: 30,
        }
    }
}

impl PoolConfig {
    /// Load pool configuration from `PULSE_DB_*` environment variables,
    /// falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let read = |key: &str, fallback: u32| {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(fallback)
        };
        Self {
            max_connections: read("PULSE_DB_MAX_CONNECTIONS", defaults.max_connections),
            min_connections: read("PULSE_DB_MIN_CONNECTIONS", defaults.min_connections),
            acquire_timeout_secs: u64::from(read(
                "PULSE_DB_ACQUIRE_TIMEOUT_SECS",
                defaults.acquire_timeout_secs as u32,
            )),
        }
    }
}

/// Transactional store for all Pulse entities.
///
/// Cheap to clone; the engines share one instance behind an `Arc`.
#[derive(Clone)]
pub struct MetricStore {
    pool: PgPool,
}

/// Counters reported on execution end
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionCounters {
    pub inserts: Option<i64>,
    pub updates: Option<i64>,
    pub soft_deletes: Option<i64>,
    pub total_rows: Option<i64>,
}

impl MetricStore {
    /// Connect with the default pool configuration
    pub async fn connect(database_url: &str) -> Result<Self> {
        Self::connect_with(database_url, PoolConfig::default()).await
    }

    /// Connect with an explicit pool configuration
    pub async fn connect_with(database_url: &str, config: PoolConfig) -> Result<Self> {
        if config.min_connections == 0 {
            return Err(crate::Error::Validation(
                "min_connections must be > 0".to_string(),
            ));
        }
        if config.max_connections < config.min_connections {
            return Err(crate::Error::Validation(
                "max_connections must be >= min_connections".to_string(),
            ));
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.acquire_timeout_secs))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool (tests)
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the idempotent schema DDL
    pub async fn ensure_schema(&self) -> Result<()> {
        for ddl in SCHEMA_DDL {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Execute a closure within a transaction.
    ///
    /// Commits on success, rolls back on error, and warns on slow
    /// operations (>100ms).
    async fn with_transaction<F, T>(&self, op: &'static str, f: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut Transaction<'_, Postgres>) -> BoxFuture<'c, Result<T>> + Send,
        T: Send,
    {
        let start = Instant::now();
        let mut tx = self.pool.begin().await?;

        let result = match f(&mut tx).await {
            Ok(result) => {
                tx.commit().await?;
                Ok(result)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        };

        let elapsed = start.elapsed();
        if elapsed.as_millis() > 100 {
            warn!(
                operation = op,
                duration_ms = elapsed.as_millis() as u64,
                "Slow database operation detected"
            );
        }

        result
    }

    // ========== Addresses & types ==========

    /// Get or create an address type by name; race-safe.
    #[instrument(skip(self))]
    pub async fn get_or_create_address_type(
        &self,
        name: &str,
        group_name: &str,
    ) -> Result<(AddressTypeModel, bool)> {
        let inserted = sqlx::query_as::<_, AddressTypeModel>(
            r#"
            INSERT INTO address_types (name, group_name)
            VALUES ($1, $2)
            ON CONFLICT (name) DO NOTHING
            RETURNING id, name, group_name
            "#,
        )
        .bind(name)
        .bind(group_name)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(model) = inserted {
            return Ok((model, true));
        }

        let existing = sqlx::query_as::<_, AddressTypeModel>(
            "SELECT id, name, group_name FROM address_types WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| crate::Error::Conflict(format!("address type {name} vanished")))?;

        Ok((existing, false))
    }

    /// Get or create an address by its globally-unique name; race-safe.
    ///
    /// The name is lower-cased and, for database-group address types, parsed
    /// into database/schema/table parts.
    #[instrument(skip(self))]
    pub async fn get_or_create_address(
        &self,
        name: &str,
        address_type: &AddressTypeModel,
    ) -> Result<(AddressModel, bool)> {
        let (normalized, parts) = parse_address_name(name, &address_type.group_name);
        if normalized.is_empty() {
            return Err(crate::Error::Validation(
                "address name cannot be empty".to_string(),
            ));
        }

        let inserted = sqlx::query_as::<_, AddressModel>(
            r#"
            INSERT INTO addresses
                (name, address_type_id, database_name, schema_name, table_name)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (name) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(&normalized)
        .bind(address_type.id)
        .bind(&parts.database_name)
        .bind(&parts.schema_name)
        .bind(&parts.table_name)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(model) = inserted {
            return Ok((model, true));
        }

        let existing =
            sqlx::query_as::<_, AddressModel>("SELECT * FROM addresses WHERE name = $1")
                .bind(&normalized)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| crate::Error::Conflict(format!("address {normalized} vanished")))?;

        Ok((existing, false))
    }

    // ========== Pipelines ==========

    /// Get or create a pipeline type by name; race-safe.
    #[instrument(skip(self))]
    pub async fn get_or_create_pipeline_type(
        &self,
        name: &str,
    ) -> Result<(PipelineTypeModel, bool)> {
        let inserted = sqlx::query_as::<_, PipelineTypeModel>(
            r#"
            INSERT INTO pipeline_types (name)
            VALUES ($1)
            ON CONFLICT (name) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(model) = inserted {
            return Ok((model, true));
        }

        let existing =
            sqlx::query_as::<_, PipelineTypeModel>("SELECT * FROM pipeline_types WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| crate::Error::Conflict(format!("pipeline type {name} vanished")))?;

        Ok((existing, false))
    }

    /// Insert or update a pipeline by name.
    ///
    /// Optional fields only overwrite when provided; absent fields keep their
    /// stored values.
    #[instrument(skip(self))]
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_pipeline(
        &self,
        name: &str,
        pipeline_type_id: i64,
        next_watermark: Option<&str>,
        freshness_number: Option<i32>,
        freshness_datepart: Option<&str>,
        timeliness_number: Option<i32>,
        timeliness_datepart: Option<&str>,
    ) -> Result<PipelineModel> {
        let pipeline = sqlx::query_as::<_, PipelineModel>(
            r#"
            INSERT INTO pipelines
                (name, pipeline_type_id, next_watermark,
                 freshness_number, freshness_datepart,
                 timeliness_number, timeliness_datepart)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (name) DO UPDATE SET
                pipeline_type_id    = EXCLUDED.pipeline_type_id,
                next_watermark      = COALESCE(EXCLUDED.next_watermark, pipelines.next_watermark),
                freshness_number    = COALESCE(EXCLUDED.freshness_number, pipelines.freshness_number),
                freshness_datepart  = COALESCE(EXCLUDED.freshness_datepart, pipelines.freshness_datepart),
                timeliness_number   = COALESCE(EXCLUDED.timeliness_number, pipelines.timeliness_number),
                timeliness_datepart = COALESCE(EXCLUDED.timeliness_datepart, pipelines.timeliness_datepart),
                updated_at          = now()
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(pipeline_type_id)
        .bind(next_watermark)
        .bind(freshness_number)
        .bind(freshness_datepart)
        .bind(timeliness_number)
        .bind(timeliness_datepart)
        .fetch_one(&self.pool)
        .await?;

        Ok(pipeline)
    }

    /// Fetch a pipeline by id
    pub async fn get_pipeline(&self, pipeline_id: i64) -> Result<PipelineModel> {
        sqlx::query_as::<_, PipelineModel>("SELECT * FROM pipelines WHERE id = $1")
            .bind(pipeline_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| crate::Error::NotFound(format!("pipeline {pipeline_id}")))
    }

    // ========== Lineage edges & closure ==========

    /// Distinct address ids appearing in the pipeline's current edge set.
    ///
    /// Read before an edge replacement so the closure rebuild can seed with
    /// the union of the old and new address sets.
    pub async fn pipeline_edge_address_ids(&self, pipeline_id: i64) -> Result<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT source_address_id FROM address_lineage WHERE pipeline_id = $1
            UNION
            SELECT target_address_id FROM address_lineage WHERE pipeline_id = $1
            "#,
        )
        .bind(pipeline_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Atomically replace the pipeline's edge set.
    ///
    /// An edge pair already owned by another pipeline is taken over by the
    /// submitting pipeline, keeping `(source, target)` unique across the
    /// whole table.
    #[instrument(skip(self, edges), fields(edge_count = edges.len()))]
    pub async fn replace_pipeline_edges(
        &self,
        pipeline_id: i64,
        edges: &[(i64, i64)],
    ) -> Result<()> {
        let edges = edges.to_vec();
        self.with_transaction("replace_pipeline_edges", move |tx| {
            Box::pin(async move {
                sqlx::query("DELETE FROM address_lineage WHERE pipeline_id = $1")
                    .bind(pipeline_id)
                    .execute(&mut **tx)
                    .await?;

                // 3 binds per row
                for chunk in edges.chunks(BIND_LIMIT / 3) {
                    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                        "INSERT INTO address_lineage \
                         (pipeline_id, source_address_id, target_address_id) ",
                    );
                    qb.push_values(chunk, |mut b, (source, target)| {
                        b.push_bind(pipeline_id).push_bind(source).push_bind(target);
                    });
                    qb.push(
                        " ON CONFLICT (source_address_id, target_address_id) \
                          DO UPDATE SET pipeline_id = EXCLUDED.pipeline_id",
                    );
                    qb.build().execute(&mut **tx).await?;
                }
                Ok(())
            })
        })
        .await
    }

    /// Run a closure rebuild inside its own transaction.
    ///
    /// Takes the per-pipeline advisory lock, then runs the rebuild inside a
    /// savepoint: a failed rebuild rolls the closure table back to its prior
    /// committed state while the already-committed edge replacement stands.
    pub async fn closure_rebuild_scope<F, T>(&self, pipeline_id: i64, f: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut Transaction<'_, Postgres>) -> BoxFuture<'c, Result<T>> + Send,
        T: Send,
    {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(pipeline_id)
            .execute(&mut *tx)
            .await?;

        let mut savepoint = tx.begin().await?;
        match f(&mut savepoint).await {
            Ok(value) => {
                savepoint.commit().await?;
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                savepoint.rollback().await?;
                // Releases the advisory lock; closure state is untouched.
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    /// Edges whose source lies in `ids`
    pub async fn edges_from(
        tx: &mut Transaction<'_, Postgres>,
        ids: &[i64],
    ) -> Result<Vec<(i64, i64)>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT source_address_id, target_address_id
            FROM address_lineage
            WHERE source_address_id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&mut **tx)
        .await?;
        Ok(rows)
    }

    /// Edges whose target lies in `ids`
    pub async fn edges_into(
        tx: &mut Transaction<'_, Postgres>,
        ids: &[i64],
    ) -> Result<Vec<(i64, i64)>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT source_address_id, target_address_id
            FROM address_lineage
            WHERE target_address_id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&mut **tx)
        .await?;
        Ok(rows)
    }

    /// Delete closure rows whose source or target lies in `ids`.
    ///
    /// Two deletes, one per indexed column.
    pub async fn delete_closure_touching(
        tx: &mut Transaction<'_, Postgres>,
        ids: &[i64],
    ) -> Result<u64> {
        let by_source =
            sqlx::query("DELETE FROM address_lineage_closure WHERE source_address_id = ANY($1)")
                .bind(ids)
                .execute(&mut **tx)
                .await?
                .rows_affected();
        let by_target =
            sqlx::query("DELETE FROM address_lineage_closure WHERE target_address_id = ANY($1)")
                .bind(ids)
                .execute(&mut **tx)
                .await?
                .rows_affected();
        Ok(by_source + by_target)
    }

    /// Bulk-insert closure rows, chunked below the bind-parameter limit.
    pub async fn insert_closure_rows(
        tx: &mut Transaction<'_, Postgres>,
        rows: &[NewClosureRow],
    ) -> Result<()> {
        // 4 binds per row (the array counts as one)
        for chunk in rows.chunks(BIND_LIMIT / 4) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO address_lineage_closure \
                 (source_address_id, target_address_id, depth, lineage_path) ",
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(row.source_address_id)
                    .push_bind(row.target_address_id)
                    .push_bind(row.depth)
                    .push_bind(&row.lineage_path);
            });
            qb.build().execute(&mut **tx).await?;
        }
        Ok(())
    }

    /// All closure rows, ordered for assertions and diagnostics
    pub async fn closure_rows(&self) -> Result<Vec<ClosureRowModel>> {
        let rows = sqlx::query_as::<_, ClosureRowModel>(
            r#"
            SELECT source_address_id, target_address_id, depth, lineage_path
            FROM address_lineage_closure
            ORDER BY source_address_id, target_address_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ========== Executions ==========

    /// Record an execution start.
    ///
    /// Watermark values supplied at start overwrite the pipeline's stored
    /// ones in the same transaction; the parent execution id is carried on
    /// the row so the ancestry closure can be extended when the run ends.
    #[instrument(skip(self))]
    pub async fn create_execution(
        &self,
        pipeline_id: i64,
        start_date: DateTime<Utc>,
        parent_execution_id: Option<i64>,
        watermark: Option<&str>,
        next_watermark: Option<&str>,
    ) -> Result<ExecutionModel> {
        let watermark = watermark.map(str::to_owned);
        let next_watermark = next_watermark.map(str::to_owned);
        self.with_transaction("create_execution", move |tx| {
            Box::pin(async move {
                let execution = sqlx::query_as::<_, ExecutionModel>(
                    r#"
                    INSERT INTO pipeline_executions
                        (pipeline_id, parent_execution_id, start_date, hour_recorded)
                    VALUES ($1, $2, $3, $4)
                    RETURNING *
                    "#,
                )
                .bind(pipeline_id)
                .bind(parent_execution_id)
                .bind(start_date)
                .bind(pulse_core::hour_recorded(start_date))
                .fetch_one(&mut **tx)
                .await?;

                if watermark.is_some() || next_watermark.is_some() {
                    sqlx::query(
                        r#"
                        UPDATE pipelines SET
                            watermark      = COALESCE($2, watermark),
                            next_watermark = COALESCE($3, next_watermark),
                            updated_at     = now()
                        WHERE id = $1
                        "#,
                    )
                    .bind(pipeline_id)
                    .bind(watermark)
                    .bind(next_watermark)
                    .execute(&mut **tx)
                    .await?;
                }

                Ok(execution)
            })
        })
        .await
    }

    /// Fetch an execution by id
    pub async fn get_execution(&self, execution_id: i64) -> Result<ExecutionModel> {
        sqlx::query_as::<_, ExecutionModel>("SELECT * FROM pipeline_executions WHERE id = $1")
            .bind(execution_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| crate::Error::NotFound(format!("execution {execution_id}")))
    }

    /// Record an execution end and apply the pipeline side effects in one
    /// transaction.
    ///
    /// Derives duration and throughput; a run that already ended is rejected
    /// with [`crate::Error::Conflict`]. On success the pipeline's watermark
    /// advances to `next_watermark` and `last_target_*` timestamps move for
    /// non-zero counters; `load_lineage` is cleared for every ended run.
    #[instrument(skip(self, counters))]
    pub async fn complete_execution(
        &self,
        execution_id: i64,
        end_date: DateTime<Utc>,
        completed_successfully: bool,
        counters: ExecutionCounters,
    ) -> Result<ExecutionModel> {
        self.with_transaction("complete_execution", move |tx| {
            Box::pin(async move {
                let existing = sqlx::query_as::<_, ExecutionModel>(
                    "SELECT * FROM pipeline_executions WHERE id = $1 FOR UPDATE",
                )
                .bind(execution_id)
                .fetch_optional(&mut **tx)
                .await?
                .ok_or_else(|| crate::Error::NotFound(format!("execution {execution_id}")))?;

                // Terminal columns are written once; a repeated end must not
                // re-derive metrics or re-apply the pipeline side effects.
                if existing.end_date.is_some() {
                    return Err(crate::Error::Conflict(format!(
                        "execution {execution_id} already ended"
                    )));
                }

                if end_date <= existing.start_date {
                    return Err(crate::Error::CheckViolation(format!(
                        "end_date {} is not after start_date {}",
                        end_date, existing.start_date
                    )));
                }

                let duration = derive_duration_seconds(existing.start_date, end_date);
                let throughput = counters
                    .total_rows
                    .map(|rows| derive_throughput(rows, duration));

                let updated = sqlx::query_as::<_, ExecutionModel>(
                    r#"
                    UPDATE pipeline_executions SET
                        end_date = $2,
                        completed_successfully = $3,
                        duration_seconds = $4,
                        throughput = $5,
                        inserts = $6,
                        updates = $7,
                        soft_deletes = $8,
                        total_rows = $9
                    WHERE id = $1
                    RETURNING *
                    "#,
                )
                .bind(execution_id)
                .bind(end_date)
                .bind(completed_successfully)
                .bind(duration)
                .bind(throughput)
                .bind(counters.inserts)
                .bind(counters.updates)
                .bind(counters.soft_deletes)
                .bind(counters.total_rows)
                .fetch_one(&mut **tx)
                .await?;

                if completed_successfully {
                    sqlx::query(
                        r#"
                        UPDATE pipelines SET
                            watermark = COALESCE(next_watermark, watermark),
                            last_target_insert =
                                CASE WHEN $2 > 0 THEN $5 ELSE last_target_insert END,
                            last_target_update =
                                CASE WHEN $3 > 0 THEN $5 ELSE last_target_update END,
                            last_target_soft_delete =
                                CASE WHEN $4 > 0 THEN $5 ELSE last_target_soft_delete END,
                            load_lineage = FALSE,
                            updated_at = now()
                        WHERE id = $1
                        "#,
                    )
                    .bind(updated.pipeline_id)
                    .bind(counters.inserts.unwrap_or(0))
                    .bind(counters.updates.unwrap_or(0))
                    .bind(counters.soft_deletes.unwrap_or(0))
                    .bind(end_date)
                    .execute(&mut **tx)
                    .await?;
                } else {
                    sqlx::query(
                        "UPDATE pipelines SET load_lineage = FALSE, updated_at = now() \
                         WHERE id = $1",
                    )
                    .bind(updated.pipeline_id)
                    .execute(&mut **tx)
                    .await?;
                }

                Ok(updated)
            })
        })
        .await
    }

    // ========== Execution ancestry closure ==========

    /// Insert the ancestry rows for a newly ended execution in one
    /// transaction; idempotent under retry.
    #[instrument(skip(self))]
    pub async fn insert_execution_ancestry(
        &self,
        execution_id: i64,
        parent_execution_id: Option<i64>,
    ) -> Result<()> {
        self.with_transaction("insert_execution_ancestry", move |tx| {
            Box::pin(async move {
                sqlx::query(
                    r#"
                    INSERT INTO pipeline_execution_closure
                        (ancestor_execution_id, descendant_execution_id, depth)
                    VALUES ($1, $1, 0)
                    ON CONFLICT DO NOTHING
                    "#,
                )
                .bind(execution_id)
                .execute(&mut **tx)
                .await?;

                if let Some(parent) = parent_execution_id {
                    sqlx::query(
                        r#"
                        INSERT INTO pipeline_execution_closure
                            (ancestor_execution_id, descendant_execution_id, depth)
                        SELECT ancestor_execution_id, $1, depth + 1
                        FROM pipeline_execution_closure
                        WHERE descendant_execution_id = $2
                        ON CONFLICT DO NOTHING
                        "#,
                    )
                    .bind(execution_id)
                    .bind(parent)
                    .execute(&mut **tx)
                    .await?;
                }
                Ok(())
            })
        })
        .await
    }

    /// Ancestor rows of one execution, self-row included
    pub async fn execution_ancestors(&self, execution_id: i64) -> Result<Vec<(i64, i32)>> {
        let rows: Vec<(i64, i32)> = sqlx::query_as(
            r#"
            SELECT ancestor_execution_id, depth
            FROM pipeline_execution_closure
            WHERE descendant_execution_id = $1
            ORDER BY depth
            "#,
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ========== Anomaly detection ==========

    /// Active rules for a pipeline
    pub async fn active_anomaly_rules(&self, pipeline_id: i64) -> Result<Vec<AnomalyRuleModel>> {
        let rules = sqlx::query_as::<_, AnomalyRuleModel>(
            "SELECT * FROM anomaly_detection_rules WHERE pipeline_id = $1 AND active",
        )
        .bind(pipeline_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rules)
    }

    /// Insert or replace a rule's parameters (fixture/admin path)
    pub async fn upsert_anomaly_rule(
        &self,
        pipeline_id: i64,
        metric_field: MetricField,
        z_threshold: f64,
        lookback_days: i32,
        minimum_executions: i32,
    ) -> Result<AnomalyRuleModel> {
        let rule = sqlx::query_as::<_, AnomalyRuleModel>(
            r#"
            INSERT INTO anomaly_detection_rules
                (pipeline_id, metric_field, z_threshold, lookback_days, minimum_executions)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (pipeline_id, metric_field) DO UPDATE SET
                z_threshold = EXCLUDED.z_threshold,
                lookback_days = EXCLUDED.lookback_days,
                minimum_executions = EXCLUDED.minimum_executions,
                active = TRUE
            RETURNING *
            "#,
        )
        .bind(pipeline_id)
        .bind(metric_field.as_str())
        .bind(z_threshold)
        .bind(lookback_days)
        .bind(minimum_executions)
        .fetch_one(&self.pool)
        .await?;
        Ok(rule)
    }

    /// Candidate history for baseline computation: completed successful
    /// executions of the pipeline in the same hour-of-day bucket, ended
    /// within the widest lookback window.
    pub async fn anomaly_candidates(
        &self,
        pipeline_id: i64,
        hour_recorded: i16,
        since: DateTime<Utc>,
    ) -> Result<Vec<ExecutionModel>> {
        let rows = sqlx::query_as::<_, ExecutionModel>(
            r#"
            SELECT * FROM pipeline_executions
            WHERE pipeline_id = $1
              AND end_date IS NOT NULL
              AND completed_successfully
              AND hour_recorded = $2
              AND end_date >= $3
            ORDER BY end_date
            "#,
        )
        .bind(pipeline_id)
        .bind(hour_recorded)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Atomically persist anomaly results and raise the execution's flags.
    ///
    /// Result rows are unique on `(rule_id, pipeline_execution_id)`, so a
    /// duplicate trigger inserts nothing. Flags merge into the existing
    /// jsonb mapping; metrics that were not flagged are left untouched.
    #[instrument(skip(self, results), fields(result_count = results.len()))]
    pub async fn commit_anomaly_results(
        &self,
        execution_id: i64,
        results: &[NewAnomalyResult],
        flagged: &[MetricField],
    ) -> Result<()> {
        let results = results.to_vec();
        let flag_map: BTreeMap<String, bool> = flagged
            .iter()
            .map(|f| (f.as_str().to_string(), true))
            .collect();
        self.with_transaction("commit_anomaly_results", move |tx| {
            Box::pin(async move {
                // 10 binds per row
                for chunk in results.chunks(BIND_LIMIT / 10) {
                    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                        "INSERT INTO anomaly_detection_results \
                         (rule_id, pipeline_execution_id, violation_value, historical_mean, \
                          std_deviation_value, z_threshold, threshold_min_value, \
                          threshold_max_value, z_score, context) ",
                    );
                    qb.push_values(chunk, |mut b, row| {
                        b.push_bind(row.rule_id)
                            .push_bind(row.pipeline_execution_id)
                            .push_bind(row.violation_value)
                            .push_bind(row.historical_mean)
                            .push_bind(row.std_deviation_value)
                            .push_bind(row.z_threshold)
                            .push_bind(row.threshold_min_value)
                            .push_bind(row.threshold_max_value)
                            .push_bind(row.z_score)
                            .push_bind(sqlx::types::Json(row.context.clone()));
                    });
                    qb.push(" ON CONFLICT (rule_id, pipeline_execution_id) DO NOTHING");
                    qb.build().execute(&mut **tx).await?;
                }

                sqlx::query(
                    "UPDATE pipeline_executions \
                     SET anomaly_flags = anomaly_flags || $2::jsonb WHERE id = $1",
                )
                .bind(execution_id)
                .bind(sqlx::types::Json(flag_map))
                .execute(&mut **tx)
                .await?;

                Ok(())
            })
        })
        .await
    }

    /// Result rows recorded for an execution
    pub async fn anomaly_results_for_execution(
        &self,
        execution_id: i64,
    ) -> Result<Vec<AnomalyResultModel>> {
        let rows = sqlx::query_as::<_, AnomalyResultModel>(
            "SELECT * FROM anomaly_detection_results WHERE pipeline_execution_id = $1",
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Rules of a pipeline matching the given metric fields (any state)
    pub async fn rules_for_metrics(
        &self,
        pipeline_id: i64,
        metrics: &[MetricField],
    ) -> Result<Vec<AnomalyRuleModel>> {
        let names: Vec<String> = metrics.iter().map(|m| m.as_str().to_string()).collect();
        let rules = sqlx::query_as::<_, AnomalyRuleModel>(
            r#"
            SELECT * FROM anomaly_detection_rules
            WHERE pipeline_id = $1 AND metric_field = ANY($2)
            "#,
        )
        .bind(pipeline_id)
        .bind(&names)
        .fetch_all(&self.pool)
        .await?;
        Ok(rules)
    }

    /// Remove result rows and lower flags for the given rules in one
    /// transaction.
    #[instrument(skip(self, rule_ids))]
    pub async fn unflag_execution(
        &self,
        execution_id: i64,
        rule_ids: &[i64],
        metrics: &[MetricField],
    ) -> Result<()> {
        let rule_ids = rule_ids.to_vec();
        let flag_map: BTreeMap<String, bool> = metrics
            .iter()
            .map(|f| (f.as_str().to_string(), false))
            .collect();
        self.with_transaction("unflag_execution", move |tx| {
            Box::pin(async move {
                sqlx::query(
                    "DELETE FROM anomaly_detection_results \
                     WHERE pipeline_execution_id = $1 AND rule_id = ANY($2)",
                )
                .bind(execution_id)
                .bind(&rule_ids)
                .execute(&mut **tx)
                .await?;

                sqlx::query(
                    "UPDATE pipeline_executions \
                     SET anomaly_flags = anomaly_flags || $2::jsonb WHERE id = $1",
                )
                .bind(execution_id)
                .bind(sqlx::types::Json(flag_map))
                .execute(&mut **tx)
                .await?;

                Ok(())
            })
        })
        .await
    }

    // ========== Timeliness & freshness ==========

    /// Executions started after `since`, joined with their pipeline's
    /// timeliness config; muted pipelines and types excluded.
    pub async fn timeliness_candidates(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<TimelinessCandidateRow>> {
        let rows = sqlx::query_as::<_, TimelinessCandidateRow>(
            r#"
            SELECT
                e.id AS execution_id,
                e.pipeline_id,
                p.name AS pipeline_name,
                e.start_date,
                e.end_date,
                e.duration_seconds,
                e.completed_successfully,
                p.timeliness_number AS child_number,
                p.timeliness_datepart AS child_datepart,
                t.timeliness_number AS parent_number,
                t.timeliness_datepart AS parent_datepart
            FROM pipeline_executions e
            JOIN pipelines p ON p.id = e.pipeline_id
            JOIN pipeline_types t ON t.id = p.pipeline_type_id
            WHERE e.start_date > $1
              AND p.active
              AND NOT p.mute_timeliness_check
              AND NOT t.mute_timeliness_check
            ORDER BY e.start_date
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Insert timeliness logs that do not exist yet; returns the execution
    /// ids actually inserted so alerting fires only for new rows.
    #[instrument(skip(self, rows), fields(row_count = rows.len()))]
    pub async fn insert_timeliness_logs_if_absent(
        &self,
        rows: &[NewTimelinessLog],
    ) -> Result<Vec<i64>> {
        let mut inserted = Vec::new();
        // 7 binds per row
        for chunk in rows.chunks(BIND_LIMIT / 7) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO timeliness_logs \
                 (pipeline_execution_id, threshold_number, threshold_datepart, \
                  actual_seconds, used_child_config, execution_status, evaluated_at) ",
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(row.pipeline_execution_id)
                    .push_bind(row.threshold_number)
                    .push_bind(&row.threshold_datepart)
                    .push_bind(row.actual_seconds)
                    .push_bind(row.used_child_config)
                    .push_bind(&row.execution_status)
                    .push_bind(row.evaluated_at);
            });
            qb.push(
                " ON CONFLICT (pipeline_execution_id) DO NOTHING \
                  RETURNING pipeline_execution_id",
            );
            let ids: Vec<i64> = qb
                .build_query_scalar()
                .fetch_all(&self.pool)
                .await?;
            inserted.extend(ids);
        }
        Ok(inserted)
    }

    /// Pipelines eligible for freshness evaluation with their threshold
    /// config and DML timestamps; muted pipelines and types excluded.
    pub async fn freshness_candidates(&self) -> Result<Vec<FreshnessCandidateRow>> {
        let rows = sqlx::query_as::<_, FreshnessCandidateRow>(
            r#"
            SELECT
                p.id AS pipeline_id,
                p.name AS pipeline_name,
                p.last_target_insert,
                p.last_target_update,
                p.last_target_soft_delete,
                p.freshness_number AS child_number,
                p.freshness_datepart AS child_datepart,
                t.freshness_number AS parent_number,
                t.freshness_datepart AS parent_datepart
            FROM pipelines p
            JOIN pipeline_types t ON t.id = p.pipeline_type_id
            WHERE p.active
              AND NOT p.mute_freshness_check
              AND NOT t.mute_freshness_check
            ORDER BY p.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Insert freshness logs that do not exist yet; returns the natural keys
    /// actually inserted.
    #[instrument(skip(self, rows), fields(row_count = rows.len()))]
    pub async fn insert_freshness_logs_if_absent(
        &self,
        rows: &[NewFreshnessLog],
    ) -> Result<Vec<FreshnessLogKey>> {
        let mut inserted = Vec::new();
        // 4 binds per row
        for chunk in rows.chunks(BIND_LIMIT / 4) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO freshness_logs \
                 (pipeline_id, last_dml_timestamp, used_child_config, evaluated_at) ",
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(row.pipeline_id)
                    .push_bind(row.last_dml_timestamp)
                    .push_bind(row.used_child_config)
                    .push_bind(row.evaluated_at);
            });
            qb.push(
                " ON CONFLICT (pipeline_id, last_dml_timestamp) DO NOTHING \
                  RETURNING pipeline_id, last_dml_timestamp",
            );
            let keys: Vec<FreshnessLogKey> = qb
                .build_query_as()
                .fetch_all(&self.pool)
                .await?;
            inserted.extend(keys);
        }
        Ok(inserted)
    }

    // ========== Job stats side store ==========

    /// Last-writer-wins upsert of a job kind's duration aggregate
    pub async fn upsert_job_stat(
        &self,
        job_kind: &str,
        average_duration_ms: f64,
        runs: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO job_stats (job_kind, average_duration_ms, runs, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (job_kind) DO UPDATE SET
                average_duration_ms = EXCLUDED.average_duration_ms,
                runs = EXCLUDED.runs,
                updated_at = now()
            "#,
        )
        .bind(job_kind)
        .bind(average_duration_ms)
        .bind(runs)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetch one job kind's persisted aggregate, if any run was recorded
    pub async fn job_stat(&self, job_kind: &str) -> Result<Option<JobStatModel>> {
        Ok(
            sqlx::query_as::<_, JobStatModel>("SELECT * FROM job_stats WHERE job_kind = $1")
                .bind(job_kind)
                .fetch_optional(&self.pool)
                .await?,
        )
    }
}
