//! Idempotent schema bootstrap
//!
//! The DDL below is applied with `CREATE ... IF NOT EXISTS` at startup.
//! Schema evolution is out of scope; operators own any migration beyond the
//! initial shape.

/// Tables and indexes in dependency order.
pub const SCHEMA_DDL: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS address_types (
    id          BIGSERIAL PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    group_name  TEXT NOT NULL
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS addresses (
    id               BIGSERIAL PRIMARY KEY,
    name             TEXT NOT NULL UNIQUE,
    address_type_id  BIGINT NOT NULL REFERENCES address_types (id),
    database_name    TEXT,
    schema_name      TEXT,
    table_name       TEXT,
    created_at       TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at       TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS pipeline_types (
    id                     BIGSERIAL PRIMARY KEY,
    name                   TEXT NOT NULL UNIQUE,
    freshness_number       INTEGER,
    freshness_datepart     TEXT,
    timeliness_number      INTEGER,
    timeliness_datepart    TEXT,
    mute_freshness_check   BOOLEAN NOT NULL DEFAULT FALSE,
    mute_timeliness_check  BOOLEAN NOT NULL DEFAULT FALSE
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS pipelines (
    id                      BIGSERIAL PRIMARY KEY,
    name                    TEXT NOT NULL UNIQUE,
    pipeline_type_id        BIGINT NOT NULL REFERENCES pipeline_types (id),
    active                  BOOLEAN NOT NULL DEFAULT TRUE,
    load_lineage            BOOLEAN NOT NULL DEFAULT TRUE,
    watermark               TEXT,
    next_watermark          TEXT,
    last_target_insert      TIMESTAMPTZ,
    last_target_update      TIMESTAMPTZ,
    last_target_soft_delete TIMESTAMPTZ,
    freshness_number        INTEGER,
    freshness_datepart      TEXT,
    timeliness_number       INTEGER,
    timeliness_datepart     TEXT,
    mute_freshness_check    BOOLEAN NOT NULL DEFAULT FALSE,
    mute_timeliness_check   BOOLEAN NOT NULL DEFAULT FALSE,
    created_at              TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at              TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS address_lineage (
    pipeline_id        BIGINT NOT NULL REFERENCES pipelines (id),
    source_address_id  BIGINT NOT NULL REFERENCES addresses (id),
    target_address_id  BIGINT NOT NULL REFERENCES addresses (id),
    PRIMARY KEY (source_address_id, target_address_id)
)
"#,
    r#"
CREATE UNIQUE INDEX IF NOT EXISTS ix_address_lineage_target_source
    ON address_lineage (target_address_id, source_address_id)
"#,
    r#"
CREATE TABLE IF NOT EXISTS address_lineage_closure (
    source_address_id  BIGINT NOT NULL,
    target_address_id  BIGINT NOT NULL,
    depth              INTEGER NOT NULL,
    lineage_path       BIGINT[] NOT NULL,
    PRIMARY KEY (source_address_id, target_address_id)
)
"#,
    r#"
CREATE INDEX IF NOT EXISTS ix_closure_source_depth
    ON address_lineage_closure (source_address_id, depth)
"#,
    r#"
CREATE INDEX IF NOT EXISTS ix_closure_target_depth
    ON address_lineage_closure (target_address_id, depth)
"#,
    r#"
CREATE TABLE IF NOT EXISTS pipeline_executions (
    id                      BIGSERIAL PRIMARY KEY,
    pipeline_id             BIGINT NOT NULL REFERENCES pipelines (id),
    parent_execution_id     BIGINT REFERENCES pipeline_executions (id),
    start_date              TIMESTAMPTZ NOT NULL,
    end_date                TIMESTAMPTZ,
    duration_seconds        BIGINT,
    throughput              DOUBLE PRECISION,
    inserts                 BIGINT,
    updates                 BIGINT,
    soft_deletes            BIGINT,
    total_rows              BIGINT,
    completed_successfully  BOOLEAN,
    hour_recorded           SMALLINT NOT NULL,
    anomaly_flags           JSONB NOT NULL DEFAULT '{}'::jsonb,
    CHECK (end_date IS NULL OR end_date > start_date)
)
"#,
    r#"
CREATE INDEX IF NOT EXISTS ix_executions_pipeline_end_date
    ON pipeline_executions (pipeline_id, end_date)
    WHERE end_date IS NOT NULL
"#,
    r#"
CREATE INDEX IF NOT EXISTS ix_executions_start_date
    ON pipeline_executions (start_date)
"#,
    r#"
CREATE TABLE IF NOT EXISTS pipeline_execution_closure (
    ancestor_execution_id    BIGINT NOT NULL,
    descendant_execution_id  BIGINT NOT NULL,
    depth                    INTEGER NOT NULL,
    PRIMARY KEY (ancestor_execution_id, descendant_execution_id)
)
"#,
    r#"
CREATE INDEX IF NOT EXISTS ix_execution_closure_descendant
    ON pipeline_execution_closure (descendant_execution_id)
"#,
    r#"
CREATE TABLE IF NOT EXISTS anomaly_detection_rules (
    id                  BIGSERIAL PRIMARY KEY,
    pipeline_id         BIGINT NOT NULL REFERENCES pipelines (id),
    metric_field        TEXT NOT NULL,
    z_threshold         DOUBLE PRECISION NOT NULL,
    lookback_days       INTEGER NOT NULL,
    minimum_executions  INTEGER NOT NULL,
    active              BOOLEAN NOT NULL DEFAULT TRUE,
    UNIQUE (pipeline_id, metric_field)
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS anomaly_detection_results (
    id                     BIGSERIAL PRIMARY KEY,
    rule_id                BIGINT NOT NULL REFERENCES anomaly_detection_rules (id),
    pipeline_execution_id  BIGINT NOT NULL REFERENCES pipeline_executions (id),
    violation_value        DOUBLE PRECISION NOT NULL,
    historical_mean        DOUBLE PRECISION NOT NULL,
    std_deviation_value    DOUBLE PRECISION NOT NULL,
    z_threshold            DOUBLE PRECISION NOT NULL,
    threshold_min_value    DOUBLE PRECISION NOT NULL,
    threshold_max_value    DOUBLE PRECISION NOT NULL,
    z_score                DOUBLE PRECISION NOT NULL,
    context                JSONB NOT NULL DEFAULT '{}'::jsonb,
    UNIQUE (rule_id, pipeline_execution_id)
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS timeliness_logs (
    id                     BIGSERIAL PRIMARY KEY,
    pipeline_execution_id  BIGINT NOT NULL UNIQUE REFERENCES pipeline_executions (id),
    threshold_number       INTEGER NOT NULL,
    threshold_datepart     TEXT NOT NULL,
    actual_seconds         BIGINT NOT NULL,
    used_child_config      BOOLEAN NOT NULL,
    execution_status       TEXT NOT NULL,
    evaluated_at           TIMESTAMPTZ NOT NULL
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS freshness_logs (
    id                  BIGSERIAL PRIMARY KEY,
    pipeline_id         BIGINT NOT NULL REFERENCES pipelines (id),
    last_dml_timestamp  TIMESTAMPTZ NOT NULL,
    used_child_config   BOOLEAN NOT NULL,
    evaluated_at        TIMESTAMPTZ NOT NULL,
    UNIQUE (pipeline_id, last_dml_timestamp)
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS job_stats (
    job_kind             TEXT PRIMARY KEY,
    average_duration_ms  DOUBLE PRECISION NOT NULL,
    runs                 BIGINT NOT NULL,
    updated_at           TIMESTAMPTZ NOT NULL
)
"#,
];
