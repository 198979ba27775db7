//! SQL migration definitions for the metadata database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: decisions, decisions_curated, pipeline_runs",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Discovered decisions. file_* columns are set by acquisition.
CREATE TABLE IF NOT EXISTS decisions (
    identifier     TEXT PRIMARY KEY,
    description    TEXT NOT NULL DEFAULT '',
    ref_no         TEXT NOT NULL DEFAULT '',
    body           TEXT NOT NULL DEFAULT '',
    published_date TEXT,
    published_on   TEXT,
    link_to_doc    TEXT,
    partition_date TEXT NOT NULL,
    scraped_at     TEXT NOT NULL,
    file_path      TEXT,
    file_hash      TEXT,
    downloaded_at  TEXT
);

CREATE INDEX IF NOT EXISTS idx_decisions_published_on ON decisions(published_on DESC);
CREATE INDEX IF NOT EXISTS idx_decisions_partition ON decisions(partition_date);
CREATE INDEX IF NOT EXISTS idx_decisions_file_path ON decisions(file_path);
CREATE INDEX IF NOT EXISTS idx_decisions_scraped_at ON decisions(scraped_at DESC);

-- Transformed decisions, same identifier space as decisions.
CREATE TABLE IF NOT EXISTS decisions_curated (
    identifier       TEXT PRIMARY KEY,
    description      TEXT NOT NULL DEFAULT '',
    ref_no           TEXT NOT NULL DEFAULT '',
    body             TEXT NOT NULL DEFAULT '',
    published_date   TEXT,
    published_on     TEXT,
    link_to_doc      TEXT,
    partition_date   TEXT NOT NULL,
    scraped_at       TEXT NOT NULL,
    downloaded_at    TEXT NOT NULL,
    file_path        TEXT NOT NULL,
    file_hash        TEXT NOT NULL,
    source_file_path TEXT NOT NULL,
    source_file_hash TEXT NOT NULL,
    transformed_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_curated_partition ON decisions_curated(partition_date);

-- Stage run history
CREATE TABLE IF NOT EXISTS pipeline_runs (
    id          TEXT PRIMARY KEY,
    stage       TEXT NOT NULL,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

CREATE INDEX IF NOT EXISTS idx_pipeline_runs_stage ON pipeline_runs(stage, started_at DESC);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
