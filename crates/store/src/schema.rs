/// All DDL for the repolens SQLite schema.
/// Run in order; all statements are idempotent (IF NOT EXISTS).
///
/// Every summary table is partitioned by `model`; embeddings are raw
/// little-endian f32 blobs compared with sqlite-vec's `vec_distance_l2`.
pub const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode=WAL;

CREATE TABLE IF NOT EXISTS repos (
    name      TEXT NOT NULL,
    model     TEXT NOT NULL,
    summary   TEXT NOT NULL,
    embedding BLOB,
    PRIMARY KEY (name, model)
);

CREATE TABLE IF NOT EXISTS folders (
    name      TEXT NOT NULL,
    repo      TEXT NOT NULL,
    model     TEXT NOT NULL,
    summary   TEXT NOT NULL,
    embedding BLOB,
    PRIMARY KEY (name, repo, model)
);

CREATE INDEX IF NOT EXISTS idx_folders_repo_model
    ON folders (repo, model);

CREATE TABLE IF NOT EXISTS files (
    name      TEXT NOT NULL,
    folder    TEXT NOT NULL,
    repo      TEXT NOT NULL,
    model     TEXT NOT NULL,
    code      TEXT NOT NULL,
    summary   TEXT NOT NULL,
    embedding BLOB,
    PRIMARY KEY (name, folder, repo, model)
);

CREATE INDEX IF NOT EXISTS idx_files_repo_model
    ON files (repo, model);

CREATE TABLE IF NOT EXISTS commits (
    repo         TEXT NOT NULL,
    id           TEXT NOT NULL,
    author_name  TEXT,
    author_email TEXT,
    date         TEXT,
    title        TEXT,
    message      TEXT,
    changes_blob BLOB,
    PRIMARY KEY (repo, id)
);

CREATE TABLE IF NOT EXISTS commit_summaries (
    repo      TEXT NOT NULL,
    id        TEXT NOT NULL,
    model     TEXT NOT NULL,
    summary   TEXT NOT NULL,
    embedding BLOB,
    PRIMARY KEY (repo, id, model)
);

CREATE TABLE IF NOT EXISTS config (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
