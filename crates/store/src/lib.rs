mod schema;
mod queries;

use std::sync::{Mutex, MutexGuard, Once, PoisonError};
use repolens_types::Result;

static VEC_EXTENSION: Once = Once::new();

/// Registers sqlite-vec for every connection opened afterwards.
#[allow(clippy::missing_transmute_annotations)]
fn load_vec_extension() {
    VEC_EXTENSION.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite_vec::sqlite3_vec_init as *const (),
        )));
    });
}

/// SQLite-backed implementation of the [`repolens_types::Store`] trait.
pub struct SqliteStore {
    pub(crate) conn: Mutex<rusqlite::Connection>,
}

impl SqliteStore {
    /// Open a persistent on-disk database at `path`.
    pub fn open(path: &std::path::Path) -> Result<Self> {
        load_vec_extension();
        let conn = rusqlite::Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    /// Open an in-memory database (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        load_vec_extension();
        let conn = rusqlite::Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    /// Run all pragmas and schema DDL.
    fn init(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch(schema::SCHEMA_SQL)?;
        let version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
        tracing::debug!(sqlite_vec = %version, "store initialized");
        Ok(())
    }

    /// A panic while holding the lock cannot leave a half-applied statement
    /// behind, so a poisoned guard is still usable.
    pub(crate) fn lock(&self) -> MutexGuard<'_, rusqlite::Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use repolens_types::{
        CommitRecord, EntityRef, FileRecord, FolderRecord, RepoRecord, Store,
    };

    fn make_store() -> SqliteStore {
        SqliteStore::open_in_memory().expect("open in-memory store")
    }

    fn make_file(name: &str, folder: &str, model: &str, summary: &str) -> FileRecord {
        FileRecord {
            name: name.to_string(),
            folder: folder.to_string(),
            repo: "pg_cron".to_string(),
            model: model.to_string(),
            code: format!("// {name}\n"),
            summary: summary.to_string(),
        }
    }

    fn make_commit(id: &str) -> CommitRecord {
        CommitRecord {
            repo: "pg_cron".to_string(),
            id: id.to_string(),
            author_name: "Alice".to_string(),
            author_email: "alice@example.com".to_string(),
            date: "Tue, 14 Nov 2023 22:13:20 +0000".to_string(),
            title: "Fix scheduler".to_string(),
            message: "Handles DST".to_string(),
            changes: "diff --git a/src/job.c b/src/job.c\n+fixed\n".to_string(),
        }
    }

    #[test]
    fn test_vec_extension_loaded() {
        let store = make_store();
        let conn = store.lock();
        let d: f64 = conn
            .query_row(
                "SELECT vec_distance_l2(vec_f32('[0, 0]'), vec_f32('[3, 4]'))",
                [],
                |r| r.get(0),
            )
            .expect("vec_distance_l2");
        assert!((d - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_insert_file_idempotent() {
        let store = make_store();
        store.insert_file(&make_file("job.c", "src", "gpt", "first")).expect("first insert");
        store.insert_file(&make_file("job.c", "src", "gpt", "second")).expect("second insert");

        let summary = store.file_summary("pg_cron", "src", "job.c", "gpt").expect("lookup");
        assert_eq!(summary.as_deref(), Some("first"), "summaries are write-once");

        let conn = store.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM files", [], |r| r.get(0))
            .expect("count");
        assert_eq!(count, 1);
    }

    #[test]
    fn test_models_are_partitioned() {
        let store = make_store();
        store.insert_file(&make_file("job.c", "src", "gpt", "openai view")).unwrap();
        store.insert_file(&make_file("job.c", "src", "llama", "ubicloud view")).unwrap();

        assert_eq!(
            store.file_summary("pg_cron", "src", "job.c", "llama").unwrap().as_deref(),
            Some("ubicloud view")
        );
        assert!(store.file_summary("pg_cron", "src", "job.c", "other").unwrap().is_none());
    }

    #[test]
    fn test_commit_changes_roundtrip() {
        let store = make_store();
        let commit = make_commit("abc123");
        assert!(!store.commit_exists("pg_cron", "abc123").unwrap());
        store.insert_commit(&commit).expect("insert commit");
        store.insert_commit(&commit).expect("duplicate insert is a no-op");
        assert!(store.commit_exists("pg_cron", "abc123").unwrap());

        let stored = store.get_commit("pg_cron", "abc123").unwrap().expect("commit present");
        assert_eq!(stored, commit);
    }

    #[test]
    fn test_pending_and_store_embedding() {
        let store = make_store();
        store
            .insert_repo(&RepoRecord {
                name: "pg_cron".into(),
                model: "gpt".into(),
                summary: "Cron for Postgres".into(),
            })
            .unwrap();
        store
            .insert_folder(&FolderRecord {
                name: "src".into(),
                repo: "pg_cron".into(),
                model: "gpt".into(),
                summary: "Sources".into(),
            })
            .unwrap();
        store.insert_file(&make_file("job.c", "src", "gpt", "Jobs")).unwrap();
        store.insert_file(&make_file("empty.c", "src", "gpt", "")).unwrap();
        store.insert_commit(&make_commit("abc123")).unwrap();
        store.insert_commit_summary("pg_cron", "abc123", "gpt", "Fixes DST").unwrap();

        let pending = store.pending_embeddings("pg_cron", "gpt").unwrap();
        assert_eq!(pending.len(), 4, "empty summaries are never embedded: {pending:?}");
        assert!(store.pending_embeddings("pg_cron", "llama").unwrap().is_empty());

        for item in &pending {
            store
                .store_embedding("pg_cron", "gpt", &item.entity, &[1.0, 0.0])
                .unwrap();
        }
        assert!(store.pending_embeddings("pg_cron", "gpt").unwrap().is_empty());

        let stats = store.repo_stats("pg_cron").unwrap();
        assert_eq!(stats.len(), 1);
        assert!(stats[0].compiled);
        assert_eq!(stats[0].files, 2);
        assert_eq!(stats[0].missing_embeddings, 0);

        let entity = EntityRef::File { name: "job.c".into(), folder: "src".into() };
        assert_eq!(entity.to_string(), "file src/job.c");
    }

    #[test]
    fn test_nearest_files_orders_by_distance() {
        let store = make_store();
        for (name, vector) in [("far.c", [10.0f32, 0.0]), ("near.c", [1.0, 0.0]), ("mid.c", [4.0, 0.0])] {
            store.insert_file(&make_file(name, "src", "gpt", name)).unwrap();
            let entity = EntityRef::File { name: name.into(), folder: "src".into() };
            store.store_embedding("pg_cron", "gpt", &entity, &vector).unwrap();
        }
        store.insert_file(&make_file("unembedded.c", "src", "gpt", "x")).unwrap();

        let hits = store.nearest_files("pg_cron", "gpt", &[0.0, 0.0], 2).unwrap();
        let names: Vec<&str> = hits.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["near.c", "mid.c"]);
        assert!((hits[0].distance - 1.0).abs() < 1e-6);

        assert!(store.nearest_files("other", "gpt", &[0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_open_on_disk_persists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("repolens.sqlite3");
        {
            let store = SqliteStore::open(&path).expect("open");
            store.set_config("summarize.batch_size", "25").expect("set config");
        }
        let store = SqliteStore::open(&path).expect("reopen");
        assert_eq!(
            store.get_config("summarize.batch_size").unwrap().as_deref(),
            Some("25")
        );
    }
}
