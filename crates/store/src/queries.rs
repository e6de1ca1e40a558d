use rusqlite::{params, OptionalExtension};

use repolens_types::{
    CommitHit, CommitRecord, CommitSummary, EntityRef, FileHit, FileRecord, FolderHit,
    FolderRecord, PendingEmbedding, RepoRecord, RepoStats, RepolensError, Result, Store,
    ROOT_FOLDER,
};

use crate::SqliteStore;

// ── Helpers ───────────────────────────────────────────────────────────────

fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn compress(text: &str) -> Result<Vec<u8>> {
    zstd::encode_all(text.as_bytes(), 3).map_err(RepolensError::Io)
}

fn decompress(blob: Option<Vec<u8>>) -> Result<String> {
    match blob {
        None => Ok(String::new()),
        Some(bytes) => {
            let raw = zstd::decode_all(bytes.as_slice()).map_err(RepolensError::Io)?;
            Ok(String::from_utf8_lossy(&raw).into_owned())
        }
    }
}

/// Escapes `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
fn like_prefix(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + 2);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push_str("/%");
    out
}

fn row_to_file(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        name: row.get(0)?,
        folder: row.get(1)?,
        repo: row.get(2)?,
        model: row.get(3)?,
        code: row.get(4)?,
        summary: row.get(5)?,
    })
}

// ── impl Store ────────────────────────────────────────────────────────────

impl Store for SqliteStore {
    // ── Repositories ──────────────────────────────────────────────────────

    fn repo_summary(&self, repo: &str, model: &str) -> Result<Option<String>> {
        let conn = self.lock();
        let result = conn
            .query_row(
                "SELECT summary FROM repos WHERE name = ?1 AND model = ?2",
                params![repo, model],
                |row| row.get(0),
            )
            .optional()?;
        Ok(result)
    }

    fn insert_repo(&self, repo: &RepoRecord) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO repos (name, model, summary) VALUES (?1, ?2, ?3)
             ON CONFLICT (name, model) DO NOTHING",
            params![repo.name, repo.model, repo.summary],
        )?;
        Ok(())
    }

    fn list_repos(&self) -> Result<Vec<RepoRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT name, model, summary FROM repos ORDER BY name, model")?;
        let repos: rusqlite::Result<Vec<RepoRecord>> = stmt
            .query_map([], |row| {
                Ok(RepoRecord {
                    name: row.get(0)?,
                    model: row.get(1)?,
                    summary: row.get(2)?,
                })
            })?
            .collect();
        Ok(repos?)
    }

    // ── Folders and files ─────────────────────────────────────────────────

    fn folder_summary(&self, repo: &str, name: &str, model: &str) -> Result<Option<String>> {
        let conn = self.lock();
        let result = conn
            .query_row(
                "SELECT summary FROM folders WHERE name = ?1 AND repo = ?2 AND model = ?3",
                params![name, repo, model],
                |row| row.get(0),
            )
            .optional()?;
        Ok(result)
    }

    fn insert_folder(&self, folder: &FolderRecord) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO folders (name, repo, model, summary) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (name, repo, model) DO NOTHING",
            params![folder.name, folder.repo, folder.model, folder.summary],
        )?;
        Ok(())
    }

    fn top_level_folders(&self, repo: &str, model: &str) -> Result<Vec<FolderRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT name, repo, model, summary FROM folders
             WHERE repo = ?1 AND model = ?2 AND name <> ?3 AND name NOT LIKE '%/%/%'
             ORDER BY name",
        )?;
        let folders: rusqlite::Result<Vec<FolderRecord>> = stmt
            .query_map(params![repo, model, ROOT_FOLDER], |row| {
                Ok(FolderRecord {
                    name: row.get(0)?,
                    repo: row.get(1)?,
                    model: row.get(2)?,
                    summary: row.get(3)?,
                })
            })?
            .collect();
        Ok(folders?)
    }

    fn file_summary(&self, repo: &str, folder: &str, name: &str, model: &str) -> Result<Option<String>> {
        let conn = self.lock();
        let result = conn
            .query_row(
                "SELECT summary FROM files
                 WHERE name = ?1 AND folder = ?2 AND repo = ?3 AND model = ?4",
                params![name, folder, repo, model],
                |row| row.get(0),
            )
            .optional()?;
        Ok(result)
    }

    fn insert_file(&self, file: &FileRecord) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO files (name, folder, repo, model, code, summary)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (name, folder, repo, model) DO NOTHING",
            params![file.name, file.folder, file.repo, file.model, file.code, file.summary],
        )?;
        Ok(())
    }

    fn files_under(&self, repo: &str, folder: &str, model: &str) -> Result<Vec<FileRecord>> {
        let conn = self.lock();
        let folder = folder.trim_end_matches('/');

        // The root folder contains everything.
        let rows: rusqlite::Result<Vec<FileRecord>> = if folder == ROOT_FOLDER || folder.is_empty() {
            let mut stmt = conn.prepare(
                "SELECT name, folder, repo, model, code, summary FROM files
                 WHERE repo = ?1 AND model = ?2
                 ORDER BY folder, name",
            )?;
            let rows = stmt.query_map(params![repo, model], row_to_file)?.collect();
            rows
        } else {
            let mut stmt = conn.prepare(
                "SELECT name, folder, repo, model, code, summary FROM files
                 WHERE repo = ?1 AND model = ?2
                   AND (folder = ?3 OR folder LIKE ?4 ESCAPE '\\')
                 ORDER BY folder, name",
            )?;
            let rows = stmt
                .query_map(params![repo, model, folder, like_prefix(folder)], row_to_file)?
                .collect();
            rows
        };
        Ok(rows?)
    }

    // ── Commits ───────────────────────────────────────────────────────────

    fn commit_exists(&self, repo: &str, id: &str) -> Result<bool> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM commits WHERE repo = ?1 AND id = ?2",
            params![repo, id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn insert_commit(&self, commit: &CommitRecord) -> Result<()> {
        let changes_blob = compress(&commit.changes)?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO commits
                (repo, id, author_name, author_email, date, title, message, changes_blob)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (repo, id) DO NOTHING",
            params![
                commit.repo,
                commit.id,
                commit.author_name,
                commit.author_email,
                commit.date,
                commit.title,
                commit.message,
                changes_blob,
            ],
        )?;
        Ok(())
    }

    fn get_commit(&self, repo: &str, id: &str) -> Result<Option<CommitRecord>> {
        let conn = self.lock();
        #[allow(clippy::type_complexity)]
        let row: Option<(Option<String>, Option<String>, Option<String>, Option<String>, Option<String>, Option<Vec<u8>>)> = conn
            .query_row(
                "SELECT author_name, author_email, date, title, message, changes_blob
                 FROM commits WHERE repo = ?1 AND id = ?2",
                params![repo, id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((author_name, author_email, date, title, message, changes_blob)) => {
                Ok(Some(CommitRecord {
                    repo: repo.to_string(),
                    id: id.to_string(),
                    author_name: author_name.unwrap_or_default(),
                    author_email: author_email.unwrap_or_default(),
                    date: date.unwrap_or_default(),
                    title: title.unwrap_or_default(),
                    message: message.unwrap_or_default(),
                    changes: decompress(changes_blob)?,
                }))
            }
        }
    }

    fn commit_summary(&self, repo: &str, id: &str, model: &str) -> Result<Option<String>> {
        let conn = self.lock();
        let result = conn
            .query_row(
                "SELECT summary FROM commit_summaries WHERE repo = ?1 AND id = ?2 AND model = ?3",
                params![repo, id, model],
                |row| row.get(0),
            )
            .optional()?;
        Ok(result)
    }

    fn commit_summaries(&self, repo: &str, id: &str) -> Result<Vec<CommitSummary>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT model, summary FROM commit_summaries WHERE repo = ?1 AND id = ?2 ORDER BY model",
        )?;
        let summaries: rusqlite::Result<Vec<CommitSummary>> = stmt
            .query_map(params![repo, id], |row| {
                Ok(CommitSummary {
                    model: row.get(0)?,
                    summary: row.get(1)?,
                })
            })?
            .collect();
        Ok(summaries?)
    }

    fn insert_commit_summary(&self, repo: &str, id: &str, model: &str, summary: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO commit_summaries (repo, id, model, summary) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (repo, id, model) DO NOTHING",
            params![repo, id, model, summary],
        )?;
        Ok(())
    }

    // ── Embeddings ────────────────────────────────────────────────────────

    fn pending_embeddings(&self, repo: &str, model: &str) -> Result<Vec<PendingEmbedding>> {
        let conn = self.lock();
        let mut pending = Vec::new();

        let repo_summary: Option<String> = conn
            .query_row(
                "SELECT summary FROM repos
                 WHERE name = ?1 AND model = ?2 AND embedding IS NULL AND summary <> ''",
                params![repo, model],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(summary) = repo_summary {
            pending.push(PendingEmbedding { entity: EntityRef::Repo, summary });
        }

        let mut stmt = conn.prepare(
            "SELECT name, summary FROM folders
             WHERE repo = ?1 AND model = ?2 AND embedding IS NULL AND summary <> ''
             ORDER BY name",
        )?;
        let folders: rusqlite::Result<Vec<PendingEmbedding>> = stmt
            .query_map(params![repo, model], |row| {
                Ok(PendingEmbedding {
                    entity: EntityRef::Folder { name: row.get(0)? },
                    summary: row.get(1)?,
                })
            })?
            .collect();
        pending.extend(folders?);

        let mut stmt = conn.prepare(
            "SELECT name, folder, summary FROM files
             WHERE repo = ?1 AND model = ?2 AND embedding IS NULL AND summary <> ''
             ORDER BY folder, name",
        )?;
        let files: rusqlite::Result<Vec<PendingEmbedding>> = stmt
            .query_map(params![repo, model], |row| {
                Ok(PendingEmbedding {
                    entity: EntityRef::File {
                        name: row.get(0)?,
                        folder: row.get(1)?,
                    },
                    summary: row.get(2)?,
                })
            })?
            .collect();
        pending.extend(files?);

        let mut stmt = conn.prepare(
            "SELECT id, summary FROM commit_summaries
             WHERE repo = ?1 AND model = ?2 AND embedding IS NULL AND summary <> ''
             ORDER BY id",
        )?;
        let commits: rusqlite::Result<Vec<PendingEmbedding>> = stmt
            .query_map(params![repo, model], |row| {
                Ok(PendingEmbedding {
                    entity: EntityRef::Commit { id: row.get(0)? },
                    summary: row.get(1)?,
                })
            })?
            .collect();
        pending.extend(commits?);

        Ok(pending)
    }

    fn store_embedding(&self, repo: &str, model: &str, entity: &EntityRef, embedding: &[f32]) -> Result<()> {
        let conn = self.lock();
        let blob = embedding_to_blob(embedding);
        let updated = match entity {
            EntityRef::Repo => conn.execute(
                "UPDATE repos SET embedding = ?1 WHERE name = ?2 AND model = ?3",
                params![blob, repo, model],
            )?,
            EntityRef::Folder { name } => conn.execute(
                "UPDATE folders SET embedding = ?1 WHERE name = ?2 AND repo = ?3 AND model = ?4",
                params![blob, name, repo, model],
            )?,
            EntityRef::File { name, folder } => conn.execute(
                "UPDATE files SET embedding = ?1
                 WHERE name = ?2 AND folder = ?3 AND repo = ?4 AND model = ?5",
                params![blob, name, folder, repo, model],
            )?,
            EntityRef::Commit { id } => conn.execute(
                "UPDATE commit_summaries SET embedding = ?1 WHERE repo = ?2 AND id = ?3 AND model = ?4",
                params![blob, repo, id, model],
            )?,
        };
        if updated == 0 {
            return Err(RepolensError::NotFound(format!("{entity} in {repo} ({model})")));
        }
        Ok(())
    }

    // ── Retrieval ─────────────────────────────────────────────────────────

    fn nearest_folders(&self, repo: &str, model: &str, embedding: &[f32], limit: usize) -> Result<Vec<FolderHit>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT name, summary, vec_distance_l2(embedding, ?3) AS distance
             FROM folders
             WHERE repo = ?1 AND model = ?2 AND embedding IS NOT NULL
             ORDER BY distance
             LIMIT ?4",
        )?;
        let hits: rusqlite::Result<Vec<FolderHit>> = stmt
            .query_map(
                params![repo, model, embedding_to_blob(embedding), limit as i64],
                |row| {
                    Ok(FolderHit {
                        name: row.get(0)?,
                        summary: row.get(1)?,
                        distance: row.get(2)?,
                    })
                },
            )?
            .collect();
        Ok(hits?)
    }

    fn nearest_files(&self, repo: &str, model: &str, embedding: &[f32], limit: usize) -> Result<Vec<FileHit>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT name, folder, summary, vec_distance_l2(embedding, ?3) AS distance
             FROM files
             WHERE repo = ?1 AND model = ?2 AND embedding IS NOT NULL
             ORDER BY distance
             LIMIT ?4",
        )?;
        let hits: rusqlite::Result<Vec<FileHit>> = stmt
            .query_map(
                params![repo, model, embedding_to_blob(embedding), limit as i64],
                |row| {
                    Ok(FileHit {
                        name: row.get(0)?,
                        folder: row.get(1)?,
                        summary: row.get(2)?,
                        distance: row.get(3)?,
                    })
                },
            )?
            .collect();
        Ok(hits?)
    }

    fn nearest_commits(&self, repo: &str, model: &str, embedding: &[f32], limit: usize) -> Result<Vec<CommitHit>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT s.id, COALESCE(c.title, ''), s.summary,
                    vec_distance_l2(s.embedding, ?3) AS distance
             FROM commit_summaries s
             LEFT JOIN commits c ON c.repo = s.repo AND c.id = s.id
             WHERE s.repo = ?1 AND s.model = ?2 AND s.embedding IS NOT NULL
             ORDER BY distance
             LIMIT ?4",
        )?;
        let hits: rusqlite::Result<Vec<CommitHit>> = stmt
            .query_map(
                params![repo, model, embedding_to_blob(embedding), limit as i64],
                |row| {
                    Ok(CommitHit {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        summary: row.get(2)?,
                        distance: row.get(3)?,
                    })
                },
            )?
            .collect();
        Ok(hits?)
    }

    // ── Admin ─────────────────────────────────────────────────────────────

    fn repo_stats(&self, repo: &str) -> Result<Vec<RepoStats>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT model FROM repos WHERE name = ?1
             UNION SELECT model FROM folders WHERE repo = ?1
             UNION SELECT model FROM files WHERE repo = ?1
             UNION SELECT model FROM commit_summaries WHERE repo = ?1
             ORDER BY model",
        )?;
        let models: rusqlite::Result<Vec<String>> =
            stmt.query_map(params![repo], |row| row.get(0))?.collect();

        let count = |sql: &str, model: &str| -> rusqlite::Result<usize> {
            conn.query_row(sql, params![repo, model], |row| row.get::<_, i64>(0))
                .map(|n| n as usize)
        };

        let mut stats = Vec::new();
        for model in models? {
            let compiled = count("SELECT COUNT(*) FROM repos WHERE name = ?1 AND model = ?2", &model)? > 0;
            let folders = count("SELECT COUNT(*) FROM folders WHERE repo = ?1 AND model = ?2", &model)?;
            let files = count("SELECT COUNT(*) FROM files WHERE repo = ?1 AND model = ?2", &model)?;
            let commits = count(
                "SELECT COUNT(*) FROM commit_summaries WHERE repo = ?1 AND model = ?2",
                &model,
            )?;
            let missing_embeddings = count(
                "SELECT
                    (SELECT COUNT(*) FROM repos WHERE name = ?1 AND model = ?2
                        AND embedding IS NULL AND summary <> '')
                  + (SELECT COUNT(*) FROM folders WHERE repo = ?1 AND model = ?2
                        AND embedding IS NULL AND summary <> '')
                  + (SELECT COUNT(*) FROM files WHERE repo = ?1 AND model = ?2
                        AND embedding IS NULL AND summary <> '')
                  + (SELECT COUNT(*) FROM commit_summaries WHERE repo = ?1 AND model = ?2
                        AND embedding IS NULL AND summary <> '')",
                &model,
            )?;
            stats.push(RepoStats {
                repo: repo.to_string(),
                model,
                compiled,
                folders,
                files,
                commits,
                missing_embeddings,
            });
        }
        Ok(stats)
    }

    fn get_config(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock();
        let result = conn
            .query_row(
                "SELECT value FROM config WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(result)
    }

    fn set_config(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
