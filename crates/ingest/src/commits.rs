use std::io::BufRead;
use std::path::Path;

use repolens_llm::ask;
use repolens_types::{Backend, CommitRecord, FilterConfig, RepolensError, Result, Store};

use crate::history;
use crate::patch::changed_paths;

const COMMIT_PROMPT: &str =
    "Here is a commit from a version control history. Summarize what the change does and why.";

// ── Parsing ────────────────────────────────────────────────────────────────

/// One commit as read from a delimited log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCommit {
    pub id: String,
    pub author_name: String,
    pub author_email: String,
    pub date: String,
    pub title: String,
    pub message: String,
    pub changes: String,
}

impl RawCommit {
    pub fn into_record(self, repo: &str) -> CommitRecord {
        CommitRecord {
            repo: repo.to_string(),
            id: self.id,
            author_name: self.author_name,
            author_email: self.author_email,
            date: self.date,
            title: self.title,
            message: self.message,
            changes: self.changes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    BetweenCommits,
    InFields,
    InDiff,
}

/// Line-at-a-time parser for the delimited commit log.
///
/// Feed lines without their terminator; a commit is returned when the next
/// `HASH:` line arrives, and the last one by [`LogParser::finish`].
#[derive(Debug)]
pub struct LogParser {
    state: ParseState,
    current: Option<RawCommit>,
}

impl Default for LogParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LogParser {
    pub fn new() -> Self {
        Self {
            state: ParseState::BetweenCommits,
            current: None,
        }
    }

    pub fn feed(&mut self, line: &str) -> Option<RawCommit> {
        if let Some(id) = line.strip_prefix("HASH:") {
            let flushed = self.take();
            self.current = Some(RawCommit {
                id: id.trim().to_string(),
                ..RawCommit::default()
            });
            self.state = ParseState::InFields;
            return flushed;
        }

        let Some(commit) = self.current.as_mut() else {
            return None;
        };

        match self.state {
            ParseState::BetweenCommits => {}
            ParseState::InFields => {
                if line.trim().is_empty() {
                    self.state = ParseState::InDiff;
                } else if let Some(v) = line.strip_prefix("AUTHOR_NAME:") {
                    commit.author_name = v.trim().to_string();
                } else if let Some(v) = line.strip_prefix("AUTHOR_EMAIL:") {
                    commit.author_email = v.trim().to_string();
                } else if let Some(v) = line.strip_prefix("DATE:") {
                    commit.date = v.trim().to_string();
                } else if let Some(v) = line.strip_prefix("TITLE:") {
                    commit.title = v.trim().to_string();
                } else if let Some(v) = line.strip_prefix("MESSAGE:") {
                    commit.message = v.trim().to_string();
                } else {
                    // Unmarked lines continue a multi-line message.
                    if !commit.message.is_empty() {
                        commit.message.push('\n');
                    }
                    commit.message.push_str(line.trim_end());
                }
            }
            ParseState::InDiff => {
                commit.changes.push_str(line);
                commit.changes.push('\n');
            }
        }
        None
    }

    pub fn finish(mut self) -> Option<RawCommit> {
        self.take()
    }

    fn take(&mut self) -> Option<RawCommit> {
        self.state = ParseState::BetweenCommits;
        let mut commit = self.current.take()?;
        // Blank separator lines before the next marker are not part of the diff.
        let kept = commit.changes.trim_end_matches('\n').len();
        commit.changes.truncate(kept);
        if kept > 0 {
            commit.changes.push('\n');
        }
        Some(commit)
    }
}

/// Parses a complete log; one record per `HASH:` line.
pub fn parse_log(text: &str) -> Vec<RawCommit> {
    let mut parser = LogParser::new();
    let mut commits: Vec<RawCommit> = text.lines().filter_map(|l| parser.feed(l)).collect();
    commits.extend(parser.finish());
    commits
}

// ── Extraction ─────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CommitStats {
    pub parsed: usize,
    pub inserted: usize,
    pub summarized: usize,
    pub cached: usize,
    /// Summaries that had to fall back to the changed-path list.
    pub fallbacks: usize,
}

/// Persists parsed commits and summarizes each for one backend.
pub struct CommitExtractor<'a> {
    store: &'a dyn Store,
    backend: &'a dyn Backend,
    repo: &'a str,
    stats: CommitStats,
}

impl<'a> CommitExtractor<'a> {
    pub fn new(store: &'a dyn Store, backend: &'a dyn Backend, repo: &'a str) -> Self {
        Self {
            store,
            backend,
            repo,
            stats: CommitStats::default(),
        }
    }

    pub fn stats(&self) -> CommitStats {
        self.stats
    }

    /// Stores `raw` if it is new, then summarizes it if this model has no
    /// summary for it yet.
    pub fn flush(&mut self, raw: RawCommit) -> Result<()> {
        self.stats.parsed += 1;
        if raw.id.is_empty() {
            tracing::warn!(repo = self.repo, "skipping commit without an id");
            return Ok(());
        }

        let commit = raw.into_record(self.repo);
        if !self.store.commit_exists(self.repo, &commit.id)? {
            self.store.insert_commit(&commit)?;
            self.stats.inserted += 1;
        }

        let model = self.backend.model();
        if self.store.commit_summary(self.repo, &commit.id, model)?.is_some() {
            tracing::debug!(repo = self.repo, commit = %commit.id, "commit summary cached");
            self.stats.cached += 1;
            return Ok(());
        }

        let summary = self.summarize(&commit)?;
        self.store
            .insert_commit_summary(self.repo, &commit.id, model, &summary)?;
        tracing::info!(repo = self.repo, commit = %commit.id, title = %commit.title, "summarized commit");
        self.stats.summarized += 1;
        Ok(())
    }

    fn summarize(&mut self, commit: &CommitRecord) -> Result<String> {
        let header = format!(
            "{COMMIT_PROMPT}\n\nTITLE: {}\nAUTHOR: {} <{}>\nDATE: {}\nMESSAGE: {}",
            commit.title, commit.author_name, commit.author_email, commit.date, commit.message
        );

        match ask(self.backend, &format!("{header}\n\nCHANGES:\n{}", commit.changes)) {
            Err(RepolensError::Backend { message, .. }) => {
                tracing::warn!(
                    repo = self.repo,
                    commit = %commit.id,
                    error = %message,
                    "commit summary failed, retrying with changed paths only"
                );
                self.stats.fallbacks += 1;
                let paths = changed_paths(&commit.changes).join("\n");
                ask(self.backend, &format!("{header}\n\nFILES CHANGED:\n{paths}"))
            }
            other => other,
        }
    }

    /// True when the commit is stored and summarized for this model.
    fn is_complete(&self, id: &str) -> Result<bool> {
        Ok(self.store.commit_exists(self.repo, id)?
            && self
                .store
                .commit_summary(self.repo, id, self.backend.model())?
                .is_some())
    }

    /// Walks the git history at `path`, rendering and flushing one commit at
    /// a time. Commits already summarized for this model are counted without
    /// building their diff. `None` when `path` has no history.
    pub fn extract_history(&mut self, path: &Path, filter: &FilterConfig) -> Result<Option<CommitStats>> {
        let visited = history::for_each_commit(path, filter, |commit| {
            let id = commit.id();
            if self.is_complete(&id)? {
                tracing::debug!(repo = self.repo, commit = %id, "commit summary cached");
                self.stats.parsed += 1;
                self.stats.cached += 1;
                return Ok(());
            }
            self.extract_text(&commit.render()?)?;
            Ok(())
        })?;
        Ok(visited.map(|_| self.stats))
    }

    /// Extracts every commit in an in-memory log.
    pub fn extract_text(&mut self, log: &str) -> Result<CommitStats> {
        let mut parser = LogParser::new();
        for line in log.lines() {
            if let Some(raw) = parser.feed(line) {
                self.flush(raw)?;
            }
        }
        if let Some(raw) = parser.finish() {
            self.flush(raw)?;
        }
        Ok(self.stats)
    }

    /// Streams a pre-exported log file. Invalid UTF-8 is replaced.
    pub fn extract_file(&mut self, path: &Path) -> Result<CommitStats> {
        let file = std::fs::File::open(path)?;
        let mut reader = std::io::BufReader::new(file);
        let mut parser = LogParser::new();
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            let line = line.strip_suffix('\n').unwrap_or(&line);
            let line = line.strip_suffix('\r').unwrap_or(line);
            if let Some(raw) = parser.feed(line) {
                self.flush(raw)?;
            }
        }
        if let Some(raw) = parser.finish() {
            self.flush(raw)?;
        }
        Ok(self.stats)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
