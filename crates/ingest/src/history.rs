use std::path::Path;

use chrono::{DateTime, FixedOffset};
use repolens_types::{FilterConfig, RepolensError, Result};

use crate::patch;

fn ingest_err(e: git2::Error) -> RepolensError {
    RepolensError::Ingest(e.message().to_string())
}

/// RFC 2822 date in the author's own offset.
fn format_time(time: git2::Time) -> String {
    let offset = FixedOffset::east_opt(time.offset_minutes() * 60)
        .or_else(|| FixedOffset::east_opt(0));
    match (DateTime::from_timestamp(time.seconds(), 0), offset) {
        (Some(utc), Some(offset)) => utc.with_timezone(&offset).to_rfc2822(),
        _ => time.seconds().to_string(),
    }
}

fn one_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// A commit reachable from HEAD. Its log text, diff included, is only built
/// by [`HistoryCommit::render`].
pub struct HistoryCommit<'r> {
    repo: &'r git2::Repository,
    commit: git2::Commit<'r>,
    filter: &'r FilterConfig,
}

impl HistoryCommit<'_> {
    pub fn id(&self) -> String {
        self.commit.id().to_string()
    }

    /// The commit in log format: the field block, a blank line, the diff.
    pub fn render(&self) -> Result<String> {
        let author = self.commit.author();
        let diff = patch::diff_text(self.repo, &self.commit, self.filter)?;

        let mut out = format!(
            "HASH: {}\nAUTHOR_NAME: {}\nAUTHOR_EMAIL: {}\nDATE: {}\nTITLE: {}\nMESSAGE: {}\n\n",
            self.commit.id(),
            author.name().unwrap_or(""),
            author.email().unwrap_or(""),
            format_time(author.when()),
            one_line(self.commit.summary().unwrap_or("")),
            one_line(self.commit.body().unwrap_or("")),
        );
        out.push_str(&diff);
        if !diff.is_empty() && !diff.ends_with('\n') {
            out.push('\n');
        }
        Ok(out)
    }
}

/// Visits the history reachable from HEAD, newest first, one commit at a
/// time. Returns the number of commits visited.
///
/// Returns `None` (with a warning) when `path` is not a git repository or has
/// no commits yet.
pub fn for_each_commit<F>(path: &Path, filter: &FilterConfig, mut visit: F) -> Result<Option<usize>>
where
    F: FnMut(&HistoryCommit<'_>) -> Result<()>,
{
    let repo = match git2::Repository::open(path) {
        Ok(repo) => repo,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e.message(), "not a git repository, skipping history");
            return Ok(None);
        }
    };

    let mut revwalk = repo.revwalk().map_err(ingest_err)?;
    if let Err(e) = revwalk.push_head() {
        tracing::warn!(path = %path.display(), error = %e.message(), "no HEAD, skipping history");
        return Ok(None);
    }
    revwalk.set_sorting(git2::Sort::TIME).map_err(ingest_err)?;

    let mut count = 0usize;
    for oid in revwalk {
        let oid = oid.map_err(ingest_err)?;
        let commit = HistoryCommit {
            repo: &repo,
            commit: repo.find_commit(oid).map_err(ingest_err)?,
            filter,
        };
        visit(&commit)?;
        count += 1;
    }

    tracing::info!(path = %path.display(), commits = count, "walked history");
    Ok(Some(count))
}

/// Exports the whole history as one delimited log, newest first.
pub fn export_log(path: &Path, filter: &FilterConfig) -> Result<Option<String>> {
    let mut out = String::new();
    let visited = for_each_commit(path, filter, |commit| {
        out.push_str(&commit.render()?);
        Ok(())
    })?;
    Ok(visited.map(|_| out))
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commits::parse_log;
    use crate::test_support::commit_file;

    #[test]
    fn test_export_newest_first_with_diffs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = git2::Repository::init(dir.path()).expect("git init");
        let first = commit_file(&repo, "src/job.c", "int a;\n", "Add job\n\nFirst line.\nSecond line.", 1_000_000);
        let second = commit_file(&repo, "src/job.c", "int b;\n", "Rename variable", 2_000_000);

        let log = export_log(dir.path(), &FilterConfig::default())
            .expect("export")
            .expect("history present");
        let commits = parse_log(&log);
        assert_eq!(commits.len(), 2);

        assert_eq!(commits[0].id, second.to_string());
        assert_eq!(commits[0].title, "Rename variable");
        assert!(commits[0].changes.contains("-int a;"));
        assert!(commits[0].changes.contains("+int b;"));

        assert_eq!(commits[1].id, first.to_string());
        assert_eq!(commits[1].message, "First line. Second line.");
        assert_eq!(commits[1].author_email, "alice@example.com");
        assert!(commits[1].date.ends_with("+0200"), "author offset kept: {}", commits[1].date);
        assert!(commits[1].changes.starts_with("diff --git a/src/job.c b/src/job.c"));
    }

    #[test]
    fn test_excluded_paths_left_out() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = git2::Repository::init(dir.path()).expect("git init");
        commit_file(&repo, "node_modules/dep.js", "x\n", "Vendor", 1_000_000);
        commit_file(&repo, "src/main.c", "int main;\n", "Main", 1_000_100);

        let log = export_log(dir.path(), &FilterConfig::default()).unwrap().unwrap();
        assert!(!log.contains("node_modules/dep.js"));
        assert!(log.contains("src/main.c"));
    }

    #[test]
    fn test_non_utf8_lines_kept() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = git2::Repository::init(dir.path()).expect("git init");
        let path = dir.path().join("src/legacy.c");
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, b"/* caf\xe9 */\nint ok;\n").expect("write latin-1");
        let mut index = repo.index().expect("index");
        index.add_path(Path::new("src/legacy.c")).expect("add path");
        index.write().expect("write index");
        let tree = repo.find_tree(index.write_tree().expect("write tree")).expect("tree");
        let sig = git2::Signature::now("Alice", "alice@example.com").expect("sig");
        repo.commit(Some("HEAD"), &sig, &sig, "Add legacy file", &tree, &[])
            .expect("commit");

        let log = export_log(dir.path(), &FilterConfig::default()).unwrap().unwrap();
        let commits = parse_log(&log);
        assert_eq!(commits.len(), 1);
        let changes = &commits[0].changes;
        assert!(changes.contains("@@ -0,0 +1,2 @@\n+/* caf\u{FFFD} */\n+int ok;\n"), "{changes:?}");
    }

    #[test]
    fn test_visit_renders_on_demand() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = git2::Repository::init(dir.path()).expect("git init");
        let first = commit_file(&repo, "src/a.c", "int a;\n", "First", 1_000_000);
        let second = commit_file(&repo, "src/b.c", "int b;\n", "Second", 2_000_000);

        let mut seen = Vec::new();
        let mut rendered = Vec::new();
        let visited = for_each_commit(dir.path(), &FilterConfig::default(), |commit| {
            seen.push(commit.id());
            if commit.id() == first.to_string() {
                rendered.push(commit.render()?);
            }
            Ok(())
        })
        .unwrap();

        assert_eq!(visited, Some(2));
        assert_eq!(seen, vec![second.to_string(), first.to_string()]);
        assert_eq!(rendered.len(), 1);
        let commits = parse_log(&rendered[0]);
        assert_eq!(commits.len(), 1, "one commit per render");
        assert_eq!(commits[0].title, "First");
        assert!(commits[0].changes.contains("+int a;"));
        assert!(!rendered[0].contains("src/b.c"));
    }

    #[test]
    fn test_visit_error_stops_walk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = git2::Repository::init(dir.path()).expect("git init");
        commit_file(&repo, "src/a.c", "int a;\n", "First", 1_000_000);
        commit_file(&repo, "src/b.c", "int b;\n", "Second", 2_000_000);

        let mut calls = 0;
        let err = for_each_commit(dir.path(), &FilterConfig::default(), |_| {
            calls += 1;
            Err(RepolensError::Ingest("stop".into()))
        })
        .unwrap_err();
        assert!(matches!(err, RepolensError::Ingest(m) if m == "stop"));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_not_a_repository() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(export_log(dir.path(), &FilterConfig::default()).unwrap().is_none());
    }

    #[test]
    fn test_empty_repository() {
        let dir = tempfile::tempdir().expect("tempdir");
        git2::Repository::init(dir.path()).expect("git init");
        assert!(export_log(dir.path(), &FilterConfig::default()).unwrap().is_none());
    }

    #[test]
    fn test_format_time_uses_offset() {
        let formatted = format_time(git2::Time::new(0, -300));
        assert_eq!(formatted, "Wed, 31 Dec 1969 19:00:00 -0500");
    }
}
