use repolens_types::{FilterConfig, RepolensError, Result};

fn ingest_err(e: git2::Error) -> RepolensError {
    RepolensError::Ingest(e.message().to_string())
}

/// Unified diff of `commit` against its first parent (or the empty tree for a
/// root commit).
///
/// Binary deltas and paths inside excluded directories are skipped; output
/// stops growing once it would exceed `filter.max_diff_bytes`.
pub fn diff_text(
    repo: &git2::Repository,
    commit: &git2::Commit,
    filter: &FilterConfig,
) -> Result<String> {
    let parent_tree = if commit.parent_count() > 0 {
        Some(commit.parent(0).map_err(ingest_err)?.tree().map_err(ingest_err)?)
    } else {
        None
    };
    let commit_tree = commit.tree().map_err(ingest_err)?;
    let diff = repo
        .diff_tree_to_tree(parent_tree.as_ref(), Some(&commit_tree), None)
        .map_err(ingest_err)?;

    let max_bytes = filter.max_diff_bytes;
    let mut text = String::new();
    let mut truncated = false;

    diff.print(git2::DiffFormat::Patch, |delta, _hunk, line| {
        if truncated || delta.new_file().is_binary() || delta.old_file().is_binary() {
            return true;
        }

        let excluded = delta
            .new_file()
            .path()
            .or_else(|| delta.old_file().path())
            .and_then(|p| p.to_str())
            .map(|s| filter.excludes_path(s))
            .unwrap_or(false);
        if excluded {
            return true;
        }

        let content = String::from_utf8_lossy(line.content());
        let origin = line.origin();
        let prefix_len = usize::from(matches!(origin, '+' | '-' | ' '));
        if text.len() + prefix_len + content.len() > max_bytes {
            truncated = true;
            return true;
        }
        if prefix_len == 1 {
            text.push(origin);
        }
        text.push_str(&content);
        true
    })
    .map_err(ingest_err)?;

    if truncated {
        tracing::debug!(commit = %commit.id(), max_bytes, "diff truncated");
    }
    Ok(text)
}

fn push_unique(paths: &mut Vec<String>, path: &str) {
    let path = path.trim();
    if !path.is_empty() && path != "/dev/null" && !paths.iter().any(|p| p == path) {
        paths.push(path.to_string());
    }
}

/// Paths touched by a unified diff, in order of first appearance.
///
/// `diff --git a/x b/y` headers are the primary source; `---`/`+++` lines
/// fill in for diffs without them. `/dev/null` is never a path.
pub fn changed_paths(diff: &str) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();

    let mut saw_header = false;
    for line in diff.lines() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            saw_header = true;
            match rest.split_once(" b/") {
                Some((old, new)) => {
                    push_unique(&mut paths, old.strip_prefix("a/").unwrap_or(old));
                    push_unique(&mut paths, new);
                }
                None => push_unique(&mut paths, rest),
            }
        }
    }
    if saw_header {
        return paths;
    }

    for line in diff.lines() {
        let Some(path) = line
            .strip_prefix("+++ ")
            .or_else(|| line.strip_prefix("--- "))
        else {
            continue;
        };
        let path = path.split('\t').next().unwrap_or(path);
        push_unique(
            &mut paths,
            path.strip_prefix("a/")
                .or_else(|| path.strip_prefix("b/"))
                .unwrap_or(path),
        );
    }
    paths
}

// ── Tests ──────────────────────────────────────────────────────────────────
