use std::collections::HashMap;
use std::path::{Path, PathBuf};

use repolens_types::{FilterConfig, RepolensError, Result, ROOT_FOLDER};
use walkdir::WalkDir;

/// One directory and its accepted direct children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderEntry {
    /// Path relative to the repository root, `/`-separated; `.` for the root.
    pub name: String,
    /// File names (not paths) accepted by the filter, sorted.
    pub files: Vec<String>,
    /// Relative paths of non-excluded subfolders, sorted.
    pub children: Vec<String>,
}

/// Path index of a repository, built once per traversal.
#[derive(Debug, Clone)]
pub struct RepoTree {
    pub root: PathBuf,
    /// Every folder in post-order: children always precede their parent and
    /// the root folder is last.
    pub folders: Vec<FolderEntry>,
}

impl RepoTree {
    pub fn file_path(&self, folder: &str, file: &str) -> PathBuf {
        if folder == ROOT_FOLDER {
            self.root.join(file)
        } else {
            self.root.join(folder).join(file)
        }
    }

    pub fn file_count(&self) -> usize {
        self.folders.iter().map(|f| f.files.len()).sum()
    }
}

fn relative_name(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        ROOT_FOLDER.to_string()
    } else {
        parts.join("/")
    }
}

fn parent_name(name: &str) -> String {
    match name.rsplit_once('/') {
        Some((parent, _)) => parent.to_string(),
        None => ROOT_FOLDER.to_string(),
    }
}

/// Walks `root` depth-first, children before parent, applying `filter`.
///
/// Excluded directories are never descended into. Symlinks are not followed.
pub fn walk(root: &Path, filter: &FilterConfig) -> Result<RepoTree> {
    if !root.is_dir() {
        return Err(RepolensError::Ingest(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    let mut pending: HashMap<String, FolderEntry> = HashMap::new();
    let mut folders = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .contents_first(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e.file_type().is_dir()
                || filter.accepts_dir(&e.file_name().to_string_lossy())
        });

    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        let name = relative_name(root, entry.path());

        if entry.file_type().is_dir() {
            let mut folder = pending.remove(&name).unwrap_or_default();
            folder.name = name.clone();
            folders.push(folder);
            if entry.depth() > 0 {
                pending.entry(parent_name(&name)).or_default().children.push(name);
            }
        } else if entry.file_type().is_file() {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if filter.accepts_file(&file_name) {
                pending.entry(parent_name(&name)).or_default().files.push(file_name);
            }
        }
    }

    tracing::debug!(root = %root.display(), folders = folders.len(), "walked repository");
    Ok(RepoTree {
        root: root.to_path_buf(),
        folders,
    })
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, "int x;\n").expect("write");
    }

    #[test]
    fn test_walk_post_order_and_filter() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        touch(root, "Makefile");
        touch(root, "README.md");
        touch(root, "src/job.c");
        touch(root, "src/job.h");
        touch(root, "src/backend/worker.c");
        touch(root, "node_modules/dep/index.js");
        touch(root, "docs/notes.txt");

        let tree = walk(root, &FilterConfig::default()).expect("walk");
        let names: Vec<&str> = tree.folders.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["docs", "src/backend", "src", "."]);

        let src = &tree.folders[2];
        assert_eq!(src.files, vec!["job.c", "job.h"]);
        assert_eq!(src.children, vec!["src/backend"]);

        let top = &tree.folders[3];
        assert_eq!(top.files, vec!["Makefile"]);
        assert_eq!(top.children, vec!["docs", "src"]);
        assert!(tree.folders[0].files.is_empty(), "README/notes are not code");

        assert_eq!(tree.file_count(), 4);
        assert_eq!(tree.file_path("src", "job.c"), root.join("src").join("job.c"));
        assert_eq!(tree.file_path(".", "Makefile"), root.join("Makefile"));
    }

    #[test]
    fn test_walk_rejects_missing_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(walk(&dir.path().join("missing"), &FilterConfig::default()).is_err());
    }
}
