use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ── Error ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RepolensError {
    #[cfg(feature = "rusqlite-errors")]
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
    #[cfg(feature = "git2-errors")]
    #[error("git error: {0}")]
    Git(#[from] git2::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown provider '{0}' (expected 'openai' or 'ubicloud')")]
    UnknownProvider(String),
    #[error("unknown context type '{0}' (expected 'folders', 'files' or 'commits')")]
    InvalidContextType(String),
    #[error("no backend configured for provider '{0}'")]
    BackendMissing(Provider),
    #[error("empty completion from {model}")]
    EmptyCompletion { model: String },
    #[error("backend error from {model}: {message}")]
    Backend { model: String, message: String },
    #[error("ingest error: {0}")]
    Ingest(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, RepolensError>;

// ── Providers ─────────────────────────────────────────────────────────────

/// One of the two supported embedding + completion pairings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Ubicloud,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::OpenAi, Provider::Ubicloud];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Ubicloud => "ubicloud",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = RepolensError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "ubicloud" => Ok(Provider::Ubicloud),
            _ => Err(RepolensError::UnknownProvider(s.to_string())),
        }
    }
}

// ── Context granularities ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextType {
    Folders,
    Files,
    Commits,
}

impl ContextType {
    /// Retrieval order used when assembling prompts.
    pub const ALL: [ContextType; 3] = [ContextType::Folders, ContextType::Files, ContextType::Commits];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContextType::Folders => "folders",
            ContextType::Files => "files",
            ContextType::Commits => "commits",
        }
    }
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContextType {
    type Err = RepolensError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "folders" => Ok(ContextType::Folders),
            "files" => Ok(ContextType::Files),
            "commits" => Ok(ContextType::Commits),
            _ => Err(RepolensError::InvalidContextType(s.to_string())),
        }
    }
}

// ── Domain types ──────────────────────────────────────────────────────────

/// Folder name used for the repository root.
pub const ROOT_FOLDER: &str = ".";

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RepoRecord {
    pub name: String,
    pub model: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FolderRecord {
    /// Path relative to the repository root, `.` for the root itself.
    pub name: String,
    pub repo: String,
    pub model: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FileRecord {
    pub name: String,
    pub folder: String,
    pub repo: String,
    pub model: String,
    pub code: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CommitRecord {
    pub repo: String,
    pub id: String,
    pub author_name: String,
    pub author_email: String,
    pub date: String,
    pub title: String,
    pub message: String,
    pub changes: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CommitSummary {
    pub model: String,
    pub summary: String,
}

/// Identifies a summarized entity within one repository and model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
    Repo,
    Folder { name: String },
    File { name: String, folder: String },
    Commit { id: String },
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Repo => f.write_str("repo"),
            EntityRef::Folder { name } => write!(f, "folder {name}"),
            EntityRef::File { name, folder } => write!(f, "file {folder}/{name}"),
            EntityRef::Commit { id } => write!(f, "commit {id}"),
        }
    }
}

/// A stored summary that has no embedding yet.
#[derive(Debug, Clone)]
pub struct PendingEmbedding {
    pub entity: EntityRef,
    pub summary: String,
}

// ── Retrieval results ─────────────────────────────────────────────────────

#[derive(Debug, Clone, serde::Serialize)]
pub struct FolderHit {
    pub name: String,
    pub summary: String,
    pub distance: f64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct FileHit {
    pub name: String,
    pub folder: String,
    pub summary: String,
    pub distance: f64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CommitHit {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub distance: f64,
}

// ── Config ────────────────────────────────────────────────────────────────

/// Which entries of a repository are compiled.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    pub extensions: Vec<String>,
    pub file_names: Vec<String>,
    pub excluded_dirs: Vec<String>,
    pub max_diff_bytes: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            extensions: ["rb", "c", "cpp", "rs", "cc", "h", "py", "hpp", "go", "js", "ts", "java", "sql"]
                .into_iter()
                .map(String::from)
                .collect(),
            file_names: ["Makefile", "CMakeLists.txt", "Dockerfile"]
                .into_iter()
                .map(String::from)
                .collect(),
            excluded_dirs: [".git", "node_modules", "vendor", "dist", "target", "build", "__pycache__"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_diff_bytes: 1_048_576,
        }
    }
}

impl FilterConfig {
    pub fn accepts_file(&self, file_name: &str) -> bool {
        if self.file_names.iter().any(|n| n == file_name) {
            return true;
        }
        match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => self.extensions.iter().any(|e| e == ext),
            _ => false,
        }
    }

    pub fn accepts_dir(&self, dir_name: &str) -> bool {
        !self.excluded_dirs.iter().any(|d| d == dir_name)
    }

    /// True when any directory component of a repo-relative path is excluded.
    pub fn excludes_path(&self, path: &str) -> bool {
        let mut parts: Vec<&str> = path.split('/').collect();
        parts.pop();
        parts.iter().any(|p| !self.accepts_dir(p))
    }
}

// ── Admin types ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, serde::Serialize)]
pub struct RepoStats {
    pub repo: String,
    pub model: String,
    pub compiled: bool,
    pub folders: usize,
    pub files: usize,
    pub commits: usize,
    pub missing_embeddings: usize,
}

// ── Core traits ───────────────────────────────────────────────────────────

pub trait Store: Send + Sync {
    // Repositories
    fn repo_summary(&self, repo: &str, model: &str) -> Result<Option<String>>;
    fn insert_repo(&self, repo: &RepoRecord) -> Result<()>;
    fn list_repos(&self) -> Result<Vec<RepoRecord>>;

    // Folders and files
    fn folder_summary(&self, repo: &str, name: &str, model: &str) -> Result<Option<String>>;
    fn insert_folder(&self, folder: &FolderRecord) -> Result<()>;
    /// Folders at depth <= 1 below the root, root excluded.
    fn top_level_folders(&self, repo: &str, model: &str) -> Result<Vec<FolderRecord>>;
    fn file_summary(&self, repo: &str, folder: &str, name: &str, model: &str) -> Result<Option<String>>;
    fn insert_file(&self, file: &FileRecord) -> Result<()>;
    /// Files in `folder` or any folder beneath it.
    fn files_under(&self, repo: &str, folder: &str, model: &str) -> Result<Vec<FileRecord>>;

    // Commits
    fn commit_exists(&self, repo: &str, id: &str) -> Result<bool>;
    fn insert_commit(&self, commit: &CommitRecord) -> Result<()>;
    fn get_commit(&self, repo: &str, id: &str) -> Result<Option<CommitRecord>>;
    fn commit_summary(&self, repo: &str, id: &str, model: &str) -> Result<Option<String>>;
    fn commit_summaries(&self, repo: &str, id: &str) -> Result<Vec<CommitSummary>>;
    fn insert_commit_summary(&self, repo: &str, id: &str, model: &str, summary: &str) -> Result<()>;

    // Embeddings
    fn pending_embeddings(&self, repo: &str, model: &str) -> Result<Vec<PendingEmbedding>>;
    fn store_embedding(&self, repo: &str, model: &str, entity: &EntityRef, embedding: &[f32]) -> Result<()>;

    // Retrieval, nearest first
    fn nearest_folders(&self, repo: &str, model: &str, embedding: &[f32], limit: usize) -> Result<Vec<FolderHit>>;
    fn nearest_files(&self, repo: &str, model: &str, embedding: &[f32], limit: usize) -> Result<Vec<FileHit>>;
    fn nearest_commits(&self, repo: &str, model: &str, embedding: &[f32], limit: usize) -> Result<Vec<CommitHit>>;

    // Admin
    fn repo_stats(&self, repo: &str) -> Result<Vec<RepoStats>>;
    fn get_config(&self, key: &str) -> Result<Option<String>>;
    fn set_config(&self, key: &str, value: &str) -> Result<()>;
}

/// Embedding + completion capability of one provider.
///
/// Calls are blocking round trips. `model` is the completion model name and
/// partitions every stored summary and vector.
pub trait Backend {
    fn model(&self) -> &str;
    /// Budget in characters for a single prompt body.
    fn context_window(&self) -> usize;
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
    fn complete(&self, prompt: &str) -> Result<String>;
    /// Completion constrained to a JSON object where the provider supports
    /// it; plain [`Backend::complete`] otherwise.
    fn complete_json_object(&self, prompt: &str) -> Result<String> {
        self.complete(prompt)
    }
}

/// The configured backend for each provider.
#[derive(Default)]
pub struct Backends {
    entries: Vec<(Provider, Box<dyn Backend>)>,
}

impl Backends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: Provider, backend: Box<dyn Backend>) -> Self {
        self.insert(provider, backend);
        self
    }

    pub fn insert(&mut self, provider: Provider, backend: Box<dyn Backend>) {
        self.entries.retain(|(p, _)| *p != provider);
        self.entries.push((provider, backend));
    }

    pub fn get(&self, provider: Provider) -> Result<&dyn Backend> {
        self.entries
            .iter()
            .find(|(p, _)| *p == provider)
            .map(|(_, b)| b.as_ref())
            .ok_or(RepolensError::BackendMissing(provider))
    }

    /// Validates a provider name and returns its backend.
    pub fn resolve(&self, name: &str) -> Result<(Provider, &dyn Backend)> {
        let provider: Provider = name.parse()?;
        Ok((provider, self.get(provider)?))
    }

    pub fn providers(&self) -> impl Iterator<Item = Provider> + '_ {
        self.entries.iter().map(|(p, _)| *p)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedBackend(&'static str);

    impl Backend for FixedBackend {
        fn model(&self) -> &str {
            self.0
        }
        fn context_window(&self) -> usize {
            1000
        }
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.0; 4])
        }
        fn complete(&self, _prompt: &str) -> Result<String> {
            Ok("ok".into())
        }
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!("openai".parse::<Provider>().unwrap(), Provider::OpenAi);
        assert_eq!(" Ubicloud ".parse::<Provider>().unwrap(), Provider::Ubicloud);
        let err = "anthropic".parse::<Provider>().unwrap_err();
        assert!(matches!(err, RepolensError::UnknownProvider(ref p) if p == "anthropic"));
    }

    #[test]
    fn test_provider_serializes_lowercase() {
        let json = serde_json::to_string(&Provider::OpenAi).expect("serialize");
        assert_eq!(json, "\"openai\"");
        let back: Provider = serde_json::from_str("\"ubicloud\"").expect("deserialize");
        assert_eq!(back, Provider::Ubicloud);
    }

    #[test]
    fn test_context_type_parse() {
        assert_eq!("files".parse::<ContextType>().unwrap(), ContextType::Files);
        assert!(matches!(
            "components".parse::<ContextType>(),
            Err(RepolensError::InvalidContextType(_))
        ));
        assert_eq!(
            ContextType::ALL.map(|c| c.as_str()),
            ["folders", "files", "commits"]
        );
    }

    #[test]
    fn test_filter_accepts_by_extension_and_name() {
        let filter = FilterConfig::default();
        assert!(filter.accepts_file("main.rs"));
        assert!(filter.accepts_file("pg_cron.c"));
        assert!(filter.accepts_file("Makefile"));
        assert!(!filter.accepts_file("README.md"));
        assert!(!filter.accepts_file(".rs"));
        assert!(!filter.accepts_file("LICENSE"));
        assert!(filter.accepts_dir("src"));
        assert!(!filter.accepts_dir("node_modules"));
    }

    #[test]
    fn test_filter_excludes_nested_paths() {
        let filter = FilterConfig::default();
        assert!(filter.excludes_path("vendor/lib/a.c"));
        assert!(filter.excludes_path("web/node_modules/x.js"));
        assert!(!filter.excludes_path("src/vendor.rs"));
        assert!(!filter.excludes_path("main.rs"));
    }

    #[test]
    fn test_backends_resolve() {
        let backends = Backends::new().with(Provider::OpenAi, Box::new(FixedBackend("gpt")));
        let (provider, backend) = backends.resolve("openai").expect("resolve openai");
        assert_eq!(provider, Provider::OpenAi);
        assert_eq!(backend.model(), "gpt");

        assert!(matches!(
            backends.resolve("ubicloud"),
            Err(RepolensError::BackendMissing(Provider::Ubicloud))
        ));
        assert!(matches!(
            backends.resolve("bogus"),
            Err(RepolensError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_backends_insert_replaces() {
        let mut backends = Backends::new();
        backends.insert(Provider::Ubicloud, Box::new(FixedBackend("a")));
        backends.insert(Provider::Ubicloud, Box::new(FixedBackend("b")));
        assert_eq!(backends.providers().count(), 1);
        assert_eq!(backends.get(Provider::Ubicloud).unwrap().model(), "b");
    }
}
