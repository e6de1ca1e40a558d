use std::path::{Path, PathBuf};

use repolens_types::{Backend, FilterConfig, Result, Store};

use crate::commits::{CommitExtractor, CommitStats};
use crate::summarize::{SummarizeStats, Summarizer};
use crate::tree;

#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub filter: FilterConfig,
    /// Pre-exported commit log; when unset history is walked with git.
    pub log_file: Option<PathBuf>,
    /// Overrides the combine threshold derived from the context window.
    pub batch_size: Option<usize>,
    pub include_history: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            filter: FilterConfig::default(),
            log_file: None,
            batch_size: None,
            include_history: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompileSummary {
    pub repo: String,
    pub model: String,
    /// The repository was already compiled for this model; nothing ran.
    pub already_compiled: bool,
    pub commits: CommitStats,
    pub tree: SummarizeStats,
    pub repo_summary: Option<String>,
}

/// Compiles `repo_path` into the store under `repo_name` for one backend.
///
/// Commits are extracted first, then the tree is summarized bottom-up, and
/// the repository row is written last. A repository that already has its row
/// for this backend's model is left untouched.
pub fn compile(
    store: &dyn Store,
    backend: &dyn Backend,
    repo_name: &str,
    repo_path: &Path,
    opts: &CompileOptions,
) -> Result<CompileSummary> {
    let model = backend.model();
    let mut summary = CompileSummary {
        repo: repo_name.to_string(),
        model: model.to_string(),
        ..CompileSummary::default()
    };

    if let Some(existing) = store.repo_summary(repo_name, model)? {
        tracing::info!(repo = repo_name, model, "repository already compiled, skipping");
        summary.already_compiled = true;
        summary.repo_summary = Some(existing);
        return Ok(summary);
    }

    let mut extractor = CommitExtractor::new(store, backend, repo_name);
    summary.commits = match &opts.log_file {
        Some(log_file) => extractor.extract_file(log_file)?,
        None if opts.include_history => extractor
            .extract_history(repo_path, &opts.filter)?
            .unwrap_or_default(),
        None => CommitStats::default(),
    };

    let tree = tree::walk(repo_path, &opts.filter)?;
    tracing::info!(
        repo = repo_name,
        folders = tree.folders.len(),
        files = tree.file_count(),
        "walked repository"
    );

    let mut summarizer = Summarizer::new(store, backend, repo_name);
    if let Some(batch_size) = opts.batch_size {
        summarizer = summarizer.with_batch_size(batch_size);
    }
    summary.repo_summary = summarizer.summarize_repo(&tree)?;
    summary.tree = summarizer.stats();

    Ok(summary)
}

// ── Tests ──────────────────────────────────────────────────────────────────
