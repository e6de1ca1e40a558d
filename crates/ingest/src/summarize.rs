use repolens_llm::ask;
use repolens_types::{Backend, FileRecord, FolderRecord, RepoRecord, Result, Store};

use crate::chunk::chunk_text;
use crate::tree::{FolderEntry, RepoTree};

const FILE_PROMPT: &str = "Here is some code. Summarize what the code does.";
const FILE_SUMMARIES_PROMPT: &str =
    "Here are multiple summaries of sections of a file. Summarize what the code does.";
const FOLDER_PROMPT: &str = "Here are the summaries of the files and subfolders in this folder. \
                             Summarize what the folder does.";
const FOLDER_SUMMARIES_PROMPT: &str = "Here are multiple summaries of the files and subfolders in \
                                       this folder. Summarize what the folder does.";
const REPO_PROMPT: &str = "Here are the summaries of the folders in this repository. \
                           Summarize what the repository does.";

/// Rough size of one stored summary, used to size combine batches.
pub const AVERAGE_SUMMARY_CHARS: usize = 400;

/// At most this many section summaries are combined into a file summary.
pub const MAX_SECTION_SUMMARIES: usize = 10;

/// Combine threshold for a context window of `context_window` characters.
pub fn batch_size_for(context_window: usize) -> usize {
    (context_window / AVERAGE_SUMMARY_CHARS).max(1)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SummarizeStats {
    pub files_summarized: usize,
    pub files_cached: usize,
    pub folders_summarized: usize,
    pub folders_cached: usize,
    /// Completion calls issued.
    pub calls: usize,
}

/// Bottom-up summarizer for one repository and one backend.
///
/// Every entity is looked up in the store first; a stored summary is returned
/// as is and costs no backend call. New summaries are written immediately.
pub struct Summarizer<'a> {
    store: &'a dyn Store,
    backend: &'a dyn Backend,
    repo: &'a str,
    batch_size: usize,
    stats: SummarizeStats,
}

impl<'a> Summarizer<'a> {
    pub fn new(store: &'a dyn Store, backend: &'a dyn Backend, repo: &'a str) -> Self {
        Self {
            store,
            backend,
            repo,
            batch_size: batch_size_for(backend.context_window()),
            stats: SummarizeStats::default(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn stats(&self) -> SummarizeStats {
        self.stats
    }

    fn ask(&mut self, prompt: &str) -> Result<String> {
        self.stats.calls += 1;
        ask(self.backend, prompt)
    }

    /// Summarizes `file` in `folder`, reading it from disk only on a cache miss.
    pub fn summarize_file(&mut self, tree: &RepoTree, folder: &str, file: &str) -> Result<String> {
        let model = self.backend.model();
        if let Some(summary) = self.store.file_summary(self.repo, folder, file, model)? {
            tracing::debug!(repo = self.repo, folder, file, "file summary cached");
            self.stats.files_cached += 1;
            return Ok(summary);
        }

        let bytes = std::fs::read(tree.file_path(folder, file))?;
        let code = String::from_utf8_lossy(&bytes).into_owned();
        let chunks = chunk_text(&code, self.backend.context_window());

        let summary = if chunks.len() == 1 {
            self.ask(&format!("{FILE_PROMPT}\n\nFile: {file}\n\n{}", chunks[0]))?
        } else {
            let mut sections = Vec::with_capacity(chunks.len());
            for chunk in &chunks {
                sections.push(self.ask(&format!("{FILE_PROMPT}\n\nFile: {file}\n\n{chunk}"))?);
            }
            sections.truncate(MAX_SECTION_SUMMARIES);
            self.ask(&format!(
                "{FILE_SUMMARIES_PROMPT}\n\nFile: {file}\n\n{}",
                sections.join("\n")
            ))?
        };

        self.store.insert_file(&FileRecord {
            name: file.to_string(),
            folder: folder.to_string(),
            repo: self.repo.to_string(),
            model: model.to_string(),
            code,
            summary: summary.clone(),
        })?;
        tracing::info!(repo = self.repo, folder, file, chunks = chunks.len(), "summarized file");
        self.stats.files_summarized += 1;
        Ok(summary)
    }

    /// Summarizes one folder from its files and its already stored subfolders.
    ///
    /// Returns `None`, and writes nothing, when there is nothing to summarize.
    pub fn summarize_folder(&mut self, tree: &RepoTree, entry: &FolderEntry) -> Result<Option<String>> {
        let model = self.backend.model();
        if let Some(summary) = self.store.folder_summary(self.repo, &entry.name, model)? {
            tracing::debug!(repo = self.repo, folder = %entry.name, "folder summary cached");
            self.stats.folders_cached += 1;
            return Ok(Some(summary));
        }

        let mut summaries = Vec::new();
        for file in &entry.files {
            summaries.push(self.summarize_file(tree, &entry.name, file)?);
        }
        for child in &entry.children {
            if let Some(summary) = self.store.folder_summary(self.repo, child, model)? {
                if !summary.is_empty() {
                    summaries.push(summary);
                }
            }
        }

        if summaries.is_empty() {
            tracing::debug!(repo = self.repo, folder = %entry.name, "nothing to summarize");
            return Ok(None);
        }

        let summary = self.combine(FOLDER_PROMPT, FOLDER_SUMMARIES_PROMPT, &summaries)?;
        self.store.insert_folder(&FolderRecord {
            name: entry.name.clone(),
            repo: self.repo.to_string(),
            model: model.to_string(),
            summary: summary.clone(),
        })?;
        tracing::info!(repo = self.repo, folder = %entry.name, inputs = summaries.len(), "summarized folder");
        self.stats.folders_summarized += 1;
        Ok(Some(summary))
    }

    /// Summarizes every folder in post-order and returns the non-empty
    /// folder summaries in that order.
    pub fn summarize_tree(&mut self, tree: &RepoTree) -> Result<Vec<String>> {
        let mut summaries = Vec::new();
        for entry in &tree.folders {
            if let Some(summary) = self.summarize_folder(tree, entry)? {
                summaries.push(summary);
            }
        }
        Ok(summaries)
    }

    /// Summarizes the tree, then the repository from its folder summaries.
    ///
    /// The repository row is written last. Returns `None` when the tree holds
    /// no summarizable files.
    pub fn summarize_repo(&mut self, tree: &RepoTree) -> Result<Option<String>> {
        let model = self.backend.model();
        if let Some(summary) = self.store.repo_summary(self.repo, model)? {
            return Ok(Some(summary));
        }

        let folder_summaries = self.summarize_tree(tree)?;
        if folder_summaries.is_empty() {
            tracing::warn!(repo = self.repo, root = %tree.root.display(), "no valid files found, skipping repository summary");
            return Ok(None);
        }

        let summary = self.combine(REPO_PROMPT, REPO_PROMPT, &folder_summaries)?;
        self.store.insert_repo(&RepoRecord {
            name: self.repo.to_string(),
            model: model.to_string(),
            summary: summary.clone(),
        })?;
        tracing::info!(repo = self.repo, model, folders = folder_summaries.len(), "summarized repository");
        Ok(Some(summary))
    }

    /// One call for up to `batch_size` summaries; otherwise one call per batch
    /// and a final call over the batch results.
    fn combine(&mut self, prompt: &str, batches_prompt: &str, summaries: &[String]) -> Result<String> {
        if summaries.len() <= self.batch_size {
            return self.ask(&format!("{prompt}\n\n{}", summaries.join("\n")));
        }

        let mut partials = Vec::new();
        for batch in summaries.chunks(self.batch_size) {
            partials.push(self.ask(&format!("{prompt}\n\n{}", batch.join("\n")))?);
        }
        self.ask(&format!("{batches_prompt}\n\n{}", partials.join("\n")))
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
