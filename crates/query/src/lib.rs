//! Question answering over a compiled repository.
//!
//! The question is embedded with the chosen provider, the nearest stored
//! summaries are retrieved per granularity (folders, files, commits, in that
//! order), and the assembled prompt goes to the same provider's completion
//! model. Nothing is written to the store.

pub mod context;

use repolens_types::{Backend, Backends, ContextType, Result, Store};
use serde::{Deserialize, Serialize};

pub use context::{build_prompt, ContextBlock};

pub const DEFAULT_TOP_K: usize = 5;

fn default_context_types() -> Vec<ContextType> {
    ContextType::ALL.to_vec()
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

/// Retrieval options for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOpts {
    #[serde(default = "default_context_types")]
    pub context_types: Vec<ContextType>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for QueryOpts {
    fn default() -> Self {
        Self {
            context_types: default_context_types(),
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl QueryOpts {
    /// Parses granularity names such as `folders` or `files`.
    pub fn with_context_names<S: AsRef<str>>(mut self, names: &[S]) -> Result<Self> {
        self.context_types = names
            .iter()
            .map(|n| n.as_ref().parse())
            .collect::<Result<Vec<ContextType>>>()?;
        Ok(self)
    }

    fn wants(&self, context_type: ContextType) -> bool {
        self.context_types.contains(&context_type)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub prompt: String,
}

pub struct QueryEngine<'a> {
    store: &'a dyn Store,
    backends: &'a Backends,
}

impl<'a> QueryEngine<'a> {
    pub fn new(store: &'a dyn Store, backends: &'a Backends) -> Self {
        Self { store, backends }
    }

    /// Nearest summaries for `question`, folders first, then files, then commits.
    pub fn retrieve(
        &self,
        backend: &dyn Backend,
        repo: &str,
        question: &str,
        opts: &QueryOpts,
    ) -> Result<Vec<ContextBlock>> {
        if opts.context_types.is_empty() {
            return Ok(Vec::new());
        }

        let model = backend.model();
        let embedding = backend.embed(question)?;
        let mut blocks = Vec::new();

        for context_type in ContextType::ALL {
            if !opts.wants(context_type) {
                continue;
            }
            let before = blocks.len();
            match context_type {
                ContextType::Folders => blocks.extend(
                    self.store
                        .nearest_folders(repo, model, &embedding, opts.top_k)?
                        .into_iter()
                        .map(ContextBlock::from),
                ),
                ContextType::Files => blocks.extend(
                    self.store
                        .nearest_files(repo, model, &embedding, opts.top_k)?
                        .into_iter()
                        .map(ContextBlock::from),
                ),
                ContextType::Commits => blocks.extend(
                    self.store
                        .nearest_commits(repo, model, &embedding, opts.top_k)?
                        .into_iter()
                        .map(ContextBlock::from),
                ),
            }
            tracing::debug!(repo, %context_type, hits = blocks.len() - before, "retrieved context");
        }
        Ok(blocks)
    }

    /// Builds the prompt that [`QueryEngine::answer`] would send.
    pub fn build_prompt(
        &self,
        provider: &str,
        repo: &str,
        question: &str,
        opts: &QueryOpts,
    ) -> Result<String> {
        let (_, backend) = self.backends.resolve(provider)?;
        let blocks = self.retrieve(backend, repo, question, opts)?;
        Ok(build_prompt(repo, question, &blocks))
    }

    pub fn answer_with_prompt(
        &self,
        provider: &str,
        repo: &str,
        question: &str,
        opts: &QueryOpts,
    ) -> Result<Answer> {
        let (provider, backend) = self.backends.resolve(provider)?;
        let blocks = self.retrieve(backend, repo, question, opts)?;
        let prompt = build_prompt(repo, question, &blocks);
        tracing::info!(repo, %provider, blocks = blocks.len(), "asking");
        let text = repolens_llm::ask(backend, &prompt)?;
        Ok(Answer { text, prompt })
    }

    pub fn answer(
        &self,
        provider: &str,
        repo: &str,
        question: &str,
        opts: &QueryOpts,
    ) -> Result<String> {
        Ok(self.answer_with_prompt(provider, repo, question, opts)?.text)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
