use std::cell::RefCell;
use std::path::Path;

use repolens_types::{Backend, RepolensError, Result};

/// Scripted backend: the n-th completion returns `summary n`. Prompts
/// containing `fail_on` fail with a backend error.
pub struct CountingBackend {
    window: usize,
    prompts: RefCell<Vec<String>>,
    fail_on: Option<&'static str>,
}

impl CountingBackend {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            prompts: RefCell::new(Vec::new()),
            fail_on: None,
        }
    }

    pub fn failing_on(mut self, needle: &'static str) -> Self {
        self.fail_on = Some(needle);
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.borrow().len()
    }

    pub fn prompt(&self, index: usize) -> String {
        self.prompts.borrow()[index].clone()
    }
}

impl Backend for CountingBackend {
    fn model(&self) -> &str {
        "test-model"
    }

    fn context_window(&self) -> usize {
        self.window
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(vec![text.len() as f32, 1.0])
    }

    fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.borrow_mut().push(prompt.to_string());
        if let Some(needle) = self.fail_on {
            if prompt.contains(needle) {
                return Err(RepolensError::Backend {
                    model: "test-model".into(),
                    message: "413 Payload Too Large".into(),
                });
            }
        }
        Ok(format!("summary {}", self.calls()))
    }
}

/// Writes `content` to `rel` and commits it on HEAD at `time` (+02:00).
pub fn commit_file(
    repo: &git2::Repository,
    rel: &str,
    content: &str,
    message: &str,
    time: i64,
) -> git2::Oid {
    let root = repo.workdir().expect("workdir");
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    std::fs::write(&path, content).expect("write");

    let mut index = repo.index().expect("index");
    index.add_path(Path::new(rel)).expect("add path");
    index.write().expect("write index");
    let tree = repo.find_tree(index.write_tree().expect("write tree")).expect("tree");

    let sig = git2::Signature::new("Alice", "alice@example.com", &git2::Time::new(time, 120))
        .expect("sig");
    let parents: Vec<git2::Commit> = repo
        .head()
        .ok()
        .and_then(|h| h.peel_to_commit().ok())
        .into_iter()
        .collect();
    let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
        .expect("commit")
}
