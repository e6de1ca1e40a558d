use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;

use repolens_ingest::{compile, CompileOptions};
use repolens_llm::backfill_embeddings;
use repolens_query::{QueryEngine, QueryOpts};
use repolens_store::SqliteStore;
use repolens_types::{Backend, Backends, Provider, Result, Store};

/// Deterministic stand-in for a provider: embeddings depend on text length,
/// completions are numbered.
struct FakeBackend {
    model: &'static str,
    calls: Rc<Cell<usize>>,
}

impl Backend for FakeBackend {
    fn model(&self) -> &str {
        self.model
    }

    fn context_window(&self) -> usize {
        20_000
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(vec![text.len() as f32, 1.0, 0.5])
    }

    fn complete(&self, _prompt: &str) -> Result<String> {
        self.calls.set(self.calls.get() + 1);
        Ok(format!("summary {}", self.calls.get()))
    }
}

fn commit_all(repo: &git2::Repository, paths: &[&str], message: &str) -> git2::Oid {
    let sig = git2::Signature::now("Test User", "test@example.com").unwrap();
    let mut index = repo.index().unwrap();
    for path in paths {
        index.add_path(Path::new(path)).unwrap();
    }
    index.write().unwrap();
    let tree_oid = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_oid).unwrap();
    let parents = match repo.head() {
        Ok(head) => vec![head.peel_to_commit().unwrap()],
        Err(_) => vec![],
    };
    let parents: Vec<&git2::Commit> = parents.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap()
}

#[test]
fn test_end_to_end() {
    // 1. A file-backed database
    let db_dir = tempfile::tempdir().unwrap();
    let db_path = db_dir.path().join("test.sqlite3");

    // 2. A real git repo with two commits
    let repo_dir = tempfile::tempdir().unwrap();
    let git_repo = git2::Repository::init(repo_dir.path()).unwrap();

    std::fs::write(repo_dir.path().join("README.md"), "# pg_cron\n").unwrap();
    std::fs::write(repo_dir.path().join("Makefile"), "all:\n\tcc -o cron src/*.c\n").unwrap();
    commit_all(&git_repo, &["README.md", "Makefile"], "Initial commit");

    std::fs::create_dir_all(repo_dir.path().join("src")).unwrap();
    std::fs::write(repo_dir.path().join("src/job.c"), "int run_job(void) {\n  return 0;\n}\n").unwrap();
    std::fs::write(repo_dir.path().join("src/cron.c"), "int next_tick(void);\n").unwrap();
    let head = commit_all(
        &git_repo,
        &["src/job.c", "src/cron.c"],
        "Add job scheduler\n\nRuns jobs on every tick.",
    );

    // 3. Compile
    let store = SqliteStore::open(&db_path).unwrap();
    let calls = Rc::new(Cell::new(0));
    let backend = FakeBackend { model: "fake-model", calls: Rc::clone(&calls) };
    let opts = CompileOptions::default();

    let summary = compile(&store, &backend, "pg_cron", repo_dir.path(), &opts).unwrap();
    assert!(!summary.already_compiled);
    assert_eq!(summary.commits.parsed, 2);
    assert_eq!(summary.commits.summarized, 2);
    assert_eq!(summary.tree.files_summarized, 3, "README.md is not a source file");
    assert!(summary.repo_summary.is_some());
    let compile_calls = calls.get();

    // 4. Recompiling is a no-op
    let again = compile(&store, &backend, "pg_cron", repo_dir.path(), &opts).unwrap();
    assert!(again.already_compiled);
    assert_eq!(calls.get(), compile_calls, "no completions on recompile");

    // 5. Browse what was stored
    let top = store.top_level_folders("pg_cron", "fake-model").unwrap();
    assert_eq!(top.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(), vec!["src"]);
    let files = store.files_under("pg_cron", "src", "fake-model").unwrap();
    assert_eq!(files.len(), 2);
    assert!(files.iter().all(|f| !f.summary.is_empty()));

    let commit = store
        .get_commit("pg_cron", &head.to_string())
        .unwrap()
        .expect("head commit stored");
    assert_eq!(commit.title, "Add job scheduler");
    assert_eq!(commit.author_email, "test@example.com");
    assert!(commit.changes.contains("+int run_job(void) {"));
    let summaries = store.commit_summaries("pg_cron", &head.to_string()).unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].model, "fake-model");

    // 6. Backfill: repo + 2 folders + 3 files + 2 commits
    let filled = backfill_embeddings(&store, &backend, "pg_cron").unwrap();
    assert_eq!(filled.embedded, 8);
    assert_eq!(filled.failed, 0);
    assert_eq!(backfill_embeddings(&store, &backend, "pg_cron").unwrap().embedded, 0);

    let stats = store.repo_stats("pg_cron").unwrap();
    assert_eq!(stats.len(), 1);
    assert!(stats[0].compiled);
    assert_eq!(stats[0].missing_embeddings, 0);

    // 7. Ask
    let answer_calls = Rc::new(Cell::new(0));
    let backends = Backends::new()
        .with(
            Provider::OpenAi,
            Box::new(FakeBackend { model: "fake-model", calls: Rc::clone(&answer_calls) }),
        )
        .with(
            Provider::Ubicloud,
            Box::new(FakeBackend { model: "other-model", calls: Rc::clone(&answer_calls) }),
        );
    let engine = QueryEngine::new(&store, &backends);
    let answer = engine
        .answer_with_prompt("openai", "pg_cron", "How are jobs run?", &QueryOpts::default())
        .unwrap();

    assert_eq!(answer.text, "summary 1");
    assert_eq!(answer_calls.get(), 1);
    assert!(answer.prompt.contains("**QUESTION**: How are jobs run?"));
    assert!(answer.prompt.contains("**CONTEXT 1/7**\nFOLDER: "));
    assert!(answer.prompt.contains("**CONTEXT 7/7**\nCOMMIT: "));
    assert!(answer.prompt.contains("FILE: job.c\nFOLDER: src\n"));

    // 8. The other provider has nothing compiled, so the question goes out bare
    let other = engine
        .answer_with_prompt("ubicloud", "pg_cron", "How are jobs run?", &QueryOpts::default())
        .unwrap();
    assert_eq!(other.prompt, "Answer the question about the pg_cron repo: How are jobs run?");
    assert_eq!(answer_calls.get(), 2);
}
