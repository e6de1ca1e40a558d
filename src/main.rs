use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use repolens_ingest::{compile, CompileOptions};
use repolens_llm::{backfill_embeddings, build_backends, summarize_batch_size, OpenAiCompatBackend, ProviderConfig};
use repolens_query::{QueryEngine, QueryOpts};
use repolens_store::SqliteStore;
use repolens_types::{Provider, Store};

#[derive(Parser)]
#[command(name = "repolens", about = "Summarize a code repository and ask questions about it")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database
    Init {
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Summarize a repository's files, folders and commits
    Compile {
        name: String,
        path: PathBuf,
        /// `openai`, `ubicloud` or `all`
        #[arg(long, default_value = "openai")]
        provider: String,
        /// Pre-exported commit log instead of reading git history
        #[arg(long = "log-file")]
        log_file: Option<PathBuf>,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Embed every stored summary that has no vector yet
    Backfill {
        name: String,
        #[arg(long, default_value = "openai")]
        provider: String,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Answer a question using the nearest stored summaries
    Ask {
        name: String,
        question: String,
        #[arg(long, default_value = "openai")]
        provider: String,
        /// Granularities to retrieve: folders, files, commits
        #[arg(long = "context", value_delimiter = ',')]
        context: Vec<String>,
        #[arg(long = "top-k", default_value_t = repolens_query::DEFAULT_TOP_K)]
        top_k: usize,
        #[arg(long = "show-prompt")]
        show_prompt: bool,
        /// Ask without any retrieved context
        #[arg(long = "no-context", conflicts_with = "context")]
        no_context: bool,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Per-repository counts for each model
    Status {
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Print top-level folder summaries
    Summaries {
        name: String,
        #[arg(long, default_value = "openai")]
        provider: String,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// List files, with summaries, under each folder
    Files {
        name: String,
        #[arg(required = true)]
        folders: Vec<String>,
        #[arg(long, default_value = "openai")]
        provider: String,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Print one stored commit as JSON
    Show {
        name: String,
        id: String,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Get {
        key: String,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    Set {
        key: String,
        value: String,
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

fn resolve_db_path(flag: Option<PathBuf>) -> PathBuf {
    if let Some(p) = flag {
        return p;
    }
    if let Ok(v) = std::env::var("REPOLENS_DB") {
        return PathBuf::from(v);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    PathBuf::from(home).join(".repolens").join("db.sqlite3")
}

fn open_store(db: Option<PathBuf>) -> Result<SqliteStore> {
    let db_path = resolve_db_path(db);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    SqliteStore::open(&db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))
}

fn parse_providers(value: &str) -> Result<Vec<Provider>> {
    if value.trim().eq_ignore_ascii_case("all") {
        return Ok(Provider::ALL.to_vec());
    }
    Ok(vec![value.parse()?])
}

fn model_for(store: &dyn Store, provider: &str) -> Result<String> {
    let provider: Provider = provider.parse()?;
    Ok(ProviderConfig::from_store(store, provider)?.completion_model)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db } => {
            let db_path = resolve_db_path(db.clone());
            open_store(db)?;
            println!("Initialized repolens database at {}", db_path.display());
        }

        Commands::Compile { name, path, provider, log_file, db } => {
            let providers = parse_providers(&provider)?;
            let store = open_store(db)?;
            let repo_path = path
                .canonicalize()
                .with_context(|| format!("Repository path not found: {}", path.display()))?;
            let opts = CompileOptions {
                log_file,
                batch_size: summarize_batch_size(&store)?,
                ..CompileOptions::default()
            };

            for provider in providers {
                let config = ProviderConfig::from_store(&store, provider)?;
                let backend = OpenAiCompatBackend::new(&config)?;
                let summary = compile(&store, &backend, &name, &repo_path, &opts)
                    .with_context(|| format!("Failed to compile '{name}' with {provider}"))?;

                if summary.already_compiled {
                    println!("'{name}' is already compiled for {provider} ({})", summary.model);
                    continue;
                }
                println!(
                    "Compiled '{name}' for {provider} ({}): {} files, {} folders, {} commits, {} completion calls",
                    summary.model,
                    summary.tree.files_summarized + summary.tree.files_cached,
                    summary.tree.folders_summarized + summary.tree.folders_cached,
                    summary.commits.parsed,
                    summary.tree.calls + summary.commits.summarized + summary.commits.fallbacks,
                );
                if summary.repo_summary.is_none() {
                    tracing::warn!(repo = %name, %provider, "no summarizable files found");
                }
            }
        }

        Commands::Backfill { name, provider, db } => {
            let providers = parse_providers(&provider)?;
            let store = open_store(db)?;
            for provider in providers {
                let config = ProviderConfig::from_store(&store, provider)?;
                let backend = OpenAiCompatBackend::new(&config)?;
                let summary = backfill_embeddings(&store, &backend, &name)
                    .with_context(|| format!("Failed to backfill '{name}' with {provider}"))?;
                println!(
                    "Backfilled '{name}' for {provider}: {} embedded, {} failed",
                    summary.embedded, summary.failed
                );
            }
        }

        Commands::Ask { name, question, provider, context, top_k, show_prompt, no_context, db } => {
            let provider: Provider = provider.parse()?;
            let mut opts = QueryOpts { top_k, ..QueryOpts::default() };
            if no_context {
                opts.context_types.clear();
            } else if !context.is_empty() {
                opts = opts.with_context_names(context.as_slice())?;
            }

            let store = open_store(db)?;
            let backends = build_backends(&store, &[provider])?;
            let engine = QueryEngine::new(&store, &backends);
            let answer = engine
                .answer_with_prompt(provider.as_str(), &name, &question, &opts)
                .with_context(|| format!("Failed to answer with {provider}"))?;

            if show_prompt {
                println!("{}\n", answer.prompt);
                println!("--------------------------\n");
            }
            println!("{}", answer.text);
        }

        Commands::Status { db } => {
            let store = open_store(db)?;
            let mut names: Vec<String> = store
                .list_repos()
                .context("Failed to list repos")?
                .into_iter()
                .map(|r| r.name)
                .collect();
            names.dedup();

            println!(
                "{:<20} {:<24} {:>8} {:>8} {:>8} {:>10}",
                "REPO", "MODEL", "FOLDERS", "FILES", "COMMITS", "UNEMBEDDED"
            );
            for name in &names {
                let stats = store
                    .repo_stats(name)
                    .with_context(|| format!("Failed to get stats for '{name}'"))?;
                for s in stats {
                    let model = if s.compiled { s.model } else { format!("{} (partial)", s.model) };
                    println!(
                        "{:<20} {:<24} {:>8} {:>8} {:>8} {:>10}",
                        name, model, s.folders, s.files, s.commits, s.missing_embeddings
                    );
                }
            }
        }

        Commands::Summaries { name, provider, db } => {
            let store = open_store(db)?;
            let model = model_for(&store, &provider)?;
            let folders = store
                .top_level_folders(&name, &model)
                .context("Failed to list folders")?;

            println!("repo: {name}");
            for folder in folders {
                println!("--------------------------");
                println!("Folder: {}", folder.name);
                println!("----------");
                println!("{}", folder.summary);
                println!("--------------------------\n");
            }
        }

        Commands::Files { name, folders, provider, db } => {
            let store = open_store(db)?;
            let model = model_for(&store, &provider)?;
            for folder in &folders {
                let files = store
                    .files_under(&name, folder, &model)
                    .with_context(|| format!("Failed to list files under '{folder}'"))?;
                if files.is_empty() {
                    println!("No files found in the folder: {folder}");
                    continue;
                }
                println!("\nListing files for folder: {folder}");
                println!("--------------------------");
                for file in files {
                    println!("Folder: {} - File: {}", file.folder, file.name);
                    println!("Description: {}", file.summary);
                    println!("--------------------------\n");
                }
            }
        }

        Commands::Show { name, id, db } => {
            let store = open_store(db)?;
            let Some(commit) = store.get_commit(&name, &id).context("Failed to get commit")? else {
                bail!("Commit {name}:{id} not found");
            };
            let summaries = store
                .commit_summaries(&name, &id)
                .context("Failed to get commit summaries")?;

            let json = serde_json::json!({
                "commit": commit,
                "summaries": summaries,
            });
            let json = serde_json::to_string_pretty(&json)
                .context("Failed to serialize commit to JSON")?;
            println!("{json}");
        }

        Commands::Config { action } => match action {
            ConfigAction::Get { key, db } => {
                let store = open_store(db)?;
                match store.get_config(&key).context("Failed to read config")? {
                    Some(value) => println!("{value}"),
                    None => bail!("{key} is not set"),
                }
            }
            ConfigAction::Set { key, value, db } => {
                let store = open_store(db)?;
                store.set_config(&key, &value).context("Failed to write config")?;
                println!("{key} = {value}");
            }
        },
    }

    Ok(())
}
