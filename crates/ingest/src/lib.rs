//! Compilation pipeline: traversal, chunking, hierarchical summaries and
//! commit history.

mod chunk;
mod commits;
mod compile;
mod history;
mod patch;
mod summarize;
mod tree;

#[cfg(test)]
mod test_support;

pub use chunk::chunk_text;
pub use commits::{parse_log, CommitExtractor, CommitStats, LogParser, RawCommit};
pub use compile::{compile, CompileOptions, CompileSummary};
pub use history::{export_log, for_each_commit, HistoryCommit};
pub use patch::changed_paths;
pub use summarize::{
    batch_size_for, SummarizeStats, Summarizer, AVERAGE_SUMMARY_CHARS, MAX_SECTION_SUMMARIES,
};
pub use tree::{walk, FolderEntry, RepoTree};
