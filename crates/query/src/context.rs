use repolens_types::{CommitHit, FileHit, FolderHit};

const SEPARATOR: &str = "-------------------------------";

/// One retrieved entity, rendered into the question prompt.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ContextBlock {
    Folder { name: String, summary: String },
    File { name: String, folder: String, summary: String },
    Commit { id: String, summary: String },
}

impl From<FolderHit> for ContextBlock {
    fn from(hit: FolderHit) -> Self {
        ContextBlock::Folder {
            name: hit.name,
            summary: hit.summary,
        }
    }
}

impl From<FileHit> for ContextBlock {
    fn from(hit: FileHit) -> Self {
        ContextBlock::File {
            name: hit.name,
            folder: hit.folder,
            summary: hit.summary,
        }
    }
}

impl From<CommitHit> for ContextBlock {
    fn from(hit: CommitHit) -> Self {
        ContextBlock::Commit {
            id: hit.id,
            summary: hit.summary,
        }
    }
}

impl ContextBlock {
    pub fn render(&self) -> String {
        match self {
            ContextBlock::Folder { name, summary } => {
                format!("FOLDER: {name}\nDESCRIPTION: {summary}")
            }
            ContextBlock::File { name, folder, summary } => {
                format!("FILE: {name}\nFOLDER: {folder}\nDESCRIPTION:\n{summary}")
            }
            ContextBlock::Commit { id, summary } => {
                format!("COMMIT: {id}\nDESCRIPTION: {summary}")
            }
        }
    }
}

/// Assembles the question prompt. Without blocks the question is asked bare.
pub fn build_prompt(repo: &str, question: &str, blocks: &[ContextBlock]) -> String {
    if blocks.is_empty() {
        return format!("Answer the question about the {repo} repo: {question}");
    }

    let total = blocks.len();
    let context = blocks
        .iter()
        .enumerate()
        .map(|(i, block)| format!("**CONTEXT {}/{total}**\n{}", i + 1, block.render()))
        .collect::<Vec<_>>()
        .join("\n\n");

    [
        format!(
            "Answer the question about the {repo} repo using the provided context. \
             Cite specific portions of the given context if they were relevant to \
             answering the question."
        ),
        SEPARATOR.to_string(),
        format!("**QUESTION**: {question}"),
        SEPARATOR.to_string(),
        context,
    ]
    .join("\n")
}
