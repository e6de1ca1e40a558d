use std::sync::LazyLock;

use regex::Regex;

static INDENTED_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s{2}\}").expect("valid indented brace regex"));

fn split_terminator(line: &str) -> (&str, &str) {
    if let Some(content) = line.strip_suffix("\r\n") {
        (content, "\r\n")
    } else if let Some(content) = line.strip_suffix('\n') {
        (content, "\n")
    } else {
        (line, "")
    }
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Splits `text` into chunks of roughly `budget` characters, preferring to
/// cut after a closing brace at the start of a line.
///
/// Line terminators stay inside their chunk, so the chunks concatenate back to
/// the input. The only loss is a single line longer than `budget`, which is
/// truncated to `budget` characters.
pub fn chunk_text(text: &str, budget: usize) -> Vec<String> {
    let budget = budget.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut size = 0usize;

    for line in text.split_inclusive('\n') {
        let (content, terminator) = split_terminator(line);
        let content = truncate_chars(content, budget);

        current.push_str(content);
        current.push_str(terminator);
        size += content.chars().count();

        let cut = (size >= budget && (content.starts_with('}') || content == "];"))
            || (size >= 2 * budget && INDENTED_CLOSE.is_match(content))
            || size >= 3 * budget;
        if cut {
            chunks.push(std::mem::take(&mut current));
            size = 0;
        }
    }

    if !current.is_empty() || chunks.is_empty() {
        chunks.push(current);
    }
    chunks
}

// ── Tests ──────────────────────────────────────────────────────────────────
