//! Line-oriented Markdown script parser.
//!
//! `#` lines open headers, blank lines separate chunks. Chunks starting with a
//! metadata prefix (and everything under an "Intro bit" header) are not selectable.

use super::model::{Chunk, Document, Header, MetaChunk, ScriptChunk};
use anyhow::{anyhow, Result};
use std::fs;
use std::path::Path;

/// Prefixes marking a line as script metadata rather than performable text.
const META_PREFIXES: [&str; 4] = ["TODO", "REF", "NOTE", "BIT"];

/// Headers whose content is never performed.
const INTRO_MARKER: &str = "Intro bit";

const CODE_FENCE: &str = "```";

fn is_meta(line: &str) -> bool {
    META_PREFIXES.iter().any(|prefix| {
        line.strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with(':'))
    })
}

/// Accumulates the header and chunk text currently being parsed.
struct ScriptBuilder {
    headers: Vec<Header>,
    header: Header,
    text: String,
}

impl ScriptBuilder {
    fn new() -> Self {
        Self {
            headers: Vec::new(),
            header: Header::default(),
            text: String::new(),
        }
    }

    fn flush_chunk(&mut self) {
        let content = self.text.trim().to_string();
        self.text.clear();
        if content.is_empty() {
            return;
        }

        let chunk = if self.header.text.contains(INTRO_MARKER) || is_meta(&content) {
            ScriptChunk::Meta(MetaChunk::new(content))
        } else {
            ScriptChunk::Normal(Chunk::new(content))
        };
        self.header.add_chunk(chunk);
    }

    fn open_header(&mut self, line: &str) {
        if self.header.text.is_empty() {
            self.header.text = line.to_string();
            return;
        }
        self.flush_chunk();
        let finished = std::mem::replace(&mut self.header, Header::new(line));
        self.headers.push(finished);
    }

    fn push_line(&mut self, line: &str) {
        if !self.text.is_empty() {
            let starts_on_new_line = line.starts_with(CODE_FENCE)
                || is_meta(line)
                || line.trim_start().starts_with('-');
            self.text.push(if starts_on_new_line { '\n' } else { ' ' });
        }
        self.text.push_str(line);
        if line == CODE_FENCE {
            self.text.push('\n');
        }
    }

    fn finish(mut self) -> Document {
        self.flush_chunk();
        self.headers.push(self.header);
        Document::new(self.headers)
    }
}

/// Parses Markdown script text into a document.
pub fn parse_script(markdown: &str) -> Document {
    let mut builder = ScriptBuilder::new();

    for line in markdown.lines() {
        if line.starts_with('#') {
            builder.open_header(line);
        } else if line.trim().is_empty() {
            builder.flush_chunk();
        } else {
            builder.push_line(line);
        }
    }

    builder.finish()
}

/// Reads and parses a script file.
///
/// # Errors
/// - If the file cannot be read
pub fn read_script(path: &Path) -> Result<Document> {
    let markdown = fs::read_to_string(path)
        .map_err(|e| anyhow!("Failed to open script {}: {e}", path.display()))?;
    let document = parse_script(&markdown);
    tracing::info!(
        "Script loaded: {} ({} headers, {} chunks)",
        path.display(),
        document.headers.len(),
        document.chunk_count()
    );
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Renderable;

    #[test]
    fn test_two_chunks_under_header() {
        let doc = parse_script("# Test\nchunk 1\n\nchunk 2");
        assert_eq!(doc.headers.len(), 1);
        let header = &doc.headers[0];
        assert_eq!(header.text, "# Test");
        let contents: Vec<&str> = header.chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, ["chunk 1", "chunk 2"]);
    }

    #[test]
    fn test_continuation_lines_join() {
        let doc = parse_script("# H\nfirst line\nsecond line\n- bullet\n");
        assert_eq!(
            doc.headers[0].chunks[0].content,
            "first line second line\n- bullet"
        );
    }

    #[test]
    fn test_meta_chunks_are_interleaved() {
        let doc = parse_script("# H\nsay this\n\nNOTE: breathe\n\nsay that\n");
        let header = &doc.headers[0];
        assert_eq!(header.chunks.len(), 2);
        assert_eq!(header.meta_chunks.len(), 1);

        let order: Vec<bool> = doc
            .renderable()
            .into_iter()
            .filter_map(|r| match r {
                Renderable::Chunk { .. } => Some(false),
                Renderable::Meta(_) => Some(true),
                Renderable::Header(_) => None,
            })
            .collect();
        assert_eq!(order, [false, true, false]);
    }

    #[test]
    fn test_intro_header_content_is_meta() {
        let doc = parse_script("# Intro bit\nhello\n\n# Main\nperform me\n");
        assert_eq!(doc.headers.len(), 2);
        assert!(doc.headers[0].chunks.is_empty());
        assert_eq!(doc.headers[0].meta_chunks.len(), 1);
        assert_eq!(doc.chunk_count(), 1);
    }

    #[test]
    fn test_prefix_without_colon_is_not_meta() {
        assert!(is_meta("TODO: fix"));
        assert!(!is_meta("TODOS are fun"));
    }

    #[test]
    fn test_empty_script_still_has_header() {
        let doc = parse_script("");
        assert_eq!(doc.headers.len(), 1);
        assert_eq!(doc.chunk_count(), 0);
    }

    #[test]
    fn test_read_script_missing_file() {
        let err = read_script(Path::new("/nonexistent/script.md")).unwrap_err();
        assert!(err.to_string().contains("Failed to open script"));
    }
}
