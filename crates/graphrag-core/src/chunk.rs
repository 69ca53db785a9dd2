//! Document chunking.
//!
//! Splits a [`Document`] into [`Chunk`]s according to its [`DocType`]:
//!
//! | doc_type     | Strategy                                                 |
//! |--------------|----------------------------------------------------------|
//! | `markdown`   | One chunk per non-empty heading section                  |
//! | `assignment` | One whole-document chunk, section `Assignment`           |
//! | `faq`        | One chunk per Q/A pair (a pair starts at a `Q:` line)    |
//! | other        | One whole-document chunk, no section                     |
//!
//! Chunk ordinals are contiguous by output position, so the `i`-th chunk is
//! always `chunk:doc:<id>:<i>`.
//!
//! [`parse_markdown_sections`] is also used by the offline index builder,
//! which needs the heading level to nest sections.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::models::{document_node_id, Chunk, DocType, Document, Metadata};

/// Section title given to text that precedes the first heading.
pub const PREAMBLE_TITLE: &str = "Document";
/// Section title given to a heading with no text.
pub const UNTITLED_TITLE: &str = "Untitled";
pub const ASSIGNMENT_SECTION: &str = "Assignment";
pub const FAQ_SECTION: &str = "FAQ";

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(#{1,6})\s+(.*)$").expect("heading pattern is valid"))
}

/// A markdown section: heading title, heading level (1–6) and trimmed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub level: usize,
    pub title: String,
    pub text: String,
}

/// Split markdown into heading sections.
///
/// Text before the first heading belongs to a level-1 section titled
/// [`PREAMBLE_TITLE`]. Sections whose body trims to nothing are skipped
/// (their heading still ends the previous section).
pub fn parse_markdown_sections(markdown: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut level = 1;
    let mut title = PREAMBLE_TITLE.to_string();
    let mut buf: Vec<&str> = Vec::new();

    fn flush(sections: &mut Vec<Section>, buf: &mut Vec<&str>, level: usize, title: &str) {
        let text = buf.join("\n");
        let text = text.trim();
        if !text.is_empty() {
            sections.push(Section {
                level,
                title: title.to_string(),
                text: text.to_string(),
            });
        }
        buf.clear();
    }

    for line in markdown.lines() {
        if let Some(caps) = heading_re().captures(line.trim()) {
            flush(&mut sections, &mut buf, level, &title);
            level = caps[1].len();
            let heading = caps[2].trim();
            title = if heading.is_empty() {
                UNTITLED_TITLE.to_string()
            } else {
                heading.to_string()
            };
            continue;
        }
        buf.push(line);
    }
    flush(&mut sections, &mut buf, level, &title);

    sections
}

/// Split FAQ text into Q/A pairs. Every line beginning with `Q:` opens a new
/// pair; blank pairs are dropped.
pub fn split_faq(content: &str) -> Vec<String> {
    let mut pairs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in content.split('\n') {
        if line.starts_with("Q:") && !current.is_empty() {
            pairs.push(current.join("\n"));
            current.clear();
        }
        current.push(line);
    }
    if !current.is_empty() {
        pairs.push(current.join("\n"));
    }

    pairs
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// `chunk:doc:<doc_id>:<ordinal>`
pub fn document_chunk_id(doc_id: &str, ordinal: usize) -> String {
    format!("chunk:{}:{}", document_node_id(doc_id), ordinal)
}

/// `sec:<doc_id>:<ordinal>`
pub fn document_section_id(doc_id: &str, ordinal: usize) -> String {
    format!("sec:{}:{}", doc_id, ordinal)
}

/// Metadata attached to every chunk of `doc`, both in the graph and in the
/// vector index. Absent ACL fields are stored as empty strings.
pub fn document_metadata(doc: &Document, section: Option<&str>) -> Metadata {
    let mut meta = Metadata::new();
    meta.insert("source".into(), Value::String(document_node_id(&doc.id)));
    meta.insert(
        "section".into(),
        Value::String(section.unwrap_or_default().to_string()),
    );
    meta.insert(
        "course_id".into(),
        Value::String(doc.course_id.clone().unwrap_or_default()),
    );
    meta.insert(
        "user_id".into(),
        Value::String(doc.user_id.clone().unwrap_or_default()),
    );
    meta.insert("doc_id".into(), Value::String(doc.id.clone()));
    meta
}

/// Trimmed document body, `None` when blank.
fn whole_body(content: &str) -> Option<String> {
    let text = content.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Chunk a document by its `doc_type`. May return no chunks (blank content,
/// or markdown consisting only of headings); never fails.
pub fn chunk_document(doc: &Document) -> Vec<Chunk> {
    let pieces: Vec<(String, Option<String>)> = match &doc.doc_type {
        DocType::Markdown => parse_markdown_sections(&doc.content)
            .into_iter()
            .map(|s| (s.text, Some(s.title)))
            .collect(),
        DocType::Assignment => whole_body(&doc.content)
            .map(|text| (text, Some(ASSIGNMENT_SECTION.to_string())))
            .into_iter()
            .collect(),
        DocType::Faq => split_faq(&doc.content)
            .into_iter()
            .map(|pair| (pair, Some(FAQ_SECTION.to_string())))
            .collect(),
        DocType::Other(_) => whole_body(&doc.content)
            .map(|text| (text, None))
            .into_iter()
            .collect(),
    };

    let source = document_node_id(&doc.id);
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, (text, section))| {
            let metadata = document_metadata(doc, section.as_deref());
            let mut chunk = Chunk::new(document_chunk_id(&doc.id, i), text)
                .with_source(source.clone())
                .with_metadata(metadata);
            chunk.section = section;
            chunk
        })
        .collect()
}
