//! Placeholder substitution for `.docx` report templates.
//!
//! A `.docx` file is a zip archive of WordprocessingML parts. Placeholders such
//! as `{{GAD}}` are written by hand in Word, which often splits them across
//! several runs (`<w:r>`), so substitution works on the joined text of each
//! paragraph and writes the result back into the paragraph's existing text
//! nodes. Formatting of the run that holds the opening delimiter is kept.
//!
//! Parts are walked as a stream of XML events. Paragraphs nest (a text box
//! inside a run holds its own `<w:p>` elements), so every text node belongs
//! to the innermost paragraph open around it.

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::ops::Range;
use std::path::Path;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::mapper::FieldMap;

pub const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

const MAIN_PART: &str = "word/document.xml";

const PARAGRAPH_TAG: &[u8] = b"w:p";
const TEXT_TAG: &[u8] = b"w:t";

// Commands that need an expression engine; only plain insertion is supported.
const UNSUPPORTED_COMMANDS: &[&str] = &[
    "FOR", "END-FOR", "IF", "END-IF", "IMAGE", "LINK", "HTML", "EXEC", "QUERY", "ALIAS", "CMD_NODE",
];

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("template is not a valid docx archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("failed to read template: {0}")]
    Io(#[from] std::io::Error),
    #[error("template has no word/document.xml part")]
    MissingDocument,
    #[error("malformed XML in {part}")]
    Xml {
        part: String,
        #[source]
        source: quick_xml::Error,
    },
    #[error("{} template substitution error(s)", .0.len())]
    Issues(Vec<TemplateIssue>),
}

/// One placeholder that could not be filled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateIssue {
    pub part: String,
    pub command: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiters {
    pub open: String,
    pub close: String,
}

impl Delimiters {
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        Delimiters {
            open: open.into(),
            close: close.into(),
        }
    }
}

impl Default for Delimiters {
    fn default() -> Self {
        Delimiters::new("{{", "}}")
    }
}

/// A loaded `.docx` template.
#[derive(Debug, Clone)]
pub struct DocxTemplate {
    bytes: Vec<u8>,
    delimiters: Delimiters,
}

impl DocxTemplate {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        DocxTemplate {
            bytes,
            delimiters: Delimiters::default(),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        Ok(DocxTemplate::from_bytes(fs::read(path)?))
    }

    pub fn with_delimiters(mut self, delimiters: Delimiters) -> Self {
        self.delimiters = delimiters;
        self
    }

    /// Fill every placeholder from `fields` and return the new document.
    ///
    /// All parts are processed before failing, so the error lists every
    /// problem in the template at once.
    pub fn render(&self, fields: &FieldMap) -> Result<Vec<u8>, TemplateError> {
        let mut archive = ZipArchive::new(Cursor::new(self.bytes.as_slice()))?;
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let mut issues = Vec::new();
        let mut saw_main_part = false;

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            let name = entry.name().to_string();

            if !is_text_part(&name) {
                writer.raw_copy_file(entry)?;
                continue;
            }
            saw_main_part |= name == MAIN_PART;

            let options = SimpleFileOptions::default().compression_method(entry.compression());
            let mut xml = String::new();
            entry.read_to_string(&mut xml)?;

            let filled = fill_xml(&xml, &name, fields, &self.delimiters, &mut issues)?;
            writer.start_file(name, options)?;
            writer.write_all(filled.as_bytes())?;
        }

        if !saw_main_part {
            return Err(TemplateError::MissingDocument);
        }
        if !issues.is_empty() {
            return Err(TemplateError::Issues(issues));
        }

        Ok(writer.finish()?.into_inner())
    }
}

fn is_text_part(name: &str) -> bool {
    if name == MAIN_PART || name == "word/footnotes.xml" || name == "word/endnotes.xml" {
        return true;
    }
    (name.starts_with("word/header") || name.starts_with("word/footer")) && name.ends_with(".xml")
}

/// A `<w:t>` element: the events it spans and the text it holds.
#[derive(Debug)]
struct TextNode {
    first: usize,
    last: usize,
    text: String,
}

/// Substitute placeholders in one WordprocessingML part.
///
/// Parts without a filled placeholder are returned unchanged. Only the text
/// nodes whose content changes are rewritten; all other markup is written
/// back event for event.
pub fn fill_xml(
    xml: &str,
    part: &str,
    fields: &FieldMap,
    delimiters: &Delimiters,
    issues: &mut Vec<TemplateIssue>,
) -> Result<String, TemplateError> {
    let malformed = |source: quick_xml::Error| TemplateError::Xml {
        part: part.to_string(),
        source,
    };

    let mut reader = Reader::from_str(xml);
    let mut events = Vec::new();
    let mut paragraphs: Vec<Vec<TextNode>> = Vec::new();
    let mut open_text: Option<TextNode> = None;
    let mut rewrites: HashMap<usize, TextNode> = HashMap::new();

    loop {
        let event = reader.read_event().map_err(malformed)?;
        let index = events.len();
        match &event {
            Event::Eof => break,
            Event::Start(e) if e.name().as_ref() == PARAGRAPH_TAG => paragraphs.push(Vec::new()),
            Event::End(e) if e.name().as_ref() == PARAGRAPH_TAG => {
                if let Some(nodes) = paragraphs.pop() {
                    for node in fill_paragraph(nodes, part, fields, delimiters, issues) {
                        rewrites.insert(node.first, node);
                    }
                }
            }
            Event::Start(e) if e.name().as_ref() == TEXT_TAG => {
                open_text = Some(TextNode {
                    first: index,
                    last: index,
                    text: String::new(),
                });
            }
            Event::Empty(e) if e.name().as_ref() == TEXT_TAG => {
                if let Some(nodes) = paragraphs.last_mut() {
                    nodes.push(TextNode {
                        first: index,
                        last: index,
                        text: String::new(),
                    });
                }
            }
            Event::Text(e) => {
                if let Some(node) = open_text.as_mut() {
                    node.text.push_str(&e.unescape().map_err(malformed)?);
                }
            }
            Event::CData(e) => {
                if let Some(node) = open_text.as_mut() {
                    node.text.push_str(&String::from_utf8_lossy(e));
                }
            }
            Event::End(e) if e.name().as_ref() == TEXT_TAG => {
                if let Some(mut node) = open_text.take() {
                    node.last = index;
                    if let Some(nodes) = paragraphs.last_mut() {
                        nodes.push(node);
                    }
                }
            }
            _ => {}
        }
        events.push(event);
    }

    if rewrites.is_empty() {
        return Ok(xml.to_string());
    }

    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut skip_until = None;
    for (index, event) in events.into_iter().enumerate() {
        if let Some(last) = skip_until {
            if index <= last {
                continue;
            }
            skip_until = None;
        }
        match rewrites.get(&index) {
            Some(node) => {
                let tag = match &event {
                    Event::Start(e) | Event::Empty(e) => preserve_space(e),
                    _ => BytesStart::new("w:t"),
                };
                writer.write_event(Event::Start(tag)).map_err(malformed)?;
                if !node.text.is_empty() {
                    writer
                        .write_event(Event::Text(BytesText::new(&node.text)))
                        .map_err(malformed)?;
                }
                writer
                    .write_event(Event::End(BytesEnd::new("w:t")))
                    .map_err(malformed)?;
                skip_until = Some(node.last);
            }
            None => writer.write_event(event).map_err(malformed)?,
        }
    }

    String::from_utf8(writer.into_inner()).map_err(|e| malformed(e.utf8_error().into()))
}

/// The start tag with `xml:space="preserve"`, so Word keeps edge whitespace.
fn preserve_space(tag: &BytesStart) -> BytesStart<'static> {
    let mut tag = tag.clone().into_owned();
    let has_space = tag
        .attributes()
        .flatten()
        .any(|attr| attr.key.as_ref() == b"xml:space");
    if !has_space {
        tag.push_attribute(("xml:space", "preserve"));
    }
    tag
}

struct Placeholder {
    span: Range<usize>,
    replacement: String,
}

/// Returns the nodes of `nodes` whose text changed, holding their new text.
fn fill_paragraph(
    nodes: Vec<TextNode>,
    part: &str,
    fields: &FieldMap,
    delimiters: &Delimiters,
    issues: &mut Vec<TemplateIssue>,
) -> Vec<TextNode> {
    let joined: String = nodes.iter().map(|node| node.text.as_str()).collect();
    if !joined.contains(delimiters.open.as_str()) {
        return Vec::new();
    }

    let placeholders = scan_placeholders(&joined, part, fields, delimiters, issues);
    if placeholders.is_empty() {
        return Vec::new();
    }

    let mut spans = Vec::with_capacity(nodes.len());
    let mut offset = 0;
    for node in &nodes {
        spans.push(offset..offset + node.text.len());
        offset += node.text.len();
    }

    let mut rewritten = vec![String::new(); nodes.len()];
    let mut cursor = 0;
    for placeholder in &placeholders {
        copy_between(&joined, &spans, cursor..placeholder.span.start, &mut rewritten);
        if let Some(owner) = spans.iter().position(|s| s.contains(&placeholder.span.start)) {
            rewritten[owner].push_str(&placeholder.replacement);
        }
        cursor = placeholder.span.end;
    }
    copy_between(&joined, &spans, cursor..joined.len(), &mut rewritten);

    nodes
        .into_iter()
        .zip(rewritten)
        .filter(|(node, text)| node.text != *text)
        .map(|(node, text)| TextNode { text, ..node })
        .collect()
}

fn copy_between(joined: &str, spans: &[Range<usize>], range: Range<usize>, out: &mut [String]) {
    for (span, text) in spans.iter().zip(out.iter_mut()) {
        let start = span.start.max(range.start);
        let end = span.end.min(range.end);
        if start < end {
            text.push_str(&joined[start..end]);
        }
    }
}

fn scan_placeholders(
    text: &str,
    part: &str,
    fields: &FieldMap,
    delimiters: &Delimiters,
    issues: &mut Vec<TemplateIssue>,
) -> Vec<Placeholder> {
    let mut found = Vec::new();
    let mut from = 0;

    while let Some(rel_open) = text[from..].find(delimiters.open.as_str()) {
        let open = from + rel_open;
        let body_start = open + delimiters.open.len();
        let Some(rel_close) = text[body_start..].find(delimiters.close.as_str()) else {
            issues.push(TemplateIssue {
                part: part.to_string(),
                command: text[body_start..].trim().to_string(),
                message: format!("unterminated placeholder, missing '{}'", delimiters.close),
            });
            break;
        };
        let close = body_start + rel_close;
        let end = close + delimiters.close.len();
        let command = text[body_start..close].trim();

        let replacement = match resolve_command(command, fields) {
            Ok(value) => value,
            Err(message) => {
                issues.push(TemplateIssue {
                    part: part.to_string(),
                    command: command.to_string(),
                    message,
                });
                String::new()
            }
        };

        found.push(Placeholder {
            span: open..end,
            replacement,
        });
        from = end;
    }

    found
}

fn resolve_command(command: &str, fields: &FieldMap) -> Result<String, String> {
    let name = if let Some(rest) = command.strip_prefix('=') {
        rest.trim()
    } else if let Some(rest) = command
        .get(..4)
        .filter(|prefix| prefix.eq_ignore_ascii_case("INS "))
        .and_then(|_| command.get(4..))
    {
        rest.trim()
    } else {
        command
    };

    if name.is_empty() {
        return Err("empty command".to_string());
    }

    let keyword = name.split_whitespace().next().unwrap_or(name);
    if UNSUPPORTED_COMMANDS
        .iter()
        .any(|k| keyword.eq_ignore_ascii_case(k))
    {
        return Err(format!("unsupported command '{}'", keyword));
    }

    match fields.get(name) {
        Some(value) => Ok(render_value(value)),
        None => Err(format!("field '{}' is not defined", name)),
    }
}

/// Text inserted for a cell value.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
