//! Format-specific structural checks used during validation.
//!
//! These are sanity checks (non-empty body, at least one paragraph,
//! resolvable internal links), not full document validation.

use crate::error::Result;
use crate::format::DocumentFormat;
use crate::validation::ValidationOutcome;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

const WORDML_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const RELATIONSHIPS_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Structural sanity check for one output format.
pub trait StructureValidator: Send + Sync {
    fn validate(&self, output_path: &Path, check_links: bool) -> ValidationOutcome;
}

/// Validators keyed by target format. Formats without an entry skip the check.
#[derive(Default)]
pub struct StructureValidators {
    validators: HashMap<DocumentFormat, Box<dyn StructureValidator>>,
}

impl std::fmt::Debug for StructureValidators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructureValidators")
            .field("formats", &self.validators.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl StructureValidators {
    /// No validators; every structural check is skipped.
    pub fn empty() -> Self {
        Self::default()
    }

    /// HTML, DOCX and Markdown validators.
    pub fn with_defaults() -> Self {
        Self::empty()
            .register(DocumentFormat::Html, HtmlValidator)
            .register(DocumentFormat::Docx, DocxValidator)
            .register(DocumentFormat::Markdown, MarkdownValidator)
    }

    pub fn register(
        mut self,
        format: DocumentFormat,
        validator: impl StructureValidator + 'static,
    ) -> Self {
        self.validators.insert(format, Box::new(validator));
        self
    }

    pub fn get(&self, format: DocumentFormat) -> Option<&dyn StructureValidator> {
        self.validators.get(&format).map(|v| v.as_ref())
    }
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern compiles"))
}

fn read_text(path: &Path) -> std::result::Result<String, ValidationOutcome> {
    std::fs::read(path)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .map_err(|e| {
            ValidationOutcome::invalid(vec![format!(
                "Could not read output '{}': {}",
                path.display(),
                e
            )])
        })
}

/// What the HTML tokenizer saw: visible text, anchor targets and link hrefs.
#[derive(Debug, Default)]
struct HtmlScan {
    has_body: bool,
    body_text: bool,
    any_text: bool,
    ids: HashSet<String>,
    hrefs: Vec<String>,
}

impl HtmlScan {
    /// Tokenize leniently: mismatched end tags and unquoted attributes are
    /// accepted. Script and style blocks must already be removed.
    fn parse(html: &str) -> std::result::Result<Self, quick_xml::Error> {
        let mut reader = Reader::from_str(html);
        reader.config_mut().check_end_names = false;

        let mut scan = Self::default();
        let mut in_body = false;
        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    if e.local_name().as_ref().eq_ignore_ascii_case(b"body") {
                        scan.has_body = true;
                        in_body = true;
                    }
                    scan.collect_attributes(&e);
                }
                Event::Empty(e) => scan.collect_attributes(&e),
                Event::End(e) if e.local_name().as_ref().eq_ignore_ascii_case(b"body") => {
                    in_body = false;
                }
                Event::Text(text) => scan.note_text(&text, in_body),
                Event::CData(text) => scan.note_text(&text, in_body),
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(scan)
    }

    fn collect_attributes(&mut self, element: &BytesStart<'_>) {
        let is_anchor = element.local_name().as_ref().eq_ignore_ascii_case(b"a");
        for attr in element.html_attributes().flatten() {
            let key = attr.key.as_ref();
            let value = || {
                attr.unescape_value()
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned())
            };
            if key.eq_ignore_ascii_case(b"id") || (is_anchor && key.eq_ignore_ascii_case(b"name")) {
                self.ids.insert(value());
            } else if is_anchor && key.eq_ignore_ascii_case(b"href") {
                self.hrefs.push(value());
            }
        }
    }

    fn note_text(&mut self, text: &[u8], in_body: bool) {
        if text.iter().any(|b| !b.is_ascii_whitespace()) {
            self.any_text = true;
            self.body_text |= in_body;
        }
    }

    /// A fragment without a `<body>` counts all of its text.
    fn is_empty(&self) -> bool {
        if self.has_body {
            !self.body_text
        } else {
            !self.any_text
        }
    }
}

/// HTML: non-empty body, and optionally resolvable `#fragment` links.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlValidator;

impl StructureValidator for HtmlValidator {
    fn validate(&self, output_path: &Path, check_links: bool) -> ValidationOutcome {
        static SCRIPT: OnceLock<Regex> = OnceLock::new();

        let html = match read_text(output_path) {
            Ok(html) => html,
            Err(outcome) => return outcome,
        };
        let markup = regex(&SCRIPT, r"(?is)<(script|style)\b.*?</(script|style)\s*>")
            .replace_all(&html, " ");

        let scan = match HtmlScan::parse(&markup) {
            Ok(scan) => scan,
            Err(e) => {
                return ValidationOutcome::invalid(vec![format!("HTML output is malformed: {}", e)])
            }
        };

        let mut errors = Vec::new();
        if scan.is_empty() {
            errors.push("HTML document has an empty body".to_string());
        }

        if check_links {
            for href in &scan.hrefs {
                if href.trim().is_empty() {
                    errors.push("Link with empty href".to_string());
                } else if let Some(fragment) = href.strip_prefix('#') {
                    if !fragment.is_empty() && !scan.ids.contains(fragment) {
                        errors.push(format!("Broken internal link: #{}", fragment));
                    }
                }
            }
        }

        ValidationOutcome::from_errors(errors)
    }
}

/// DOCX: a readable package with a body containing at least one paragraph.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocxValidator;

impl DocxValidator {
    fn read_part(archive: &mut zip::ZipArchive<File>, name: &str) -> Result<String> {
        let mut part = archive.by_name(name)?;
        let mut xml = String::new();
        part.read_to_string(&mut xml)?;
        Ok(xml)
    }

    /// Relationship ids declared in `word/_rels/document.xml.rels`.
    fn relationship_ids(archive: &mut zip::ZipArchive<File>) -> HashSet<String> {
        let rels = Self::read_part(archive, "word/_rels/document.xml.rels").unwrap_or_default();
        match roxmltree::Document::parse(&rels) {
            Ok(doc) => doc
                .descendants()
                .filter(|n| n.tag_name().name() == "Relationship")
                .filter_map(|n| n.attribute("Id"))
                .map(str::to_string)
                .collect(),
            Err(_) => HashSet::new(),
        }
    }

    fn inspect(path: &Path, check_links: bool) -> Result<Vec<String>> {
        let mut archive = zip::ZipArchive::new(File::open(path)?)?;
        let xml = match Self::read_part(&mut archive, "word/document.xml") {
            Ok(xml) => xml,
            Err(_) => return Ok(vec!["DOCX package has no word/document.xml".to_string()]),
        };
        let document = match roxmltree::Document::parse(&xml) {
            Ok(document) => document,
            Err(e) => {
                return Ok(vec![format!(
                    "DOCX word/document.xml is not well-formed: {}",
                    e
                )])
            }
        };

        let body = match document
            .descendants()
            .find(|n| n.has_tag_name((WORDML_NS, "body")))
        {
            Some(body) => body,
            None => return Ok(vec!["DOCX document has no body".to_string()]),
        };

        let mut errors = Vec::new();
        let paragraphs = body
            .descendants()
            .filter(|n| n.has_tag_name((WORDML_NS, "p")))
            .count();
        let has_text = body
            .descendants()
            .filter(|n| n.has_tag_name((WORDML_NS, "t")))
            .any(|n| n.text().is_some_and(|t| !t.trim().is_empty()));
        if paragraphs == 0 {
            errors.push("DOCX document has no paragraphs".to_string());
        } else if !has_text {
            errors.push(format!(
                "DOCX document has {} paragraph(s) but no text",
                paragraphs
            ));
        }

        if check_links {
            let hyperlinks: Vec<_> = body
                .descendants()
                .filter(|n| n.has_tag_name((WORDML_NS, "hyperlink")))
                .collect();

            let rel_ids = Self::relationship_ids(&mut archive);
            for id in hyperlinks
                .iter()
                .filter_map(|n| n.attribute((RELATIONSHIPS_NS, "id")))
            {
                if !rel_ids.contains(id) {
                    errors.push(format!("Hyperlink relationship '{}' is missing", id));
                }
            }

            let bookmarks: HashSet<&str> = body
                .descendants()
                .filter(|n| n.has_tag_name((WORDML_NS, "bookmarkStart")))
                .filter_map(|n| n.attribute((WORDML_NS, "name")))
                .collect();
            for anchor in hyperlinks
                .iter()
                .filter_map(|n| n.attribute((WORDML_NS, "anchor")))
            {
                if !bookmarks.contains(anchor) {
                    errors.push(format!("Broken internal link: #{}", anchor));
                }
            }
        }

        Ok(errors)
    }
}

impl StructureValidator for DocxValidator {
    fn validate(&self, output_path: &Path, check_links: bool) -> ValidationOutcome {
        match Self::inspect(output_path, check_links) {
            Ok(errors) => ValidationOutcome::from_errors(errors),
            Err(e) => ValidationOutcome::invalid(vec![format!(
                "DOCX package '{}' is unreadable: {}",
                output_path.display(),
                e
            )]),
        }
    }
}

/// Markdown: some non-blank text, and optionally defined reference links.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownValidator;

impl StructureValidator for MarkdownValidator {
    fn validate(&self, output_path: &Path, check_links: bool) -> ValidationOutcome {
        static EMPTY_LINK: OnceLock<Regex> = OnceLock::new();
        static REF_USE: OnceLock<Regex> = OnceLock::new();
        static REF_DEF: OnceLock<Regex> = OnceLock::new();

        let text = match read_text(output_path) {
            Ok(text) => text,
            Err(outcome) => return outcome,
        };

        let mut errors = Vec::new();
        if text.trim().is_empty() {
            errors.push("Markdown document is empty".to_string());
        }

        if check_links {
            if regex(&EMPTY_LINK, r"\[[^\]]*\]\(\s*\)").is_match(&text) {
                errors.push("Link with empty target".to_string());
            }

            let defined: HashSet<String> = regex(&REF_DEF, r"(?m)^\s{0,3}\[([^\]]+)\]:")
                .captures_iter(&text)
                .map(|c| c[1].to_lowercase())
                .collect();
            let mut reported = HashSet::new();
            for cap in regex(&REF_USE, r"\[[^\]]+\]\[([^\]]+)\]").captures_iter(&text) {
                let label = cap[1].to_lowercase();
                if !defined.contains(&label) && reported.insert(label.clone()) {
                    errors.push(format!("Undefined link reference: [{}]", label));
                }
            }
        }

        ValidationOutcome::from_errors(errors)
    }
}
