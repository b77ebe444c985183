//! Document formats and conversion directions.

use crate::error::{ConversionError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// A document format the pipeline can read or write through pandoc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Markdown,
    Html,
    Docx,
    Odt,
    Rtf,
    Latex,
    PlainText,
}

impl DocumentFormat {
    /// All known formats.
    pub const ALL: [DocumentFormat; 7] = [
        DocumentFormat::Markdown,
        DocumentFormat::Html,
        DocumentFormat::Docx,
        DocumentFormat::Odt,
        DocumentFormat::Rtf,
        DocumentFormat::Latex,
        DocumentFormat::PlainText,
    ];

    /// Name used by pandoc's `--from`/`--to` flags.
    pub fn pandoc_name(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::Docx => "docx",
            Self::Odt => "odt",
            Self::Rtf => "rtf",
            Self::Latex => "latex",
            Self::PlainText => "plain",
        }
    }

    /// Extension used for generated output files.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Html => "html",
            Self::Docx => "docx",
            Self::Odt => "odt",
            Self::Rtf => "rtf",
            Self::Latex => "tex",
            Self::PlainText => "txt",
        }
    }

    /// Every extension recognized as this format on input.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Markdown => &["md", "markdown", "mdown", "mkd"],
            Self::Html => &["html", "htm", "xhtml"],
            Self::Docx => &["docx"],
            Self::Odt => &["odt"],
            Self::Rtf => &["rtf"],
            Self::Latex => &["tex", "latex"],
            Self::PlainText => &["txt", "text"],
        }
    }

    /// Look a format up by file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|format| {
            format
                .extensions()
                .iter()
                .any(|&e| e.eq_ignore_ascii_case(ext))
        })
    }

    /// Detect the format of a path from its extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Default glob matching input files of this format.
    pub fn default_pattern(&self) -> String {
        format!("*.{}", self.extension())
    }

    /// Source format assumed when a batch names only its target.
    pub fn default_source_for(target: DocumentFormat) -> DocumentFormat {
        match target {
            Self::Markdown => Self::Docx,
            _ => Self::Markdown,
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.pandoc_name())
    }
}

impl FromStr for DocumentFormat {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().trim_start_matches('.').to_ascii_lowercase();
        match lowered.as_str() {
            "markdown" | "gfm" | "commonmark" => Ok(Self::Markdown),
            "plain" | "plaintext" => Ok(Self::PlainText),
            other => Self::from_extension(other)
                .ok_or_else(|| ConversionError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Ordered (source, target) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversionDirection {
    pub source: DocumentFormat,
    pub target: DocumentFormat,
}

impl ConversionDirection {
    pub fn new(source: DocumentFormat, target: DocumentFormat) -> Self {
        Self { source, target }
    }

    /// Key under which per-direction extra arguments are configured.
    pub fn key(&self) -> String {
        format!("{}->{}", self.source.pandoc_name(), self.target.pandoc_name())
    }
}

impl fmt::Display for ConversionDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_extension_case_insensitive() {
        assert_eq!(DocumentFormat::from_extension("MD"), Some(DocumentFormat::Markdown));
        assert_eq!(DocumentFormat::from_extension("htm"), Some(DocumentFormat::Html));
        assert_eq!(DocumentFormat::from_extension("Docx"), Some(DocumentFormat::Docx));
        assert_eq!(DocumentFormat::from_extension("pdf"), None);
    }

    #[test]
    fn test_from_path() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("/notes/guide.markdown")),
            Some(DocumentFormat::Markdown)
        );
        assert_eq!(DocumentFormat::from_path(Path::new("README")), None);
    }

    #[test]
    fn test_from_str_accepts_names_and_extensions() {
        assert_eq!("markdown".parse::<DocumentFormat>().unwrap(), DocumentFormat::Markdown);
        assert_eq!("gfm".parse::<DocumentFormat>().unwrap(), DocumentFormat::Markdown);
        assert_eq!(".docx".parse::<DocumentFormat>().unwrap(), DocumentFormat::Docx);
        assert_eq!("HTML".parse::<DocumentFormat>().unwrap(), DocumentFormat::Html);
        assert!(matches!(
            "pdf".parse::<DocumentFormat>(),
            Err(ConversionError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_default_pattern() {
        assert_eq!(DocumentFormat::Html.default_pattern(), "*.html");
        assert_eq!(DocumentFormat::Markdown.default_pattern(), "*.md");
    }

    #[test]
    fn test_default_source_for_target() {
        assert_eq!(
            DocumentFormat::default_source_for(DocumentFormat::Docx),
            DocumentFormat::Markdown
        );
        assert_eq!(
            DocumentFormat::default_source_for(DocumentFormat::Markdown),
            DocumentFormat::Docx
        );
        assert_eq!(
            DocumentFormat::default_source_for(DocumentFormat::Html),
            DocumentFormat::Markdown
        );
    }

    #[test]
    fn test_direction_key() {
        let direction = ConversionDirection::new(DocumentFormat::Markdown, DocumentFormat::Docx);
        assert_eq!(direction.key(), "markdown->docx");
        assert_eq!(direction.to_string(), "markdown -> docx");
    }
}
