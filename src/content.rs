//! Document and knowledge base loading
//!
//! Documents are plain `.txt` files or HTML pages. HTML pages carry the text
//! in a hidden `<div id="{id}-data" class="hidden-data">` block; pages without
//! one fall back to the visible `<div class="content">` block, tags stripped.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::config::DocumentConfig;
use crate::query::KnowledgeBase;
use crate::{Error, Result};

static CONTENT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<div\s+class=["']content["']>([\s\S]*?)</div>"#).expect("valid content regex")
});

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[^>]+(>|$)").expect("valid tag regex"));

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Where a document's text and structured answers live
#[derive(Debug, Clone)]
pub struct DocumentSource {
    pub id: String,
    pub title: String,
    pub path: PathBuf,
    pub knowledge_path: PathBuf,
}

impl DocumentSource {
    #[must_use]
    pub fn from_config(config: &DocumentConfig) -> Self {
        Self {
            id: config.id.clone(),
            title: config.title.clone(),
            path: config.path.clone(),
            knowledge_path: config.knowledge_path.clone(),
        }
    }

    /// Read the document text
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or no text can be extracted
    pub fn load_text(&self) -> Result<String> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            Error::Document(format!("failed to read {}: {e}", self.path.display()))
        })?;

        let text = if is_html(&self.path) {
            extract_html_content(&raw, &self.id).ok_or_else(|| {
                Error::Document(format!(
                    "could not extract content from {}",
                    self.path.display()
                ))
            })?
        } else {
            raw.trim().to_string()
        };

        tracing::info!(
            id = %self.id,
            path = %self.path.display(),
            chars = text.len(),
            "loaded document"
        );
        Ok(text)
    }

    /// Load the structured knowledge base, if the file exists
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but is unreadable or malformed
    pub fn load_knowledge(&self) -> Result<Option<KnowledgeBase>> {
        if !self.knowledge_path.exists() {
            tracing::info!(
                path = %self.knowledge_path.display(),
                "no knowledge base file, structured answers disabled"
            );
            return Ok(None);
        }

        KnowledgeBase::load(&self.knowledge_path).map(Some)
    }

    /// Identifier under which the knowledge base is served
    #[must_use]
    pub fn knowledge_id(&self) -> String {
        format!("{}_responses", self.id)
    }
}

fn is_html(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"))
}

/// Extract document text from an HTML page
///
/// Prefers the hidden data block for `id`, else the visible content block with
/// tags removed and whitespace collapsed.
#[must_use]
pub fn extract_html_content(html: &str, id: &str) -> Option<String> {
    let hidden = Regex::new(&format!(
        r#"<div\s+id=["']{}-data["']\s+class=["']hidden-data["']>\s*([\s\S]*?)\s*</div>"#,
        regex::escape(id)
    ))
    .ok()?;

    if let Some(text) = hidden
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|t| !t.is_empty())
    {
        return Some(text.to_string());
    }

    tracing::debug!(id, "no hidden data block, using visible content");

    let block = CONTENT_BLOCK.captures(html)?.get(1)?.as_str();
    let stripped = HTML_TAG.replace_all(block, " ");
    let text = WHITESPACE.replace_all(&stripped, " ").trim().to_string();

    (!text.is_empty()).then_some(text)
}
