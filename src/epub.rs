use ammonia::Builder;
use epub::doc::EpubDoc;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum EpubError {
    #[error("Failed to open EPUB {path}: {reason}")]
    Open { path: String, reason: String },
    #[error("EPUB {0} has no readable text")]
    Empty(String),
}

impl serde::Serialize for EpubError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedText {
    pub full_text: String,
    pub chapter_count: usize,
}

/// Entities ammonia leaves behind once every tag is gone.
const ENTITIES: [(&str, &str); 7] = [
    ("&nbsp;", " "),
    ("&#160;", " "),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&amp;", "&"), // last, so "&amp;lt;" stays "&lt;"
];

/// Turns EPUB chapters into plain prose.
pub struct EpubExtractor {
    cleaner: Builder<'static>,
}

impl EpubExtractor {
    pub fn new() -> Self {
        // Strip all tags, keep only text
        let mut cleaner = Builder::new();
        cleaner
            .tags(HashSet::new())
            .clean_content_tags(HashSet::from(["script", "style"]));
        Self { cleaner }
    }

    /// Plain text of one XHTML chapter, whitespace collapsed.
    pub fn html_to_text(&self, html: &str) -> String {
        let mut text = self.cleaner.clean(html).to_string();
        for (entity, replacement) in ENTITIES {
            if text.contains(entity) {
                text = text.replace(entity, replacement);
            }
        }
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Every spine item in reading order, non-empty chapters joined by a blank line.
    pub fn extract(&self, epub_path: &Path) -> Result<ExtractedText, EpubError> {
        let mut doc = EpubDoc::new(epub_path).map_err(|e| EpubError::Open {
            path: epub_path.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut chapters: Vec<String> = Vec::new();
        loop {
            if let Some((content, _mime)) = doc.get_current_str() {
                let chapter = self.html_to_text(&content);
                if !chapter.is_empty() {
                    chapters.push(chapter);
                }
            }
            if !doc.go_next() {
                break;
            }
        }

        if chapters.is_empty() {
            return Err(EpubError::Empty(epub_path.display().to_string()));
        }
        tracing::debug!("Extracted {} chapters from {}", chapters.len(), epub_path.display());
        Ok(ExtractedText {
            chapter_count: chapters.len(),
            full_text: chapters.join("\n\n"),
        })
    }
}

impl Default for EpubExtractor {
    fn default() -> Self {
        Self::new()
    }
}
