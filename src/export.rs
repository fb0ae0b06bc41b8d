//! Vocabulary export file.
//!
//! Only the word, its score and its example sentences are written;
//! occurrence counts and variants stay in the in-app result.

use crate::library::Book;
use crate::nlp::{AnalysisResult, HardWord};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const EXPORT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Failed to serialize export: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Failed to write export to {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl Serialize for ExportError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedWord {
    pub word: String,
    pub frequency_score: f64,
    pub contexts: Vec<String>,
}

impl From<&HardWord> for ExportedWord {
    fn from(word: &HardWord) -> Self {
        Self {
            word: word.word.clone(),
            frequency_score: word.frequency_score,
            contexts: word.contexts.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedBook {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub words: Vec<ExportedWord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub version: u32,
    /// RFC 3339, UTC.
    pub exported_at: String,
    pub books: Vec<ExportedBook>,
}

impl ExportDocument {
    pub fn new(exported_at: DateTime<Utc>) -> Self {
        Self {
            version: EXPORT_VERSION,
            exported_at: exported_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            books: Vec::new(),
        }
    }

    pub fn now() -> Self {
        Self::new(Utc::now())
    }

    pub fn add_book(&mut self, id: i64, title: &str, author: &str, result: &AnalysisResult) {
        self.books.push(ExportedBook {
            id,
            title: title.to_string(),
            author: author.to_string(),
            words: result.hard_words.iter().map(ExportedWord::from).collect(),
        });
    }

    pub fn add_library_book(&mut self, book: &Book, result: &AnalysisResult) {
        self.add_book(book.id, &book.title, &book.author, result);
    }

    pub fn to_json(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), ExportError> {
        let json = self.to_json()?;
        fs::write(path, json).map_err(|source| ExportError::Write {
            path: path.display().to_string(),
            source,
        })?;
        tracing::info!("Exported {} books to {}", self.books.len(), path.display());
        Ok(())
    }
}
