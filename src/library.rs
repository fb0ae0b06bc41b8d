//! Where book text comes from.

use crate::epub::EpubError;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub path: String,
    pub cover_path: Option<String>,
    pub has_epub: bool,
}

/// Plain text of a whole book.
#[derive(Debug, Clone, PartialEq)]
pub struct BookText {
    pub text: String,
    pub chapter_count: usize,
    /// Whitespace-separated tokens.
    pub word_count: usize,
}

impl BookText {
    pub fn new(text: String, chapter_count: usize) -> Self {
        let word_count = text.split_whitespace().count();
        Self {
            text,
            chapter_count,
            word_count,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Library not found at path: {0}")]
    LibraryNotFound(String),
    #[error("Invalid library path: {0}")]
    InvalidPath(String),
    #[error("Book {0} has no EPUB file")]
    NoEpub(i64),
    #[error(transparent)]
    Extraction(#[from] EpubError),
}

impl Serialize for LibraryError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// A collection of books the pipeline can read.
pub trait BookSource {
    fn books(&self) -> Result<Vec<Book>, LibraryError>;

    fn book(&self, book_id: i64) -> Result<Option<Book>, LibraryError> {
        Ok(self.books()?.into_iter().find(|b| b.id == book_id))
    }

    fn book_text(&self, book_id: i64) -> Result<BookText, LibraryError>;
}
