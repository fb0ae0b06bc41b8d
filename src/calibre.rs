use crate::epub::EpubExtractor;
use crate::library::{Book, BookSource, BookText, LibraryError};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};

/// A Calibre library directory, read through its `metadata.db`.
pub struct CalibreLibrary {
    root: PathBuf,
    extractor: EpubExtractor,
}

impl CalibreLibrary {
    pub fn open(library_path: impl AsRef<Path>) -> Result<Self, LibraryError> {
        let root = library_path.as_ref().to_path_buf();
        if !root.join("metadata.db").exists() {
            return Err(LibraryError::LibraryNotFound(root.display().to_string()));
        }
        Ok(Self {
            root,
            extractor: EpubExtractor::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn connect(&self) -> Result<Connection, LibraryError> {
        let db_path = self.root.join("metadata.db");
        let db_uri = format!(
            "file:{}?mode=ro",
            db_path
                .to_str()
                .ok_or_else(|| LibraryError::InvalidPath(self.root.display().to_string()))?
        );

        Ok(Connection::open_with_flags(
            &db_uri,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI,
        )?)
    }

    pub fn epub_path(&self, book_id: i64) -> Result<Option<PathBuf>, LibraryError> {
        let conn = self.connect()?;
        let book_path: Option<String> = conn
            .query_row("SELECT path FROM books WHERE id = ?", [book_id], |row| row.get(0))
            .optional()?;

        Ok(book_path.and_then(|p| find_epub(&self.root.join(p))))
    }
}

impl BookSource for CalibreLibrary {
    fn books(&self) -> Result<Vec<Book>, LibraryError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT
                b.id,
                b.title,
                b.path,
                COALESCE(GROUP_CONCAT(a.name, ' & '), 'Unknown') as author,
                b.has_cover
            FROM books b
            LEFT JOIN books_authors_link bal ON b.id = bal.book
            LEFT JOIN authors a ON bal.author = a.id
            GROUP BY b.id
            ORDER BY b.title
            "#,
        )?;

        let books = stmt
            .query_map([], |row| {
                let id: i64 = row.get(0)?;
                let title: String = row.get(1)?;
                let book_path: String = row.get(2)?;
                let author: String = row.get(3)?;
                let has_cover: bool = row.get(4)?;

                let full_book_path = self.root.join(&book_path);
                let cover = full_book_path.join("cover.jpg");
                let cover_path = (has_cover && cover.exists()).then(|| cover.to_string_lossy().to_string());

                Ok(Book {
                    id,
                    title,
                    author,
                    has_epub: find_epub(&full_book_path).is_some(),
                    path: full_book_path.to_string_lossy().to_string(),
                    cover_path,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!("Found {} books in {}", books.len(), self.root.display());
        Ok(books)
    }

    fn book_text(&self, book_id: i64) -> Result<BookText, LibraryError> {
        let epub_path = self.epub_path(book_id)?.ok_or(LibraryError::NoEpub(book_id))?;
        tracing::info!("Extracting text from {}", epub_path.display());
        let extracted = self.extractor.extract(&epub_path)?;
        Ok(BookText::new(extracted.full_text, extracted.chapter_count))
    }
}

pub fn find_epub(book_dir: &Path) -> Option<PathBuf> {
    std::fs::read_dir(book_dir)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .find(|path| path.extension().is_some_and(|e| e.eq_ignore_ascii_case("epub")))
}
