//! Lexis finds the hard vocabulary in a book.
//!
//! Text goes through segmentation, frequency filtering, malformed-word
//! correction, stemming, entity filtering and aggregation, and comes out as
//! a ranked list of rare words with example sentences. Jobs run through a
//! [`JobQueue`] that reports [`ProgressEvent`]s and honours cancellation.

pub mod calibre;
pub mod config;
pub mod epub;
pub mod error;
pub mod export;
pub mod job;
pub mod library;
pub mod nlp;
pub mod resources;

pub use calibre::CalibreLibrary;
pub use config::{AnalysisConfig, ConfigError, DEFAULT_RARITY_THRESHOLD};
pub use error::PipelineError;
pub use export::ExportDocument;
pub use job::{CancelToken, JobHandle, JobOutcome, JobQueue, JobState};
pub use library::{Book, BookSource, BookText, LibraryError};
pub use nlp::progress::{ProgressEvent, ProgressReporter, Stage};
pub use nlp::{AnalysisResult, AnalysisStats, HardWord, NlpPipeline, PipelineContext};
pub use resources::ResourcePaths;
