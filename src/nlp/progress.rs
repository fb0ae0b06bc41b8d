//! Progress events for the presentation layer.
//!
//! Events travel over a bounded channel and are best effort: a full or
//! closed channel drops the event instead of blocking the pipeline.

use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct SampleWord {
    pub word: String,
    pub is_entity: bool, // true = will be filtered, false = kept
}

/// The six pipeline stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Segmentation,
    FrequencyFiltering,
    MalformedWordCorrection,
    Stemming,
    EntityFiltering,
    Aggregation,
}

impl Stage {
    /// Stable label shared with the UI.
    pub fn label(self) -> &'static str {
        match self {
            Stage::Segmentation => "segmentation",
            Stage::FrequencyFiltering => "frequency-filtering",
            Stage::MalformedWordCorrection => "malformed-word-correction",
            Stage::Stemming => "stemming",
            Stage::EntityFiltering => "entity-filtering",
            Stage::Aggregation => "aggregation",
        }
    }

    /// Percent reported when the stage starts.
    pub fn start_percent(self) -> u8 {
        match self {
            Stage::Segmentation => 0,
            Stage::FrequencyFiltering => 10,
            Stage::MalformedWordCorrection => 25,
            Stage::Stemming => 35,
            Stage::EntityFiltering => 40,
            Stage::Aggregation => 90,
        }
    }
}

/// Stage-specific progress payload.
#[derive(Debug, Clone, PartialEq)]
pub enum StageProgress {
    Segmentation {
        chars: usize,
    },
    FrequencyFiltering {
        sentences: usize,
        tokens: usize,
        distinct: usize,
    },
    MalformedWordCorrection {
        unknown: usize,
    },
    Stemming {
        candidates: usize,
        repaired: usize,
    },
    EntityFiltering {
        processed: usize,
        total: usize,
        entities_found: usize,
        sample_words: Vec<SampleWord>,
    },
    Aggregation {
        candidates: usize,
        hard_words: Option<usize>,
    },
}

impl StageProgress {
    pub fn stage(&self) -> Stage {
        match self {
            StageProgress::Segmentation { .. } => Stage::Segmentation,
            StageProgress::FrequencyFiltering { .. } => Stage::FrequencyFiltering,
            StageProgress::MalformedWordCorrection { .. } => Stage::MalformedWordCorrection,
            StageProgress::Stemming { .. } => Stage::Stemming,
            StageProgress::EntityFiltering { .. } => Stage::EntityFiltering,
            StageProgress::Aggregation { .. } => Stage::Aggregation,
        }
    }

    pub fn detail(&self) -> String {
        match self {
            StageProgress::Segmentation { chars } => format!("{} characters", chars),
            StageProgress::FrequencyFiltering {
                sentences,
                tokens,
                distinct,
            } => format!("{} sentences, {} words, {} distinct", sentences, tokens, distinct),
            StageProgress::MalformedWordCorrection { unknown } => {
                format!("{} unknown words to check", unknown)
            }
            StageProgress::Stemming {
                candidates,
                repaired,
            } => format!("{} candidates, {} malformed words repaired", candidates, repaired),
            StageProgress::EntityFiltering {
                processed,
                total,
                entities_found,
                ..
            } => format!("{}/{} sentences, {} names found", processed, total, entities_found),
            StageProgress::Aggregation {
                hard_words: Some(found),
                ..
            } => format!("{} hard words found", found),
            StageProgress::Aggregation { candidates, .. } => {
                format!("{} candidates to rank", candidates)
            }
        }
    }
}

/// One progress update for one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(into = "ProgressPayload")]
pub struct ProgressEvent {
    pub book_id: i64,
    pub progress: u8,
    pub update: StageProgress,
}

impl ProgressEvent {
    pub fn stage(&self) -> Stage {
        self.update.stage()
    }
}

/// Wire shape consumed by the UI.
#[derive(Debug, Serialize)]
pub struct ProgressPayload {
    pub book_id: i64,
    pub stage: &'static str,
    pub progress: u8, // 0-100
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_words: Option<Vec<SampleWord>>,
}

impl From<ProgressEvent> for ProgressPayload {
    fn from(event: ProgressEvent) -> Self {
        let detail = Some(event.update.detail());
        let stage = event.stage().label();
        let sample_words = match event.update {
            StageProgress::EntityFiltering { sample_words, .. } if !sample_words.is_empty() => Some(sample_words),
            _ => None,
        };
        ProgressPayload {
            book_id: event.book_id,
            stage,
            progress: event.progress,
            detail,
            sample_words,
        }
    }
}

/// Sends progress for one job, keeping the percent non-decreasing.
pub struct ProgressReporter {
    book_id: i64,
    sender: Option<mpsc::Sender<ProgressEvent>>,
    last_percent: u8,
    dropped: usize,
}

impl ProgressReporter {
    pub fn new(book_id: i64, sender: mpsc::Sender<ProgressEvent>) -> Self {
        Self {
            book_id,
            sender: Some(sender),
            last_percent: 0,
            dropped: 0,
        }
    }

    /// A reporter nobody listens to.
    pub fn silent(book_id: i64) -> Self {
        Self {
            book_id,
            sender: None,
            last_percent: 0,
            dropped: 0,
        }
    }

    pub fn report(&mut self, percent: u8, update: StageProgress) {
        let progress = percent.min(100).max(self.last_percent);
        self.last_percent = progress;

        let Some(sender) = &self.sender else {
            return;
        };
        let event = ProgressEvent {
            book_id: self.book_id,
            progress,
            update,
        };
        match sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => self.dropped += 1,
            Err(mpsc::error::TrySendError::Closed(_)) => {
                // Listener went away; stop trying.
                self.sender = None;
            }
        }
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        if self.dropped > 0 {
            tracing::debug!("Dropped {} progress events for book {}", self.dropped, self.book_id);
        }
    }
}
