//! Repair of concatenation artifacts left by EPUB conversion
//! ("believesthat's", "theendofeternity").
//!
//! Only words the frequency table has never seen reach this stage; a word
//! with a nonzero frequency is a real word and is never re-segmented.

use super::frequency::{FrequencyTable, UnknownWord};
use super::normalizer::Normalizer;
use super::CandidateWord;
use crate::config::CorrectionConfig;
use crate::error::PipelineError;
use std::path::Path;
use symspell::{AsciiStringStrategy, SymSpell};

/// Best split of a string into dictionary words.
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    pub segments: Vec<String>,
    pub distance_sum: i64,
}

pub trait WordSegmenter: Send + Sync {
    fn segment(&self, word: &str, max_edit_distance: i64) -> Segmentation;
}

impl WordSegmenter for SymSpell<AsciiStringStrategy> {
    fn segment(&self, word: &str, max_edit_distance: i64) -> Segmentation {
        let composition = self.word_segmentation(word, max_edit_distance);
        Segmentation {
            segments: composition
                .segmented_string
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            distance_sum: composition.distance_sum,
        }
    }
}

/// Load a SymSpell dictionary file (`term count` per line).
pub fn load_symspell(dict_path: &Path) -> Result<SymSpell<AsciiStringStrategy>, PipelineError> {
    let path = dict_path
        .to_str()
        .ok_or_else(|| PipelineError::unavailable("SymSpell dictionary", "path is not valid UTF-8"))?;
    if !dict_path.exists() {
        return Err(PipelineError::unavailable(
            "SymSpell dictionary",
            format!("{} not found; run `lexis resources download`", path),
        ));
    }

    let mut symspell: SymSpell<AsciiStringStrategy> = SymSpell::default();
    if !symspell.load_dictionary(path, 0, 1, " ") {
        return Err(PipelineError::unavailable(
            "SymSpell dictionary",
            format!("failed to load {}", path),
        ));
    }
    tracing::info!("SymSpell dictionary loaded from {}", path);
    Ok(symspell)
}

const HYPHENS: [char; 3] = ['-', '\u{2010}', '\u{2011}'];

/// Function words that conversion most often glues onto the previous word.
const TRAILING_FUNCTION_WORDS: &[&str] = &["that", "the", "this", "they", "there", "their"];

#[derive(Debug, Clone, PartialEq)]
pub enum Correction {
    /// The token was an artifact of these words.
    Resolved(Vec<String>),
    /// Kept as a hard-word candidate.
    Retained,
}

#[derive(Debug, Default)]
pub struct CorrectionPass {
    pub retained: Vec<CandidateWord>,
    pub resolved: Vec<(String, Vec<String>)>,
}

pub struct SegmentationCorrector<'a> {
    segmenter: &'a dyn WordSegmenter,
    table: &'a dyn FrequencyTable,
    normalizer: &'a Normalizer,
    config: &'a CorrectionConfig,
}

impl<'a> SegmentationCorrector<'a> {
    pub fn new(
        segmenter: &'a dyn WordSegmenter,
        table: &'a dyn FrequencyTable,
        normalizer: &'a Normalizer,
        config: &'a CorrectionConfig,
    ) -> Self {
        Self {
            segmenter,
            table,
            normalizer,
            config,
        }
    }

    pub fn run(&self, words: Vec<UnknownWord>) -> CorrectionPass {
        let mut pass = CorrectionPass::default();
        for word in words {
            match self.correct(&word) {
                Correction::Resolved(parts) => {
                    tracing::debug!("Filtering malformed word '{}' -> '{}'", word.word(), parts.join(" "));
                    pass.resolved.push((word.word().to_string(), parts));
                }
                Correction::Retained => pass.retained.push(word.into_candidate()),
            }
        }
        pass
    }

    pub fn correct(&self, word: &UnknownWord) -> Correction {
        // "believesthat's" is checked as "believesthat"
        let base = match word.word().find(['\'', '\u{2019}']) {
            Some(pos) => &word.word()[..pos],
            None => word.word(),
        };

        // "to-morrow", "well-bred": each hyphen is a split point with no edits.
        if base.contains(HYPHENS) {
            let split = Segmentation {
                segments: base.split(HYPHENS).map(str::to_string).collect(),
                distance_sum: 0,
            };
            return if self.accepts(&split) {
                Correction::Resolved(split.segments)
            } else {
                Correction::Retained
            };
        }

        if base.len() < self.config.min_word_chars || !base.bytes().all(|b| b.is_ascii_lowercase()) {
            return Correction::Retained;
        }

        // An unseen inflection of a known stem is a real word.
        if self.table.frequency(&self.normalizer.stem(base)) > 0.0 {
            return Correction::Retained;
        }

        let split = self.segmenter.segment(base, self.config.max_edit_distance);
        if self.accepts(&split) {
            return Correction::Resolved(split.segments);
        }

        for suffix in TRAILING_FUNCTION_WORDS {
            if let Some(prefix) = base.strip_suffix(suffix) {
                if prefix.len() < 4 {
                    continue;
                }
                let split = Segmentation {
                    segments: vec![prefix.to_string(), suffix.to_string()],
                    distance_sum: 0,
                };
                if self.accepts(&split) {
                    return Correction::Resolved(split.segments);
                }
            }
        }

        Correction::Retained
    }

    /// Every segment must be a known word on its own and the split as a
    /// whole must be likely enough.
    fn accepts(&self, split: &Segmentation) -> bool {
        if split.segments.len() < 2 {
            return false;
        }
        if split.distance_sum > self.config.max_edit_distance * split.segments.len() as i64 {
            return false;
        }

        let mut log_sum = 0.0f64;
        for segment in &split.segments {
            if segment.chars().count() < self.config.min_segment_chars {
                return false;
            }
            let freq = self.table.frequency(segment);
            if freq <= 0.0 {
                return false;
            }
            log_sum += (freq as f64).log10();
        }
        log_sum -= split.distance_sum as f64;

        log_sum / split.segments.len() as f64 >= self.config.min_mean_log_frequency
    }
}
