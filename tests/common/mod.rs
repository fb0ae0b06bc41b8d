//! In-memory stand-ins for the frequency table, the segmenter and the
//! entity model, so pipeline behaviour can be checked without downloads.
#![allow(dead_code)]

use lexis::nlp::correction::{Segmentation, WordSegmenter};
use lexis::nlp::entities::EntityRecognizer;
use lexis::nlp::frequency::FrequencyTable;
use lexis::{AnalysisConfig, CancelToken, NlpPipeline, PipelineContext, PipelineError};
use std::collections::HashMap;
use std::ops::Range;
use std::sync::{Arc, Mutex};

pub const THRESHOLD: f32 = 0.00005;

pub fn table(entries: &[(&str, f32)]) -> HashMap<String, f32> {
    entries.iter().map(|(w, f)| (w.to_string(), *f)).collect()
}

/// Vocabulary shared by the pipeline tests.
pub fn book_table() -> HashMap<String, f32> {
    table(&[
        // common
        ("was", 0.01),
        ("she", 0.005),
        ("and", 0.03),
        ("had", 0.004),
        ("the", 0.05),
        ("left", 4e-4),
        ("end", 3e-4),
        ("of", 0.03),
        ("mood", 1e-4),
        ("very", 2e-3),
        // rare
        ("darcy", 2e-6),
        ("sanguine", 1.5e-6),
        ("obsequious", 2.5e-7),
        ("amiable", 1e-6),
        ("favorites", 8e-6),
        ("eternity", 5e-6),
        ("zephyr", 1e-6),
        ("quixotic", 1e-6),
        ("aldous", 1e-7),
        ("beatrix", 1e-7),
        ("cedric", 1e-7),
        ("ann", 3e-6),
        ("annoyance", 4e-6),
        ("unbecoming", 2e-6),
        // parts of hyphenated compounds
        ("said", 5e-3),
        ("we", 0.01),
        ("to", 0.02),
        ("with", 0.02),
        ("leave", 3e-4),
        ("friends", 3e-4),
        ("well", 3e-3),
        ("good", 2e-3),
        ("three", 1e-3),
        ("twenty", 2e-4),
        ("bred", 5e-6),
        ("morrow", 2e-6),
        ("humoured", 1e-6),
    ])
}

pub const BOOK: &str = "Darcy was sanguine. She was obsequious and amiable. \
Darcy had theendofeternity favorites. The sanguine Darcy left.";

/// Splits into listed words by dynamic programming, recording every call.
pub struct CountingSegmenter {
    words: Vec<&'static str>,
    pub calls: Mutex<Vec<String>>,
}

impl CountingSegmenter {
    pub fn new(words: &[&'static str]) -> Self {
        Self {
            words: words.to_vec(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl WordSegmenter for CountingSegmenter {
    fn segment(&self, word: &str, _max_edit_distance: i64) -> Segmentation {
        self.calls.lock().unwrap().push(word.to_string());
        let n = word.len();
        let mut best: Vec<Option<Vec<String>>> = vec![None; n + 1];
        best[0] = Some(Vec::new());
        for end in 1..=n {
            for start in 0..end {
                let (Some(prefix), Some(piece)) = (&best[start], word.get(start..end)) else {
                    continue;
                };
                if !self.words.iter().any(|w| *w == piece) {
                    continue;
                }
                let mut candidate = prefix.clone();
                candidate.push(piece.to_string());
                if best[end].as_ref().map_or(true, |b| candidate.len() < b.len()) {
                    best[end] = Some(candidate);
                }
            }
        }
        Segmentation {
            segments: best[n].clone().unwrap_or_else(|| vec![word.to_string()]),
            distance_sum: 0,
        }
    }
}

/// Tags whole-word mentions of the listed names. Optionally cancels a job
/// the first time it is called.
pub struct NameRecognizer {
    names: Vec<&'static str>,
    cancel_on_call: Option<CancelToken>,
    pub seen: Mutex<Vec<String>>,
}

impl NameRecognizer {
    pub fn new(names: &[&'static str]) -> Self {
        Self {
            names: names.to_vec(),
            cancel_on_call: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn cancelling(names: &[&'static str], token: CancelToken) -> Self {
        Self {
            cancel_on_call: Some(token),
            ..Self::new(names)
        }
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl EntityRecognizer for NameRecognizer {
    fn recognize(&self, texts: &[&str]) -> Result<Vec<Vec<Range<usize>>>, PipelineError> {
        if let Some(token) = &self.cancel_on_call {
            token.cancel();
        }
        self.seen.lock().unwrap().extend(texts.iter().map(|t| t.to_string()));
        Ok(texts.iter().map(|t| mentions(t, &self.names)).collect())
    }
}

/// Byte ranges of `names` in `text` that are not part of a longer word.
pub fn mentions(text: &str, names: &[&str]) -> Vec<Range<usize>> {
    let mut ranges: Vec<Range<usize>> = names
        .iter()
        .flat_map(|name| text.match_indices(name).map(|(pos, m)| pos..pos + m.len()))
        .filter(|r| {
            !text[..r.start].chars().next_back().is_some_and(char::is_alphanumeric)
                && !text[r.end..].chars().next().is_some_and(char::is_alphanumeric)
        })
        .collect();
    ranges.sort_by_key(|r| r.start);
    ranges
}

pub struct FailingRecognizer;

impl EntityRecognizer for FailingRecognizer {
    fn recognize(&self, _texts: &[&str]) -> Result<Vec<Vec<Range<usize>>>, PipelineError> {
        Err(PipelineError::Inference("onnx session failed".into()))
    }
}

pub fn segmenter() -> Arc<CountingSegmenter> {
    Arc::new(CountingSegmenter::new(&["the", "end", "of", "eternity"]))
}

pub fn pipeline(
    segmenter: Arc<CountingSegmenter>,
    recognizer: Arc<dyn EntityRecognizer>,
    config: AnalysisConfig,
) -> NlpPipeline {
    pipeline_with_table(book_table(), segmenter, recognizer, config)
}

pub fn pipeline_with_table(
    table: HashMap<String, f32>,
    segmenter: Arc<CountingSegmenter>,
    recognizer: Arc<dyn EntityRecognizer>,
    config: AnalysisConfig,
) -> NlpPipeline {
    let frequencies: Arc<dyn FrequencyTable> = Arc::new(table);
    let context = PipelineContext::new(frequencies, segmenter, recognizer);
    NlpPipeline::new(Arc::new(context), config)
}

pub fn default_pipeline() -> (NlpPipeline, Arc<CountingSegmenter>) {
    let segmenter = segmenter();
    let pipeline = pipeline(
        Arc::clone(&segmenter),
        Arc::new(NameRecognizer::new(&["Darcy"])),
        AnalysisConfig::default(),
    );
    (pipeline, segmenter)
}
