//! Frequency lookup and the rarity cut.

use super::CandidateWord;
use crate::error::PipelineError;
use std::collections::HashMap;
use wordfreq::WordFreq;
use wordfreq_model::{load_wordfreq, ModelKind};

/// Read-only word -> corpus frequency mapping. 0.0 means "not in the table".
pub trait FrequencyTable: Send + Sync {
    fn frequency(&self, word: &str) -> f32;
}

impl FrequencyTable for WordFreq {
    fn frequency(&self, word: &str) -> f32 {
        self.word_frequency(word)
    }
}

impl FrequencyTable for HashMap<String, f32> {
    fn frequency(&self, word: &str) -> f32 {
        self.get(word).copied().unwrap_or(0.0)
    }
}

/// Load the embedded large English wordfreq model.
pub fn load_english_table() -> Result<WordFreq, PipelineError> {
    load_wordfreq(ModelKind::LargeEn)
        .map_err(|e| PipelineError::unavailable("wordfreq model", format!("{:?}", e)))
}

/// Look a lowercase form up, falling back to the part before an apostrophe
/// ("darcy's" -> "darcy").
pub fn lookup(table: &dyn FrequencyTable, word: &str) -> f32 {
    let freq = table.frequency(word);
    if freq > 0.0 {
        return freq;
    }
    match word.find(['\'', '\u{2019}']) {
        Some(pos) if pos > 0 => table.frequency(&word[..pos]),
        _ => 0.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rarity {
    /// At or above the threshold.
    Common(f32),
    /// Known and strictly below the threshold.
    Rare(f32),
    /// Absent from the table; goes to segmentation correction.
    Unknown,
}

/// A candidate whose form is absent from the frequency table. Only the
/// frequency filter creates these, so correction never sees a known word.
#[derive(Debug, Clone)]
pub struct UnknownWord(CandidateWord);

impl UnknownWord {
    pub fn word(&self) -> &str {
        &self.0.canonical
    }

    pub fn into_candidate(self) -> CandidateWord {
        self.0
    }
}

/// Result of one frequency pass over the distinct forms of a document.
#[derive(Debug, Default)]
pub struct FrequencyPass {
    pub rare: Vec<CandidateWord>,
    pub unknown: Vec<UnknownWord>,
    pub common: usize,
}

pub struct FrequencyFilter<'a> {
    table: &'a dyn FrequencyTable,
    threshold: f32,
}

impl<'a> FrequencyFilter<'a> {
    pub fn new(table: &'a dyn FrequencyTable, threshold: f32) -> Self {
        Self { table, threshold }
    }

    pub fn classify(&self, word: &str) -> Rarity {
        let freq = lookup(self.table, word);
        if freq <= 0.0 {
            Rarity::Unknown
        } else if freq < self.threshold {
            Rarity::Rare(freq)
        } else {
            Rarity::Common(freq)
        }
    }

    /// Split candidates into rare and unknown, dropping common ones.
    pub fn run(&self, words: Vec<CandidateWord>) -> FrequencyPass {
        let mut pass = FrequencyPass::default();
        for mut word in words {
            match self.classify(&word.canonical) {
                Rarity::Common(_) => pass.common += 1,
                Rarity::Rare(freq) => {
                    word.score = freq;
                    pass.rare.push(word);
                }
                Rarity::Unknown => {
                    word.score = 0.0;
                    pass.unknown.push(UnknownWord(word));
                }
            }
        }
        pass
    }
}
