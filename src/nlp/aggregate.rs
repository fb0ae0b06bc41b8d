use super::normalizer::CandidateGroup;
use super::{AnalysisStats, HardWord};
use std::cmp::Ordering;

/// Folds the surviving groups into ranked hard-word records.
pub struct Aggregator {
    max_contexts: usize,
}

impl Aggregator {
    pub fn new(max_contexts: usize) -> Self {
        Self { max_contexts }
    }

    pub fn build(
        &self,
        groups: Vec<CandidateGroup>,
        sentences: &[&str],
        total_candidates: usize,
        filtered_by_ner: Vec<String>,
    ) -> (Vec<HardWord>, AnalysisStats) {
        let mut scored_words: Vec<HardWord> = groups.iter().filter_map(|g| self.record(g, sentences)).collect();
        scored_words.sort_by(rank);

        let stats = AnalysisStats {
            total_candidates,
            filtered_by_ner,
            hard_words_count: scored_words.len(),
        };
        (scored_words, stats)
    }

    fn record(&self, group: &CandidateGroup, sentences: &[&str]) -> Option<HardWord> {
        let word = group.representative()?.to_string();
        let occurrences = group.occurrences();

        let mut seen: Vec<usize> = Vec::new();
        let mut contexts: Vec<String> = Vec::new();
        for occurrence in &occurrences {
            if contexts.len() >= self.max_contexts {
                break;
            }
            if seen.contains(&occurrence.sentence) {
                continue;
            }
            seen.push(occurrence.sentence);
            if let Some(text) = sentences.get(occurrence.sentence) {
                let context = clean_context(text);
                if !contexts.contains(&context) {
                    contexts.push(context);
                }
            }
        }

        Some(HardWord {
            word,
            frequency_score: group.score() as f64,
            contexts,
            count: occurrences.len(),
            variants: group.variants(),
        })
    }
}

/// Rarest first, then most used, then alphabetical.
pub fn rank(a: &HardWord, b: &HardWord) -> Ordering {
    a.frequency_score
        .total_cmp(&b.frequency_score)
        .then_with(|| b.count.cmp(&a.count))
        .then_with(|| a.word.cmp(&b.word))
}

/// Collapse whitespace and stray non-breaking spaces left by HTML.
pub fn clean_context(sentence: &str) -> String {
    sentence
        .replace("&nbsp;", " ")
        .replace('\u{00A0}', " ") // non-breaking space
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
