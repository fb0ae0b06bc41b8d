use super::{CandidateWord, WordOccurrence};
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::BTreeMap;

/// Groups inflections of one word (gaiety, gaieties) under their stem.
pub struct Normalizer {
    stemmer: Stemmer,
}

impl Normalizer {
    pub fn new() -> Self {
        Self {
            stemmer: Stemmer::create(Algorithm::English),
        }
    }

    /// Stem a word (input must be lowercase)
    pub fn stem(&self, word: &str) -> String {
        self.stemmer.stem(word).to_string()
    }

    /// Merge candidates sharing a stem. Output is ordered by stem.
    pub fn group(&self, candidates: Vec<CandidateWord>) -> Vec<CandidateGroup> {
        let mut groups: BTreeMap<String, CandidateGroup> = BTreeMap::new();
        for candidate in candidates {
            let stem = self.stem(&candidate.canonical);
            groups
                .entry(stem.clone())
                .or_insert_with(|| CandidateGroup::new(stem))
                .insert(candidate);
        }
        groups.into_values().collect()
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// All surviving forms of one stem.
#[derive(Debug, Clone)]
pub struct CandidateGroup {
    pub stem: String,
    pub forms: BTreeMap<String, CandidateWord>,
}

impl CandidateGroup {
    pub fn new(stem: String) -> Self {
        Self {
            stem,
            forms: BTreeMap::new(),
        }
    }

    fn insert(&mut self, candidate: CandidateWord) {
        match self.forms.get_mut(&candidate.canonical) {
            Some(existing) => {
                existing.occurrences.extend(candidate.occurrences);
                existing.score = existing.score.max(candidate.score);
            }
            None => {
                self.forms.insert(candidate.canonical.clone(), candidate);
            }
        }
    }

    /// Display form: most occurrences, then shortest, then alphabetical.
    pub fn representative(&self) -> Option<&str> {
        self.forms
            .values()
            .min_by(|a, b| {
                b.count()
                    .cmp(&a.count())
                    .then_with(|| a.canonical.chars().count().cmp(&b.canonical.chars().count()))
                    .then_with(|| a.canonical.cmp(&b.canonical))
            })
            .map(|w| w.canonical.as_str())
    }

    /// Every form except the representative, alphabetically.
    pub fn variants(&self) -> Vec<String> {
        let representative = self.representative();
        self.forms
            .keys()
            .filter(|form| Some(form.as_str()) != representative)
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.forms.values().map(CandidateWord::count).sum()
    }

    /// Highest known frequency among the forms, 0.0 if none is known.
    pub fn score(&self) -> f32 {
        self.forms.values().map(|w| w.score).fold(0.0, f32::max)
    }

    /// Occurrences of every form in document order.
    pub fn occurrences(&self) -> Vec<&WordOccurrence> {
        let mut all: Vec<&WordOccurrence> = self.forms.values().flat_map(|w| w.occurrences.iter()).collect();
        all.sort_by_key(|o| (o.sentence, o.offset));
        all
    }

    pub fn is_empty(&self) -> bool {
        self.forms.values().all(|w| w.occurrences.is_empty())
    }
}
