//! The hard-word pipeline.
//!
//! Stages run strictly in order, cheapest first, so the expensive entity
//! model only ever sees sentences that still hold a candidate:
//! segmentation, frequency filtering, malformed-word correction, stemming,
//! entity filtering, aggregation.

pub mod aggregate;
pub mod correction;
pub mod entities;
pub mod frequency;
pub mod normalizer;
pub mod progress;
pub mod segmenter;

use crate::config::AnalysisConfig;
use crate::error::{Halt, PipelineError};
use crate::job::{CancelToken, JobOutcome, JobRun, JobState};
use crate::resources::ResourcePaths;
use aggregate::Aggregator;
use correction::{SegmentationCorrector, WordSegmenter};
use entities::{EntityFilter, EntityRecognizer, GlinerRecognizer};
use frequency::{FrequencyFilter, FrequencyTable};
use normalizer::Normalizer;
use progress::{ProgressReporter, Stage, StageProgress};
use segmenter::{is_vocabulary_token, Segmenter};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// One token instance as it appeared in the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordOccurrence {
    pub surface: String,
    pub canonical: String,
    pub sentence: usize,
    /// Byte offset of `surface` in its sentence.
    pub offset: usize,
}

impl WordOccurrence {
    pub fn end(&self) -> usize {
        self.offset + self.surface.len()
    }

    pub fn is_capitalized(&self) -> bool {
        self.surface.chars().next().is_some_and(char::is_uppercase)
    }
}

/// A canonical form and everywhere it occurred.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateWord {
    pub canonical: String,
    /// Table frequency, 0.0 when the word is not in the table.
    pub score: f32,
    pub occurrences: Vec<WordOccurrence>,
}

impl CandidateWord {
    pub fn new(canonical: String) -> Self {
        Self {
            canonical,
            score: 0.0,
            occurrences: Vec::new(),
        }
    }

    pub fn count(&self) -> usize {
        self.occurrences.len()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HardWord {
    pub word: String,
    /// 0.0 when no form of the word is in the frequency table.
    pub frequency_score: f64,
    pub contexts: Vec<String>,
    pub count: usize,
    pub variants: Vec<String>, // All forms found (gaiety, gaieties, etc.)
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AnalysisStats {
    pub total_candidates: usize,
    pub filtered_by_ner: Vec<String>,
    pub hard_words_count: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AnalysisResult {
    pub book_id: i64,
    pub word_count: usize,
    pub hard_words: Vec<HardWord>,
    pub stats: AnalysisStats,
}

/// Read-only resources shared by every job.
pub struct PipelineContext {
    pub frequencies: Arc<dyn FrequencyTable>,
    pub segmenter: Arc<dyn WordSegmenter>,
    pub recognizer: Arc<dyn EntityRecognizer>,
    pub normalizer: Normalizer,
}

impl PipelineContext {
    pub fn new(
        frequencies: Arc<dyn FrequencyTable>,
        segmenter: Arc<dyn WordSegmenter>,
        recognizer: Arc<dyn EntityRecognizer>,
    ) -> Self {
        Self {
            frequencies,
            segmenter,
            recognizer,
            normalizer: Normalizer::new(),
        }
    }

    /// Load the frequency table and dictionary now; the entity model loads
    /// on first use.
    pub fn from_resources(paths: &ResourcePaths, config: &AnalysisConfig) -> Result<Self, PipelineError> {
        let started = Instant::now();
        let frequencies = frequency::load_english_table()?;
        let segmenter = correction::load_symspell(&paths.symspell_dict())?;
        let recognizer = GlinerRecognizer::new(paths.gliner_dir(), &config.ner);
        tracing::info!("Pipeline resources ready in {} ms", started.elapsed().as_millis());
        Ok(Self::new(Arc::new(frequencies), Arc::new(segmenter), Arc::new(recognizer)))
    }
}

pub struct NlpPipeline {
    context: Arc<PipelineContext>,
    config: AnalysisConfig,
}

impl NlpPipeline {
    pub fn new(context: Arc<PipelineContext>, config: AnalysisConfig) -> Self {
        Self { context, config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Run one job to its terminal state.
    pub fn analyze(
        &self,
        book_id: i64,
        text: &str,
        frequency_threshold: f32,
        reporter: ProgressReporter,
        cancel: &CancelToken,
    ) -> JobOutcome {
        let mut run = JobRun::new(cancel.clone(), reporter);
        let started = Instant::now();
        let result = self.run_stages(book_id, text, frequency_threshold, &mut run);
        let outcome = run.finish(result);
        match &outcome {
            JobOutcome::Completed(result) => tracing::info!(
                "Book {}: {} hard words, {} filtered by NER in {} ms",
                book_id,
                result.hard_words.len(),
                result.stats.filtered_by_ner.len(),
                started.elapsed().as_millis()
            ),
            JobOutcome::Failed(err) => tracing::error!("Book {}: analysis failed: {}", book_id, err),
            JobOutcome::Cancelled => tracing::info!("Book {}: analysis cancelled", book_id),
        }
        outcome
    }

    /// Run without progress or cancellation.
    pub fn analyze_text(&self, text: &str, frequency_threshold: f32) -> Result<AnalysisResult, PipelineError> {
        match self.analyze(0, text, frequency_threshold, ProgressReporter::silent(0), &CancelToken::new()) {
            JobOutcome::Completed(result) => Ok(result),
            JobOutcome::Failed(err) => Err(err),
            JobOutcome::Cancelled => Err(PipelineError::Worker("cancelled without a cancel request".into())),
        }
    }

    fn run_stages(
        &self,
        book_id: i64,
        text: &str,
        frequency_threshold: f32,
        run: &mut JobRun,
    ) -> Result<AnalysisResult, Halt> {
        let ctx = &self.context;

        run.advance(JobState::Segmenting, StageProgress::Segmentation { chars: text.chars().count() })?;
        let segmenter = Segmenter;
        let mut sentences: Vec<&str> = Vec::new();
        let mut forms: BTreeMap<String, CandidateWord> = BTreeMap::new();
        let mut word_count = 0;
        for sentence in segmenter.sentences(text) {
            if sentence.index % 100 == 0 {
                run.checkpoint()?;
            }
            for token in segmenter.words(sentence.text) {
                word_count += 1;
                if !is_vocabulary_token(token.text, self.config.min_word_chars) {
                    continue;
                }
                let canonical = token.text.to_lowercase().replace('\u{2019}', "'");
                let occurrence = WordOccurrence {
                    surface: token.text.to_string(),
                    canonical: canonical.clone(),
                    sentence: sentence.index,
                    offset: token.offset,
                };
                forms
                    .entry(canonical)
                    .or_insert_with_key(|k| CandidateWord::new(k.clone()))
                    .occurrences
                    .push(occurrence);
            }
            sentences.push(sentence.text);
        }
        tracing::info!("Processing {} sentences, {} words...", sentences.len(), word_count);

        run.advance(
            JobState::FrequencyFiltering,
            StageProgress::FrequencyFiltering {
                sentences: sentences.len(),
                tokens: word_count,
                distinct: forms.len(),
            },
        )?;
        let freq_pass =
            FrequencyFilter::new(ctx.frequencies.as_ref(), frequency_threshold).run(forms.into_values().collect());
        tracing::info!(
            "Frequency filter: {} rare, {} unknown, {} common",
            freq_pass.rare.len(),
            freq_pass.unknown.len(),
            freq_pass.common
        );

        run.advance(
            JobState::SegmentationCorrecting,
            StageProgress::MalformedWordCorrection {
                unknown: freq_pass.unknown.len(),
            },
        )?;
        let corrected = SegmentationCorrector::new(
            ctx.segmenter.as_ref(),
            ctx.frequencies.as_ref(),
            &ctx.normalizer,
            &self.config.correction,
        )
        .run(freq_pass.unknown);
        let mut candidates = freq_pass.rare;
        candidates.extend(corrected.retained);
        tracing::info!(
            "Found {} hard word candidates, {} malformed words repaired",
            candidates.len(),
            corrected.resolved.len()
        );

        run.advance(
            JobState::Normalizing,
            StageProgress::Stemming {
                candidates: candidates.len(),
                repaired: corrected.resolved.len(),
            },
        )?;
        let groups = ctx.normalizer.group(candidates);

        let to_check = EntityFilter::sentences_to_check(&groups).len();
        run.advance(
            JobState::EntityFiltering,
            StageProgress::EntityFiltering {
                processed: 0,
                total: to_check,
                entities_found: 0,
                sample_words: Vec::new(),
            },
        )?;
        let cancel = run.cancel_token().clone();
        let start = Stage::EntityFiltering.start_percent() as usize;
        let span = (Stage::Aggregation.start_percent() - Stage::EntityFiltering.start_percent()) as usize;
        let entity_pass = EntityFilter::new(ctx.recognizer.as_ref(), &self.config.ner).run(
            groups,
            &sentences,
            || cancel.check(),
            |batch| {
                let percent = start + batch.processed * span / batch.total.max(1);
                run.report(
                    percent.min(start + span) as u8,
                    StageProgress::EntityFiltering {
                        processed: batch.processed,
                        total: batch.total,
                        entities_found: batch.entities_found,
                        sample_words: batch.sample_words,
                    },
                );
            },
        )?;

        let candidates = entity_pass.kept.len();
        run.advance(
            JobState::Aggregating,
            StageProgress::Aggregation {
                candidates,
                hard_words: None,
            },
        )?;
        let (hard_words, stats) = Aggregator::new(self.config.max_contexts).build(
            entity_pass.kept,
            &sentences,
            entity_pass.total_candidates,
            entity_pass.filtered,
        );

        run.advance(
            JobState::Completed,
            StageProgress::Aggregation {
                candidates,
                hard_words: Some(hard_words.len()),
            },
        )?;

        Ok(AnalysisResult {
            book_id,
            word_count,
            hard_words,
            stats,
        })
    }
}
