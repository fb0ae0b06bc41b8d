//! Named-entity exclusion.
//!
//! Removal is per occurrence: "Hope" tagged as a person in one sentence does
//! not remove "hope" from another. A group disappears only when every one of
//! its occurrences was tagged.

use super::normalizer::CandidateGroup;
use super::progress::SampleWord;
use crate::config::NerConfig;
use crate::error::PipelineError;
use gliner::model::{input::text::TextInput, pipeline::span::SpanMode, GLiNER};
use once_cell::sync::OnceCell;
use orp::params::RuntimeParameters;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Range;
use std::path::PathBuf;
use std::time::Instant;

#[cfg(target_os = "macos")]
use ort::execution_providers::CoreMLExecutionProvider;

/// Tags entity spans in a batch of texts.
pub trait EntityRecognizer: Send + Sync {
    /// One list of tagged byte ranges per input text, in input order.
    /// Each range indexes into its own text.
    fn recognize(&self, texts: &[&str]) -> Result<Vec<Vec<Range<usize>>>, PipelineError>;
}

/// GLiNER span model, loaded on first use and shared afterwards.
pub struct GlinerRecognizer {
    model_dir: PathBuf,
    labels: Vec<String>,
    threads: usize,
    model: OnceCell<GLiNER<SpanMode>>,
}

impl GlinerRecognizer {
    pub fn new(model_dir: PathBuf, config: &NerConfig) -> Self {
        Self {
            model_dir,
            labels: config.labels.clone(),
            threads: config.threads,
            model: OnceCell::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.model.get().is_some()
    }

    fn model(&self) -> Result<&GLiNER<SpanMode>, PipelineError> {
        self.model.get_or_try_init(|| {
            let tokenizer_path = self.model_dir.join("tokenizer.json");
            let model_path = self.model_dir.join("model.onnx");

            if !tokenizer_path.exists() || !model_path.exists() {
                return Err(PipelineError::unavailable(
                    "GLiNER model",
                    format!(
                        "not found at {}; run `lexis resources download`",
                        self.model_dir.display()
                    ),
                ));
            }

            #[cfg(target_os = "macos")]
            let runtime_params = RuntimeParameters::default()
                .with_threads(self.threads)
                .with_execution_providers([CoreMLExecutionProvider::default().build()]);

            #[cfg(not(target_os = "macos"))]
            let runtime_params = RuntimeParameters::default().with_threads(self.threads);

            let started = Instant::now();
            let model = GLiNER::<SpanMode>::new(Default::default(), runtime_params, tokenizer_path, model_path)
                .map_err(|e| PipelineError::unavailable("GLiNER model", e))?;
            tracing::info!("GLiNER model loaded in {} ms", started.elapsed().as_millis());
            Ok(model)
        })
    }
}

impl EntityRecognizer for GlinerRecognizer {
    fn recognize(&self, texts: &[&str]) -> Result<Vec<Vec<Range<usize>>>, PipelineError> {
        let model = self.model()?;
        let labels: Vec<&str> = self.labels.iter().map(String::as_str).collect();

        let input = TextInput::from_str(texts, &labels)
            .map_err(|e| PipelineError::Inference(format!("invalid input: {}", e)))?;
        let output = model
            .inference(input)
            .map_err(|e| PipelineError::Inference(e.to_string()))?;

        // Span offsets are byte offsets into the input text.
        let mut entities: Vec<Vec<Range<usize>>> = vec![Vec::new(); texts.len()];
        for spans in &output.spans {
            for span in spans {
                if let Some(ranges) = entities.get_mut(span.sequence()) {
                    let (start, end) = span.offsets();
                    ranges.push(start..end);
                }
            }
        }
        Ok(entities)
    }
}

/// A piece of a sentence small enough for the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub sentence: usize,
    /// Byte offset of `text` in its sentence.
    pub base: usize,
    pub text: &'a str,
}

/// Split `text` at whitespace into pieces of at most `max_bytes`
/// (a single longer word becomes its own piece).
pub fn chunk_sentence(sentence: usize, text: &str, max_bytes: usize) -> Vec<Chunk<'_>> {
    if text.len() <= max_bytes {
        return vec![Chunk { sentence, base: 0, text }];
    }

    let mut chunks = Vec::new();
    let mut start: Option<usize> = None;
    let mut last_end = 0;
    for (offset, word) in whitespace_words(text) {
        let end = offset + word.len();
        match start {
            Some(s) if end - s > max_bytes => {
                chunks.push(Chunk { sentence, base: s, text: &text[s..last_end] });
                start = Some(offset);
            }
            None => start = Some(offset),
            _ => {}
        }
        last_end = end;
    }
    if let Some(s) = start {
        chunks.push(Chunk { sentence, base: s, text: &text[s..last_end] });
    }
    chunks
}

/// Byte offset and text of every whitespace-separated word.
fn whitespace_words(text: &str) -> Vec<(usize, &str)> {
    let mut words = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                words.push((s, &text[s..i]));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        words.push((s, &text[s..]));
    }
    words
}

/// Progress of one inference batch.
#[derive(Debug, Clone)]
pub struct BatchProgress {
    pub processed: usize,
    pub total: usize,
    pub entities_found: usize,
    pub sample_words: Vec<SampleWord>,
}

#[derive(Debug)]
pub struct EntityPass {
    pub kept: Vec<CandidateGroup>,
    /// Representative forms of groups whose every occurrence was an entity.
    pub filtered: Vec<String>,
    pub total_candidates: usize,
}

const SAMPLE_LIMIT: usize = 8;

pub struct EntityFilter<'a> {
    recognizer: &'a dyn EntityRecognizer,
    config: &'a NerConfig,
}

impl<'a> EntityFilter<'a> {
    pub fn new(recognizer: &'a dyn EntityRecognizer, config: &'a NerConfig) -> Self {
        Self { recognizer, config }
    }

    /// Sentences worth sending to the model: those where some candidate
    /// occurrence is capitalized. Lowercase occurrences are never entities.
    pub fn sentences_to_check(groups: &[CandidateGroup]) -> BTreeSet<usize> {
        groups
            .iter()
            .flat_map(|g| g.forms.values())
            .flat_map(|w| w.occurrences.iter())
            .filter(|o| o.is_capitalized())
            .map(|o| o.sentence)
            .collect()
    }

    /// Tag the candidate sentences and drop entity occurrences.
    ///
    /// `before_batch` runs ahead of every inference batch and may stop the
    /// pass (cancellation); `on_batch` receives progress after each batch.
    pub fn run<E, B, P>(
        &self,
        groups: Vec<CandidateGroup>,
        sentences: &[&str],
        mut before_batch: B,
        mut on_batch: P,
    ) -> Result<EntityPass, E>
    where
        E: From<PipelineError>,
        B: FnMut() -> Result<(), E>,
        P: FnMut(BatchProgress),
    {
        let total_candidates = groups.len();
        let to_check = Self::sentences_to_check(&groups);
        if to_check.is_empty() {
            tracing::info!("No proper noun candidates need NER verification");
            return Ok(EntityPass {
                kept: groups,
                filtered: Vec::new(),
                total_candidates,
            });
        }

        let max_bytes = self.config.max_chunk_bytes.max(1);
        let chunks: Vec<Chunk> = to_check
            .iter()
            .filter_map(|&i| sentences.get(i).map(|text| (i, *text)))
            .flat_map(|(i, text)| chunk_sentence(i, text, max_bytes))
            .collect();

        // Candidate forms per sentence, for the progress samples.
        let mut forms_by_sentence: HashMap<usize, Vec<(usize, usize, &str)>> = HashMap::new();
        for word in groups.iter().flat_map(|g| g.forms.values()) {
            for o in &word.occurrences {
                forms_by_sentence
                    .entry(o.sentence)
                    .or_default()
                    .push((o.offset, o.end(), word.canonical.as_str()));
            }
        }

        let total = chunks.len();
        let batch_size = self.config.batch_size.max(1);
        tracing::info!("Running NER on {} sentence chunks containing proper noun candidates...", total);

        let mut tagged: BTreeMap<usize, Vec<Range<usize>>> = BTreeMap::new();
        let mut entities_found: BTreeSet<String> = BTreeSet::new();
        let mut processed = 0;
        let mut total_infer_ms: u128 = 0;

        for (batch_idx, batch) in chunks.chunks(batch_size).enumerate() {
            before_batch()?;

            let texts: Vec<&str> = batch.iter().map(|c| c.text).collect();
            let infer_start = Instant::now();
            let found = self.recognizer.recognize(&texts)?;
            let infer_elapsed = infer_start.elapsed();
            total_infer_ms += infer_elapsed.as_millis();
            if batch_idx == 0 {
                tracing::info!(
                    "GLiNER first batch inference: {} ms for {} sentences (batch size {})",
                    infer_elapsed.as_millis(),
                    batch.len(),
                    batch_size
                );
            }

            let mut samples: Vec<SampleWord> = Vec::new();
            for (chunk, ranges) in batch.iter().zip(found.iter()) {
                let mut spans: Vec<Range<usize>> = Vec::with_capacity(ranges.len());
                for range in ranges {
                    // Ranges outside the chunk or off a char boundary are ignored.
                    let Some(entity) = chunk.text.get(range.clone()) else {
                        continue;
                    };
                    entities_found.insert(entity.trim().to_lowercase());
                    spans.push(chunk.base + range.start..chunk.base + range.end);
                }

                if let Some(forms) = forms_by_sentence.get(&chunk.sentence) {
                    let chunk_range = chunk.base..chunk.base + chunk.text.len();
                    for &(start, end, form) in forms {
                        if start < chunk_range.start || end > chunk_range.end {
                            continue;
                        }
                        let is_entity = spans.iter().any(|s| overlaps(s, start, end));
                        if samples.len() < SAMPLE_LIMIT && !samples.iter().any(|s| s.word == form) {
                            samples.push(SampleWord {
                                word: form.to_string(),
                                is_entity,
                            });
                        }
                    }
                }
                tagged.entry(chunk.sentence).or_default().extend(spans);
            }

            processed += batch.len();
            on_batch(BatchProgress {
                processed,
                total,
                entities_found: entities_found.len(),
                sample_words: samples,
            });
        }

        if total > 0 {
            tracing::info!(
                "GLiNER total inference time: {} ms for {} chunks (avg {:.2} ms/chunk)",
                total_infer_ms,
                total,
                total_infer_ms as f64 / total as f64
            );
        }

        let mut kept = Vec::with_capacity(groups.len());
        let mut filtered = Vec::new();
        for mut group in groups {
            let representative = group.representative().map(str::to_string);
            for word in group.forms.values_mut() {
                word.occurrences.retain(|o| {
                    !tagged
                        .get(&o.sentence)
                        .is_some_and(|spans| spans.iter().any(|s| overlaps(s, o.offset, o.end())))
                });
            }
            group.forms.retain(|_, w| !w.occurrences.is_empty());

            if group.is_empty() {
                filtered.push(representative.unwrap_or_else(|| group.stem.clone()));
            } else {
                kept.push(group);
            }
        }

        tracing::info!("Found {} named entities, {} candidates filtered", entities_found.len(), filtered.len());
        Ok(EntityPass {
            kept,
            filtered,
            total_candidates,
        })
    }
}

fn overlaps(span: &Range<usize>, start: usize, end: usize) -> bool {
    span.start < end && start < span.end
}
