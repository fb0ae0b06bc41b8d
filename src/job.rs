//! Analysis jobs: state machine, cancellation and the job queue.
//!
//! Each job walks `Pending -> Segmenting -> ... -> Aggregating -> Completed`
//! one step at a time, emitting one progress event per step and checking
//! its cancel token before every step. `Failed` and `Cancelled` can be
//! reached from any non-terminal state.

use crate::error::{Halt, PipelineError};
use crate::nlp::progress::{ProgressEvent, ProgressReporter, Stage, StageProgress};
use crate::nlp::{AnalysisResult, NlpPipeline};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobState {
    Pending,
    Segmenting,
    FrequencyFiltering,
    SegmentationCorrecting,
    Normalizing,
    EntityFiltering,
    Aggregating,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    /// The only state a running job may move to next (besides `Failed`/`Cancelled`).
    pub fn successor(self) -> Option<JobState> {
        match self {
            JobState::Pending => Some(JobState::Segmenting),
            JobState::Segmenting => Some(JobState::FrequencyFiltering),
            JobState::FrequencyFiltering => Some(JobState::SegmentationCorrecting),
            JobState::SegmentationCorrecting => Some(JobState::Normalizing),
            JobState::Normalizing => Some(JobState::EntityFiltering),
            JobState::EntityFiltering => Some(JobState::Aggregating),
            JobState::Aggregating => Some(JobState::Completed),
            JobState::Completed | JobState::Failed | JobState::Cancelled => None,
        }
    }

    /// Pipeline stage running in this state.
    pub fn stage(self) -> Option<Stage> {
        match self {
            JobState::Segmenting => Some(Stage::Segmentation),
            JobState::FrequencyFiltering => Some(Stage::FrequencyFiltering),
            JobState::SegmentationCorrecting => Some(Stage::MalformedWordCorrection),
            JobState::Normalizing => Some(Stage::Stemming),
            JobState::EntityFiltering => Some(Stage::EntityFiltering),
            JobState::Aggregating => Some(Stage::Aggregation),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Cancelled)
    }
}

/// Shared stop flag for one job.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn same_as(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn check(&self) -> Result<(), Halt> {
        if self.is_cancelled() {
            Err(Halt::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// How a job ended. Cancellation carries no result and no error.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(AnalysisResult),
    Failed(PipelineError),
    Cancelled,
}

impl JobOutcome {
    pub fn state(&self) -> JobState {
        match self {
            JobOutcome::Completed(_) => JobState::Completed,
            JobOutcome::Failed(_) => JobState::Failed,
            JobOutcome::Cancelled => JobState::Cancelled,
        }
    }
}

/// Drives one job through its states.
pub(crate) struct JobRun {
    state: JobState,
    cancel: CancelToken,
    reporter: ProgressReporter,
}

impl JobRun {
    pub(crate) fn new(cancel: CancelToken, reporter: ProgressReporter) -> Self {
        Self {
            state: JobState::Pending,
            cancel,
            reporter,
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> JobState {
        self.state
    }

    pub(crate) fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub(crate) fn checkpoint(&self) -> Result<(), Halt> {
        self.cancel.check()
    }

    /// Move to `next`, emitting exactly one progress event.
    pub(crate) fn advance(&mut self, next: JobState, update: StageProgress) -> Result<(), Halt> {
        self.checkpoint()?;
        if self.state.successor() != Some(next) {
            return Err(PipelineError::InvalidTransition {
                from: self.state,
                to: next,
            }
            .into());
        }
        tracing::debug!("Job state {:?} -> {:?}", self.state, next);
        self.state = next;
        let percent = next.stage().map(Stage::start_percent).unwrap_or(100);
        self.reporter.report(percent, update);
        Ok(())
    }

    /// Progress inside the current stage.
    pub(crate) fn report(&mut self, percent: u8, update: StageProgress) {
        self.reporter.report(percent, update);
    }

    pub(crate) fn finish(mut self, result: Result<AnalysisResult, Halt>) -> JobOutcome {
        let outcome = match result {
            Ok(result) if self.state == JobState::Completed => JobOutcome::Completed(result),
            Ok(_) => JobOutcome::Failed(PipelineError::InvalidTransition {
                from: self.state,
                to: JobState::Completed,
            }),
            Err(Halt::Cancelled) => JobOutcome::Cancelled,
            Err(Halt::Failed(err)) => JobOutcome::Failed(err),
        };
        self.state = outcome.state();
        outcome
    }
}

/// A submitted job.
///
/// Drain `next_event` until it returns `None`, then await `outcome`: the
/// progress channel closes before the outcome resolves, so the result
/// always arrives after the last event.
pub struct JobHandle {
    book_id: i64,
    cancel: CancelToken,
    events: mpsc::Receiver<ProgressEvent>,
    task: JoinHandle<JobOutcome>,
}

impl JobHandle {
    pub fn book_id(&self) -> i64 {
        self.book_id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.events.recv().await
    }

    pub async fn outcome(self) -> JobOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => JobOutcome::Failed(PipelineError::Worker(e.to_string())),
        }
    }
}

type ActiveJobs = Arc<Mutex<HashMap<i64, CancelToken>>>;

/// Runs jobs on blocking workers, `max_concurrent_jobs` at a time in FIFO
/// order, with at most one live job per book.
pub struct JobQueue {
    pipeline: Arc<NlpPipeline>,
    slots: Arc<Semaphore>,
    active: ActiveJobs,
}

impl JobQueue {
    pub fn new(pipeline: Arc<NlpPipeline>) -> Self {
        let permits = pipeline.config().max_concurrent_jobs.max(1);
        Self {
            pipeline,
            slots: Arc::new(Semaphore::new(permits)),
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Queue an analysis. A job already queued or running for the same book
    /// is cancelled. Must be called from within a Tokio runtime.
    pub fn submit(&self, book_id: i64, text: String, frequency_threshold: f32) -> JobHandle {
        let cancel = CancelToken::new();
        {
            let mut jobs = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            // Cancel any existing job for this book
            if let Some(old_token) = jobs.insert(book_id, cancel.clone()) {
                old_token.cancel();
                tracing::info!("Superseding running analysis for book {}", book_id);
            }
        }

        let capacity = self.pipeline.config().progress_capacity.max(1);
        let (sender, events) = mpsc::channel(capacity);
        let reporter = ProgressReporter::new(book_id, sender);

        let pipeline = Arc::clone(&self.pipeline);
        let slots = Arc::clone(&self.slots);
        let active = Arc::clone(&self.active);
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let outcome = match slots.acquire_owned().await {
                Err(_) => {
                    drop(reporter);
                    JobOutcome::Failed(PipelineError::Worker("job queue closed".into()))
                }
                Ok(_) if token.is_cancelled() => {
                    drop(reporter);
                    JobOutcome::Cancelled
                }
                Ok(permit) => {
                    let worker_token = token.clone();
                    let worker = tokio::task::spawn_blocking(move || {
                        let _permit = permit;
                        pipeline.analyze(book_id, &text, frequency_threshold, reporter, &worker_token)
                    });
                    match worker.await {
                        Ok(outcome) => outcome,
                        Err(e) => JobOutcome::Failed(PipelineError::Worker(e.to_string())),
                    }
                }
            };
            release(&active, book_id, &token);
            outcome
        });

        JobHandle {
            book_id,
            cancel,
            events,
            task,
        }
    }

    /// Cancel the live job for a book. Returns false if there is none.
    pub fn cancel(&self, book_id: i64) -> bool {
        let jobs = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        match jobs.get(&book_id) {
            Some(token) => {
                tracing::info!("Cancelling analysis for book {}", book_id);
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Books with a queued or running job.
    pub fn active_jobs(&self) -> Vec<i64> {
        let jobs = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<i64> = jobs.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

fn release(active: &ActiveJobs, book_id: i64, token: &CancelToken) {
    let mut jobs = active.lock().unwrap_or_else(PoisonError::into_inner);
    if jobs.get(&book_id).is_some_and(|t| t.same_as(token)) {
        jobs.remove(&book_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_with_channel() -> (JobRun, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(32);
        (JobRun::new(CancelToken::new(), ProgressReporter::new(3, tx)), rx)
    }

    #[test]
    fn test_states_advance_in_order() {
        let mut state = JobState::Pending;
        let mut visited = vec![state];
        while let Some(next) = state.successor() {
            visited.push(next);
            state = next;
        }
        assert_eq!(visited.len(), 8);
        assert_eq!(state, JobState::Completed);
        assert!(state.is_terminal());
        assert!(JobState::Failed.successor().is_none());
        assert!(JobState::Cancelled.successor().is_none());
    }

    #[test]
    fn test_skipping_a_state_is_rejected() {
        let (mut run, _rx) = run_with_channel();
        let err = run
            .advance(JobState::FrequencyFiltering, StageProgress::MalformedWordCorrection { unknown: 0 })
            .unwrap_err();
        assert_eq!(
            err,
            Halt::Failed(PipelineError::InvalidTransition {
                from: JobState::Pending,
                to: JobState::FrequencyFiltering
            })
        );
        assert_eq!(run.state(), JobState::Pending);
    }

    #[test]
    fn test_each_transition_emits_one_event() {
        let (mut run, mut rx) = run_with_channel();
        run.advance(JobState::Segmenting, StageProgress::Segmentation { chars: 5 }).unwrap();
        run.advance(
            JobState::FrequencyFiltering,
            StageProgress::FrequencyFiltering {
                sentences: 1,
                tokens: 1,
                distinct: 1,
            },
        )
        .unwrap();

        let events: Vec<ProgressEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].stage(), Stage::Segmentation);
        assert_eq!(events[1].progress, Stage::FrequencyFiltering.start_percent());
        assert!(events.iter().all(|e| e.book_id == 3));
    }

    #[test]
    fn test_cancel_is_seen_at_next_transition() {
        let (mut run, mut rx) = run_with_channel();
        run.advance(JobState::Segmenting, StageProgress::Segmentation { chars: 5 }).unwrap();
        run.cancel_token().cancel();

        let result = run.advance(
            JobState::FrequencyFiltering,
            StageProgress::FrequencyFiltering {
                sentences: 0,
                tokens: 0,
                distinct: 0,
            },
        );
        assert_eq!(result, Err(Halt::Cancelled));
        assert_eq!(run.finish(Err(Halt::Cancelled)), JobOutcome::Cancelled);
        assert_eq!(std::iter::from_fn(|| rx.try_recv().ok()).count(), 1);
    }

    #[test]
    fn test_tokens_compare_by_identity() {
        let a = CancelToken::new();
        let b = a.clone();
        assert!(a.same_as(&b));
        assert!(!a.same_as(&CancelToken::new()));
        b.cancel();
        assert!(a.is_cancelled());
    }
}
