//! Batch conversion worker.
//!
//! Runs one sequential loop over the title sets found under a source
//! directory, one blocking encode per title set. A failed encode is logged
//! and the loop moves on. Progress and log lines are reported as
//! [`BatchEvent`]s so a front end can follow along from another thread.

use crate::scanner::{self, TitleSet};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use vobreel_av::{EncodeJob, EncodeSettings, Encoder};

/// What to convert and how.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    /// Directory tree holding DVD rips.
    pub source_dir: PathBuf,
    /// Directory receiving one MP4 per title set.
    pub output_dir: PathBuf,
    pub settings: EncodeSettings,
}

/// How a batch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Every title set was visited.
    Completed,
    /// The stop signal was raised before the last title set.
    Stopped,
    /// The source held no title sets.
    NothingFound,
}

/// Summary sent with [`BatchEvent::Finished`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub status: BatchStatus,
    pub total: usize,
    pub converted: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchOutcome {
    fn new(status: BatchStatus, total: usize) -> Self {
        Self {
            status,
            total,
            converted: 0,
            skipped: 0,
            failed: 0,
        }
    }

    /// Completed with no failed title sets.
    pub fn is_success(&self) -> bool {
        self.status == BatchStatus::Completed && self.failed == 0
    }
}

/// Events emitted while a batch runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEvent {
    /// A human-readable status line.
    Log(String),
    /// Percentage of title sets handled so far.
    Progress(u8),
    Finished(BatchOutcome),
}

/// Percentage of `total` reached after `current` items, rounded down.
pub fn progress_percent(current: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((current.min(total) * 100) / total) as u8
}

/// Sequential title-set converter.
pub struct BatchWorker<E> {
    request: BatchRequest,
    encoder: E,
    stop_signal: Arc<AtomicBool>,
    event_tx: mpsc::UnboundedSender<BatchEvent>,
}

impl<E: Encoder> BatchWorker<E> {
    /// Create a worker reporting to `event_tx`.
    pub fn new(
        request: BatchRequest,
        encoder: E,
        event_tx: mpsc::UnboundedSender<BatchEvent>,
    ) -> Self {
        Self {
            request,
            encoder,
            stop_signal: Arc::new(AtomicBool::new(false)),
            event_tx,
        }
    }

    /// Get a clone of the stop signal for external control.
    ///
    /// Raising it lets the current encode finish and starts no further ones.
    pub fn stop_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_signal)
    }

    fn emit(&self, event: BatchEvent) {
        if self.event_tx.send(event).is_err() {
            debug!("No listener for batch event");
        }
    }

    fn log(&self, message: impl Into<String>) {
        let message = message.into();
        debug!("{}", message);
        self.emit(BatchEvent::Log(message));
    }

    fn stopped(&self) -> bool {
        self.stop_signal.load(Ordering::Relaxed)
    }

    /// Scan the source and convert every title set, in key order.
    pub fn run(&self) -> Result<BatchOutcome> {
        let source = &self.request.source_dir;
        self.log(format!("Scanning {}...", source.display()));

        let title_sets = match scanner::scan_title_sets(source) {
            Ok(sets) => sets,
            Err(e) => {
                self.log(format!("Scan failed: {:#}", e));
                return Err(e);
            }
        };

        if title_sets.is_empty() {
            self.log("No valid VOB Title Sets found.");
            let outcome = BatchOutcome::new(BatchStatus::NothingFound, 0);
            self.emit(BatchEvent::Finished(outcome.clone()));
            return Ok(outcome);
        }

        let total = title_sets.len();
        self.log(format!("Found {} titles to process.", total));

        std::fs::create_dir_all(&self.request.output_dir).with_context(|| {
            format!(
                "Failed to create output directory: {:?}",
                self.request.output_dir
            )
        })?;

        info!("Batch started: {} title sets from {:?}", total, source);

        let mut outcome = BatchOutcome::new(BatchStatus::Completed, total);

        for (index, title_set) in title_sets.iter().enumerate() {
            if self.stopped() {
                outcome.status = BatchStatus::Stopped;
                break;
            }

            let current = index + 1;
            self.process(title_set, current, total, &mut outcome);
            self.emit(BatchEvent::Progress(progress_percent(current, total)));
        }

        if outcome.status == BatchStatus::Stopped {
            self.log("--- BATCH STOPPED ---");
        } else {
            self.log("--- BATCH COMPLETE ---");
        }

        info!(
            "Batch finished: {} converted, {} skipped, {} failed",
            outcome.converted, outcome.skipped, outcome.failed
        );
        self.emit(BatchEvent::Finished(outcome.clone()));
        Ok(outcome)
    }

    fn process(
        &self,
        title_set: &TitleSet,
        current: usize,
        total: usize,
        outcome: &mut BatchOutcome,
    ) {
        let file_name = title_set.output_file_name();
        let output = self.request.output_dir.join(&file_name);

        if output.exists() {
            self.log(format!("Skipping existing: {}", file_name));
            outcome.skipped += 1;
            return;
        }

        self.log(format!(
            "Converting ({}/{}): {}",
            current, total, title_set.key
        ));

        let job = EncodeJob::new(
            title_set.parts.clone(),
            output,
            self.request.settings.clone(),
        );
        match self.encoder.encode(&job) {
            Ok(()) => {
                self.log(format!("Finished: {}", file_name));
                outcome.converted += 1;
            }
            Err(e) => {
                error!("Conversion failed: {} - {}", title_set.key, e);
                self.log(format!("Error: {}: {}", title_set.key, e));
                outcome.failed += 1;
            }
        }
    }
}

/// A batch running on a blocking background task.
pub struct BatchHandle {
    pub events: mpsc::UnboundedReceiver<BatchEvent>,
    pub stop_signal: Arc<AtomicBool>,
    pub task: JoinHandle<Result<BatchOutcome>>,
}

impl BatchHandle {
    /// Ask the worker to stop after the current title set.
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::Relaxed);
    }
}

/// Start a batch on the Tokio blocking pool.
///
/// Must be called from within a Tokio runtime.
pub fn spawn<E: Encoder + 'static>(request: BatchRequest, encoder: E) -> BatchHandle {
    let (event_tx, events) = mpsc::unbounded_channel();
    let worker = BatchWorker::new(request, encoder, event_tx);
    let stop_signal = worker.stop_signal();
    let task = tokio::task::spawn_blocking(move || worker.run());

    BatchHandle {
        events,
        stop_signal,
        task,
    }
}
