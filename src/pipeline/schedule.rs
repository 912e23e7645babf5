//! Recurring pipeline runs

use crate::pipeline::{PipelineOrchestrator, PipelineRun};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Control over a running schedule
///
/// Dropping the handle cancels the schedule after the current run.
pub struct ScheduleHandle {
    cancel: watch::Sender<bool>,
    runs: mpsc::UnboundedReceiver<PipelineRun>,
    task: JoinHandle<()>,
}

impl ScheduleHandle {
    /// Waits for the next finished run; `None` once the schedule ended
    pub async fn next_run(&mut self) -> Option<PipelineRun> {
        self.runs.recv().await
    }

    /// Stops scheduling new runs; a run in progress finishes normally
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// Cancels and waits for the schedule task to end
    ///
    /// Returns the runs finished but not yet taken with
    /// [`next_run`](Self::next_run), including a run in progress at
    /// cancellation time.
    pub async fn shutdown(mut self) -> Vec<PipelineRun> {
        self.cancel();

        let mut remaining = Vec::new();
        while let Some(run) = self.runs.recv().await {
            remaining.push(run);
        }

        if let Err(e) = self.task.await {
            tracing::warn!("Schedule task ended abnormally: {}", e);
        }
        remaining
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl PipelineOrchestrator {
    /// Runs the pipeline now and then every `interval`
    ///
    /// A tick that finds a run still active is skipped.
    pub fn start_schedule(self: &Arc<Self>, interval: Duration) -> ScheduleHandle {
        let (cancel, mut cancelled) = watch::channel(false);
        let (runs_tx, runs) = mpsc::unbounded_channel();
        let orchestrator = Arc::clone(self);
        let period = interval.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!("Pipeline scheduled every {:?}", period);

            loop {
                tokio::select! {
                    biased;
                    changed = cancelled.changed() => {
                        if changed.is_err() || *cancelled.borrow() {
                            break;
                        }
                        continue;
                    }
                    _ = ticker.tick() => {}
                }

                match orchestrator.run_full_pipeline().await {
                    Ok(run) => {
                        if runs_tx.send(run).is_err() {
                            tracing::debug!("No one is waiting for scheduled runs");
                        }
                    }
                    Err(e) => tracing::info!("Scheduled tick skipped: {}", e),
                }
            }

            tracing::info!("Pipeline schedule cancelled");
        });

        ScheduleHandle { cancel, runs, task }
    }
}
