//! The record of one pipeline run

use crate::fetch::ErrorKind;
use crate::queue::Rejection;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Stage of a run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Idle,
    Fetching,
    Analyzing,
    Filtering,
    Persisting,
    CacheRefresh,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Analyzing => "analyzing",
            Self::Filtering => "filtering",
            Self::Persisting => "persisting",
            Self::CacheRefresh => "cache-refresh",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Running,
    Completed,
    /// No source could be attempted
    Fatal,
    /// Stopped at a phase boundary
    Stopped,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Fatal => "fatal",
            Self::Stopped => "stopped",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "fatal" => Some(Self::Fatal),
            "stopped" => Some(Self::Stopped),
            _ => None,
        }
    }
}

/// Items counted at each phase boundary
///
/// `fetched == filtered_in + filtered_out` once filtering has run, and
/// `persisted <= filtered_in`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PhaseCounts {
    pub fetched: u64,
    /// Items with at least one successful analyzer
    pub analyzed: u64,
    pub filtered_in: u64,
    pub filtered_out: u64,
    pub persisted: u64,
}

/// A failure kept on the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunFailure {
    pub phase: Phase,
    /// Source name for fetch failures, item URL otherwise
    pub target: String,
    pub reason: String,
}

/// A target of a source that produced no item
#[derive(Debug, Clone, Serialize)]
pub struct TargetFailure {
    pub target: String,
    pub error_kind: Option<ErrorKind>,
    pub message: Option<String>,
}

/// Fetch-phase accounting of one configured source
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceReport {
    pub name: String,
    /// Raw inputs handed to the queue
    pub submitted: usize,
    pub accepted: usize,
    pub fetched: usize,
    /// Accepted targets left pending by a stop
    pub skipped: usize,
    pub rejections: Vec<Rejection>,
    pub failures: Vec<TargetFailure>,
    /// Why the source's target file could not be read
    pub load_error: Option<String>,
}

impl SourceReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Whether at least one target of the source was dispatched
    pub fn attempted(&self) -> bool {
        self.accepted > 0
    }

    /// One-line description of what went wrong, if anything did
    pub fn failure_summary(&self) -> Option<String> {
        if !self.attempted() {
            return Some(match &self.load_error {
                Some(error) => format!("target file unreadable: {}", error),
                None => format!("no valid targets ({} rejected)", self.rejections.len()),
            });
        }

        let mut parts = Vec::new();
        if let Some(error) = &self.load_error {
            parts.push(format!("target file unreadable: {}", error));
        }
        if let Some(first) = self.failures.first() {
            let detail = first
                .message
                .clone()
                .or_else(|| first.error_kind.map(|kind| kind.to_string()))
                .unwrap_or_else(|| "unknown error".to_string());
            parts.push(format!(
                "{} of {} targets failed (first: {}: {})",
                self.failed(),
                self.accepted,
                first.target,
                detail
            ));
        }

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }
}

/// Summary of one full pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    /// Last phase entered
    pub phase: Phase,
    pub counts: PhaseCounts,
    pub failures: Vec<RunFailure>,
    /// Failures beyond the kept bound
    pub failures_dropped: u64,
    pub sources: Vec<SourceReport>,
    pub cache_views_written: usize,
    pub cache_views_failed: usize,
    pub fatal_reason: Option<String>,
    #[serde(skip)]
    max_failures: usize,
}

impl PipelineRun {
    /// Starts a run keeping at most `max_failures` failure entries
    pub fn new(max_failures: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
            phase: Phase::Idle,
            counts: PhaseCounts::default(),
            failures: Vec::new(),
            failures_dropped: 0,
            sources: Vec::new(),
            cache_views_written: 0,
            cache_views_failed: 0,
            fatal_reason: None,
            max_failures,
        }
    }

    pub fn record_failure(&mut self, phase: Phase, target: impl Into<String>, reason: impl Into<String>) {
        if self.failures.len() >= self.max_failures {
            self.failures_dropped += 1;
            return;
        }

        self.failures.push(RunFailure {
            phase,
            target: target.into(),
            reason: reason.into(),
        });
    }

    /// Every failure, including those past the bound
    pub fn failure_count(&self) -> u64 {
        self.failures.len() as u64 + self.failures_dropped
    }

    pub fn failures_in(&self, phase: Phase) -> impl Iterator<Item = &RunFailure> {
        self.failures.iter().filter(move |failure| failure.phase == phase)
    }

    pub fn is_fatal(&self) -> bool {
        self.status == RunStatus::Fatal
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|finished| (finished - self.started_at).num_milliseconds())
    }

    pub(crate) fn mark_fatal(&mut self, reason: impl Into<String>) {
        self.fatal_reason = Some(reason.into());
        self.finish(RunStatus::Fatal);
    }

    pub(crate) fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }
}
