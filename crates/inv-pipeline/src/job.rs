// SPDX-License-Identifier: MIT OR Apache-2.0
//! Job state tracked by the orchestrator.

use chrono::{DateTime, Utc};
use inv_model::ProcessingResult;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// The job task is running.
    Processing,
    /// The job finished and a result is available.
    Completed,
    /// The job failed; `error` carries the reason.
    Failed,
    /// The caller abandoned the job.
    Cancelled,
}

impl JobStatus {
    /// Whether this status is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing)
    }

    /// Valid successor statuses.
    #[must_use]
    pub fn valid_transitions(&self) -> &'static [JobStatus] {
        match self {
            Self::Processing => &[Self::Completed, Self::Failed, Self::Cancelled],
            Self::Completed | Self::Failed | Self::Cancelled => &[],
        }
    }

    /// Whether `self → next` is a valid transition.
    #[must_use]
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        self.valid_transitions().contains(&next)
    }
}

/// One completed stage, as reported to status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Stage name.
    pub stage: String,
    /// Progress message shown to callers.
    pub message: String,
    /// When the stage was entered.
    pub timestamp: DateTime<Utc>,
}

/// Mutable job state. Only the orchestrator writes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    /// Lifecycle status.
    pub status: JobStatus,
    /// When the job was accepted.
    pub started_at: DateTime<Utc>,
    /// Name of the ingested file.
    pub filename: String,
    /// Stages entered so far, in order.
    pub stages_completed: Vec<StageRecord>,
    /// The stage currently executing.
    pub current_stage: String,
    /// Final result, present once `status == Completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Box<ProcessingResult>>,
    /// Failure reason, present once `status == Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobState {
    /// Fresh state for an accepted job.
    #[must_use]
    pub fn accepted(filename: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Processing,
            started_at: Utc::now(),
            filename: filename.into(),
            stages_completed: Vec::new(),
            current_stage: "queued".to_string(),
            result: None,
            error: None,
        }
    }

    /// Record entering a stage.
    pub fn enter_stage(&mut self, stage: &str, message: &str) {
        self.current_stage = stage.to_string();
        self.stages_completed.push(StageRecord {
            stage: stage.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
        });
    }
}
