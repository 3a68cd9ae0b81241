use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// State of one sync job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Admitted,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    /// The owning distribution is disabled.
    Skipped,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Cancelled | Self::Skipped
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Admitted => "admitted",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn validate_transition(from: JobState, to: JobState) -> Result<(), CoreError> {
    let valid = matches!(
        (from, to),
        (
            JobState::Queued,
            JobState::Admitted | JobState::Skipped | JobState::Failed | JobState::Cancelled
        ) | (
            JobState::Admitted,
            JobState::Running | JobState::Failed | JobState::Cancelled
        ) | (
            JobState::Running,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    );

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
