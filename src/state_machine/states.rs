use serde::{Deserialize, Serialize};
use std::fmt;

/// Observed state of one restore task, recorded as a status action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StatusActionState {
    /// Task submitted; primary work not yet finished
    #[default]
    Processing,
    /// Task finished successfully
    Completed,
    /// Task failed; its message carries the backend's reason
    Failed,
}

impl StatusActionState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// `Processing → {Completed | Failed}`; staying put is always allowed
    pub fn can_transition_to(&self, next: StatusActionState) -> bool {
        *self == next || !self.is_terminal()
    }
}

impl fmt::Display for StatusActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Processing => write!(f, "Processing"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

impl std::str::FromStr for StatusActionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Processing" => Ok(Self::Processing),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid status action state: {s}")),
        }
    }
}
