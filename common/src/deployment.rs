use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// The state machine driven by the orchestrator (SPEC_FULL.md §4.10).
///
/// `Progress` is derived purely from `DeploymentStatus`; it is never stored
/// independently so the two can never drift apart.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Display, Serialize, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
#[strum(ascii_case_insensitive)]
pub enum DeploymentStatus {
    Pending,
    Queued,
    Cloning,
    Building,
    Uploading,
    Deploying,
    Restarting,
    HealthChecking,
    Success,
    Failed,
    Cancelled,
}

impl DeploymentStatus {
    /// Progress percent as a pure function of status, per §4.7.
    pub fn progress(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Queued => 0,
            Self::Cloning => 10,
            Self::Building => 30,
            Self::Uploading => 60,
            Self::Deploying => 80,
            Self::Restarting => 90,
            Self::HealthChecking => 95,
            Self::Success => 100,
            Self::Failed | Self::Cancelled => 0,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }
}

/// What kind of work a deployment performs (§4.7).
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Display, Serialize, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[strum(ascii_case_insensitive)]
pub enum DeploymentKind {
    Full,
    RestartOnly,
    Upload,
}

/// The isolation bucket a project or server group belongs to (§3).
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Display, Serialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum Environment {
    Development,
    Production,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn progress_is_monotonic_with_status() {
        assert_eq!(DeploymentStatus::Pending.progress(), 0);
        assert_eq!(DeploymentStatus::Cloning.progress(), 10);
        assert_eq!(DeploymentStatus::Building.progress(), 30);
        assert_eq!(DeploymentStatus::Uploading.progress(), 60);
        assert_eq!(DeploymentStatus::Deploying.progress(), 80);
        assert_eq!(DeploymentStatus::Restarting.progress(), 90);
        assert_eq!(DeploymentStatus::HealthChecking.progress(), 95);
        assert_eq!(DeploymentStatus::Success.progress(), 100);
        assert_eq!(DeploymentStatus::Failed.progress(), 0);
        assert_eq!(DeploymentStatus::Cancelled.progress(), 0);
    }

    #[test]
    fn terminal_states() {
        assert!(DeploymentStatus::Success.is_terminal());
        assert!(DeploymentStatus::Failed.is_terminal());
        assert!(DeploymentStatus::Cancelled.is_terminal());
        assert!(!DeploymentStatus::Queued.is_terminal());
        assert!(!DeploymentStatus::Deploying.is_terminal());
    }

    #[test]
    fn status_deser_is_case_insensitive() {
        assert_eq!(
            DeploymentStatus::HealthChecking,
            DeploymentStatus::from_str("healthchecking").unwrap()
        );
        assert_eq!(
            DeploymentKind::RestartOnly,
            DeploymentKind::from_str("restart_only").unwrap()
        );
    }
}
