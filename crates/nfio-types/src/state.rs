//! Lifecycle and status enums.
//!
//! `InstanceState` is what the kernel's lifecycle controller tracks.
//! `InstanceStatus` is what the backend reports for a running workload; it
//! is the value behind the `status` attribute file.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

/// Lifecycle state of an NF instance as tracked by the kernel.
///
/// ```text
/// Absent → Pending → Running → Destroying → Absent
///                      ↕
///                   Degraded   (backend-reported, never driven by the kernel)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum InstanceState {
    /// Instantiation accepted, not yet confirmed.
    Pending,
    /// Confirmed running.
    Running,
    /// Backend reports the workload as not fully serving.
    Degraded,
    /// Destruction in progress.
    Destroying,
    /// Does not exist.
    #[default]
    Absent,
}

impl InstanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Pending => "Pending",
            InstanceState::Running => "Running",
            InstanceState::Degraded => "Degraded",
            InstanceState::Destroying => "Destroying",
            InstanceState::Absent => "Absent",
        }
    }

    /// States from which a destroy request is honored.
    pub fn can_destroy(&self) -> bool {
        matches!(
            self,
            InstanceState::Running | InstanceState::Degraded | InstanceState::Pending
        )
    }

    /// States in which a create request is already satisfied.
    pub fn satisfies_create(&self) -> bool {
        matches!(self, InstanceState::Running | InstanceState::Pending)
    }

    /// Transitional states that a listing may reconcile.
    pub fn is_transitional(&self) -> bool {
        matches!(self, InstanceState::Pending | InstanceState::Destroying)
    }

    /// Lifecycle state implied by a backend-reported status.
    pub fn from_status(status: InstanceStatus) -> Self {
        match status {
            InstanceStatus::Pending => InstanceState::Pending,
            InstanceStatus::Running => InstanceState::Running,
            InstanceStatus::Degraded | InstanceStatus::Paused | InstanceStatus::Stopped => {
                InstanceState::Degraded
            }
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run status reported by the orchestration backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum InstanceStatus {
    /// Created but not yet started.
    #[default]
    Pending,
    /// Serving.
    #[strum(serialize = "running", serialize = "up")]
    Running,
    /// Up but unhealthy.
    Degraded,
    /// Frozen by a `pause` action.
    Paused,
    /// Halted by a `stop` action.
    #[strum(serialize = "stopped", serialize = "exited")]
    Stopped,
}

impl InstanceStatus {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Pending => "Pending",
            InstanceStatus::Running => "Running",
            InstanceStatus::Degraded => "Degraded",
            InstanceStatus::Paused => "Paused",
            InstanceStatus::Stopped => "Stopped",
        }
    }

    pub fn all() -> &'static [InstanceStatus] {
        &[
            InstanceStatus::Pending,
            InstanceStatus::Running,
            InstanceStatus::Degraded,
            InstanceStatus::Paused,
            InstanceStatus::Stopped,
        ]
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channel lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum ChannelState {
    /// Connect sent, not yet confirmed.
    Establishing,
    /// Confirmed by the backend.
    Active,
    /// Disconnect sent, not yet confirmed.
    #[strum(serialize = "tearing down", serialize = "tearingdown", serialize = "tearing_down")]
    TearingDown,
}

impl ChannelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelState::Establishing => "Establishing",
            ChannelState::Active => "Active",
            ChannelState::TearingDown => "Tearing Down",
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Control verb accepted by the `action` attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum Action {
    Start,
    Stop,
    Restart,
    Pause,
    Unpause,
}

impl Action {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Start => "start",
            Action::Stop => "stop",
            Action::Restart => "restart",
            Action::Pause => "pause",
            Action::Unpause => "unpause",
        }
    }

    /// Status the instance settles in once the action has been applied.
    pub fn resulting_status(&self) -> InstanceStatus {
        match self {
            Action::Start | Action::Restart | Action::Unpause => InstanceStatus::Running,
            Action::Stop => InstanceStatus::Stopped,
            Action::Pause => InstanceStatus::Paused,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_aliases() {
        assert_eq!(InstanceStatus::from_str("running"), Some(InstanceStatus::Running));
        assert_eq!(InstanceStatus::from_str("UP"), Some(InstanceStatus::Running));
        assert_eq!(InstanceStatus::from_str("exited"), Some(InstanceStatus::Stopped));
        assert_eq!(InstanceStatus::from_str("bogus"), None);
    }

    #[test]
    fn test_state_from_status() {
        assert_eq!(InstanceState::from_status(InstanceStatus::Running), InstanceState::Running);
        assert_eq!(InstanceState::from_status(InstanceStatus::Paused), InstanceState::Degraded);
        assert_eq!(InstanceState::from_status(InstanceStatus::Stopped), InstanceState::Degraded);
    }

    #[test]
    fn test_state_predicates() {
        assert!(InstanceState::Pending.satisfies_create());
        assert!(!InstanceState::Degraded.satisfies_create());
        assert!(InstanceState::Degraded.can_destroy());
        assert!(!InstanceState::Destroying.can_destroy());
        assert!(!InstanceState::Absent.can_destroy());
    }

    #[test]
    fn test_channel_state_display() {
        assert_eq!(ChannelState::TearingDown.to_string(), "Tearing Down");
        assert_eq!(
            "tearing down".parse::<ChannelState>().unwrap(),
            ChannelState::TearingDown
        );
    }

    #[test]
    fn test_action_parse() {
        assert_eq!(Action::from_str("Restart"), Some(Action::Restart));
        assert_eq!(Action::Pause.resulting_status(), InstanceStatus::Paused);
        assert_eq!(Action::from_str("reboot"), None);
    }
}
