//! Pure install-prompt state machine.
//!
//! # Responsibility
//! - Decide every transition from the current state, an event, the last
//!   dismissal time and the current time.
//! - Keep the suppression policy free of storage and platform handles.
//!
//! # Invariants
//! - `Accepted` and `Dismissed` are only reachable from `Shown`.
//! - `Accepted` and `Dismissed` are terminal for one lifecycle instance.
//! - Events that match no edge leave the state unchanged.

use crate::clock::EpochMs;
use crate::config::DEFAULT_SUPPRESSION_WINDOW_MS;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallState {
    #[default]
    Unavailable,
    Available,
    Shown,
    Accepted,
    Dismissed,
}

impl InstallState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unavailable => "unavailable",
            Self::Available => "available",
            Self::Shown => "shown",
            Self::Accepted => "accepted",
            Self::Dismissed => "dismissed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Accepted | Self::Dismissed)
    }
}

impl Display for InstallState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User decision reported by the platform after the prompt was shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallOutcome {
    Accepted,
    Dismissed,
}

impl InstallOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Dismissed => "dismissed",
        }
    }
}

/// Time-based guard applied to installability signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuppressionPolicy {
    pub window_ms: EpochMs,
}

impl Default for SuppressionPolicy {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_SUPPRESSION_WINDOW_MS,
        }
    }
}

impl SuppressionPolicy {
    pub fn new(window_ms: EpochMs) -> Self {
        Self { window_ms }
    }

    /// Whether a dismissal at `last_dismissed` still suppresses at `now`.
    ///
    /// A dismissal dated in the future counts as recent.
    pub fn is_suppressed(&self, last_dismissed: Option<EpochMs>, now: EpochMs) -> bool {
        match last_dismissed {
            Some(dismissed_at) => now.saturating_sub(dismissed_at) < self.window_ms,
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallEvent {
    InstallabilitySignalled,
    Presented,
    UserChoice(InstallOutcome),
}

impl InstallEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InstallabilitySignalled => "installability_signalled",
            Self::Presented => "presented",
            Self::UserChoice(_) => "user_choice",
        }
    }
}

/// Result of feeding one event to the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Moved {
        from: InstallState,
        to: InstallState,
    },
    /// Installability was signalled inside the suppression window.
    Suppressed,
    /// A fresh signal replaced the captured prompt while still `Available`.
    Recaptured,
    /// No edge matches the event from the current state.
    Ignored,
}

impl Transition {
    pub fn changed(&self) -> bool {
        matches!(self, Self::Moved { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct InstallLifecycle {
    state: InstallState,
    policy: SuppressionPolicy,
}

impl InstallLifecycle {
    pub fn new(policy: SuppressionPolicy) -> Self {
        Self {
            state: InstallState::Unavailable,
            policy,
        }
    }

    pub fn state(&self) -> InstallState {
        self.state
    }

    pub fn policy(&self) -> SuppressionPolicy {
        self.policy
    }

    /// Applies `event`; `last_dismissed` only matters for installability
    /// signals.
    pub fn apply(
        &mut self,
        event: InstallEvent,
        last_dismissed: Option<EpochMs>,
        now: EpochMs,
    ) -> Transition {
        let next = match (self.state, event) {
            (InstallState::Unavailable, InstallEvent::InstallabilitySignalled) => {
                if self.policy.is_suppressed(last_dismissed, now) {
                    return Transition::Suppressed;
                }
                InstallState::Available
            }
            (InstallState::Available, InstallEvent::InstallabilitySignalled) => {
                return Transition::Recaptured;
            }
            (InstallState::Available, InstallEvent::Presented) => InstallState::Shown,
            (InstallState::Shown, InstallEvent::UserChoice(InstallOutcome::Accepted)) => {
                InstallState::Accepted
            }
            (InstallState::Shown, InstallEvent::UserChoice(InstallOutcome::Dismissed)) => {
                InstallState::Dismissed
            }
            _ => return Transition::Ignored,
        };

        let from = self.state;
        self.state = next;
        Transition::Moved { from, to: next }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        InstallEvent, InstallLifecycle, InstallOutcome, InstallState, SuppressionPolicy,
        Transition,
    };
    use crate::clock::DAY_MS;

    const NOW: i64 = 1_700_000_000_000;

    fn shown() -> InstallLifecycle {
        let mut lifecycle = InstallLifecycle::default();
        lifecycle.apply(InstallEvent::InstallabilitySignalled, None, NOW);
        lifecycle.apply(InstallEvent::Presented, None, NOW);
        lifecycle
    }

    #[test]
    fn suppression_window_is_seven_days() {
        let policy = SuppressionPolicy::default();
        assert!(!policy.is_suppressed(None, NOW));
        assert!(policy.is_suppressed(Some(NOW - 3 * DAY_MS), NOW));
        assert!(policy.is_suppressed(Some(NOW - 7 * DAY_MS + 1), NOW));
        assert!(!policy.is_suppressed(Some(NOW - 7 * DAY_MS), NOW));
        assert!(!policy.is_suppressed(Some(NOW - 8 * DAY_MS), NOW));
    }

    #[test]
    fn future_dismissal_suppresses() {
        let policy = SuppressionPolicy::default();
        assert!(policy.is_suppressed(Some(NOW + DAY_MS), NOW));
    }

    #[test]
    fn recent_dismissal_keeps_state_unavailable() {
        let mut lifecycle = InstallLifecycle::default();
        let transition = lifecycle.apply(
            InstallEvent::InstallabilitySignalled,
            Some(NOW - 3 * DAY_MS),
            NOW,
        );
        assert_eq!(transition, Transition::Suppressed);
        assert_eq!(lifecycle.state(), InstallState::Unavailable);
    }

    #[test]
    fn happy_path_reaches_accepted() {
        let mut lifecycle = shown();
        assert_eq!(lifecycle.state(), InstallState::Shown);
        let transition = lifecycle.apply(
            InstallEvent::UserChoice(InstallOutcome::Accepted),
            None,
            NOW,
        );
        assert_eq!(
            transition,
            Transition::Moved {
                from: InstallState::Shown,
                to: InstallState::Accepted
            }
        );
    }

    #[test]
    fn outcome_is_ignored_unless_shown() {
        let mut lifecycle = InstallLifecycle::default();
        assert_eq!(
            lifecycle.apply(InstallEvent::UserChoice(InstallOutcome::Dismissed), None, NOW),
            Transition::Ignored
        );
        lifecycle.apply(InstallEvent::InstallabilitySignalled, None, NOW);
        assert_eq!(
            lifecycle.apply(InstallEvent::UserChoice(InstallOutcome::Accepted), None, NOW),
            Transition::Ignored
        );
        assert_eq!(lifecycle.state(), InstallState::Available);
    }

    #[test]
    fn terminal_states_ignore_everything() {
        let mut lifecycle = shown();
        lifecycle.apply(InstallEvent::UserChoice(InstallOutcome::Dismissed), None, NOW);
        for event in [
            InstallEvent::InstallabilitySignalled,
            InstallEvent::Presented,
            InstallEvent::UserChoice(InstallOutcome::Accepted),
        ] {
            assert_eq!(lifecycle.apply(event, None, NOW), Transition::Ignored);
        }
        assert!(lifecycle.state().is_terminal());
    }

    #[test]
    fn repeated_signal_while_available_recaptures() {
        let mut lifecycle = InstallLifecycle::default();
        lifecycle.apply(InstallEvent::InstallabilitySignalled, None, NOW);
        assert_eq!(
            lifecycle.apply(InstallEvent::InstallabilitySignalled, None, NOW),
            Transition::Recaptured
        );
    }
}
