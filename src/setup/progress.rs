//! Setup progress: the ordered steps, their criticality, and the run guard.

use serde::{Deserialize, Serialize};

/// How a step's failure affects the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    /// Required for a complete account; failure aborts the run.
    Fatal,
    /// Logged and skipped on failure.
    BestEffort,
}

/// The seven setup steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningStep {
    MirroringIdentity,
    SavingBusinessProfile,
    SavingCallPreferences,
    ActivatingSubscription,
    TrainingAgent,
    ArchivingOnboarding,
    Finalizing,
}

impl ProvisioningStep {
    pub const ALL: [ProvisioningStep; 7] = [
        Self::MirroringIdentity,
        Self::SavingBusinessProfile,
        Self::SavingCallPreferences,
        Self::ActivatingSubscription,
        Self::TrainingAgent,
        Self::ArchivingOnboarding,
        Self::Finalizing,
    ];

    pub fn criticality(self) -> Criticality {
        match self {
            Self::MirroringIdentity
            | Self::SavingBusinessProfile
            | Self::SavingCallPreferences
            | Self::ActivatingSubscription => Criticality::Fatal,
            Self::TrainingAgent | Self::ArchivingOnboarding | Self::Finalizing => {
                Criticality::BestEffort
            }
        }
    }

    /// 1-based position, for "step 3 of 7" displays.
    pub fn position(self) -> usize {
        Self::ALL
            .iter()
            .position(|s| *s == self)
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    /// Text shown on the setup-loading screen.
    pub fn label(self) -> &'static str {
        match self {
            Self::MirroringIdentity => "Creating your account",
            Self::SavingBusinessProfile => "Saving your business profile",
            Self::SavingCallPreferences => "Saving your call preferences",
            Self::ActivatingSubscription => "Activating your subscription",
            Self::TrainingAgent => "Training your AI receptionist",
            Self::ArchivingOnboarding => "Saving your onboarding answers",
            Self::Finalizing => "Finishing up",
        }
    }
}

impl std::fmt::Display for ProvisioningStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::MirroringIdentity => "mirroring_identity",
            Self::SavingBusinessProfile => "saving_business_profile",
            Self::SavingCallPreferences => "saving_call_preferences",
            Self::ActivatingSubscription => "activating_subscription",
            Self::TrainingAgent => "training_agent",
            Self::ArchivingOnboarding => "archiving_onboarding",
            Self::Finalizing => "finalizing",
        };
        write!(f, "{s}")
    }
}

/// What the setup-loading screen shows. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProvisioningProgress {
    NotStarted,
    Step {
        step: ProvisioningStep,
        position: usize,
        total: usize,
        label: String,
    },
    Succeeded,
    Failed {
        message: String,
    },
}

impl ProvisioningProgress {
    pub fn step(step: ProvisioningStep) -> Self {
        Self::Step {
            step,
            position: step.position(),
            total: ProvisioningStep::ALL.len(),
            label: step.label().to_string(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed { .. })
    }
}

/// Per-identity run guard.
///
/// Only `Running` rejects a new run; a finished run (either way) may be
/// started again, which is how "Try Again" works.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    NotStarted,
    Running,
    Succeeded,
    Failed,
}

impl RunState {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(self, target: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, target),
            (NotStarted, Running)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Succeeded, Running)
                | (Failed, Running)
        )
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_four_steps_are_fatal() {
        let fatal: Vec<_> = ProvisioningStep::ALL
            .iter()
            .filter(|s| s.criticality() == Criticality::Fatal)
            .copied()
            .collect();
        assert_eq!(
            fatal,
            vec![
                ProvisioningStep::MirroringIdentity,
                ProvisioningStep::SavingBusinessProfile,
                ProvisioningStep::SavingCallPreferences,
                ProvisioningStep::ActivatingSubscription,
            ]
        );
    }

    #[test]
    fn positions_follow_order() {
        for (i, step) in ProvisioningStep::ALL.iter().enumerate() {
            assert_eq!(step.position(), i + 1);
        }
    }

    #[test]
    fn display_matches_serde() {
        for step in ProvisioningStep::ALL {
            let json = serde_json::to_string(&step).unwrap();
            assert_eq!(format!("\"{step}\""), json, "Display and serde should match for {step:?}");
        }
    }

    #[test]
    fn running_blocks_reentry() {
        use RunState::*;
        assert!(NotStarted.can_transition_to(Running));
        assert!(!Running.can_transition_to(Running));
        assert!(Failed.can_transition_to(Running));
        assert!(Succeeded.can_transition_to(Running));
        assert!(!NotStarted.can_transition_to(Succeeded));
        assert!(!Succeeded.can_transition_to(Failed));
    }

    #[test]
    fn progress_serializes_with_state_tag() {
        let value = serde_json::to_value(ProvisioningProgress::step(
            ProvisioningStep::ActivatingSubscription,
        ))
        .unwrap();
        assert_eq!(value["state"], "step");
        assert_eq!(value["step"], "activating_subscription");
        assert_eq!(value["position"], 4);
        assert_eq!(value["total"], 7);

        let failed = serde_json::to_value(ProvisioningProgress::Failed {
            message: "boom".into(),
        })
        .unwrap();
        assert_eq!(failed, serde_json::json!({"state": "failed", "message": "boom"}));
        assert!(ProvisioningProgress::Succeeded.is_terminal());
        assert!(!ProvisioningProgress::NotStarted.is_terminal());
    }
}
