// Blue/green deployment policy and state machine
//
// The policy renders the CodeDeploy deployment group settings. The state
// machine mirrors what CodeDeploy does with those settings:
//
//   Idle -> Deploying -> Succeeded   (traffic moves to the replacement color)
//                     -> RolledBack  (failure, auto-rollback on; live color unchanged)
//                     -> Failed      (failure, auto-rollback off)

use serde_json::{json, Value};
use std::fmt;

use crate::error::DeploymentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficShift {
    AllAtOnce,
}

impl TrafficShift {
    pub fn deployment_config_name(&self) -> &'static str {
        match self {
            TrafficShift::AllAtOnce => "CodeDeployDefault.ECSAllAtOnce",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlueGreenPolicy {
    pub traffic_shift: TrafficShift,
    pub auto_rollback_on_failure: bool,
    /// Minutes to wait for a go-ahead before rerouting traffic
    pub approval_wait_minutes: u32,
    /// Minutes to keep the old task set after a successful swap
    pub termination_wait_minutes: u32,
}

impl Default for BlueGreenPolicy {
    fn default() -> Self {
        Self {
            traffic_shift: TrafficShift::AllAtOnce,
            auto_rollback_on_failure: true,
            approval_wait_minutes: 0,
            termination_wait_minutes: 0,
        }
    }
}

impl BlueGreenPolicy {
    pub fn auto_rollback_configuration(&self) -> Value {
        if self.auto_rollback_on_failure {
            json!({ "Enabled": true, "Events": ["DEPLOYMENT_FAILURE"] })
        } else {
            json!({ "Enabled": false })
        }
    }

    pub fn blue_green_configuration(&self) -> Value {
        let ready = if self.approval_wait_minutes == 0 {
            json!({ "ActionOnTimeout": "CONTINUE_DEPLOYMENT" })
        } else {
            json!({
                "ActionOnTimeout": "STOP_DEPLOYMENT",
                "WaitTimeInMinutes": self.approval_wait_minutes,
            })
        };
        json!({
            "DeploymentReadyOption": ready,
            "TerminateBlueInstancesOnDeploymentSuccess": {
                "Action": "TERMINATE",
                "TerminationWaitTimeInMinutes": self.termination_wait_minutes,
            },
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetColor {
    Blue,
    Green,
}

impl TargetColor {
    pub fn other(&self) -> TargetColor {
        match self {
            TargetColor::Blue => TargetColor::Green,
            TargetColor::Green => TargetColor::Blue,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetColor::Blue => "blue",
            TargetColor::Green => "green",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentState {
    Idle,
    Deploying { target: TargetColor },
    Succeeded,
    RolledBack,
    Failed,
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentState::Idle => f.write_str("idle"),
            DeploymentState::Deploying { target } => write!(f, "deploying to {}", target.as_str()),
            DeploymentState::Succeeded => f.write_str("succeeded"),
            DeploymentState::RolledBack => f.write_str("rolled-back"),
            DeploymentState::Failed => f.write_str("failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentOutcome {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone)]
pub struct BlueGreenDeployment {
    policy: BlueGreenPolicy,
    live: TargetColor,
    state: DeploymentState,
}

impl BlueGreenDeployment {
    /// Production traffic starts on blue
    pub fn new(policy: BlueGreenPolicy) -> Self {
        Self {
            policy,
            live: TargetColor::Blue,
            state: DeploymentState::Idle,
        }
    }

    pub fn live(&self) -> TargetColor {
        self.live
    }

    pub fn state(&self) -> DeploymentState {
        self.state
    }

    /// Start a deployment onto the idle color; returns that color
    pub fn begin(&mut self) -> Result<TargetColor, DeploymentError> {
        match self.state {
            DeploymentState::Deploying { .. } | DeploymentState::Failed => {
                Err(DeploymentError::InvalidTransition {
                    action: "begin",
                    state: self.state.to_string(),
                })
            }
            _ => {
                let target = self.live.other();
                self.state = DeploymentState::Deploying { target };
                Ok(target)
            }
        }
    }

    /// Finish the in-flight deployment
    pub fn complete(
        &mut self,
        outcome: DeploymentOutcome,
    ) -> Result<DeploymentState, DeploymentError> {
        let DeploymentState::Deploying { target } = self.state else {
            return Err(DeploymentError::InvalidTransition {
                action: "complete",
                state: self.state.to_string(),
            });
        };

        self.state = match outcome {
            DeploymentOutcome::Healthy => {
                // All-at-once: every request moves in one step
                self.live = target;
                DeploymentState::Succeeded
            }
            DeploymentOutcome::Unhealthy if self.policy.auto_rollback_on_failure => {
                DeploymentState::RolledBack
            }
            DeploymentOutcome::Unhealthy => DeploymentState::Failed,
        };
        Ok(self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_renders_codedeploy_settings() {
        let policy = BlueGreenPolicy::default();
        assert_eq!(
            policy.traffic_shift.deployment_config_name(),
            "CodeDeployDefault.ECSAllAtOnce"
        );
        assert_eq!(
            policy.auto_rollback_configuration(),
            json!({ "Enabled": true, "Events": ["DEPLOYMENT_FAILURE"] })
        );
        let bg = policy.blue_green_configuration();
        assert_eq!(
            bg["DeploymentReadyOption"]["ActionOnTimeout"],
            "CONTINUE_DEPLOYMENT"
        );
        assert_eq!(
            bg["TerminateBlueInstancesOnDeploymentSuccess"]["TerminationWaitTimeInMinutes"],
            0
        );
    }

    #[test]
    fn test_successful_deploy_swaps_live_color() {
        let mut deployment = BlueGreenDeployment::new(BlueGreenPolicy::default());
        assert_eq!(deployment.begin().unwrap(), TargetColor::Green);
        assert_eq!(
            deployment.complete(DeploymentOutcome::Healthy).unwrap(),
            DeploymentState::Succeeded
        );
        assert_eq!(deployment.live(), TargetColor::Green);

        // Next release goes back to blue
        assert_eq!(deployment.begin().unwrap(), TargetColor::Blue);
    }

    #[test]
    fn test_failed_deploy_rolls_back() {
        let mut deployment = BlueGreenDeployment::new(BlueGreenPolicy::default());
        deployment.begin().unwrap();
        assert_eq!(
            deployment.complete(DeploymentOutcome::Unhealthy).unwrap(),
            DeploymentState::RolledBack
        );
        assert_eq!(deployment.live(), TargetColor::Blue);
        assert!(deployment.begin().is_ok());
    }

    #[test]
    fn test_failure_without_rollback_is_terminal() {
        let policy = BlueGreenPolicy {
            auto_rollback_on_failure: false,
            ..BlueGreenPolicy::default()
        };
        let mut deployment = BlueGreenDeployment::new(policy);
        deployment.begin().unwrap();
        assert_eq!(
            deployment.complete(DeploymentOutcome::Unhealthy).unwrap(),
            DeploymentState::Failed
        );
        assert!(deployment.begin().is_err());
    }

    #[test]
    fn test_invalid_transitions() {
        let mut deployment = BlueGreenDeployment::new(BlueGreenPolicy::default());
        assert!(deployment.complete(DeploymentOutcome::Healthy).is_err());
        deployment.begin().unwrap();
        assert!(deployment.begin().is_err());
    }
}
