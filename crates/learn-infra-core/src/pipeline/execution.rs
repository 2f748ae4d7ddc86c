// A single pipeline run, stage by stage
//
// Stages run strictly in order. A stage may be entered only once its
// predecessor has succeeded or been skipped by its guard. Entering evaluates
// the guard first; a stage with approval pre-steps then waits until every
// approval is recorded before it starts deploying.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::gate::GuardOutcome;
use super::{PipelineDefinition, VariableCheck};
use crate::error::GateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Pending,
    AwaitingApproval,
    InProgress,
    Succeeded,
    Failed,
    Skipped,
}

impl StageStatus {
    /// Whether the next stage may be entered
    pub fn unblocks_successor(&self) -> bool {
        matches!(self, StageStatus::Succeeded | StageStatus::Skipped)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageStatus::Succeeded | StageStatus::Failed | StageStatus::Skipped
        )
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageStatus::Pending => "pending",
            StageStatus::AwaitingApproval => "awaiting approval",
            StageStatus::InProgress => "in progress",
            StageStatus::Succeeded => "succeeded",
            StageStatus::Failed => "failed",
            StageStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
struct StageRun {
    name: String,
    guard: Option<VariableCheck>,
    approvals: Vec<String>,
    approved: BTreeSet<String>,
    status: StageStatus,
}

#[derive(Debug, Clone)]
pub struct PipelineExecution {
    variables: BTreeMap<String, String>,
    stages: Vec<StageRun>,
}

impl PipelineExecution {
    pub fn start(definition: &PipelineDefinition, overrides: &BTreeMap<String, String>) -> Self {
        let stages = definition
            .stages
            .iter()
            .map(|stage| StageRun {
                name: stage.name.clone(),
                guard: stage.guard.clone(),
                approvals: stage.pre.iter().map(|p| p.name().to_string()).collect(),
                approved: BTreeSet::new(),
                status: StageStatus::Pending,
            })
            .collect();

        Self {
            variables: definition.resolve_variables(overrides),
            stages,
        }
    }

    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    pub fn status(&self, stage: &str) -> Option<StageStatus> {
        self.stages.iter().find(|s| s.name == stage).map(|s| s.status)
    }

    /// Every stage reached a terminal status
    pub fn is_finished(&self) -> bool {
        self.stages.iter().all(|s| s.status.is_terminal())
    }

    pub fn enter(&mut self, stage: &str) -> Result<StageStatus, GateError> {
        let index = self.index_of(stage)?;

        if let Some(predecessor) = index.checked_sub(1).map(|i| &self.stages[i]) {
            if !predecessor.status.unblocks_successor() {
                return Err(GateError::PredecessorIncomplete {
                    stage: stage.to_string(),
                    predecessor: predecessor.name.clone(),
                    status: predecessor.status.to_string(),
                });
            }
        }

        let variables = &self.variables;
        let run = &mut self.stages[index];
        if run.status != StageStatus::Pending {
            return Err(invalid(run, "enter"));
        }

        let outcome = run
            .guard
            .as_ref()
            .map_or(GuardOutcome::Enter, |g| g.evaluate(variables));

        run.status = match outcome {
            GuardOutcome::Skip => StageStatus::Skipped,
            GuardOutcome::Enter if run.approvals.is_empty() => StageStatus::InProgress,
            GuardOutcome::Enter => StageStatus::AwaitingApproval,
        };
        tracing::debug!(stage, status = %run.status, "Entered stage");
        Ok(run.status)
    }

    /// Record one approval; the stage starts once all are in
    pub fn approve(&mut self, stage: &str, step: &str) -> Result<StageStatus, GateError> {
        let index = self.index_of(stage)?;
        let run = &mut self.stages[index];

        if run.status != StageStatus::AwaitingApproval {
            return Err(invalid(run, "approve"));
        }
        if !run.approvals.iter().any(|a| a == step) {
            return Err(GateError::UnknownApproval {
                stage: stage.to_string(),
                step: step.to_string(),
            });
        }

        run.approved.insert(step.to_string());
        if run.approvals.iter().all(|a| run.approved.contains(a)) {
            run.status = StageStatus::InProgress;
        }
        Ok(run.status)
    }

    /// A rejected approval fails the stage and blocks everything after it
    pub fn reject(&mut self, stage: &str, step: &str) -> Result<StageStatus, GateError> {
        let index = self.index_of(stage)?;
        let run = &mut self.stages[index];

        if run.status != StageStatus::AwaitingApproval {
            return Err(invalid(run, "reject"));
        }
        if !run.approvals.iter().any(|a| a == step) {
            return Err(GateError::UnknownApproval {
                stage: stage.to_string(),
                step: step.to_string(),
            });
        }
        run.status = StageStatus::Failed;
        Ok(run.status)
    }

    pub fn complete(&mut self, stage: &str, succeeded: bool) -> Result<StageStatus, GateError> {
        let index = self.index_of(stage)?;
        let run = &mut self.stages[index];

        if run.status != StageStatus::InProgress {
            return Err(invalid(run, "complete"));
        }
        run.status = if succeeded {
            StageStatus::Succeeded
        } else {
            StageStatus::Failed
        };
        Ok(run.status)
    }

    fn index_of(&self, stage: &str) -> Result<usize, GateError> {
        self.stages
            .iter()
            .position(|s| s.name == stage)
            .ok_or_else(|| GateError::UnknownStage(stage.to_string()))
    }
}

fn invalid(run: &StageRun, action: &'static str) -> GateError {
    GateError::InvalidTransition {
        stage: run.name.clone(),
        action,
        status: run.status.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{trigger_variables, TriggerSource};
    use learn_infra_config::Settings;

    fn execution(source: TriggerSource) -> PipelineExecution {
        let definition = PipelineDefinition::standard(&Settings::default());
        PipelineExecution::start(&definition, &trigger_variables(source))
    }

    fn run_through_dev(exec: &mut PipelineExecution) {
        for stage in ["Source", "Synth", "UpdatePipeline", "DevStage"] {
            assert_eq!(exec.enter(stage).unwrap(), StageStatus::InProgress);
            exec.complete(stage, true).unwrap();
        }
    }

    #[test]
    fn test_full_github_run() {
        let mut exec = execution(TriggerSource::Github);
        run_through_dev(&mut exec);

        assert_eq!(exec.enter("StgStage").unwrap(), StageStatus::AwaitingApproval);
        assert_eq!(
            exec.approve("StgStage", "stg-deployment-approval").unwrap(),
            StageStatus::InProgress
        );
        exec.complete("StgStage", true).unwrap();

        assert_eq!(exec.enter("PrdStage").unwrap(), StageStatus::AwaitingApproval);
        exec.approve("PrdStage", "prd-deployment-approval").unwrap();
        exec.complete("PrdStage", true).unwrap();
        assert!(exec.is_finished());
    }

    #[test]
    fn test_stage_cannot_start_before_predecessor_succeeds() {
        let mut exec = execution(TriggerSource::Github);
        exec.enter("Source").unwrap();
        exec.complete("Source", true).unwrap();
        exec.enter("Synth").unwrap();

        let err = exec.enter("UpdatePipeline").unwrap_err();
        assert_eq!(
            err,
            GateError::PredecessorIncomplete {
                stage: "UpdatePipeline".to_string(),
                predecessor: "Synth".to_string(),
                status: "in progress".to_string(),
            }
        );

        exec.complete("Synth", false).unwrap();
        assert!(exec.enter("UpdatePipeline").is_err());
        assert!(exec.enter("DevStage").is_err());
    }

    #[test]
    fn test_staging_cannot_deploy_without_approval() {
        let mut exec = execution(TriggerSource::Github);
        run_through_dev(&mut exec);
        exec.enter("StgStage").unwrap();

        assert!(exec.complete("StgStage", true).is_err());
        assert!(exec.enter("PrdStage").is_err());
        assert!(matches!(
            exec.approve("StgStage", "someone-else"),
            Err(GateError::UnknownApproval { .. })
        ));
    }

    #[test]
    fn test_rejected_approval_blocks_production() {
        let mut exec = execution(TriggerSource::Github);
        run_through_dev(&mut exec);
        exec.enter("StgStage").unwrap();
        assert_eq!(
            exec.reject("StgStage", "stg-deployment-approval").unwrap(),
            StageStatus::Failed
        );
        assert!(exec.enter("PrdStage").is_err());
    }

    #[test]
    fn test_lambda_run_skips_production() {
        let mut exec = execution(TriggerSource::Lambda);
        run_through_dev(&mut exec);
        exec.enter("StgStage").unwrap();
        exec.approve("StgStage", "stg-deployment-approval").unwrap();
        exec.complete("StgStage", true).unwrap();

        assert_eq!(exec.enter("PrdStage").unwrap(), StageStatus::Skipped);
        assert!(exec.is_finished());
    }

    #[test]
    fn test_unknown_stage_and_double_entry() {
        let mut exec = execution(TriggerSource::Github);
        assert_eq!(
            exec.enter("QaStage").unwrap_err(),
            GateError::UnknownStage("QaStage".to_string())
        );
        exec.enter("Source").unwrap();
        assert!(matches!(
            exec.enter("Source"),
            Err(GateError::InvalidTransition { action: "enter", .. })
        ));
    }
}
