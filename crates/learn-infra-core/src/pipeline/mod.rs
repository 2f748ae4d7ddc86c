//! Pipeline definition: stage order, approval pre-steps, and entry guards
//!
//! The definition is the single source for both the rendered CodePipeline
//! resource and the offline `plan`/`PipelineExecution` models, so what the
//! CLI predicts is what the pipeline does.

use learn_infra_config::{DeployEnv, Settings};
use std::collections::BTreeMap;

pub mod execution;
pub mod gate;
pub mod synth_step;
pub mod trigger_source;

pub use execution::{PipelineExecution, StageStatus};
pub use gate::{GuardOutcome, VariableCheck};
pub use trigger_source::{classify, TriggerSource, DEFAULT_WINDOW_SECS};

pub const TRIGGER_VARIABLE: &str = "TRIGGER";
pub const DEFAULT_TRIGGER: &str = "github";
const APPROVAL_COMMENT: &str = "Please confirm for learn diff at below link!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Source,
    Synth,
    /// Redeploys the pipeline's own stack from the fresh assembly
    UpdatePipeline,
    Deploy(DeployEnv),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreStep {
    ManualApproval {
        name: String,
        comment: String,
        review_url: String,
    },
}

impl PreStep {
    pub fn name(&self) -> &str {
        match self {
            PreStep::ManualApproval { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStage {
    pub name: String,
    pub kind: StageKind,
    pub pre: Vec<PreStep>,
    pub guard: Option<VariableCheck>,
}

impl PipelineStage {
    fn new(name: impl Into<String>, kind: StageKind) -> Self {
        Self {
            name: name.into(),
            kind,
            pre: Vec::new(),
            guard: None,
        }
    }

    fn with_pre(mut self, step: PreStep) -> Self {
        self.pre.push(step);
        self
    }

    fn guarded_by(mut self, guard: VariableCheck) -> Self {
        self.guard = Some(guard);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineVariable {
    pub name: String,
    pub default_value: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineDefinition {
    pub name: String,
    pub variables: Vec<PipelineVariable>,
    pub stages: Vec<PipelineStage>,
}

/// One row of `plan` output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStage {
    pub name: String,
    pub approvals: Vec<String>,
    pub guard: Option<VariableCheck>,
    pub outcome: GuardOutcome,
}

impl PipelineDefinition {
    /// Source, Synth, the pipeline's own update, then one deploy stage per
    /// environment. Staging and
    /// production wait for a manual approval; production only runs when the
    /// run was started from the repository.
    pub fn standard(settings: &Settings) -> Self {
        let mut stages = vec![
            PipelineStage::new("Source", StageKind::Source),
            PipelineStage::new("Synth", StageKind::Synth),
            PipelineStage::new("UpdatePipeline", StageKind::UpdatePipeline),
        ];

        for env in DeployEnv::ALL {
            let mut stage = PipelineStage::new(stage_name(env), StageKind::Deploy(env));
            if env != DeployEnv::Dev {
                stage = stage.with_pre(PreStep::ManualApproval {
                    name: format!("{}-deployment-approval", env),
                    comment: APPROVAL_COMMENT.to_string(),
                    review_url: format!("{}&env={}", settings.pipeline.review_url, env),
                });
            }
            if env == DeployEnv::Prd {
                stage = stage.guarded_by(VariableCheck::equals(TRIGGER_VARIABLE, DEFAULT_TRIGGER));
            }
            stages.push(stage);
        }

        Self {
            name: settings.pipeline.name.clone(),
            variables: vec![PipelineVariable {
                name: TRIGGER_VARIABLE.to_string(),
                default_value: DEFAULT_TRIGGER.to_string(),
                description: "What started this run: github or lambda".to_string(),
            }],
            stages,
        }
    }

    pub fn stage(&self, name: &str) -> Option<&PipelineStage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Declared defaults overlaid with the values a run was started with
    pub fn resolve_variables(&self, overrides: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut resolved: BTreeMap<String, String> = self
            .variables
            .iter()
            .map(|v| (v.name.clone(), v.default_value.clone()))
            .collect();
        for (name, value) in overrides {
            resolved.insert(name.clone(), value.clone());
        }
        resolved
    }

    /// Which stages a run started with `overrides` would enter or skip
    pub fn plan(&self, overrides: &BTreeMap<String, String>) -> Vec<PlannedStage> {
        let variables = self.resolve_variables(overrides);
        self.stages
            .iter()
            .map(|stage| PlannedStage {
                name: stage.name.clone(),
                approvals: stage.pre.iter().map(|p| p.name().to_string()).collect(),
                guard: stage.guard.clone(),
                outcome: stage
                    .guard
                    .as_ref()
                    .map_or(GuardOutcome::Enter, |g| g.evaluate(&variables)),
            })
            .collect()
    }
}

/// `DevStage`, `StgStage`, `PrdStage`
pub fn stage_name(env: DeployEnv) -> String {
    format!("{}Stage", env.title())
}

/// Variables for a run started by `source`
pub fn trigger_variables(source: TriggerSource) -> BTreeMap<String, String> {
    BTreeMap::from([(TRIGGER_VARIABLE.to_string(), source.as_str().to_string())])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition() -> PipelineDefinition {
        PipelineDefinition::standard(&Settings::default())
    }

    #[test]
    fn test_standard_stage_order() {
        let names: Vec<_> = definition().stages.into_iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            ["Source", "Synth", "UpdatePipeline", "DevStage", "StgStage", "PrdStage"]
        );
    }

    #[test]
    fn test_approvals_and_guard() {
        let def = definition();
        assert!(def.stage("DevStage").unwrap().pre.is_empty());

        let stg = def.stage("StgStage").unwrap();
        let PreStep::ManualApproval { name, review_url, .. } = &stg.pre[0];
        assert_eq!(name, "stg-deployment-approval");
        assert_eq!(
            review_url,
            "https://infra.shirokumapower.jp/infra-diff?system=learn&env=stg"
        );
        assert!(stg.guard.is_none());

        let prd = def.stage("PrdStage").unwrap();
        assert_eq!(prd.pre.len(), 1);
        assert_eq!(prd.guard, Some(VariableCheck::equals("TRIGGER", "github")));
    }

    #[test]
    fn test_plan_skips_production_for_lambda_runs() {
        let def = definition();

        let github = def.plan(&BTreeMap::new());
        assert!(github.iter().all(|s| s.outcome == GuardOutcome::Enter));

        let lambda = def.plan(&trigger_variables(TriggerSource::Lambda));
        let skipped: Vec<_> = lambda
            .iter()
            .filter(|s| s.outcome == GuardOutcome::Skip)
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(skipped, ["PrdStage"]);
    }

    #[test]
    fn test_resolve_variables_defaults() {
        let vars = definition().resolve_variables(&BTreeMap::new());
        assert_eq!(vars.get("TRIGGER").map(String::as_str), Some("github"));
    }
}
