//! Stack: a named, independently deployable template plus its dependencies

use learn_infra_config::Settings;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Result, SynthError};
use crate::template::Template;

/// Target account/region of a stack. `account: None` means environment-agnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AwsEnvironment {
    pub account: Option<String>,
    pub region: String,
}

impl AwsEnvironment {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            account: if settings.aws.account.is_empty() {
                None
            } else {
                Some(settings.aws.account.clone())
            },
            region: settings.aws.region.clone(),
        }
    }

    /// `aws://<account>/<region>` as written to the manifest
    pub fn uri(&self) -> String {
        format!(
            "aws://{}/{}",
            self.account.as_deref().unwrap_or("unknown-account"),
            self.region
        )
    }
}

#[derive(Debug, Clone)]
pub struct Stack {
    name: String,
    environment: AwsEnvironment,
    template: Template,
    dependencies: Vec<String>,
}

impl Stack {
    pub fn new(name: impl Into<String>, environment: AwsEnvironment, template: Template) -> Self {
        Self {
            name: name.into(),
            environment,
            template,
            dependencies: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn environment(&self) -> &AwsEnvironment {
        &self.environment
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Declare that this stack must be provisioned after `other`
    pub fn add_dependency(&mut self, other: &Stack) {
        if !self.dependencies.iter().any(|d| d == other.name()) {
            self.dependencies.push(other.name().to_string());
        }
    }

    pub fn template_file(&self) -> String {
        format!("{}.template.json", self.name)
    }

    /// Validate the template, tagging any error with the stack name
    pub fn validate(&self) -> Result<()> {
        self.template
            .validate()
            .map_err(|source| SynthError::InvalidTemplate {
                stack: self.name.clone(),
                source: Box::new(source),
            })
    }
}

/// Group stacks into deployment waves: every stack lands in the wave after
/// the last of its dependencies. Dependencies must be among `stacks`.
pub fn deploy_waves<'a>(stacks: &[&'a Stack]) -> Result<Vec<Vec<&'a Stack>>> {
    let mut by_name: BTreeMap<&str, &'a Stack> = BTreeMap::new();
    for stack in stacks.iter().copied() {
        if by_name.insert(stack.name(), stack).is_some() {
            return Err(SynthError::DuplicateStack(stack.name().to_string()));
        }
    }
    for stack in stacks {
        for dep in stack.dependencies() {
            if !by_name.contains_key(dep.as_str()) {
                return Err(SynthError::MissingDependency {
                    stack: stack.name().to_string(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    let mut placed: BTreeSet<&str> = BTreeSet::new();
    let mut waves = Vec::new();
    while placed.len() < stacks.len() {
        // Keep input order within a wave
        let wave: Vec<&'a Stack> = stacks
            .iter()
            .copied()
            .filter(|s| !placed.contains(s.name()))
            .filter(|s| s.dependencies().iter().all(|d| placed.contains(d.as_str())))
            .collect();

        if wave.is_empty() {
            let stuck: Vec<&str> = stacks
                .iter()
                .map(|s| s.name())
                .filter(|n| !placed.contains(n))
                .collect();
            return Err(SynthError::DependencyCycle(stuck.join(", ")));
        }
        placed.extend(wave.iter().map(|s| s.name()));
        waves.push(wave);
    }
    Ok(waves)
}
