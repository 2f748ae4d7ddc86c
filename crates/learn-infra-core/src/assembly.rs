// Cloud assembly: every stack of the app plus a manifest
//
// The whole assembly is built and validated in memory before anything is
// written, so a bad flag or a dangling reference leaves the output directory
// untouched.

use learn_infra_config::{ConfigError, DeployEnv, InfraStatus, Settings};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Result, SynthError};
use crate::pipeline::PipelineDefinition;
use crate::stack::{deploy_waves, Stack};
use crate::stacks::PipelineStack;
use crate::stage::AppStage;

pub const MANIFEST_FILE: &str = "manifest.json";
const TEMPLATE_SUFFIX: &str = ".template.json";
const MANIFEST_VERSION: &str = "1.0.0";

/// Infra status flag per environment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InfraStatuses {
    pub dev: InfraStatus,
    pub stg: InfraStatus,
    pub prd: InfraStatus,
}

impl InfraStatuses {
    /// Parse raw flag values; absent means `on`, anything but on/off is rejected
    pub fn parse(
        dev: Option<&str>,
        stg: Option<&str>,
        prd: Option<&str>,
    ) -> std::result::Result<Self, ConfigError> {
        Ok(Self {
            dev: InfraStatus::from_optional(dev)?,
            stg: InfraStatus::from_optional(stg)?,
            prd: InfraStatus::from_optional(prd)?,
        })
    }

    pub fn get(&self, env: DeployEnv) -> InfraStatus {
        match env {
            DeployEnv::Dev => self.dev,
            DeployEnv::Stg => self.stg,
            DeployEnv::Prd => self.prd,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub name: String,
    pub environment: String,
    pub template_file: String,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    pub version: String,
    pub infra_status: BTreeMap<String, String>,
    /// Deployment order
    pub stacks: Vec<ManifestEntry>,
}

pub struct CloudAssembly {
    stacks: Vec<Stack>,
    definition: PipelineDefinition,
    statuses: InfraStatuses,
}

/// Build every stage plus the pipeline stack
pub fn build_app(settings: &Settings, statuses: InfraStatuses) -> Result<CloudAssembly> {
    let stages = DeployEnv::ALL
        .into_iter()
        .map(|env| AppStage::new(env, statuses.get(env), settings))
        .collect::<Result<Vec<_>>>()?;

    let pipeline = PipelineStack::build(settings, &stages)?;

    let mut stacks = vec![pipeline.stack];
    for stage in &stages {
        debug!(stage = %stage.name(), infra_status = %stage.status(), "Adding stage");
        stacks.extend(stage.stacks().into_iter().cloned());
    }

    let assembly = CloudAssembly {
        stacks,
        definition: pipeline.definition,
        statuses,
    };
    assembly.validate()?;
    Ok(assembly)
}

impl CloudAssembly {
    pub fn stacks(&self) -> &[Stack] {
        &self.stacks
    }

    pub fn stack(&self, name: &str) -> Option<&Stack> {
        self.stacks.iter().find(|s| s.name() == name)
    }

    pub fn definition(&self) -> &PipelineDefinition {
        &self.definition
    }

    /// Stacks in an order where every dependency comes first
    pub fn ordered(&self) -> Result<Vec<&Stack>> {
        let refs: Vec<&Stack> = self.stacks.iter().collect();
        Ok(deploy_waves(&refs)?.into_iter().flatten().collect())
    }

    pub fn validate(&self) -> Result<()> {
        for stack in &self.stacks {
            stack.validate()?;
        }
        self.ordered().map(|_| ())
    }

    pub fn manifest(&self) -> Result<Manifest> {
        let infra_status = DeployEnv::ALL
            .iter()
            .map(|env| (env.to_string(), self.statuses.get(*env).to_string()))
            .collect();

        let stacks = self
            .ordered()?
            .into_iter()
            .map(|stack| ManifestEntry {
                name: stack.name().to_string(),
                environment: stack.environment().uri(),
                template_file: stack.template_file(),
                dependencies: stack.dependencies().to_vec(),
            })
            .collect();

        Ok(Manifest {
            version: MANIFEST_VERSION.to_string(),
            infra_status,
            stacks,
        })
    }

    /// Write `<stack>.template.json` for each stack and `manifest.json`
    pub fn write_to(&self, dir: &Path) -> Result<Manifest> {
        let manifest = self.manifest()?;

        // Serialize everything before touching the filesystem
        let mut files = Vec::with_capacity(self.stacks.len() + 1);
        for stack in &self.stacks {
            files.push((stack.template_file(), stack.template().to_json_pretty()?));
        }
        files.push((
            MANIFEST_FILE.to_string(),
            serde_json::to_string_pretty(&manifest)?,
        ));

        fs::create_dir_all(dir).map_err(|source| SynthError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let current: BTreeSet<&str> = files.iter().map(|(file, _)| file.as_str()).collect();
        remove_stale_templates(dir, &current)?;

        for (file, contents) in files {
            let path = dir.join(&file);
            fs::write(&path, contents + "\n").map_err(|source| SynthError::Io {
                path: path.clone(),
                source,
            })?;
            debug!(path = %path.display(), "Wrote assembly file");
        }

        info!(
            dir = %dir.display(),
            stacks = self.stacks.len(),
            "Wrote cloud assembly"
        );
        Ok(manifest)
    }
}

/// Delete templates left by earlier runs that this assembly no longer has
fn remove_stale_templates(dir: &Path, current: &BTreeSet<&str>) -> Result<()> {
    for entry in fs::read_dir(dir).map_err(io_error(dir))? {
        let path = entry.map_err(io_error(dir))?.path();
        let Some(file) = path.file_name().and_then(|f| f.to_str()) else {
            continue;
        };
        if file.ends_with(TEMPLATE_SUFFIX) && !current.contains(file) && path.is_file() {
            fs::remove_file(&path).map_err(io_error(&path))?;
            debug!(path = %path.display(), "Removed stale template");
        }
    }
    Ok(())
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> SynthError {
    let path = path.to_path_buf();
    move |source| SynthError::Io { path, source }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statuses_parse() {
        let statuses = InfraStatuses::parse(Some("off"), None, Some("on")).unwrap();
        assert_eq!(statuses.get(DeployEnv::Dev), InfraStatus::Off);
        assert_eq!(statuses.get(DeployEnv::Stg), InfraStatus::On);
        assert!(InfraStatuses::parse(Some("maybe"), None, None).is_err());
        assert!(InfraStatuses::parse(None, Some("ON "), None).is_err());
    }

    #[test]
    fn test_manifest_orders_network_before_compute() {
        let assembly = build_app(&Settings::default(), InfraStatuses::default()).unwrap();
        let manifest = assembly.manifest().unwrap();
        let position = |name: &str| manifest.stacks.iter().position(|s| s.name == name).unwrap();

        for stage in ["DevStage", "StgStage", "PrdStage"] {
            assert!(
                position(&format!("{}-NetworkStack", stage))
                    < position(&format!("{}-StatelessStack", stage))
            );
        }
        assert_eq!(manifest.stacks.len(), 10);
        assert_eq!(manifest.infra_status["prd"], "on");
    }

    #[test]
    fn test_write_removes_stale_templates_only() {
        let dir = tempfile::TempDir::new().unwrap();
        let stale = dir.path().join("QaStage-NetworkStack.template.json");
        let notes = dir.path().join("notes.txt");
        fs::write(&stale, "{}").unwrap();
        fs::write(&notes, "keep me").unwrap();

        let assembly = build_app(&Settings::default(), InfraStatuses::default()).unwrap();
        let manifest = assembly.write_to(dir.path()).unwrap();

        assert!(!stale.exists());
        assert!(notes.exists());
        for entry in &manifest.stacks {
            assert!(dir.path().join(&entry.template_file).exists());
        }
        assert!(dir.path().join("code-pipeline.template.json").exists());
    }
}
