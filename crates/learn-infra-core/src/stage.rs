//! One deployable environment: network, compute, and backend function stacks
//!
//! Every environment is built by the same constructor; the environment and
//! its infra status flag are the only inputs that differ.

use learn_infra_config::{DeployEnv, InfraStatus, Settings};

use crate::error::Result;
use crate::pipeline::stage_name;
use crate::stack::{deploy_waves, AwsEnvironment, Stack};
use crate::stacks::{BackendFunctionStack, NetworkStack, StatelessStack};

pub struct AppStage {
    env: DeployEnv,
    status: InfraStatus,
    network: NetworkStack,
    stateless: StatelessStack,
    backend: BackendFunctionStack,
}

impl AppStage {
    pub fn new(env: DeployEnv, status: InfraStatus, settings: &Settings) -> Result<Self> {
        let stage = stage_name(env);
        let aws_env = AwsEnvironment::from_settings(settings);

        let network =
            NetworkStack::build(&format!("{}-NetworkStack", stage), env, aws_env.clone())?;
        let mut stateless = StatelessStack::build(
            &format!("{}-StatelessStack", stage),
            env,
            aws_env.clone(),
            &network.vpc,
            status,
        )?;
        stateless.stack.add_dependency(&network.stack);

        let backend = BackendFunctionStack::build(
            &format!("{}-BackendFunctionStack", stage),
            env,
            aws_env,
            &settings.assets,
        )?;

        tracing::debug!(stage = %stage, infra_status = %status, "Built stage");

        Ok(Self {
            env,
            status,
            network,
            stateless,
            backend,
        })
    }

    pub fn env(&self) -> DeployEnv {
        self.env
    }

    pub fn status(&self) -> InfraStatus {
        self.status
    }

    pub fn name(&self) -> String {
        stage_name(self.env)
    }

    pub fn stateless(&self) -> &StatelessStack {
        &self.stateless
    }

    pub fn stacks(&self) -> Vec<&Stack> {
        vec![&self.network.stack, &self.stateless.stack, &self.backend.stack]
    }

    /// Stacks grouped by deployment wave
    pub fn waves(&self) -> Result<Vec<Vec<&Stack>>> {
        deploy_waves(&self.stacks())
    }
}
