// learn-infra-core - Typed CloudFormation synthesis for the learn service
//
// Stacks are built as plain values (templates of resources keyed by logical
// id), validated for dangling references, and written as a cloud assembly the
// delivery pipeline deploys stage by stage.

pub mod assembly;
pub mod blue_green;
pub mod cidr;
pub mod error;
pub mod iam;
pub mod pipeline;
pub mod stack;
pub mod stacks;
pub mod stage;
pub mod template;

pub use assembly::{build_app, CloudAssembly, InfraStatuses, Manifest, ManifestEntry};
pub use blue_green::{
    BlueGreenDeployment, BlueGreenPolicy, DeploymentOutcome, DeploymentState, TargetColor,
};
pub use error::{DeploymentError, GateError, Result, SynthError};
pub use pipeline::{
    PipelineDefinition, PipelineExecution, StageStatus, TriggerSource, VariableCheck,
};
pub use stack::{AwsEnvironment, Stack};
pub use stage::AppStage;
pub use template::{Resource, Template};
