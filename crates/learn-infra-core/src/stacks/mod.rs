//! Stack constructs

pub mod backend;
pub mod network;
pub mod pipeline;
pub mod stateless;
pub mod trigger;

pub use backend::BackendFunctionStack;
pub use network::{NetworkStack, VpcHandle};
pub use pipeline::PipelineStack;
pub use stateless::StatelessStack;
pub use trigger::TriggerFunction;
