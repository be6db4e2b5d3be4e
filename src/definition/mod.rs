//! Definition model: type grammar, raw documents, block decoder, resources
//! and the dependency graph validator.

pub mod decoder;
pub mod module;
pub mod param;
pub mod pipeline;
pub mod raw;
pub mod step;
pub mod trigger;
pub mod types;
pub mod validator;

pub use decoder::{decode_pipeline, decode_trigger, DecodeContext};
pub use module::Module;
pub use param::Param;
pub use pipeline::{Pipeline, PipelineOutput};
pub use step::{ErrorConfig, Step, StepKind, ThrowConfig};
pub use trigger::{ExecutionMode, MethodInfo, Trigger, TriggerConfig};
pub use types::{AttrValue, Type};
