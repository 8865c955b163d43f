// shelf-flow/src/lib.rs

//! shelf-flow: asynchronous step pipelines for the shelf order workflows.
//!
//! A pipeline is an ordered list of named steps. Every step owns `before`, `on` and `after`
//! handlers that run against one shared [`ContextData`]. A handler can halt the run with
//! [`PipelineControl::Stop`] or fail it with an error. Steps may be optional (allowed to have
//! no handlers) or carry a skip condition evaluated against the context right before the step.
//!
//! A [`Registry`] stores one pipeline per context type and dispatches on that type, so callers
//! only build a context and call `run`.

pub mod core;
pub mod error;
pub mod pipeline;
pub mod registry;

pub use crate::core::context_data::ContextData;
pub use crate::core::control::{PipelineControl, PipelineResult};
pub use crate::core::handler::Handler;
pub use crate::core::step::{SkipCondition, StepDef};
pub use crate::error::{FlowError, FlowResult};
pub use crate::pipeline::Pipeline;
pub use crate::registry::Registry;
