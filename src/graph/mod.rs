//! Traffic graph model and the appender pipeline that enriches it.

pub mod appender;
pub mod appenders;
pub mod model;

pub use appender::{
    Appender, AppenderContext, AppenderError, AppenderPipeline, PipelineError, PipelineReport,
    PipelineState, QueryWindow, TelemetryFailurePolicy,
};
pub use appenders::{AppenderRegistry, RegistryError};
pub use model::{AnnotationValue, Annotations, Edge, EdgeKey, Node, NodeKey, TrafficGraph};
