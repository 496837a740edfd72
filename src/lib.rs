pub mod config;
pub mod document;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod scheduler;

pub use config::SchedulerConfig;
pub use document::{EditCoalescer, EditEvent, EditSnapshot, TextSupplier};
pub use error::{ModelError, RenderError, SchedulerError, SchedulerResult, TaskError};
pub use pipeline::{
    OutlineRenderer, PipelineState, PipelineStats, PipelineTask, PresentationRenderer,
    SessionStore, SyntaxModel, UpdateSession,
};
pub use scheduler::{Interrupt, Interrupted, TaskQueue, TaskScheduler, TaskState, TimedTask};
