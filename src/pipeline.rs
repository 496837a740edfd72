//! The model → presentation/outline update pipeline.
//!
//! Presentation and outline only run after a successful model update (or an
//! explicit resync request); a failed update leaves the previous views in
//! place rather than rendering against a model known to be stale.

pub mod collaborators;
pub mod session;
pub mod state;
pub mod store;

pub use collaborators::{
    DiscardRenderer, OutlineRenderer, PresentationRenderer, SyntaxModel, TextSupplier,
};
pub use session::{PipelineTask, UpdateSession};
pub use state::{PipelineState, PipelineStats};
pub use store::SessionStore;
