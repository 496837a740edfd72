//! Interfaces of the external collaborators driven by the pipeline.

use std::ops::Range;
use std::sync::Arc;

pub use crate::document::TextSupplier;
use crate::document::EditEvent;
use crate::error::{ModelError, RenderError};

/// An incrementally updatable syntax model.
///
/// Models are immutable values: an update produces the next model, which the
/// session installs atomically. Readers holding the previous `Arc` keep a
/// consistent view.
pub trait SyntaxModel: Send + Sync + Sized + 'static {
    /// Styling information handed to the presentation renderer.
    type Styling;
    /// Structural outline handed to the outline renderer.
    type Outline;

    /// Apply `events` (in order) and return the updated model.
    ///
    /// `text` yields the full document text after all `events`, for models
    /// that need to reparse from scratch. Returning `Err` leaves the current
    /// model installed and the events pending.
    fn update_model(
        &self,
        events: &[Arc<EditEvent>],
        text: &dyn TextSupplier,
    ) -> Result<Self, ModelError>;

    /// Length in bytes of the text this model was built from.
    fn document_len(&self) -> usize;

    fn styling(&self) -> Self::Styling;

    fn outline(&self) -> Self::Outline;
}

/// Receives styling for a byte range of the document.
///
/// Called on the worker thread; implementations marshal to their own thread
/// if they need to.
pub trait PresentationRenderer<S>: Send + Sync {
    fn publish_styling(&self, range: Range<usize>, styling: S) -> Result<(), RenderError>;
}

/// Receives the outline tree and the cursor to select in it.
///
/// Called on the worker thread.
pub trait OutlineRenderer<O>: Send + Sync {
    fn publish_outline(&self, outline: O, cursor: Option<usize>) -> Result<(), RenderError>;
}

impl<S, F> PresentationRenderer<S> for F
where
    F: Fn(Range<usize>, S) -> Result<(), RenderError> + Send + Sync,
{
    fn publish_styling(&self, range: Range<usize>, styling: S) -> Result<(), RenderError> {
        self(range, styling)
    }
}

impl<O, F> OutlineRenderer<O> for F
where
    F: Fn(O, Option<usize>) -> Result<(), RenderError> + Send + Sync,
{
    fn publish_outline(&self, outline: O, cursor: Option<usize>) -> Result<(), RenderError> {
        self(outline, cursor)
    }
}

/// Renderer that accepts and drops everything, for headless sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardRenderer;

impl<S> PresentationRenderer<S> for DiscardRenderer {
    fn publish_styling(&self, _range: Range<usize>, _styling: S) -> Result<(), RenderError> {
        Ok(())
    }
}

impl<O> OutlineRenderer<O> for DiscardRenderer {
    fn publish_outline(&self, _outline: O, _cursor: Option<usize>) -> Result<(), RenderError> {
        Ok(())
    }
}
