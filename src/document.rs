pub mod coalescer;
pub mod edits;

pub use coalescer::{EditCoalescer, EditSnapshot};
pub use edits::{EditEvent, apply_edit, validate_edit};

/// Supplies the full current document text on demand.
///
/// Handed to the syntax model so it can fall back to a full reparse when the
/// incremental path cannot be used.
pub trait TextSupplier {
    fn full_text(&self) -> &str;
}

impl TextSupplier for str {
    fn full_text(&self) -> &str {
        self
    }
}

impl TextSupplier for String {
    fn full_text(&self) -> &str {
        self
    }
}
