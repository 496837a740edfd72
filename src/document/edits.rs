use crate::error::{SchedulerError, SchedulerResult};

/// One text change: replace `removed_len` bytes at `offset` with `inserted`.
///
/// `seq` is assigned by the coalescer on arrival and identifies the event
/// when a consumed prefix is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditEvent {
    seq: u64,
    offset: usize,
    removed_len: usize,
    inserted: String,
}

impl EditEvent {
    pub(crate) fn new(seq: u64, offset: usize, removed_len: usize, inserted: String) -> Self {
        Self {
            seq,
            offset,
            removed_len,
            inserted,
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn removed_len(&self) -> usize {
        self.removed_len
    }

    pub fn inserted(&self) -> &str {
        &self.inserted
    }

    /// End of the replaced range in the text before the edit.
    pub fn old_end(&self) -> usize {
        self.offset + self.removed_len
    }

    /// End of the inserted range in the text after the edit.
    pub fn new_end(&self) -> usize {
        self.offset + self.inserted.len()
    }

    /// Change in document length caused by this edit.
    pub fn delta(&self) -> isize {
        self.inserted.len() as isize - self.removed_len as isize
    }

    /// Apply this edit to `text`.
    pub fn apply_to(&self, text: &mut String) -> SchedulerResult<()> {
        apply_edit(text, self.offset, self.removed_len, &self.inserted)
    }
}

/// Check that `offset..offset + removed_len` is a valid byte range of `text`.
pub fn validate_edit(text: &str, offset: usize, removed_len: usize) -> SchedulerResult<()> {
    let Some(end) = offset.checked_add(removed_len) else {
        return Err(SchedulerError::invalid_edit(
            offset,
            removed_len,
            text.len(),
            "range overflows",
        ));
    };
    if end > text.len() {
        return Err(SchedulerError::invalid_edit(
            offset,
            removed_len,
            text.len(),
            "range exceeds text",
        ));
    }
    if !text.is_char_boundary(offset) || !text.is_char_boundary(end) {
        return Err(SchedulerError::invalid_edit(
            offset,
            removed_len,
            text.len(),
            "range splits a character",
        ));
    }
    Ok(())
}

/// Replace `removed_len` bytes at `offset` with `inserted`, validating first.
pub fn apply_edit(
    text: &mut String,
    offset: usize,
    removed_len: usize,
    inserted: &str,
) -> SchedulerResult<()> {
    validate_edit(text, offset, removed_len)?;
    text.replace_range(offset..offset + removed_len, inserted);
    Ok(())
}
