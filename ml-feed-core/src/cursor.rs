//! Cyclic window cursor over an installed batch

use std::ops::Range;

use crate::error::{Error, Result};

/// Sub-batch position within the installed samples
///
/// `position` is always a multiple of the batch size and stays in
/// `[0, total)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCursor {
    position: usize,
    total: usize,
}

impl WindowCursor {
    /// Start a cursor at position 0 over `total` samples
    pub fn new(total: usize, batch_size: usize) -> Result<Self> {
        if total == 0 {
            return Err(Error::NoSamples);
        }
        if batch_size == 0 || total % batch_size != 0 {
            return Err(Error::NotBatchMultiple {
                count: total,
                batch_size,
            });
        }

        Ok(Self { position: 0, total })
    }

    /// Current sample offset
    pub fn position(&self) -> usize {
        self.position
    }

    /// Samples in the window
    pub fn total(&self) -> usize {
        self.total
    }

    /// Whether the cursor can keep stepping with `batch_size`
    pub fn is_aligned(&self, batch_size: usize) -> bool {
        batch_size != 0 && self.total % batch_size == 0 && self.position % batch_size == 0
    }

    /// Take the next `batch_size` samples and move past them
    ///
    /// Returns the sample range served and whether the cursor wrapped to 0.
    pub fn advance(&mut self, batch_size: usize) -> (Range<usize>, bool) {
        let start = self.position;
        self.position = (self.position + batch_size) % self.total;
        (start..start + batch_size, self.position == 0)
    }
}
