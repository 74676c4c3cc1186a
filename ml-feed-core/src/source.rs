//! Consumer-facing batch source trait and the views it hands out

use crate::error::Result;
use crate::tensor::{Shape, TensorElement, TensorView};

/// Shapes a source currently declares for its two outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputShapes {
    /// `[batch_size, C, H, W]`
    pub data: Shape,

    /// `[batch_size, 1, 1, 1]`
    pub labels: Shape,
}

/// Index descriptor for one consumption step
///
/// Carries no borrow; resolve it with
/// [`MemoryFeeder::view`](crate::MemoryFeeder::view), which rejects it once
/// the buffer it points into has been replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch {
    /// First sample served
    pub offset: usize,

    /// Samples served
    pub len: usize,

    /// Buffer version the batch was issued at
    pub version: u64,
}

/// Zero-copy data and label views for one consumption step
#[derive(Debug, Clone, Copy)]
pub struct BatchView<'a, T: TensorElement> {
    /// Sample values
    pub data: TensorView<'a, T>,

    /// Labels
    pub labels: TensorView<'a, T>,

    /// Where in the buffer this batch came from
    pub batch: Batch,
}

/// A source the pipeline pulls one fixed-size batch from per cycle
pub trait BatchSource {
    /// Element type of the served tensors
    type Elem: TensorElement;

    /// Shapes of the outputs as last declared to the pipeline
    fn output_shapes(&self) -> OutputShapes;

    /// Serve the next batch
    fn next_batch(&mut self) -> Result<BatchView<'_, Self::Elem>>;
}
