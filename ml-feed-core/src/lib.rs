//! In-memory batch feeder for ML data pipelines
//!
//! This crate lets an application inject labeled samples it produced on the
//! fly into a pipeline that consumes fixed-size batches. Samples are written
//! into an owned, versioned buffer store; a window cursor serves them back
//! one batch per consumption step as zero-copy views and wraps when the
//! injected batch is exhausted.

#![warn(missing_docs)]

pub mod buffer;
pub mod config;
pub mod cursor;
pub mod error;
pub mod feeder;
pub mod memory;
pub mod sample;
pub mod shared;
pub mod source;
pub mod tensor;
pub mod transform;

// Re-export key types for convenience
pub use buffer::BufferStore;
pub use config::BatchDescriptor;
pub use cursor::WindowCursor;
pub use error::{Error, ErrorKind, Result};
pub use feeder::{FeederState, MemoryFeeder};
pub use sample::{Datum, ImageBuffer};
pub use shared::SharedFeeder;
pub use source::{Batch, BatchSource, BatchView, OutputShapes};
pub use tensor::{DenseTensor, Shape, TensorElement, TensorType, TensorView};
pub use transform::{DefaultTransform, SampleTransform};

/// Memory budget and accounting functionality
pub mod budget {
    pub use crate::memory::MemoryBudget;
    pub use crate::memory::MemoryStats;
}
