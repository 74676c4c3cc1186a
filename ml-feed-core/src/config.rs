//! Batch descriptor and configuration loading

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tensor::Shape;

/// Fixed batch geometry declared before setup
///
/// `batch_size` may later change through
/// [`MemoryFeeder::change_batch_size`](crate::MemoryFeeder::change_batch_size);
/// the per-sample shape never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchDescriptor {
    /// Samples per consumption step
    pub batch_size: usize,

    /// Channels per sample
    pub channels: usize,

    /// Height of each sample
    pub height: usize,

    /// Width of each sample
    pub width: usize,
}

impl BatchDescriptor {
    /// Create a descriptor without validating it
    pub fn new(batch_size: usize, channels: usize, height: usize, width: usize) -> Self {
        Self {
            batch_size,
            channels,
            height,
            width,
        }
    }

    /// Parse a descriptor from JSON and validate it
    pub fn from_json_str(json: &str) -> Result<Self> {
        let descriptor: Self = serde_json::from_str(json)?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Load a descriptor from a JSON file and validate it
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Check that `batch_size * channels * height * width` is positive and fits in `usize`
    pub fn validate(&self) -> Result<()> {
        let product = self
            .batch_size
            .checked_mul(self.channels)
            .and_then(|v| v.checked_mul(self.height))
            .and_then(|v| v.checked_mul(self.width))
            .ok_or_else(|| {
                Error::InvalidConfig(format!("shape product overflows for {self:?}"))
            })?;

        if product == 0 {
            return Err(Error::InvalidConfig(
                "batch_size, channels, height, and width must be specified and positive".into(),
            ));
        }

        Ok(())
    }

    /// Number of values in one sample (`channels * height * width`)
    pub fn sample_size(&self) -> usize {
        self.channels * self.height * self.width
    }

    /// Shape of a data tensor holding `num` samples
    pub fn data_shape(&self, num: usize) -> Shape {
        Shape::new(num, self.channels, self.height, self.width)
    }

    /// Shape of a label tensor holding `num` labels
    pub fn label_shape(num: usize) -> Shape {
        Shape::new(num, 1, 1, 1)
    }
}
