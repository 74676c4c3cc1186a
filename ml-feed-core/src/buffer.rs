//! Owned, versioned buffer store holding the injected batch

use std::ops::Range;
use std::sync::Arc;

use tracing::debug;

use crate::config::BatchDescriptor;
use crate::cursor::WindowCursor;
use crate::error::{Error, Result};
use crate::memory::MemoryBudget;
use crate::tensor::{DenseTensor, Shape, TensorElement, TensorView};

const DATA_BUFFER: &str = "feeder.data";
const LABEL_BUFFER: &str = "feeder.labels";
const STAGING_BUFFER: &str = "feeder.staging";

/// Data and label tensors plus the window currently served from them
///
/// Every operation that replaces or invalidates the contents bumps
/// `version`, so batch descriptors issued earlier can be detected as stale.
/// New samples are converted into a separate staging tensor and only copied
/// into the served tensors once the whole batch converted cleanly.
#[derive(Debug)]
pub struct BufferStore<T: TensorElement> {
    /// `[N, C, H, W]` sample values
    data: DenseTensor<T>,

    /// `[N, 1, 1, 1]` labels
    labels: DenseTensor<T>,

    /// Conversion target for the next batch
    staging: DenseTensor<T>,

    /// Active window, `None` until a batch is installed
    window: Option<WindowCursor>,

    /// Bumped on every replacement or invalidation
    version: u64,

    /// Budget charged for allocation growth
    budget: Option<Arc<MemoryBudget>>,

    /// Bytes currently charged to `budget`
    charged: usize,
}

impl<T: TensorElement> BufferStore<T> {
    /// Allocate a store sized to one batch of `descriptor`
    pub fn new(descriptor: &BatchDescriptor, budget: Option<Arc<MemoryBudget>>) -> Result<Self> {
        let mut store = Self {
            data: DenseTensor::new(descriptor.data_shape(0)),
            labels: DenseTensor::new(BatchDescriptor::label_shape(0)),
            staging: DenseTensor::new(descriptor.data_shape(0)),
            window: None,
            version: 0,
            budget,
            charged: 0,
        };
        store.reshape(
            descriptor.data_shape(descriptor.batch_size),
            BatchDescriptor::label_shape(descriptor.batch_size),
        )?;
        Ok(store)
    }

    /// Make room for `num` samples; capacity never shrinks
    pub fn ensure_capacity(&mut self, descriptor: &BatchDescriptor, num: usize) -> Result<()> {
        if num > self.data.shape().num() {
            self.reshape(descriptor.data_shape(num), BatchDescriptor::label_shape(num))?;
        }
        Ok(())
    }

    /// Reshape both tensors to a single batch of `descriptor`
    pub fn reshape_to_batch(&mut self, descriptor: &BatchDescriptor) -> Result<()> {
        self.reshape(
            descriptor.data_shape(descriptor.batch_size),
            BatchDescriptor::label_shape(descriptor.batch_size),
        )
    }

    fn reshape(&mut self, data_shape: Shape, label_shape: Shape) -> Result<()> {
        let growth = self.data.growth_bytes(data_shape) + self.labels.growth_bytes(label_shape);
        self.charge(growth)?;

        let grew = self.data.reshape(data_shape) | self.labels.reshape(label_shape);
        if grew {
            debug!(
                data_shape = %data_shape,
                capacity = self.capacity(),
                "Grew feeder buffers"
            );
        }
        self.register_usage();
        Ok(())
    }

    /// Staging slice for converting the next `num` samples
    ///
    /// Served data is untouched until [`commit_staged`](Self::commit_staged),
    /// so a failed conversion leaves the current window intact.
    pub fn staging_mut(&mut self, descriptor: &BatchDescriptor, num: usize) -> Result<&mut [T]> {
        let shape = descriptor.data_shape(num);
        let growth = self.staging.growth_bytes(shape);
        self.charge(growth)?;
        if self.staging.reshape(shape) {
            debug!(data_shape = %shape, "Grew staging buffer");
        }
        self.register_usage();
        Ok(self.staging.as_mut_slice())
    }

    /// Copy `num` staged samples and their labels into the served tensors
    pub fn commit_staged<I>(
        &mut self,
        descriptor: &BatchDescriptor,
        num: usize,
        labels: I,
    ) -> Result<()>
    where
        I: IntoIterator<Item = T>,
    {
        let len = num * descriptor.sample_size();
        if self.staging.len() < len {
            return Err(Error::BufferLengthMismatch {
                expected: len,
                actual: self.staging.len(),
            });
        }
        let cursor = WindowCursor::new(num, descriptor.batch_size)?;
        self.ensure_capacity(descriptor, num)?;

        self.data.as_mut_slice()[..len].copy_from_slice(&self.staging.as_slice()[..len]);
        for (slot, label) in self.labels.as_mut_slice()[..num].iter_mut().zip(labels) {
            *slot = label;
        }
        self.install(cursor);
        Ok(())
    }

    /// Copy caller-owned buffers holding `labels.len()` samples into the store
    ///
    /// The allocation is reused and only grows, like an injection.
    pub fn load(&mut self, descriptor: &BatchDescriptor, data: &[T], labels: &[T]) -> Result<()> {
        let num = labels.len();
        let expected = num * descriptor.sample_size();
        if data.len() != expected {
            return Err(Error::BufferLengthMismatch {
                expected,
                actual: data.len(),
            });
        }
        let cursor = WindowCursor::new(num, descriptor.batch_size)?;
        self.ensure_capacity(descriptor, num)?;

        self.data.as_mut_slice()[..expected].copy_from_slice(data);
        self.labels.as_mut_slice()[..num].copy_from_slice(labels);
        self.install(cursor);
        Ok(())
    }

    /// Point the window at the first `num` samples, position 0
    pub fn reset_window(&mut self, num: usize, batch_size: usize) -> Result<()> {
        let cursor = WindowCursor::new(num, batch_size)?;
        self.install(cursor);
        Ok(())
    }

    fn install(&mut self, cursor: WindowCursor) {
        self.window = Some(cursor);
        self.version += 1;
    }

    /// Drop the window so nothing is served until the next install
    pub fn invalidate(&mut self) {
        self.window = None;
        self.version += 1;
    }

    /// Active window
    pub fn window(&self) -> Option<&WindowCursor> {
        self.window.as_ref()
    }

    /// Mutable active window
    pub fn window_mut(&mut self) -> Option<&mut WindowCursor> {
        self.window.as_mut()
    }

    /// Current buffer version
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Samples the allocation can hold without growing
    pub fn capacity(&self) -> usize {
        let sample_size = self.data.shape().sample_size().max(1);
        (self.data.capacity() / sample_size).min(self.labels.capacity())
    }

    /// Logical shape of the data tensor
    pub fn data_shape(&self) -> Shape {
        self.data.shape()
    }

    /// Logical shape of the label tensor
    pub fn label_shape(&self) -> Shape {
        self.labels.shape()
    }

    /// Borrow the samples in `range` as data and label views
    pub fn views(
        &self,
        range: Range<usize>,
        descriptor: &BatchDescriptor,
    ) -> Result<(TensorView<'_, T>, TensorView<'_, T>)> {
        let num = range.len();
        let data = self
            .data
            .view(range.start * descriptor.sample_size(), descriptor.data_shape(num))?;
        let labels = self
            .labels
            .view(range.start, BatchDescriptor::label_shape(num))?;
        Ok((data, labels))
    }

    fn charge(&mut self, bytes: usize) -> Result<()> {
        if bytes == 0 {
            return Ok(());
        }
        if let Some(budget) = &self.budget {
            budget.allocate(bytes)?;
        }
        self.charged += bytes;
        Ok(())
    }

    fn refund(&mut self, bytes: usize) {
        let bytes = bytes.min(self.charged);
        if let Some(budget) = &self.budget {
            budget.release(bytes);
        }
        self.charged -= bytes;
    }

    fn register_usage(&self) {
        if let Some(budget) = &self.budget {
            let elem = std::mem::size_of::<T>();
            for (name, tensor) in [
                (DATA_BUFFER, &self.data),
                (LABEL_BUFFER, &self.labels),
                (STAGING_BUFFER, &self.staging),
            ] {
                budget.register_buffer_usage(name, tensor.len() * elem, tensor.size_bytes());
            }
        }
    }
}

impl<T: TensorElement> Drop for BufferStore<T> {
    fn drop(&mut self) {
        self.refund(self.charged);
    }
}

/// Shorthand used by the feeder when no batch was ever installed
pub(crate) fn require_window<T: TensorElement>(store: &BufferStore<T>) -> Result<&WindowCursor> {
    store.window().ok_or(Error::NotInitialized)
}
