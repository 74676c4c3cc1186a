//! In-memory feeder: producer API and consumption step
//!
//! A [`MemoryFeeder`] owns a [`BufferStore`] and serves it to a pipeline one
//! batch at a time. The producer injects a multiple of the batch size with
//! [`add_datums`](MemoryFeeder::add_datums) or
//! [`add_images`](MemoryFeeder::add_images); the consumer calls
//! [`forward`](MemoryFeeder::forward) (or
//! [`next_batch`](MemoryFeeder::next_batch)) once per cycle, and the cursor
//! wraps modulo the injected count.
//!
//! The feeder assumes a single producer and a single consumer whose calls are
//! interleaved by the caller; the pending-data flag only signals when the
//! producer may inject again. Use [`SharedFeeder`](crate::SharedFeeder) when
//! the two live on different threads.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::buffer::{require_window, BufferStore};
use crate::config::BatchDescriptor;
use crate::error::{Error, Result};
use crate::memory::MemoryBudget;
use crate::sample::{Datum, ImageBuffer};
use crate::source::{Batch, BatchSource, BatchView, OutputShapes};
use crate::tensor::TensorElement;
use crate::transform::{DefaultTransform, SampleTransform};

/// Where the feeder is in its inject/drain cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeederState {
    /// Nothing pending; injection and batch-size changes are allowed
    Empty,
    /// A batch was injected and no step has consumed from it yet
    Loaded,
    /// Part of the injected batch has been consumed
    Draining,
}

/// Feeds caller-supplied samples to a pipeline in fixed-size batches
#[derive(Debug)]
pub struct MemoryFeeder<T: TensorElement = f32, X = DefaultTransform> {
    descriptor: BatchDescriptor,
    store: BufferStore<T>,
    transform: X,
    outputs: OutputShapes,
    has_new_data: bool,
    needs_reshape: bool,
}

impl<T: TensorElement> MemoryFeeder<T, DefaultTransform> {
    /// Set up a feeder with the layout-only [`DefaultTransform`]
    pub fn new(descriptor: BatchDescriptor) -> Result<Self> {
        Self::with_transform(descriptor, DefaultTransform)
    }
}

impl<T: TensorElement, X> MemoryFeeder<T, X> {
    /// Set up a feeder that converts samples with `transform`
    pub fn with_transform(descriptor: BatchDescriptor, transform: X) -> Result<Self> {
        Self::setup(descriptor, transform, None)
    }

    /// Set up a feeder whose buffer growth is charged to `budget`
    pub fn with_budget(
        descriptor: BatchDescriptor,
        transform: X,
        budget: Arc<MemoryBudget>,
    ) -> Result<Self> {
        Self::setup(descriptor, transform, Some(budget))
    }

    fn setup(
        descriptor: BatchDescriptor,
        transform: X,
        budget: Option<Arc<MemoryBudget>>,
    ) -> Result<Self> {
        descriptor.validate()?;
        let store = BufferStore::new(&descriptor, budget)?;

        debug!(
            batch_size = descriptor.batch_size,
            channels = descriptor.channels,
            height = descriptor.height,
            width = descriptor.width,
            "Memory feeder set up"
        );

        Ok(Self {
            outputs: Self::declared_shapes(&descriptor),
            descriptor,
            store,
            transform,
            has_new_data: false,
            needs_reshape: false,
        })
    }

    fn declared_shapes(descriptor: &BatchDescriptor) -> OutputShapes {
        OutputShapes {
            data: descriptor.data_shape(descriptor.batch_size),
            labels: BatchDescriptor::label_shape(descriptor.batch_size),
        }
    }

    /// Inject labeled records; their count must be a multiple of the batch size
    pub fn add_datums(&mut self, datums: &[Datum]) -> Result<()>
    where
        X: SampleTransform<Datum>,
    {
        self.check_injection(datums.len(), "add_datums")?;
        self.inject(datums, datums.iter().map(|d| d.label))
    }

    /// Inject decoded images with a parallel label sequence
    pub fn add_images(&mut self, images: &[ImageBuffer], labels: &[i32]) -> Result<()>
    where
        X: SampleTransform<ImageBuffer>,
    {
        self.check_injection(images.len(), "add_images")?;
        if labels.len() != images.len() {
            return Err(Error::LabelCountMismatch {
                samples: images.len(),
                labels: labels.len(),
            });
        }
        self.inject(images, labels.iter().copied())
    }

    fn check_injection(&self, num: usize, operation: &'static str) -> Result<()> {
        if self.has_new_data {
            return Err(Error::PendingData { operation });
        }
        if num == 0 {
            return Err(Error::NoSamples);
        }
        if num % self.descriptor.batch_size != 0 {
            return Err(Error::NotBatchMultiple {
                count: num,
                batch_size: self.descriptor.batch_size,
            });
        }
        Ok(())
    }

    fn inject<S>(&mut self, samples: &[S], labels: impl Iterator<Item = i32>) -> Result<()>
    where
        X: SampleTransform<S>,
    {
        let num = samples.len();
        let staged = self.store.staging_mut(&self.descriptor, num)?;
        if let Err(err) = self.transform.transform(samples, &self.descriptor, staged) {
            warn!(count = num, error = %err, "Transform failed, keeping previous batch");
            return Err(err);
        }

        self.store
            .commit_staged(&self.descriptor, num, labels.map(T::from_label))?;
        self.has_new_data = true;

        debug!(
            count = num,
            capacity = self.store.capacity(),
            version = self.store.version(),
            "Injected samples"
        );
        Ok(())
    }

    /// Install caller-supplied buffers holding `labels.len()` samples
    ///
    /// The values are copied into the feeder's own allocation, which keeps
    /// its grown capacity. The feeder cycles over them like an injected batch
    /// but does not set the pending flag.
    pub fn reset(&mut self, data: &[T], labels: &[T]) -> Result<()> {
        if self.has_new_data {
            return Err(Error::PendingData { operation: "reset" });
        }
        if data.is_empty() {
            return Err(Error::EmptyBuffer("data"));
        }
        if labels.is_empty() {
            return Err(Error::EmptyBuffer("labels"));
        }

        let num = labels.len();
        if num % self.descriptor.batch_size != 0 {
            return Err(Error::NotBatchMultiple {
                count: num,
                batch_size: self.descriptor.batch_size,
            });
        }
        self.store.load(&self.descriptor, data, labels)?;

        debug!(count = num, version = self.store.version(), "Installed external buffers");
        Ok(())
    }

    /// Change the batch size; outputs are re-declared on the next step
    pub fn change_batch_size(&mut self, new_size: usize) -> Result<()> {
        if self.has_new_data {
            return Err(Error::PendingData {
                operation: "change_batch_size",
            });
        }

        let descriptor = BatchDescriptor {
            batch_size: new_size,
            ..self.descriptor
        };
        descriptor.validate()?;
        self.store.reshape_to_batch(&descriptor)?;

        self.descriptor = descriptor;
        self.needs_reshape = true;

        if self
            .store
            .window()
            .is_some_and(|window| !window.is_aligned(new_size))
        {
            self.store.invalidate();
        }

        debug!(batch_size = new_size, "Changed batch size");
        Ok(())
    }

    /// Advance one consumption step and describe the batch it served
    pub fn forward(&mut self) -> Result<Batch> {
        let batch_size = self.descriptor.batch_size;
        let version = self.store.version();
        let Some(window) = self.store.window_mut() else {
            return Err(Error::NotInitialized);
        };

        if self.needs_reshape {
            self.outputs = Self::declared_shapes(&self.descriptor);
            self.needs_reshape = false;
        }

        let (range, wrapped) = window.advance(batch_size);
        if wrapped {
            self.has_new_data = false;
        }

        trace!(
            offset = range.start,
            batch_size,
            wrapped,
            "Served batch"
        );

        Ok(Batch {
            offset: range.start,
            len: batch_size,
            version,
        })
    }

    /// Resolve a batch from [`forward`](Self::forward) into zero-copy views
    pub fn view(&self, batch: &Batch) -> Result<BatchView<'_, T>> {
        let current = self.store.version();
        if batch.version != current {
            return Err(Error::StaleView {
                issued: batch.version,
                current,
            });
        }

        let (data, labels) = self
            .store
            .views(batch.offset..batch.offset + batch.len, &self.descriptor)?;
        Ok(BatchView {
            data,
            labels,
            batch: *batch,
        })
    }

    /// Advance one step and borrow the served batch
    pub fn next_batch(&mut self) -> Result<BatchView<'_, T>> {
        let batch = self.forward()?;
        self.view(&batch)
    }

    /// Current state of the inject/drain cycle
    pub fn state(&self) -> FeederState {
        if !self.has_new_data {
            return FeederState::Empty;
        }
        match self.store.window() {
            Some(window) if window.position() > 0 => FeederState::Draining,
            _ => FeederState::Loaded,
        }
    }

    /// Whether injected data is still waiting to be consumed
    pub fn has_pending_data(&self) -> bool {
        self.has_new_data
    }

    /// Whether the next step re-declares output shapes
    pub fn needs_reshape(&self) -> bool {
        self.needs_reshape
    }

    /// Current batch descriptor
    pub fn descriptor(&self) -> &BatchDescriptor {
        &self.descriptor
    }

    /// Current batch size
    pub fn batch_size(&self) -> usize {
        self.descriptor.batch_size
    }

    /// Output shapes as last declared to the pipeline
    pub fn output_shapes(&self) -> OutputShapes {
        self.outputs
    }

    /// Cursor position in samples
    pub fn position(&self) -> Result<usize> {
        require_window(&self.store).map(|window| window.position())
    }

    /// Samples in the installed window
    pub fn total_count(&self) -> Result<usize> {
        require_window(&self.store).map(|window| window.total())
    }

    /// Samples the store can hold without growing
    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    /// Current buffer version
    pub fn version(&self) -> u64 {
        self.store.version()
    }

    /// The transform collaborator
    pub fn transform(&self) -> &X {
        &self.transform
    }
}

impl<T: TensorElement, X> BatchSource for MemoryFeeder<T, X> {
    type Elem = T;

    fn output_shapes(&self) -> OutputShapes {
        self.outputs
    }

    fn next_batch(&mut self) -> Result<BatchView<'_, T>> {
        MemoryFeeder::next_batch(self)
    }
}
