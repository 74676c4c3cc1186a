//! Thread-safe single-slot handoff around a [`MemoryFeeder`]

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use static_assertions::assert_impl_all;
use tracing::debug;

use crate::error::{Error, Result};
use crate::feeder::{FeederState, MemoryFeeder};
use crate::sample::{Datum, ImageBuffer};
use crate::source::BatchView;
use crate::tensor::TensorElement;
use crate::transform::{DefaultTransform, SampleTransform};

/// A [`MemoryFeeder`] a producer thread and a consumer thread can share
///
/// The feeder's pending batch is the single slot: producers either fail fast
/// (`try_*`) or wait until the consumer has drained it (`*_timeout`).
/// Consumers run their closure under the lock so the zero-copy view never
/// escapes it.
pub struct SharedFeeder<T: TensorElement = f32, X = DefaultTransform> {
    inner: Mutex<MemoryFeeder<T, X>>,
    drained: Condvar,
}

assert_impl_all!(SharedFeeder<f32>: Send, Sync);

impl<T: TensorElement, X> SharedFeeder<T, X> {
    /// Wrap a feeder for shared use
    pub fn new(feeder: MemoryFeeder<T, X>) -> Self {
        Self {
            inner: Mutex::new(feeder),
            drained: Condvar::new(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryFeeder<T, X>>> {
        self.inner.lock().map_err(|_| Error::LockPoisoned)
    }

    fn wait_for_slot(
        &self,
        timeout: Duration,
        operation: &'static str,
    ) -> Result<MutexGuard<'_, MemoryFeeder<T, X>>> {
        let guard = self.lock()?;
        let (guard, result) = self
            .drained
            .wait_timeout_while(guard, timeout, |feeder| feeder.has_pending_data())
            .map_err(|_| Error::LockPoisoned)?;

        if result.timed_out() && guard.has_pending_data() {
            debug!(operation, ?timeout, "Timed out waiting for pending batch to drain");
            return Err(Error::PendingData { operation });
        }
        Ok(guard)
    }

    /// Inject records, failing immediately if a batch is pending
    pub fn try_add_datums(&self, datums: &[Datum]) -> Result<()>
    where
        X: SampleTransform<Datum>,
    {
        self.lock()?.add_datums(datums)
    }

    /// Inject records once the pending batch drains, waiting at most `timeout`
    pub fn add_datums_timeout(&self, datums: &[Datum], timeout: Duration) -> Result<()>
    where
        X: SampleTransform<Datum>,
    {
        self.wait_for_slot(timeout, "add_datums")?.add_datums(datums)
    }

    /// Inject images, failing immediately if a batch is pending
    pub fn try_add_images(&self, images: &[ImageBuffer], labels: &[i32]) -> Result<()>
    where
        X: SampleTransform<ImageBuffer>,
    {
        self.lock()?.add_images(images, labels)
    }

    /// Inject images once the pending batch drains, waiting at most `timeout`
    pub fn add_images_timeout(
        &self,
        images: &[ImageBuffer],
        labels: &[i32],
        timeout: Duration,
    ) -> Result<()>
    where
        X: SampleTransform<ImageBuffer>,
    {
        self.wait_for_slot(timeout, "add_images")?
            .add_images(images, labels)
    }

    /// Run one consumption step and hand the batch to `consume`
    pub fn forward_with<R>(&self, consume: impl FnOnce(BatchView<'_, T>) -> R) -> Result<R> {
        let mut guard = self.lock()?;
        let was_pending = guard.has_pending_data();

        let result = consume(guard.next_batch()?);

        if was_pending && !guard.has_pending_data() {
            self.drained.notify_all();
        }
        Ok(result)
    }

    /// Change the batch size; fails while a batch is pending
    pub fn change_batch_size(&self, new_size: usize) -> Result<()> {
        self.lock()?.change_batch_size(new_size)
    }

    /// Whether injected data is still waiting to be consumed
    pub fn has_pending_data(&self) -> Result<bool> {
        Ok(self.lock()?.has_pending_data())
    }

    /// Current state of the inject/drain cycle
    pub fn state(&self) -> Result<FeederState> {
        Ok(self.lock()?.state())
    }

    /// Unwrap the feeder
    pub fn into_inner(self) -> Result<MemoryFeeder<T, X>> {
        self.inner.into_inner().map_err(|_| Error::LockPoisoned)
    }
}
