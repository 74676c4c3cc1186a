//! Dense NCHW tensors and borrowed views over them

use std::fmt;

use bytemuck::Pod;

use crate::error::{Error, Result};

/// Trait for types that can be stored in tensors
pub trait TensorType: Pod + Send + Sync + 'static {}

impl<T: Pod + Send + Sync + 'static> TensorType for T {}

/// Numeric element the feeder writes samples and labels into
pub trait TensorElement: TensorType + PartialEq + fmt::Debug {
    /// Convert a raw pixel byte
    fn from_u8(value: u8) -> Self;

    /// Convert a float payload value
    fn from_f32(value: f32) -> Self;

    /// Convert an integer class label
    fn from_label(label: i32) -> Self;
}

impl TensorElement for f32 {
    fn from_u8(value: u8) -> Self {
        f32::from(value)
    }

    fn from_f32(value: f32) -> Self {
        value
    }

    #[allow(clippy::cast_precision_loss)]
    fn from_label(label: i32) -> Self {
        label as f32
    }
}

impl TensorElement for f64 {
    fn from_u8(value: u8) -> Self {
        f64::from(value)
    }

    fn from_f32(value: f32) -> Self {
        f64::from(value)
    }

    fn from_label(label: i32) -> Self {
        f64::from(label)
    }
}

/// A four-dimensional `[num, channels, height, width]` shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shape([usize; 4]);

impl Shape {
    /// Create a shape from its four dimensions
    pub fn new(num: usize, channels: usize, height: usize, width: usize) -> Self {
        Self([num, channels, height, width])
    }

    /// All four dimensions
    pub fn dims(&self) -> [usize; 4] {
        self.0
    }

    /// Leading (sample) dimension
    pub fn num(&self) -> usize {
        self.0[0]
    }

    /// Values per sample
    pub fn sample_size(&self) -> usize {
        self.0[1] * self.0[2] * self.0[3]
    }

    /// Total number of values
    pub fn count(&self) -> usize {
        self.num() * self.sample_size()
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [n, c, h, w] = self.0;
        write!(f, "[{n}, {c}, {h}, {w}]")
    }
}

/// A dense tensor whose allocation only ever grows
///
/// Reshaping to a smaller shape keeps the allocation; the logical length
/// follows the shape while `capacity` reports what is actually held.
pub struct DenseTensor<T: TensorType> {
    /// Logical shape
    shape: Shape,

    /// Backing storage, `len()` is the capacity in elements
    data: Vec<T>,
}

impl<T: TensorType> DenseTensor<T> {
    /// Create a zero-filled tensor with the given shape
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            data: vec![T::zeroed(); shape.count()],
        }
    }

    /// Get the shape of this tensor
    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Number of logical elements
    pub fn len(&self) -> usize {
        self.shape.count()
    }

    /// Check if this tensor is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocated elements, never less than `len()`
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Size of the allocation in bytes
    pub fn size_bytes(&self) -> usize {
        self.capacity() * std::mem::size_of::<T>()
    }

    /// Bytes a reshape to `shape` would add to the allocation
    pub fn growth_bytes(&self, shape: Shape) -> usize {
        shape.count().saturating_sub(self.capacity()) * std::mem::size_of::<T>()
    }

    /// Change the logical shape, growing the allocation if needed
    ///
    /// Returns `true` when the allocation grew.
    pub fn reshape(&mut self, shape: Shape) -> bool {
        self.shape = shape;
        if shape.count() > self.data.len() {
            self.data.resize(shape.count(), T::zeroed());
            return true;
        }
        false
    }

    /// Logical contents
    pub fn as_slice(&self) -> &[T] {
        &self.data[..self.len()]
    }

    /// Mutable logical contents
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        let len = self.len();
        &mut self.data[..len]
    }

    /// Borrow `shape.count()` elements starting at `offset` as a view
    pub fn view(&self, offset: usize, shape: Shape) -> Result<TensorView<'_, T>> {
        let end = offset
            .checked_add(shape.count())
            .filter(|&end| end <= self.data.len())
            .ok_or(Error::BufferLengthMismatch {
                expected: offset.saturating_add(shape.count()),
                actual: self.data.len(),
            })?;

        Ok(TensorView {
            shape,
            data: &self.data[offset..end],
        })
    }
}

impl<T: TensorType + fmt::Debug> fmt::Debug for DenseTensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DenseTensor<{}>{{ shape: {}, capacity: {} }}",
            std::any::type_name::<T>(),
            self.shape,
            self.capacity()
        )
    }
}

/// A read-only, zero-copy view into a [`DenseTensor`]
#[derive(Clone, Copy)]
pub struct TensorView<'a, T: TensorType> {
    shape: Shape,
    data: &'a [T],
}

impl<'a, T: TensorType> TensorView<'a, T> {
    /// Shape of the view
    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the view is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Viewed elements
    pub fn as_slice(&self) -> &'a [T] {
        self.data
    }

    /// Viewed elements as raw bytes
    pub fn as_bytes(&self) -> &'a [u8] {
        bytemuck::cast_slice(self.data)
    }

    /// Values of the `index`-th sample in the view
    pub fn sample(&self, index: usize) -> Option<&'a [T]> {
        let size = self.shape.sample_size();
        let start = index.checked_mul(size)?;
        self.data.get(start..start + size)
    }

    /// Value at `[n, c, h, w]`
    pub fn get(&self, n: usize, c: usize, h: usize, w: usize) -> Option<T> {
        let [num, channels, height, width] = self.shape.dims();
        if n >= num || c >= channels || h >= height || w >= width {
            return None;
        }
        self.data
            .get(((n * channels + c) * height + h) * width + w)
            .copied()
    }
}

impl<T: TensorType + fmt::Debug> fmt::Debug for TensorView<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TensorView")
            .field("shape", &self.shape)
            .field("data", &self.data)
            .finish()
    }
}
