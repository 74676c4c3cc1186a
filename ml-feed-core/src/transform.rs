//! Transform collaborator that writes samples into the buffer store

use crate::config::BatchDescriptor;
use crate::error::{Error, Result};
use crate::sample::{Datum, ImageBuffer};
use crate::tensor::TensorElement;

/// Converts a sequence of samples into tensor values
///
/// Implementations must fill `dst` (exactly `samples.len() * sample_size`
/// values) in sample order. The feeder calls this only while injecting.
pub trait SampleTransform<S> {
    /// Write `samples` into `dst`
    fn transform<T: TensorElement>(
        &mut self,
        samples: &[S],
        descriptor: &BatchDescriptor,
        dst: &mut [T],
    ) -> Result<()>;
}

/// Layout-only transform: copies values into `CHW` order without altering them
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTransform;

fn check_geometry(
    index: usize,
    (channels, height, width): (usize, usize, usize),
    descriptor: &BatchDescriptor,
) -> Result<()> {
    if (channels, height, width) != (descriptor.channels, descriptor.height, descriptor.width) {
        return Err(Error::TransformationError(format!(
            "sample {index} has shape {channels}x{height}x{width}, expected {}x{}x{}",
            descriptor.channels, descriptor.height, descriptor.width
        )));
    }
    Ok(())
}

fn check_destination(num: usize, descriptor: &BatchDescriptor, dst_len: usize) -> Result<()> {
    let expected = num * descriptor.sample_size();
    if dst_len != expected {
        return Err(Error::TransformationError(format!(
            "destination holds {dst_len} values, {num} samples need {expected}"
        )));
    }
    Ok(())
}

impl SampleTransform<Datum> for DefaultTransform {
    fn transform<T: TensorElement>(
        &mut self,
        samples: &[Datum],
        descriptor: &BatchDescriptor,
        dst: &mut [T],
    ) -> Result<()> {
        check_destination(samples.len(), descriptor, dst.len())?;
        let size = descriptor.sample_size();

        for (index, (datum, out)) in samples.iter().zip(dst.chunks_exact_mut(size)).enumerate() {
            check_geometry(index, (datum.channels, datum.height, datum.width), descriptor)?;
            if datum.payload_len() != size {
                return Err(Error::TransformationError(format!(
                    "sample {index} carries {} values, expected {size}",
                    datum.payload_len()
                )));
            }

            if datum.data.is_empty() {
                for (o, &v) in out.iter_mut().zip(&datum.float_data) {
                    *o = T::from_f32(v);
                }
            } else {
                for (o, &v) in out.iter_mut().zip(&datum.data) {
                    *o = T::from_u8(v);
                }
            }
        }

        Ok(())
    }
}

impl SampleTransform<ImageBuffer> for DefaultTransform {
    fn transform<T: TensorElement>(
        &mut self,
        samples: &[ImageBuffer],
        descriptor: &BatchDescriptor,
        dst: &mut [T],
    ) -> Result<()> {
        check_destination(samples.len(), descriptor, dst.len())?;
        let size = descriptor.sample_size();
        let (channels, height, width) = (descriptor.channels, descriptor.height, descriptor.width);

        for (index, (image, out)) in samples.iter().zip(dst.chunks_exact_mut(size)).enumerate() {
            check_geometry(index, (image.channels, image.height, image.width), descriptor)?;
            if image.pixels.len() != size {
                return Err(Error::TransformationError(format!(
                    "image {index} has {} bytes, expected {size}",
                    image.pixels.len()
                )));
            }

            // HWC -> CHW
            for (pixel, values) in image.pixels.chunks_exact(channels).enumerate() {
                let (h, w) = (pixel / width, pixel % width);
                for (c, &v) in values.iter().enumerate() {
                    out[(c * height + h) * width + w] = T::from_u8(v);
                }
            }
        }

        Ok(())
    }
}
