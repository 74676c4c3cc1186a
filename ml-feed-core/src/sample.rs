//! Sample types accepted by the feeder

/// A raw labeled record in channel-major (`CHW`) order
///
/// Exactly one of `data` (bytes) or `float_data` is expected to carry the
/// payload; when both are set, `data` wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Datum {
    /// Channels
    pub channels: usize,

    /// Height
    pub height: usize,

    /// Width
    pub width: usize,

    /// Byte payload
    pub data: Vec<u8>,

    /// Float payload, used when `data` is empty
    pub float_data: Vec<f32>,

    /// Class label
    pub label: i32,
}

impl Datum {
    /// Datum carrying a byte payload
    pub fn from_bytes(
        channels: usize,
        height: usize,
        width: usize,
        data: Vec<u8>,
        label: i32,
    ) -> Self {
        Self {
            channels,
            height,
            width,
            data,
            float_data: Vec::new(),
            label,
        }
    }

    /// Datum carrying a float payload
    pub fn from_floats(
        channels: usize,
        height: usize,
        width: usize,
        float_data: Vec<f32>,
        label: i32,
    ) -> Self {
        Self {
            channels,
            height,
            width,
            data: Vec::new(),
            float_data,
            label,
        }
    }

    /// Values in the active payload
    pub fn payload_len(&self) -> usize {
        if self.data.is_empty() {
            self.float_data.len()
        } else {
            self.data.len()
        }
    }
}

/// A decoded image in interleaved (`HWC`) byte order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageBuffer {
    /// Channels per pixel
    pub channels: usize,

    /// Rows
    pub height: usize,

    /// Columns
    pub width: usize,

    /// `height * width * channels` bytes, pixel by pixel
    pub pixels: Vec<u8>,
}

impl ImageBuffer {
    /// Wrap interleaved pixel bytes
    pub fn new(channels: usize, height: usize, width: usize, pixels: Vec<u8>) -> Self {
        Self {
            channels,
            height,
            width,
            pixels,
        }
    }
}
