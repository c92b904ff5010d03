use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

/// Raw pixel layouts delivered by camera devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// 3 bytes per pixel, blue first
    Bgr24,
    /// 3 bytes per pixel, red first
    Rgb24,
}

impl FrameFormat {
    /// Get bytes per pixel for the format
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            FrameFormat::Bgr24 | FrameFormat::Rgb24 => 3,
        }
    }

    /// Byte offsets of the red, green and blue channels within one pixel
    pub fn channel_offsets(&self) -> (usize, usize, usize) {
        match self {
            FrameFormat::Bgr24 => (2, 1, 0),
            FrameFormat::Rgb24 => (0, 1, 2),
        }
    }
}

/// Frame width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl From<(u32, u32)> for Geometry {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Frame data structure containing raw frame data and metadata
#[derive(Debug, Clone)]
pub struct FrameData {
    /// Unique frame identifier
    pub id: u64,
    /// Timestamp when frame was captured
    pub timestamp: SystemTime,
    /// Raw frame data, never mutated after capture
    pub data: Arc<Vec<u8>>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Bytes per row, including any padding
    pub stride: usize,
    /// Frame format
    pub format: FrameFormat,
}

impl FrameData {
    /// Create a tightly packed frame
    pub fn new(
        id: u64,
        timestamp: SystemTime,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: FrameFormat,
    ) -> Self {
        let stride = width as usize * format.bytes_per_pixel();
        Self::with_stride(id, timestamp, data, width, height, stride, format)
    }

    /// Create a frame whose rows may be padded
    pub fn with_stride(
        id: u64,
        timestamp: SystemTime,
        data: Vec<u8>,
        width: u32,
        height: u32,
        stride: usize,
        format: FrameFormat,
    ) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
            stride,
            format,
        }
    }

    pub fn geometry(&self) -> Geometry {
        Geometry::new(self.width, self.height)
    }

    /// Bytes in one row of visible pixels
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Get the expected buffer size given stride and height
    pub fn expected_size(&self) -> usize {
        if self.height == 0 {
            return 0;
        }
        self.stride * (self.height as usize - 1) + self.row_bytes()
    }

    /// Validate frame data size against stride and geometry
    pub fn validate_size(&self) -> bool {
        self.stride >= self.row_bytes() && self.data.len() >= self.expected_size()
    }

    /// Visible pixels of row `y`
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.row_bytes()]
    }

    /// Copy visible pixels into a tightly packed buffer
    pub fn packed(&self) -> Vec<u8> {
        if self.stride == self.row_bytes() {
            return self.data[..self.expected_size()].to_vec();
        }
        let mut out = Vec::with_capacity(self.row_bytes() * self.height as usize);
        for y in 0..self.height {
            out.extend_from_slice(self.row(y));
        }
        out
    }
}

/// Pixel layouts accepted by display sinks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 32-bit 0xffRRGGBB words, stored little endian (B, G, R, 0xff)
    Rgb32,
    /// 3 bytes per pixel, red first
    Rgb24,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb32 => 4,
            PixelFormat::Rgb24 => 3,
        }
    }
}

/// Frame converted for a display sink; owns its own buffer
#[derive(Debug, Clone)]
pub struct DisplayFrame {
    pub id: u64,
    pub timestamp: SystemTime,
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl DisplayFrame {
    pub fn geometry(&self) -> Geometry {
        Geometry::new(self.width, self.height)
    }
}
