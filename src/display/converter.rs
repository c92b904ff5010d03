use crate::error::{DisplayError, Result};
use crate::frame::{DisplayFrame, FrameData, Geometry, PixelFormat};
use tracing::trace;

/// Display format conversion utilities
pub struct DisplayConverter;

impl DisplayConverter {
    /// Convert a camera frame into `format` at `target`, scaling with nearest
    /// neighbour when the geometries differ.
    ///
    /// The returned frame owns its buffer, so a sink may keep it after the
    /// pipeline has moved on.
    pub fn convert(frame: &FrameData, target: Geometry, format: PixelFormat) -> Result<DisplayFrame> {
        if !frame.validate_size() {
            return Err(DisplayError::FormatConversion {
                details: format!(
                    "Invalid frame data size: expected {}, got {}",
                    frame.expected_size(),
                    frame.data.len()
                ),
            }
            .into());
        }
        if frame.geometry().is_empty() || target.is_empty() {
            return Err(DisplayError::FormatConversion {
                details: format!("Cannot convert {} to {}", frame.geometry(), target),
            }
            .into());
        }

        let (ro, go, bo) = frame.format.channel_offsets();
        let src_bpp = frame.format.bytes_per_pixel();
        let dst_bpp = format.bytes_per_pixel();
        let mut data = Vec::with_capacity(target.pixel_count() * dst_bpp);

        let x_ratio = frame.width as f32 / target.width as f32;
        let y_ratio = frame.height as f32 / target.height as f32;

        for dst_y in 0..target.height {
            let src_y = (((dst_y as f32) * y_ratio) as u32).min(frame.height - 1);
            let row = frame.row(src_y);

            for dst_x in 0..target.width {
                let src_x = (((dst_x as f32) * x_ratio) as u32).min(frame.width - 1);
                let px = &row[src_x as usize * src_bpp..(src_x as usize + 1) * src_bpp];

                match format {
                    // 0xffRRGGBB stored little endian
                    PixelFormat::Rgb32 => data.extend_from_slice(&[px[bo], px[go], px[ro], 0xff]),
                    PixelFormat::Rgb24 => data.extend_from_slice(&[px[ro], px[go], px[bo]]),
                }
            }
        }

        trace!(
            "Converted frame {} from {} to {} {:?}",
            frame.id,
            frame.geometry(),
            target,
            format
        );

        Ok(DisplayFrame {
            id: frame.id,
            timestamp: frame.timestamp,
            data,
            width: target.width,
            height: target.height,
            format,
        })
    }
}
