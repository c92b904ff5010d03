use crate::config::MotionConfig;
use crate::error::MotionError;
use crate::frame::FrameData;

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::{
    contrast::threshold,
    distance_transform::Norm,
    filter::gaussian_blur_f32,
    morphology::dilate,
    region_labelling::{connected_components, Connectivity},
};
use std::collections::HashMap;
use std::time::SystemTime;
use tracing::{debug, trace};

/// Bounding box of one connected region of changed pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Result of comparing two consecutive frames
#[derive(Debug, Clone)]
pub struct MotionSample {
    /// Percentage of pixels classified as changed
    pub intensity: f64,
    pub changed_pixels: usize,
    /// Set to the scoring time when intensity reached the sensitivity threshold
    pub detected_at: Option<SystemTime>,
    /// Changed regions, for overlay only
    pub regions: Vec<Region>,
}

impl MotionSample {
    pub fn is_detected(&self) -> bool {
        self.detected_at.is_some()
    }
}

/// Frame-differencing motion detector.
///
/// Holds no state between calls: every score depends only on the two frames
/// passed in.
pub struct MotionDetector {
    config: MotionConfig,
}

impl MotionDetector {
    pub fn new(config: MotionConfig) -> Self {
        debug!("Motion detector configured: {:?}", config);
        Self { config }
    }

    /// Score `current` against `previous` at the current wall-clock time
    pub fn score(
        &self,
        previous: &FrameData,
        current: &FrameData,
    ) -> Result<MotionSample, MotionError> {
        self.score_at(previous, current, SystemTime::now())
    }

    /// Score with an explicit detection timestamp
    pub fn score_at(
        &self,
        previous: &FrameData,
        current: &FrameData,
        now: SystemTime,
    ) -> Result<MotionSample, MotionError> {
        if previous.geometry() != current.geometry() {
            return Err(MotionError::GeometryMismatch {
                previous: previous.geometry(),
                current: current.geometry(),
            });
        }
        let geometry = current.geometry();
        if geometry.is_empty() {
            return Err(MotionError::FrameProcessing {
                details: "Cannot score empty frames".to_string(),
            });
        }

        let previous_gray = to_gray(previous)?;
        let current_gray = to_gray(current)?;

        let mask = self.changed_mask(&previous_gray, &current_gray);
        let changed_pixels = mask.pixels().filter(|p| p[0] == 255).count();
        let intensity = changed_pixels as f64 * 100.0 / geometry.pixel_count() as f64;

        let regions = if changed_pixels > 0 {
            bounding_regions(&mask)
        } else {
            Vec::new()
        };

        let detected_at = if intensity >= self.config.sensitivity_percent {
            debug!(
                "Motion detected between frames {} and {}: {:.3}% changed, {} regions",
                previous.id,
                current.id,
                intensity,
                regions.len()
            );
            Some(now)
        } else {
            trace!(
                "No motion between frames {} and {}: {:.3}% changed",
                previous.id,
                current.id,
                intensity
            );
            None
        };

        Ok(MotionSample {
            intensity,
            changed_pixels,
            detected_at,
            regions,
        })
    }

    /// Difference, blur, binarize and dilate into a 0/255 mask
    fn changed_mask(&self, previous: &GrayImage, current: &GrayImage) -> GrayImage {
        let (width, height) = current.dimensions();
        let diff: Vec<u8> = previous
            .as_raw()
            .iter()
            .zip(current.as_raw())
            .map(|(a, b)| a.abs_diff(*b))
            .collect();
        let diff = GrayImage::from_raw(width, height, diff)
            .unwrap_or_else(|| GrayImage::new(width, height));

        let blurred = if self.config.blur_sigma > 0.0 {
            gaussian_blur_f32(&diff, self.config.blur_sigma)
        } else {
            diff
        };

        let binary = threshold(&blurred, self.config.binarize_threshold);

        if self.config.dilate_radius > 0 {
            dilate(&binary, Norm::LInf, self.config.dilate_radius)
        } else {
            binary
        }
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }
}

/// Convert a 3-channel frame to luma using BT.601 weights
fn to_gray(frame: &FrameData) -> Result<GrayImage, MotionError> {
    if !frame.validate_size() {
        return Err(MotionError::FrameProcessing {
            details: format!(
                "Frame {} has {} bytes, expected at least {} for {}",
                frame.id,
                frame.data.len(),
                frame.expected_size(),
                frame.geometry()
            ),
        });
    }

    let (r, g, b) = frame.format.channel_offsets();
    let bpp = frame.format.bytes_per_pixel();
    let mut gray = Vec::with_capacity(frame.geometry().pixel_count());

    for y in 0..frame.height {
        for px in frame.row(y).chunks_exact(bpp) {
            // Fixed-point 0.299 R + 0.587 G + 0.114 B
            let luma = (px[r] as u32 * 4899 + px[g] as u32 * 9617 + px[b] as u32 * 1868 + 8192)
                >> 14;
            gray.push(luma as u8);
        }
    }

    GrayImage::from_raw(frame.width, frame.height, gray).ok_or_else(|| {
        MotionError::FrameProcessing {
            details: "Failed to create grayscale image".to_string(),
        }
    })
}

/// Bounding boxes of the 8-connected components of a binary mask
fn bounding_regions(mask: &GrayImage) -> Vec<Region> {
    let labels: ImageBuffer<Luma<u32>, Vec<u32>> =
        connected_components(mask, Connectivity::Eight, Luma([0u8]));

    let mut bounds: HashMap<u32, (u32, u32, u32, u32)> = HashMap::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let id = label[0];
        if id == 0 {
            continue;
        }
        bounds
            .entry(id)
            .and_modify(|b| {
                b.0 = b.0.min(x);
                b.1 = b.1.min(y);
                b.2 = b.2.max(x);
                b.3 = b.3.max(y);
            })
            .or_insert((x, y, x, y));
    }

    let mut regions: Vec<Region> = bounds
        .into_values()
        .map(|(x0, y0, x1, y1)| Region {
            x: x0,
            y: y0,
            width: x1 - x0 + 1,
            height: y1 - y0 + 1,
        })
        .collect();
    regions.sort_by_key(|r| (r.y, r.x));
    regions
}
