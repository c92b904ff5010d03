use super::motion::Region;
use crate::frame::FrameData;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use tracing::trace;

/// Green has the same byte layout in BGR and RGB
const REGION_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Outline width of drawn regions in pixels
const REGION_LINE_WIDTH: u32 = 2;

/// Draw region outlines onto a copy of `frame`.
///
/// The source frame is shared with other stages and is left untouched.
pub fn annotate(frame: &FrameData, regions: &[Region]) -> FrameData {
    if regions.is_empty() || !frame.validate_size() {
        return frame.clone();
    }

    let Some(mut canvas) = RgbImage::from_raw(frame.width, frame.height, frame.packed()) else {
        return frame.clone();
    };

    for region in regions {
        for inset in 0..REGION_LINE_WIDTH {
            let width = region.width.saturating_sub(inset * 2);
            let height = region.height.saturating_sub(inset * 2);
            if width == 0 || height == 0 {
                break;
            }
            let rect = Rect::at((region.x + inset) as i32, (region.y + inset) as i32)
                .of_size(width, height);
            draw_hollow_rect_mut(&mut canvas, rect, REGION_COLOR);
        }
    }
    trace!("Annotated frame {} with {} regions", frame.id, regions.len());

    FrameData::new(
        frame.id,
        frame.timestamp,
        canvas.into_raw(),
        frame.width,
        frame.height,
        frame.format,
    )
}
