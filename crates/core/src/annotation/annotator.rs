use image::{Luma, Rgb};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, Canvas};
use imageproc::rect::Rect;

use crate::detection::domain::detection::Detection;
use crate::shared::frame::{Frame, RGB_CHANNELS};
use crate::shared::region::Region;

use super::glyphs::{lit_cells, GLYPH_ADVANCE};

/// Fixed visual styles for each annotation level.
#[derive(Clone, Debug, PartialEq)]
pub struct AnnotationStyle {
    pub face_color: [u8; 3],
    pub eye_color: [u8; 3],
    pub text_color: [u8; 3],
    pub thickness: u32,
    /// Top-left corner of the timestamp.
    pub text_origin: (u32, u32),
    /// Pixels per glyph cell.
    pub text_scale: u32,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            face_color: [0, 255, 255],
            eye_color: [255, 127, 0],
            text_color: [0, 255, 0],
            thickness: 2,
            text_origin: (10, 9),
            text_scale: 3,
        }
    }
}

/// Draws face and eye outlines plus the capture timestamp onto a frame.
///
/// Drawing is clipped at the frame edges, so out-of-range regions never
/// fail. Grayscale frames receive the luma of each style color.
pub struct Annotator {
    style: AnnotationStyle,
}

impl Annotator {
    pub fn new(style: AnnotationStyle) -> Self {
        Self { style }
    }

    pub fn annotate(&self, frame: Frame, detections: &[Detection], timestamp: &str) -> Frame {
        let index = frame.index();
        if frame.channels() == RGB_CHANNELS {
            let (w, h) = (frame.width(), frame.height());
            let Some(mut canvas) = frame.into_rgb_image() else {
                log::warn!("Frame {index}: pixel buffer does not match {w}x{h}, not annotated");
                return Frame::new(vec![0; (w * h * 3) as usize], w, h, RGB_CHANNELS, index);
            };
            self.paint(
                &mut canvas,
                detections,
                timestamp,
                [Rgb(self.style.face_color), Rgb(self.style.eye_color), Rgb(self.style.text_color)],
            );
            Frame::from_rgb_image(canvas, index)
        } else if let Some(mut canvas) = frame.to_gray_image() {
            let [face, eye, text] =
                [self.style.face_color, self.style.eye_color, self.style.text_color].map(luma);
            self.paint(&mut canvas, detections, timestamp, [face, eye, text]);
            Frame::from_gray_image(canvas, index)
        } else {
            frame
        }
    }

    fn paint<C: Canvas>(
        &self,
        canvas: &mut C,
        detections: &[Detection],
        timestamp: &str,
        [face, eye, text]: [C::Pixel; 3],
    ) {
        for detection in detections {
            self.outline(canvas, &detection.face, face);
            for region in detection.eyes_in_frame() {
                self.outline(canvas, &region, eye);
            }
        }
        self.stamp(canvas, timestamp, text);
    }

    fn outline<C: Canvas>(&self, canvas: &mut C, region: &Region, color: C::Pixel) {
        for inset in 0..self.style.thickness {
            let (w, h) = (
                region.width.saturating_sub(2 * inset),
                region.height.saturating_sub(2 * inset),
            );
            if w == 0 || h == 0 {
                break;
            }
            let rect = Rect::at((region.x + inset) as i32, (region.y + inset) as i32).of_size(w, h);
            draw_hollow_rect_mut(canvas, rect, color);
        }
    }

    fn stamp<C: Canvas>(&self, canvas: &mut C, text: &str, color: C::Pixel) {
        let scale = self.style.text_scale.max(1);
        let (ox, oy) = self.style.text_origin;
        for (i, c) in text.chars().enumerate() {
            let cx = ox + i as u32 * GLYPH_ADVANCE * scale;
            if cx >= canvas.width() {
                break;
            }
            for (col, row) in lit_cells(c) {
                let rect = Rect::at((cx + col * scale) as i32, (oy + row * scale) as i32)
                    .of_size(scale, scale);
                draw_filled_rect_mut(canvas, rect, color);
            }
        }
    }
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new(AnnotationStyle::default())
    }
}

fn luma([r, g, b]: [u8; 3]) -> Luma<u8> {
    let y = 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
    Luma([y.round().min(255.0) as u8])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn black(width: u32, height: u32) -> Frame {
        Frame::new(vec![0; (width * height * 3) as usize], width, height, 3, 3)
    }

    fn pixel(frame: &Frame, x: u32, y: u32) -> [u8; 3] {
        let i = ((y * frame.width() + x) * 3) as usize;
        [frame.data()[i], frame.data()[i + 1], frame.data()[i + 2]]
    }

    fn annotator() -> Annotator {
        Annotator::default()
    }

    #[test]
    fn test_face_outline_drawn_with_thickness() {
        let style = AnnotationStyle::default();
        let det = Detection::new(Region::new(40, 40, 20, 20), vec![]);
        let out = annotator().annotate(black(100, 100), &[det], "");

        assert_eq!(pixel(&out, 40, 40), style.face_color);
        assert_eq!(pixel(&out, 41, 41), style.face_color);
        assert_eq!(pixel(&out, 59, 50), style.face_color);
        assert_eq!(pixel(&out, 42, 42), [0, 0, 0], "outline must stay hollow");
        assert_eq!(pixel(&out, 50, 50), [0, 0, 0]);
    }

    #[test]
    fn test_eye_outline_uses_frame_coordinates() {
        let style = AnnotationStyle::default();
        let det = Detection::new(Region::new(40, 40, 40, 40), vec![Region::new(5, 6, 10, 8)]);
        let out = annotator().annotate(black(100, 100), &[det], "");

        assert_eq!(pixel(&out, 45, 46), style.eye_color);
        assert_eq!(pixel(&out, 5, 6), [0, 0, 0]);
    }

    #[test]
    fn test_out_of_bounds_region_is_clipped() {
        let det = Detection::new(Region::new(90, 90, 50, 50), vec![Region::new(30, 30, 40, 40)]);
        let out = annotator().annotate(black(100, 100), &[det], "");
        assert_eq!(pixel(&out, 90, 95), AnnotationStyle::default().face_color);
        assert_eq!(out.data().len(), 100 * 100 * 3);
    }

    #[test]
    fn test_timestamp_drawn_at_fixed_position() {
        let style = AnnotationStyle::default();
        let out = annotator().annotate(black(640, 480), &[], "2024-01-01 00:00:00");

        let (ox, oy) = style.text_origin;
        let stamp_area_lit = (oy..oy + 21)
            .flat_map(|y| (ox..ox + 19 * 18).map(move |x| (x, y)))
            .any(|(x, y)| pixel(&out, x, y) == style.text_color);
        assert!(stamp_area_lit);
        assert_eq!(pixel(&out, 600, 400), [0, 0, 0]);
    }

    #[test]
    fn test_long_timestamp_on_tiny_frame_does_not_panic() {
        let out = annotator().annotate(black(20, 12), &[], "2024-01-01 00:00:00");
        assert_eq!((out.width(), out.height()), (20, 12));
    }

    #[test]
    fn test_index_and_input_detections_preserved() {
        let dets = vec![Detection::new(Region::new(1, 1, 5, 5), vec![Region::new(1, 1, 2, 2)])];
        let before = dets.clone();
        let out = annotator().annotate(black(10, 10), &dets, "1");
        assert_eq!(out.index(), 3);
        assert_eq!(dets, before);
    }

    #[test]
    fn test_gray_frame_annotated_in_luma() {
        let frame = Frame::new(vec![0; 50 * 50], 50, 50, 1, 0);
        let det = Detection::new(Region::new(10, 10, 10, 10), vec![]);
        let out = annotator().annotate(frame, &[det], "");
        assert_eq!(out.channels(), 1);
        assert_eq!(out.data()[10 * 50 + 10], luma(AnnotationStyle::default().face_color).0[0]);
    }
}
