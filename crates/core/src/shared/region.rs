use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in frame-pixel coordinates.
///
/// Coordinates are unsigned, so a region can never start left of or above
/// its frame. Whether it also ends inside the frame is checked with
/// [`Region::fits_within`]; detector output goes through
/// [`Region::clamp_bounds`] before anything else sees it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Clips a floating-point box given by its corners to a `frame_w` × `frame_h`
    /// frame. Returns `None` when nothing of the box remains.
    pub fn clamp_bounds(
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        frame_w: u32,
        frame_h: u32,
    ) -> Option<Region> {
        if !(x1.is_finite() && y1.is_finite() && x2.is_finite() && y2.is_finite()) {
            return None;
        }
        let cx1 = x1.round().clamp(0.0, frame_w as f64) as u32;
        let cy1 = y1.round().clamp(0.0, frame_h as f64) as u32;
        let cx2 = x2.round().clamp(0.0, frame_w as f64) as u32;
        let cy2 = y2.round().clamp(0.0, frame_h as f64) as u32;
        if cx2 <= cx1 || cy2 <= cy1 {
            return None;
        }
        Some(Region::new(cx1, cy1, cx2 - cx1, cy2 - cy1))
    }

    /// Intersects this region with a `frame_w` × `frame_h` frame.
    pub fn clamp_to(&self, frame_w: u32, frame_h: u32) -> Option<Region> {
        Region::clamp_bounds(
            self.x as f64,
            self.y as f64,
            self.right() as f64,
            self.bottom() as f64,
            frame_w,
            frame_h,
        )
    }

    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    pub fn fits_within(&self, frame_w: u32, frame_h: u32) -> bool {
        self.right() <= frame_w && self.bottom() <= frame_h
    }

    /// Maps a region expressed relative to `parent`'s origin into the
    /// parent's own coordinate space.
    pub fn translate(&self, parent: &Region) -> Region {
        Region::new(
            self.x.saturating_add(parent.x),
            self.y.saturating_add(parent.y),
            self.width,
            self.height,
        )
    }

    /// Inverse of [`Region::translate`]. `None` if this region starts
    /// before the parent's origin.
    pub fn relative_to(&self, parent: &Region) -> Option<Region> {
        Some(Region::new(
            self.x.checked_sub(parent.x)?,
            self.y.checked_sub(parent.y)?,
            self.width,
            self.height,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn region(x: u32, y: u32, w: u32, h: u32) -> Region {
        Region::new(x, y, w, h)
    }

    // ── Clamping ─────────────────────────────────────────────────────

    #[test]
    fn test_clamp_bounds_inside_frame_is_unchanged() {
        let r = Region::clamp_bounds(10.0, 20.0, 60.0, 90.0, 640, 480).unwrap();
        assert_eq!(r, region(10, 20, 50, 70));
    }

    #[test]
    fn test_clamp_bounds_clips_negative_origin() {
        let r = Region::clamp_bounds(-15.0, -5.0, 40.0, 30.0, 640, 480).unwrap();
        assert_eq!(r, region(0, 0, 40, 30));
    }

    #[test]
    fn test_clamp_bounds_clips_far_edge() {
        let r = Region::clamp_bounds(600.0, 450.0, 700.0, 520.0, 640, 480).unwrap();
        assert_eq!(r, region(600, 450, 40, 30));
        assert!(r.fits_within(640, 480));
    }

    #[rstest]
    #[case::left_of_frame(-50.0, 0.0, -10.0, 10.0)]
    #[case::below_frame(0.0, 500.0, 10.0, 520.0)]
    #[case::inverted(30.0, 30.0, 10.0, 10.0)]
    #[case::not_finite(f64::NAN, 0.0, 10.0, 10.0)]
    fn test_clamp_bounds_rejects_empty(
        #[case] x1: f64,
        #[case] y1: f64,
        #[case] x2: f64,
        #[case] y2: f64,
    ) {
        assert!(Region::clamp_bounds(x1, y1, x2, y2, 640, 480).is_none());
    }

    #[test]
    fn test_clamp_to_shrinks_overhanging_region() {
        let r = region(90, 90, 20, 20).clamp_to(100, 100).unwrap();
        assert_eq!(r, region(90, 90, 10, 10));
    }

    #[rstest]
    #[case(region(0, 0, 100, 100), true)]
    #[case(region(50, 50, 50, 50), true)]
    #[case(region(51, 0, 50, 10), false)]
    #[case(region(0, 99, 1, 2), false)]
    fn test_fits_within(#[case] r: Region, #[case] expected: bool) {
        assert_eq!(r.fits_within(100, 100), expected);
    }

    // ── Translation ──────────────────────────────────────────────────

    #[test]
    fn test_translate_moves_by_parent_origin() {
        let face = region(100, 80, 120, 120);
        let eye = region(20, 30, 25, 15);
        assert_eq!(eye.translate(&face), region(120, 110, 25, 15));
    }

    #[rstest]
    #[case(region(0, 0, 10, 10), region(0, 0, 5, 5))]
    #[case(region(100, 80, 120, 120), region(20, 30, 25, 15))]
    #[case(region(7, 300, 40, 40), region(39, 0, 1, 1))]
    fn test_translate_round_trip(#[case] parent: Region, #[case] child: Region) {
        let absolute = child.translate(&parent);
        assert_eq!(absolute.relative_to(&parent), Some(child));
    }

    #[test]
    fn test_relative_to_rejects_region_before_parent() {
        let parent = region(50, 50, 10, 10);
        assert!(region(40, 60, 5, 5).relative_to(&parent).is_none());
    }
}
