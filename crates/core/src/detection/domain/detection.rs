use crate::shared::region::Region;

/// A face and the eyes found inside it.
///
/// Eye regions are stored relative to the face origin, exactly as the
/// scoped eye detector returned them.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub face: Region,
    pub eyes: Vec<Region>,
}

impl Detection {
    pub fn new(face: Region, eyes: Vec<Region>) -> Self {
        Self { face, eyes }
    }

    /// Eye regions in full-frame coordinates.
    pub fn eyes_in_frame(&self) -> impl Iterator<Item = Region> + '_ {
        self.eyes.iter().map(move |eye| eye.translate(&self.face))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eyes_in_frame_are_translated() {
        let det = Detection::new(
            Region::new(100, 50, 80, 80),
            vec![Region::new(10, 20, 15, 10), Region::new(50, 22, 15, 10)],
        );
        let eyes: Vec<_> = det.eyes_in_frame().collect();
        assert_eq!(
            eyes,
            vec![Region::new(110, 70, 15, 10), Region::new(150, 72, 15, 10)]
        );
    }

    #[test]
    fn test_translated_eyes_recover_relative_coordinates() {
        let det = Detection::new(Region::new(33, 71, 60, 60), vec![Region::new(5, 9, 12, 8)]);
        for (abs, rel) in det.eyes_in_frame().zip(&det.eyes) {
            assert_eq!(abs.relative_to(&det.face).as_ref(), Some(rel));
        }
    }
}
