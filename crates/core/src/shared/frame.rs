use image::{GrayImage, RgbImage};
use ndarray::ArrayView3;

use crate::shared::region::Region;

pub const RGB_CHANNELS: u8 = 3;
pub const GRAY_CHANNELS: u8 = 1;

/// A single captured frame: contiguous pixel bytes in row-major order.
///
/// Color frames are RGB (3 channels); normalized frames are single-channel
/// intensity. Format conversion happens at I/O boundaries only.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_gray(&self) -> bool {
        self.channels == GRAY_CHANNELS
    }

    /// Copies the rectangular sub-frame covered by `region`.
    ///
    /// The region is clipped to the frame first, so the crop never reads out
    /// of bounds; a region entirely outside yields an empty frame.
    pub fn crop(&self, region: &Region) -> Frame {
        let x0 = region.x.min(self.width) as usize;
        let y0 = region.y.min(self.height) as usize;
        let x1 = region.right().min(self.width) as usize;
        let y1 = region.bottom().min(self.height) as usize;
        let cw = x1.saturating_sub(x0);
        let ch = y1.saturating_sub(y0);
        let c = self.channels as usize;
        let fw = self.width as usize;

        let mut out = Vec::with_capacity(cw * ch * c);
        for row in y0..y0 + ch {
            let start = (row * fw + x0) * c;
            out.extend_from_slice(&self.data[start..start + cw * c]);
        }
        Frame::new(out, cw as u32, ch as u32, self.channels, self.index)
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Moves the pixel buffer into an `RgbImage` without copying.
    ///
    /// Returns `None` for non-RGB frames.
    pub fn into_rgb_image(self) -> Option<RgbImage> {
        if self.channels != RGB_CHANNELS {
            return None;
        }
        RgbImage::from_raw(self.width, self.height, self.data)
    }

    pub fn to_gray_image(&self) -> Option<GrayImage> {
        if self.channels != GRAY_CHANNELS {
            return None;
        }
        GrayImage::from_raw(self.width, self.height, self.data.clone())
    }

    pub fn from_rgb_image(image: RgbImage, index: usize) -> Self {
        let (w, h) = image.dimensions();
        Self::new(image.into_raw(), w, h, RGB_CHANNELS, index)
    }

    pub fn from_gray_image(image: GrayImage, index: usize) -> Self {
        let (w, h) = image.dimensions();
        Self::new(image.into_raw(), w, h, GRAY_CHANNELS, index)
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_frame(width: u32, height: u32) -> Frame {
        // pixel value encodes its (row, col) so crops are easy to check
        let data = (0..height)
            .flat_map(|y| (0..width).map(move |x| (y * 16 + x) as u8))
            .collect();
        Frame::new(data, width, height, 1, 0)
    }

    #[test]
    fn test_construction_and_accessors() {
        let data = vec![0u8; 12]; // 2x2x3
        let frame = Frame::new(data.clone(), 2, 2, 3, 5);
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.index(), 5);
        assert_eq!(frame.data(), &data[..]);
        assert!(!frame.is_gray());
    }

    #[test]
    #[should_panic(expected = "data length must equal width * height * channels")]
    fn test_mismatched_data_length_panics_in_debug() {
        Frame::new(vec![0u8; 10], 2, 2, 3, 0);
    }

    #[test]
    fn test_as_ndarray_pixel_access() {
        let mut data = vec![0u8; 12];
        data[6] = 255; // row=1, col=0, R
        let frame = Frame::new(data, 2, 2, 3, 0);
        let arr = frame.as_ndarray();
        assert_eq!(arr.shape(), &[2, 2, 3]);
        assert_eq!(arr[[1, 0, 0]], 255);
        assert_eq!(arr[[1, 0, 1]], 0);
    }

    #[test]
    fn test_crop_uses_both_axes() {
        let frame = gradient_frame(8, 6);
        let crop = frame.crop(&Region::new(2, 3, 3, 2));
        assert_eq!((crop.width(), crop.height()), (3, 2));
        assert_eq!(crop.data(), &[50, 51, 52, 66, 67, 68]);
    }

    #[test]
    fn test_crop_clips_to_frame() {
        let frame = gradient_frame(8, 6);
        let crop = frame.crop(&Region::new(6, 4, 10, 10));
        assert_eq!((crop.width(), crop.height()), (2, 2));
    }

    #[test]
    fn test_crop_outside_is_empty() {
        let frame = gradient_frame(8, 6);
        let crop = frame.crop(&Region::new(20, 20, 5, 5));
        assert_eq!((crop.width(), crop.height()), (0, 0));
        assert!(crop.data().is_empty());
    }

    #[test]
    fn test_crop_keeps_color_channels() {
        let frame = Frame::new(vec![7u8; 4 * 4 * 3], 4, 4, 3, 9);
        let crop = frame.crop(&Region::new(1, 1, 2, 2));
        assert_eq!(crop.channels(), 3);
        assert_eq!(crop.index(), 9);
        assert_eq!(crop.data().len(), 12);
    }

    #[test]
    fn test_image_conversions() {
        let rgb = Frame::new(vec![1u8; 2 * 3 * 3], 2, 3, 3, 4);
        let image = rgb.clone().into_rgb_image().unwrap();
        assert_eq!(image.dimensions(), (2, 3));
        assert_eq!(Frame::from_rgb_image(image, 4), rgb);

        let gray = gradient_frame(4, 2);
        assert!(gray.clone().into_rgb_image().is_none());
        let luma = gray.to_gray_image().unwrap();
        assert_eq!(Frame::from_gray_image(luma, 0), gray);
    }
}
