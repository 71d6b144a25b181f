use image::{GrayImage, RgbImage};

use crate::shared::frame::{Frame, RGB_CHANNELS};

/// Converts a captured frame into the equalized intensity image detectors
/// expect.
///
/// Color input is reduced to luma first; single-channel input is taken as
/// already converted, so normalizing twice changes nothing.
pub fn normalize(frame: &Frame) -> Frame {
    let gray = if frame.channels() == RGB_CHANNELS {
        to_luma(frame)
    } else {
        match frame.to_gray_image() {
            Some(gray) => gray,
            None => to_luma_any(frame),
        }
    };
    let equalized = imageproc::contrast::equalize_histogram(&gray);
    Frame::from_gray_image(equalized, frame.index())
}

fn to_luma(frame: &Frame) -> GrayImage {
    match RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec()) {
        Some(rgb) => image::imageops::grayscale(&rgb),
        None => to_luma_any(frame),
    }
}

/// Fallback for unusual channel counts: averages every pixel's channels.
fn to_luma_any(frame: &Frame) -> GrayImage {
    let c = frame.channels().max(1) as usize;
    let data = frame
        .data()
        .chunks_exact(c)
        .map(|px| (px.iter().map(|&v| v as u32).sum::<u32>() / c as u32) as u8)
        .collect();
    GrayImage::from_raw(frame.width(), frame.height(), data)
        .unwrap_or_else(|| GrayImage::new(frame.width(), frame.height()))
}
