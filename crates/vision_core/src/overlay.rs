use image::{GrayImage, Luma, Rgb, RgbImage};
use std::path::Path;

/// Pixels of background between panels.
pub const PANEL_GAP: u32 = 4;
const GAP_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Quantize a [0, 1] map to an 8-bit grayscale image.
pub fn unit_map_to_gray(values: &[f32], width: u32, height: u32) -> Option<GrayImage> {
    if values.len() != (width * height) as usize {
        return None;
    }
    let raw = values
        .iter()
        .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect();
    GrayImage::from_raw(width, height, raw)
}

/// Rebuild an RGB image from CHW floats in [0, 1].
pub fn chw_to_rgb(chw: &[f32], width: u32, height: u32) -> Option<RgbImage> {
    let plane = (width * height) as usize;
    if chw.len() != plane * 3 {
        return None;
    }
    let to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    Some(RgbImage::from_fn(width, height, |x, y| {
        let i = (y * width + x) as usize;
        Rgb([to_u8(chw[i]), to_u8(chw[plane + i]), to_u8(chw[2 * plane + i])])
    }))
}

fn gray_to_rgb(px: &Luma<u8>) -> Rgb<u8> {
    Rgb([px[0], px[0], px[0]])
}

/// Lay out image | ground truth | prediction left to right on a white canvas.
pub fn compose_panels(image: &RgbImage, truth: &GrayImage, prediction: &GrayImage) -> RgbImage {
    let widths = [image.width(), truth.width(), prediction.width()];
    let height = image.height().max(truth.height()).max(prediction.height());
    let width = widths.iter().sum::<u32>() + PANEL_GAP * 2;
    let mut canvas = RgbImage::from_pixel(width, height, GAP_COLOR);

    let mut x0 = 0;
    for (x, y, px) in image.enumerate_pixels() {
        canvas.put_pixel(x0 + x, y, *px);
    }
    x0 += widths[0] + PANEL_GAP;
    for (x, y, px) in truth.enumerate_pixels() {
        canvas.put_pixel(x0 + x, y, gray_to_rgb(px));
    }
    x0 += widths[1] + PANEL_GAP;
    for (x, y, px) in prediction.enumerate_pixels() {
        canvas.put_pixel(x0 + x, y, gray_to_rgb(px));
    }
    canvas
}

/// Compose the three panels and write them to `path` (format from the extension).
pub fn save_panels(
    path: &Path,
    image: &RgbImage,
    truth: &GrayImage,
    prediction: &GrayImage,
) -> image::ImageResult<()> {
    compose_panels(image, truth, prediction).save(path)
}
