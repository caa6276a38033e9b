//! Grayscale image operations for motion measurement.

use image::{imageops, DynamicImage, GrayImage};

/// Gaussian sigma applied before differencing. Matches the spread of a
/// 21-tap kernel (`0.3 * ((21 - 1) / 2 - 1) + 0.8`).
pub const BLUR_SIGMA: f32 = 3.5;

/// Pixel difference above which a pixel counts as changed.
pub const DIFF_THRESHOLD: u8 = 25;

/// Convert any decoded image to 8-bit luma.
pub fn to_grayscale(image: &DynamicImage) -> GrayImage {
    image.to_luma8()
}

/// Gaussian blur with [`BLUR_SIGMA`].
pub fn gaussian_blur(image: &GrayImage) -> GrayImage {
    if image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    imageops::blur(image, BLUR_SIGMA)
}

/// Grayscale then blur: the representation used for differencing and detection.
pub fn prepare(image: &DynamicImage) -> GrayImage {
    gaussian_blur(&to_grayscale(image))
}

/// Number of pixels whose absolute difference exceeds [`DIFF_THRESHOLD`].
///
/// Returns `None` when the images have different dimensions.
pub fn changed_pixels(previous: &GrayImage, current: &GrayImage) -> Option<u64> {
    if previous.dimensions() != current.dimensions() {
        return None;
    }
    let count = previous
        .as_raw()
        .iter()
        .zip(current.as_raw())
        .filter(|(a, b)| a.abs_diff(**b) > DIFF_THRESHOLD)
        .count();
    Some(count as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_blur_preserves_flat_image() {
        let flat = GrayImage::from_pixel(30, 20, Luma([90]));
        let blurred = gaussian_blur(&flat);
        assert_eq!(blurred.dimensions(), (30, 20));
        assert!(blurred.pixels().all(|p| p[0].abs_diff(90) <= 1));
    }

    #[test]
    fn test_blur_spreads_a_point() {
        let mut image = GrayImage::from_pixel(41, 41, Luma([0]));
        image.put_pixel(20, 20, Luma([255]));
        let blurred = gaussian_blur(&image);
        assert!(blurred.get_pixel(20, 20)[0] < 255);
        assert!(blurred.get_pixel(20, 20)[0] >= blurred.get_pixel(22, 20)[0]);
        assert_eq!(blurred.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_blur_keeps_flat_frames_below_diff_threshold() {
        let a = gaussian_blur(&GrayImage::from_pixel(24, 16, Luma([40])));
        let b = gaussian_blur(&GrayImage::from_pixel(24, 16, Luma([40])));
        assert_eq!(changed_pixels(&a, &b), Some(0));
    }

    #[test]
    fn test_blur_empty_image() {
        let empty = GrayImage::new(0, 0);
        assert_eq!(gaussian_blur(&empty).dimensions(), (0, 0));
    }

    #[test]
    fn test_changed_pixels_threshold_is_strict() {
        let a = GrayImage::from_pixel(4, 4, Luma([100]));
        let mut b = a.clone();
        b.put_pixel(0, 0, Luma([125])); // diff 25, not counted
        b.put_pixel(1, 0, Luma([126])); // diff 26
        b.put_pixel(2, 0, Luma([50])); // diff 50
        assert_eq!(changed_pixels(&a, &b), Some(2));
    }

    #[test]
    fn test_changed_pixels_dimension_mismatch() {
        let a = GrayImage::new(4, 4);
        let b = GrayImage::new(4, 5);
        assert_eq!(changed_pixels(&a, &b), None);
    }
}
