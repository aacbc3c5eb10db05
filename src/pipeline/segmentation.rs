//! Foreground segmentation: HSV background subtraction fused with a skin-tone
//! blob heuristic, followed by a morphological opening.

use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use imageproc::distance_transform::Norm;
use rayon::prelude::*;

#[derive(Clone, Debug)]
pub struct SegmentationConfig {
    /// Frames are downscaled by an integer factor to roughly this width.
    pub target_width: u32,
    pub hue_threshold: u8,
    pub saturation_threshold: u8,
    pub value_threshold: u8,
    /// Blob hue band: hue at or below `blob_hue_lower` or at or above `blob_hue_upper`.
    pub blob_hue_lower: u8,
    pub blob_hue_upper: u8,
    pub blob_max_saturation: u8,
    pub hue_weight: u32,
    pub saturation_weight: u32,
    pub value_weight: u32,
    pub blob_weight: u32,
    pub vote_threshold: u32,
    /// Radius of the square opening kernel (1 = 3x3).
    pub opening_radius: u8,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            target_width: 160,
            hue_threshold: 50,
            saturation_threshold: 45,
            value_threshold: 10,
            blob_hue_lower: 30,
            blob_hue_upper: 225,
            blob_max_saturation: 128,
            hue_weight: 1,
            saturation_weight: 1,
            value_weight: 1,
            blob_weight: 3,
            vote_threshold: 3,
            opening_radius: 1,
        }
    }
}

impl SegmentationConfig {
    pub fn scale_factor(&self, width: u32) -> u32 {
        (width / self.target_width.max(1)).max(1)
    }

    /// Weighted vote for one HSV pixel against its background pixel.
    pub fn votes(&self, pixel: &[u8], background: &[u8]) -> u32 {
        let mut votes = 0;
        if pixel[0].abs_diff(background[0]) > self.hue_threshold {
            votes += self.hue_weight;
        }
        if pixel[1].abs_diff(background[1]) > self.saturation_threshold {
            votes += self.saturation_weight;
        }
        if pixel[2].abs_diff(background[2]) > self.value_threshold {
            votes += self.value_weight;
        }
        let hue_outside_band = pixel[0] <= self.blob_hue_lower || pixel[0] >= self.blob_hue_upper;
        if hue_outside_band && pixel[1] <= self.blob_max_saturation {
            votes += self.blob_weight;
        }
        votes
    }
}

/// Interleaved 3-channel HSV pixels, every channel on 0..=255.
#[derive(Clone, Debug, PartialEq)]
pub struct HsvImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl HsvImage {
    pub fn from_rgb(rgb: &RgbImage) -> Self {
        let (width, height) = rgb.dimensions();
        let mut data = vec![0u8; rgb.as_raw().len()];
        data.par_chunks_mut(3)
            .zip(rgb.as_raw().par_chunks_exact(3))
            .for_each(|(dst, src)| dst.copy_from_slice(&rgb_to_hsv(src[0], src[1], src[2])));
        Self { data, width, height }
    }
}

/// Full-range HSV conversion; hue 0..360° is mapped onto 0..=255.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> [u8; 3] {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = f32::from(max - min);
    let v = max;
    if max == 0 || delta == 0.0 {
        return [0, 0, v];
    }
    let s = (delta * 255.0 / f32::from(max)).round() as u8;

    let (r, g, b) = (f32::from(r), f32::from(g), f32::from(b));
    let max_f = f32::from(max);
    let mut hue = if max_f == r {
        60.0 * (g - b) / delta
    } else if max_f == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if hue < 0.0 {
        hue += 360.0;
    }
    let h = ((hue * 256.0 / 360.0).round() as u32 % 256) as u8;
    [h, s, v]
}

pub fn downscale(rgb: &RgbImage, config: &SegmentationConfig) -> RgbImage {
    let (width, height) = rgb.dimensions();
    let factor = config.scale_factor(width);
    if factor == 1 {
        return rgb.clone();
    }
    imageops::resize(rgb, width / factor, height / factor, FilterType::CatmullRom)
}

/// Binary foreground mask (255 = foreground) from an HSV frame and an
/// equally sized HSV background.
pub fn classify(hsv: &HsvImage, background: &[u8], config: &SegmentationConfig) -> GrayImage {
    debug_assert_eq!(hsv.data.len(), background.len());
    let mut mask = GrayImage::new(hsv.width, hsv.height);
    let pixels: &mut [u8] = &mut mask;
    pixels
        .par_iter_mut()
        .zip(hsv.data.par_chunks_exact(3).zip(background.par_chunks_exact(3)))
        .for_each(|(dst, (pixel, bg))| {
            *dst = if config.votes(pixel, bg) >= config.vote_threshold {
                255
            } else {
                0
            };
        });
    mask
}

pub fn open(mask: &GrayImage, config: &SegmentationConfig) -> GrayImage {
    imageproc::morphology::open(mask, Norm::LInf, config.opening_radius)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hsv_conversion_matches_reference_colors() {
        assert_eq!(rgb_to_hsv(0, 0, 0), [0, 0, 0]);
        assert_eq!(rgb_to_hsv(255, 255, 255), [0, 0, 255]);
        assert_eq!(rgb_to_hsv(255, 0, 0), [0, 255, 255]);
        assert_eq!(rgb_to_hsv(0, 255, 0), [85, 255, 255]);
        assert_eq!(rgb_to_hsv(0, 0, 255), [171, 255, 255]);
        assert_eq!(rgb_to_hsv(128, 64, 64), [0, 128, 128]);
    }

    #[test]
    fn votes_combine_channel_and_blob_weights() {
        let config = SegmentationConfig::default();
        let bg = [100, 200, 100];
        // Only value differs.
        assert_eq!(config.votes(&[100, 200, 150], &bg), 1);
        // Hue, saturation and value differ, no blob (high saturation).
        assert_eq!(config.votes(&[200, 140, 150], &bg), 3);
        // Skin-like: low hue, low saturation, far from background.
        assert_eq!(config.votes(&[10, 100, 200], &bg), 6);
        // Blob alone reaches the threshold.
        assert_eq!(config.votes(&[240, 128, 100], &[240, 128, 100]), 3);
    }

    #[test]
    fn classify_marks_changed_pixels() {
        let config = SegmentationConfig::default();
        let background = vec![100u8, 200, 100, 100, 200, 100];
        let hsv = HsvImage {
            data: vec![100, 200, 100, 10, 100, 200],
            width: 2,
            height: 1,
        };
        let mask = classify(&hsv, &background, &config);
        assert_eq!(mask.as_raw(), &vec![0, 255]);
    }

    #[test]
    fn downscale_uses_integer_factor() {
        let config = SegmentationConfig::default();
        assert_eq!(config.scale_factor(100), 1);
        assert_eq!(config.scale_factor(640), 4);
        assert_eq!(config.scale_factor(500), 3);
        let small = downscale(&RgbImage::new(640, 480), &config);
        assert_eq!(small.dimensions(), (160, 120));
        let odd = downscale(&RgbImage::new(500, 301), &config);
        assert_eq!(odd.dimensions(), (166, 100));
    }

    #[test]
    fn opening_removes_specks_and_keeps_blocks() {
        let config = SegmentationConfig::default();
        let mut mask = GrayImage::new(20, 20);
        mask.put_pixel(2, 2, image::Luma([255]));
        for y in 8..16 {
            for x in 8..16 {
                mask.put_pixel(x, y, image::Luma([255]));
            }
        }
        let opened = open(&mask, &config);
        assert_eq!(opened.get_pixel(2, 2)[0], 0);
        assert_eq!(opened.get_pixel(10, 10)[0], 255);
        assert_eq!(opened.get_pixel(8, 8)[0], 255);
    }
}
