use image::GrayImage;
use imageproc::contours::{BorderType, find_contours};
use imageproc::geometry::{approximate_polygon_dp, contour_area};
use imageproc::point::Point;

use crate::pipeline::skeleton::{draw_outline, fill_polygon};

#[derive(Clone, Debug)]
pub struct ContourConfig {
    /// Regions at or below this area (pixels) are dropped.
    pub min_area: f64,
    pub approx_epsilon: f64,
}

impl Default for ContourConfig {
    fn default() -> Self {
        Self {
            min_area: 200.0,
            approx_epsilon: 4.5,
        }
    }
}

/// Orientation fix-up applied to contour points instead of rotating whole frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameRotation {
    #[default]
    None,
    /// For portrait-mounted cameras: transpose then flip horizontally.
    Clockwise90,
}

impl FrameRotation {
    pub fn dimensions(self, width: u32, height: u32) -> (u32, u32) {
        match self {
            FrameRotation::None => (width, height),
            FrameRotation::Clockwise90 => (height, width),
        }
    }

    /// Maps a point of a `width x height` frame into the rotated frame.
    pub fn apply(self, p: Point<i32>, height: u32) -> Point<i32> {
        match self {
            FrameRotation::None => p,
            FrameRotation::Clockwise90 => Point::new(height as i32 - 1 - p.y, p.x),
        }
    }

    pub fn rotate_image(self, image: &image::DynamicImage) -> image::DynamicImage {
        match self {
            FrameRotation::None => image.clone(),
            FrameRotation::Clockwise90 => image.rotate90(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    pub outline: Vec<Point<i32>>,
    pub simplified: Vec<Point<i32>>,
    pub is_hole: bool,
}

pub fn extract_regions(mask: &GrayImage, config: &ContourConfig, rotation: FrameRotation) -> Vec<Region> {
    let height = mask.height();
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| contour_area(&c.points) > config.min_area)
        .map(|c| {
            let outline: Vec<Point<i32>> = c.points.iter().map(|&p| rotation.apply(p, height)).collect();
            let simplified = approximate_closed(&outline, config.approx_epsilon);
            Region {
                outline,
                simplified,
                is_hole: c.border_type == BorderType::Hole,
            }
        })
        .collect()
}

/// Douglas–Peucker over a closed curve, split at the vertex farthest from
/// the first one so neither half has coincident end points.
pub fn approximate_closed(points: &[Point<i32>], epsilon: f64) -> Vec<Point<i32>> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let first = points[0];
    let far = points
        .iter()
        .enumerate()
        .max_by_key(|(_, p)| (p.x - first.x).pow(2) + (p.y - first.y).pow(2))
        .map_or(0, |(i, _)| i);
    if far == 0 {
        return vec![first];
    }

    let mut result = approximate_polygon_dp(&points[..=far], epsilon, false);
    let mut back_half = points[far..].to_vec();
    back_half.push(first);
    let tail = approximate_polygon_dp(&back_half, epsilon, false);
    result.pop();
    result.extend(tail);
    result.pop();
    result
}

/// Renders regions as a filled mask: outer borders are filled, hole borders
/// cut their interior back out while keeping the border pixels.
pub fn render_mask(regions: &[Region], width: u32, height: u32, simplified: bool) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    for region in regions {
        let points = if simplified {
            &region.simplified
        } else {
            &region.outline
        };
        if region.is_hole {
            fill_polygon(&mut mask, points, 0);
            draw_outline(&mut mask, points, 255);
        } else {
            fill_polygon(&mut mask, points, 255);
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn filled(width: u32, height: u32, inside: impl Fn(i32, i32) -> bool) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            Luma([if inside(x as i32, y as i32) { 255 } else { 0 }])
        })
    }

    #[test]
    fn small_regions_are_dropped() {
        let mask = filled(60, 40, |x, y| {
            ((2..6).contains(&x) && (2..6).contains(&y)) || ((20..50).contains(&x) && (10..35).contains(&y))
        });
        let regions = extract_regions(&mask, &ContourConfig::default(), FrameRotation::None);
        assert_eq!(regions.len(), 1);
        assert!(!regions[0].is_hole);
        assert_eq!(regions[0].simplified.len(), 4);
    }

    #[test]
    fn holes_are_kept_and_carved_back_out() {
        let mask = filled(80, 80, |x, y| {
            let inside_outer = (5..75).contains(&x) && (5..75).contains(&y);
            let inside_hole = (25..55).contains(&x) && (25..55).contains(&y);
            inside_outer && !inside_hole
        });
        let regions = extract_regions(&mask, &ContourConfig::default(), FrameRotation::None);
        assert_eq!(regions.iter().filter(|r| r.is_hole).count(), 1);
        assert_eq!(regions.iter().filter(|r| !r.is_hole).count(), 1);

        let rendered = render_mask(&regions, 80, 80, true);
        assert_eq!(rendered.get_pixel(40, 40)[0], 0);
        assert_eq!(rendered.get_pixel(10, 10)[0], 255);
        assert_eq!(rendered.get_pixel(24, 40)[0], 255);
        assert_eq!(rendered.get_pixel(2, 2)[0], 0);
    }

    #[test]
    fn rotation_transposes_points_and_dimensions() {
        let rotation = FrameRotation::Clockwise90;
        assert_eq!(rotation.dimensions(160, 120), (120, 160));
        assert_eq!(rotation.apply(Point::new(0, 0), 120), Point::new(119, 0));
        assert_eq!(rotation.apply(Point::new(159, 119), 120), Point::new(0, 159));
        assert_eq!(FrameRotation::None.apply(Point::new(3, 4), 120), Point::new(3, 4));
    }

    #[test]
    fn rotated_regions_fit_rotated_frame() {
        let mask = filled(160, 120, |x, y| (10..60).contains(&x) && (10..40).contains(&y));
        let regions = extract_regions(&mask, &ContourConfig::default(), FrameRotation::Clockwise90);
        let (w, h) = FrameRotation::Clockwise90.dimensions(160, 120);
        for p in &regions[0].outline {
            assert!(p.x >= 0 && (p.x as u32) < w && p.y >= 0 && (p.y as u32) < h);
        }
        let rendered = render_mask(&regions, w, h, false);
        // Original (20, 20) lands at (119 - 20, 20).
        assert_eq!(rendered.get_pixel(99, 20)[0], 255);
        assert_eq!(rendered.get_pixel(20, 20)[0], 0);
    }

    #[test]
    fn approximation_of_closed_curve_keeps_corners() {
        let mut square = Vec::new();
        for x in 0..10 {
            square.push(Point::new(x, 0));
        }
        for y in 0..10 {
            square.push(Point::new(10, y));
        }
        for x in (1..=10).rev() {
            square.push(Point::new(x, 10));
        }
        for y in (1..=10).rev() {
            square.push(Point::new(0, y));
        }
        let simplified = approximate_closed(&square, 1.0);
        assert_eq!(simplified.len(), 4);
        for corner in [Point::new(0, 0), Point::new(10, 0), Point::new(10, 10), Point::new(0, 10)] {
            assert!(simplified.contains(&corner), "missing {corner:?}");
        }
        assert_eq!(approximate_closed(&square[..2], 1.0), square[..2].to_vec());
    }
}
