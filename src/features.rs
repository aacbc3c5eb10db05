//! Per-contour hand features: finger defects, screen quadrant and the
//! angular properties the classifier keys on.

use std::collections::VecDeque;

use image::GrayImage;
use imageproc::geometry::convex_hull;
use imageproc::point::Point;

use crate::matcher;
use crate::pipeline::skeleton::{draw_outline, put_pixel_safe};

#[derive(Clone, Debug)]
pub struct FeatureConfig {
    /// Defects shallower than this are filled in as noise.
    pub shallow_depth: f64,
    pub finger_depth: f64,
    /// Degrees.
    pub max_finger_angle: f64,
    /// Open band of bisection angles, in degrees, counted as pointing vertically.
    pub narrow_bisect_band: (f64, f64),
    pub narrow_max_angle: f64,
    pub min_hole_area: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            shallow_depth: 20.0,
            finger_depth: 20.0,
            max_finger_angle: 120.0,
            narrow_bisect_band: (75.0, 105.0),
            narrow_max_angle: 60.0,
            min_hole_area: 750.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    NoDirection,
    Horizontal,
    Vertical,
}

/// A concavity deep and narrow enough to sit between two fingers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FingerDefect {
    /// Direction of the inner point as seen from the chord midpoint, degrees.
    pub bisect_angle: f64,
    /// Angle at the inner point between the chord ends, degrees.
    pub interior_angle: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PoseFeatures {
    pub defects: Vec<FingerDefect>,
    pub num_holes: usize,
    pub narrow_vertical_angle: bool,
    pub top_screen: bool,
    pub left_screen: bool,
    pub skeleton: Option<Vec<matcher::Point>>,
}

impl PoseFeatures {
    pub fn finger_defects(&self) -> usize {
        self.defects.len()
    }

    /// Majority orientation of the recorded defects; ties count as vertical.
    pub fn direction(&self) -> Direction {
        if self.defects.is_empty() {
            return Direction::NoDirection;
        }
        let vertical = self
            .defects
            .iter()
            .filter(|d| d.bisect_angle > 45.0 && d.bisect_angle < 135.0)
            .count();
        if 2 * vertical >= self.defects.len() {
            Direction::Vertical
        } else {
            Direction::Horizontal
        }
    }

    pub fn check_for_u(&self) -> bool {
        self.defects.iter().any(|d| {
            d.bisect_angle > 65.0 && d.bisect_angle < 100.0 && d.interior_angle > 60.0 && d.interior_angle < 90.0
        })
    }

    /// Combines per-contour features in contour order.
    ///
    /// Counts add up, defect lists concatenate and the narrow flag is OR-ed.
    /// Quadrant flags come from the first contour alone, so a frame with
    /// several blobs reports the quadrant of whichever was traced first.
    pub fn merge(features: Vec<PoseFeatures>) -> PoseFeatures {
        let mut iter = features.into_iter();
        let Some(mut merged) = iter.next() else {
            return PoseFeatures::default();
        };
        for f in iter {
            merged.defects.extend(f.defects);
            merged.num_holes += f.num_holes;
            merged.narrow_vertical_angle |= f.narrow_vertical_angle;
        }
        merged
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConvexityDefect {
    pub start: usize,
    pub end: usize,
    pub farthest: usize,
    pub depth: f64,
}

pub fn convex_hull_indices(contour: &[Point<i32>]) -> Vec<usize> {
    let mut indices: Vec<usize> = convex_hull(contour)
        .iter()
        .filter_map(|h| contour.iter().position(|p| p == h))
        .collect();
    indices.sort_unstable();
    indices.dedup();
    indices
}

/// For each pair of cyclically adjacent hull vertices, the contour point
/// between them farthest from their chord.
pub fn convexity_defects(contour: &[Point<i32>], hull: &[usize]) -> Vec<ConvexityDefect> {
    let n = contour.len();
    let mut defects = Vec::new();
    if hull.len() < 2 {
        return defects;
    }
    for (k, &start) in hull.iter().enumerate() {
        let end = hull[(k + 1) % hull.len()];
        let a = to_f64(contour[start]);
        let b = to_f64(contour[end]);
        let mut best: Option<(usize, f64)> = None;
        let mut i = (start + 1) % n;
        while i != end {
            let depth = distance_to_line(to_f64(contour[i]), a, b);
            if best.is_none_or(|(_, d)| depth > d) {
                best = Some((i, depth));
            }
            i = (i + 1) % n;
        }
        if let Some((farthest, depth)) = best.filter(|&(_, d)| d > 0.0) {
            defects.push(ConvexityDefect {
                start,
                end,
                farthest,
                depth,
            });
        }
    }
    defects
}

pub fn angle(p1: matcher::Point, center: matcher::Point, p2: matcher::Point) -> f64 {
    let (v1x, v1y) = (p1.x - center.x, p1.y - center.y);
    let (v2x, v2y) = (p2.x - center.x, p2.y - center.y);
    let len = (v1x * v1x + v1y * v1y).sqrt() * (v2x * v2x + v2y * v2y).sqrt();
    if len == 0.0 {
        return 0.0;
    }
    ((v1x * v2x + v1y * v2y) / len).clamp(-1.0, 1.0).acos().to_degrees()
}

/// Angle between the +x axis and `center`, measured at the midpoint of `p1 p2`.
pub fn bisection_angle(p1: matcher::Point, center: matcher::Point, p2: matcher::Point) -> f64 {
    let mid = matcher::Point::new((p1.x + p2.x) / 2.0, (p1.y + p2.y) / 2.0);
    angle(matcher::Point::new(mid.x + 1.0, mid.y), mid, center)
}

/// Area-weighted centroid of a closed polygon; `None` for zero area.
pub fn centroid(contour: &[Point<i32>]) -> Option<matcher::Point> {
    let (mut m00, mut m10, mut m01) = (0.0, 0.0, 0.0);
    for (i, p) in contour.iter().enumerate() {
        let q = contour[(i + 1) % contour.len()];
        let (x0, y0) = (f64::from(p.x), f64::from(p.y));
        let (x1, y1) = (f64::from(q.x), f64::from(q.y));
        let cross = x0 * y1 - x1 * y0;
        m00 += cross;
        m10 += (x0 + x1) * cross;
        m01 += (y0 + y1) * cross;
    }
    if m00 == 0.0 {
        return None;
    }
    // m00 carries 1/2, the first moments 1/6.
    Some(matcher::Point::new(m10 / (3.0 * m00), m01 / (3.0 * m00)))
}

/// Extracts features from one simplified outer contour.
///
/// Shallow defects are flood filled into `mask`, which is the mask later
/// thinned into the skeleton. Returns `None` when the hull is too small.
pub fn extract(contour: &[Point<i32>], mask: &mut GrayImage, config: &FeatureConfig) -> Option<PoseFeatures> {
    let hull = convex_hull_indices(contour);
    if hull.len() <= 3 {
        return None;
    }

    let mut features = PoseFeatures::default();
    let defects = convexity_defects(contour, &hull);
    if !defects.is_empty() {
        let hull_points: Vec<Point<i32>> = hull.iter().map(|&i| contour[i]).collect();
        let wall = raise_wall(mask, &hull_points);

        for defect in &defects {
            let start = to_f64(contour[defect.start]);
            let end = to_f64(contour[defect.end]);
            let inner = to_f64(contour[defect.farthest]);
            let interior = angle(start, inner, end);

            if defect.depth < config.shallow_depth {
                let seed_x = (start.x + end.x + inner.x) / 3.0;
                let seed_y = (start.y + end.y + inner.y) / 3.0;
                let region = FillBounds::around(&[start, end, inner]);
                flood_fill(mask, seed_x as i32, seed_y as i32, region);
            } else if defect.depth > config.finger_depth && interior < config.max_finger_angle {
                let bisect = bisection_angle(start, inner, end);
                let (low, high) = config.narrow_bisect_band;
                if bisect > low && bisect < high && interior < config.narrow_max_angle {
                    features.narrow_vertical_angle = true;
                }
                features.defects.push(FingerDefect {
                    bisect_angle: bisect,
                    interior_angle: interior,
                });
            }
        }

        for (x, y) in wall {
            mask.put_pixel(x, y, image::Luma([0]));
        }
    }

    if let Some(c) = centroid(contour) {
        features.left_screen = c.x < f64::from(mask.width()) / 2.0;
        features.top_screen = c.y < f64::from(mask.height()) / 2.0;
    }
    log::trace!(
        "contour with {} points: {} finger defects, top={} left={}",
        contour.len(),
        features.finger_defects(),
        features.top_screen,
        features.left_screen
    );
    Some(features)
}

/// Draws the hull outline as a fill barrier and returns the pixels it turned on.
fn raise_wall(mask: &mut GrayImage, hull: &[Point<i32>]) -> Vec<(u32, u32)> {
    let before = mask.clone();
    draw_outline(mask, hull, 255);
    mask.enumerate_pixels()
        .filter(|(x, y, p)| p[0] != 0 && before.get_pixel(*x, *y)[0] == 0)
        .map(|(x, y, _)| (x, y))
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FillBounds {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl FillBounds {
    pub fn around(points: &[matcher::Point]) -> Self {
        let bounds = matcher::geometry::bounding_box(points);
        Self {
            min_x: bounds.min_x.floor() as i32,
            min_y: bounds.min_y.floor() as i32,
            max_x: (bounds.min_x + bounds.width).ceil() as i32,
            max_y: (bounds.min_y + bounds.height).ceil() as i32,
        }
    }

    fn contains(&self, x: i32, y: i32) -> bool {
        (self.min_x..=self.max_x).contains(&x) && (self.min_y..=self.max_y).contains(&y)
    }
}

/// 4-connected fill of the background region containing the seed, clipped
/// to `region` so a seed that slipped past the hull wall stays local.
pub fn flood_fill(mask: &mut GrayImage, x: i32, y: i32, region: FillBounds) {
    let (width, height) = mask.dimensions();
    let inside = |x: i32, y: i32| {
        x >= 0 && y >= 0 && (x as u32) < width && (y as u32) < height && region.contains(x, y)
    };
    if !inside(x, y) || mask.get_pixel(x as u32, y as u32)[0] != 0 {
        return;
    }
    let mut queue = VecDeque::from([(x, y)]);
    put_pixel_safe(mask, x, y, 255);
    while let Some((cx, cy)) = queue.pop_front() {
        for (nx, ny) in [(cx + 1, cy), (cx - 1, cy), (cx, cy + 1), (cx, cy - 1)] {
            if inside(nx, ny) && mask.get_pixel(nx as u32, ny as u32)[0] == 0 {
                put_pixel_safe(mask, nx, ny, 255);
                queue.push_back((nx, ny));
            }
        }
    }
}

fn to_f64(p: Point<i32>) -> matcher::Point {
    matcher::Point::new(f64::from(p.x), f64::from(p.y))
}

fn distance_to_line(p: matcher::Point, a: matcher::Point, b: matcher::Point) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len = (dx * dx + dy * dy).sqrt();
    if len == 0.0 {
        return p.distance_to(a);
    }
    ((p.x - a.x) * dy - (p.y - a.y) * dx).abs() / len
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::skeleton::fill_polygon;

    fn poly(points: &[(i32, i32)]) -> Vec<Point<i32>> {
        points.iter().map(|&(x, y)| Point::new(x, y)).collect()
    }

    fn mask_for(width: u32, height: u32, contour: &[Point<i32>]) -> GrayImage {
        let mut mask = GrayImage::new(width, height);
        fill_polygon(&mut mask, contour, 255);
        mask
    }

    fn defect(bisect_angle: f64, interior_angle: f64) -> FingerDefect {
        FingerDefect {
            bisect_angle,
            interior_angle,
        }
    }

    #[test]
    fn angles_match_hand_computed_values() {
        let o = matcher::Point::ORIGIN;
        let right = matcher::Point::new(1.0, 0.0);
        let up = matcher::Point::new(0.0, 5.0);
        assert!((angle(right, o, up) - 90.0).abs() < 1e-9);
        assert!((angle(right, o, matcher::Point::new(-2.0, 0.0)) - 180.0).abs() < 1e-9);
        assert_eq!(angle(o, o, up), 0.0);

        let start = matcher::Point::new(10.0, 10.0);
        let end = matcher::Point::new(70.0, 10.0);
        let inner = matcher::Point::new(40.0, 60.0);
        assert!((bisection_angle(start, inner, end) - 90.0).abs() < 1e-9);
        assert!((bisection_angle(start, matcher::Point::new(90.0, 10.0), end)).abs() < 1e-9);
    }

    #[test]
    fn defects_found_between_hull_vertices() {
        let contour = poly(&[(10, 10), (30, 10), (40, 60), (50, 10), (70, 10), (70, 90), (10, 90)]);
        let hull = convex_hull_indices(&contour);
        assert_eq!(hull, vec![0, 4, 5, 6]);
        let defects = convexity_defects(&contour, &hull);
        assert_eq!(defects.len(), 1);
        assert_eq!((defects[0].start, defects[0].end, defects[0].farthest), (0, 4, 2));
        assert!((defects[0].depth - 50.0).abs() < 1e-9);
    }

    #[test]
    fn wide_notch_is_a_u_shaped_finger_gap() {
        let contour = poly(&[(10, 10), (30, 10), (40, 60), (50, 10), (70, 10), (70, 90), (10, 90)]);
        let mut mask = mask_for(160, 120, &contour);
        let features = extract(&contour, &mut mask, &FeatureConfig::default()).unwrap();
        assert_eq!(features.finger_defects(), 1);
        assert!(!features.narrow_vertical_angle);
        assert!(features.check_for_u());
        assert_eq!(features.direction(), Direction::Vertical);
        assert!(features.top_screen);
        assert!(features.left_screen);
    }

    #[test]
    fn narrow_notch_sets_vertical_flag() {
        let contour = poly(&[(30, 10), (35, 10), (40, 60), (45, 10), (50, 10), (50, 90), (30, 90)]);
        let mut mask = mask_for(160, 120, &contour);
        let features = extract(&contour, &mut mask, &FeatureConfig::default()).unwrap();
        assert_eq!(features.finger_defects(), 1);
        assert!(features.narrow_vertical_angle);
        assert!(!features.check_for_u());
    }

    #[test]
    fn shallow_notch_is_filled_not_counted() {
        let contour = poly(&[(10, 10), (35, 10), (40, 20), (45, 10), (70, 10), (70, 90), (10, 90)]);
        let mut mask = mask_for(160, 120, &contour);
        assert_eq!(mask.get_pixel(40, 13)[0], 0);

        let features = extract(&contour, &mut mask, &FeatureConfig::default()).unwrap();
        assert_eq!(features.finger_defects(), 0);
        assert_eq!(mask.get_pixel(40, 13)[0], 255);
        // Hull wall pixels are taken out again and the outside stays untouched.
        assert_eq!(mask.get_pixel(40, 10)[0], 0);
        assert_eq!(mask.get_pixel(100, 100)[0], 0);
    }

    #[test]
    fn flood_fill_stays_inside_bounds() {
        let mut mask = GrayImage::new(40, 40);
        let region = FillBounds::around(&[
            matcher::Point::new(5.0, 5.0),
            matcher::Point::new(14.5, 5.0),
            matcher::Point::new(10.0, 9.2),
        ]);
        assert_eq!(region, FillBounds { min_x: 5, min_y: 5, max_x: 15, max_y: 10 });

        flood_fill(&mut mask, 8, 7, region);
        let filled = mask.pixels().filter(|p| p[0] == 255).count();
        assert_eq!(filled, 11 * 6);
        assert_eq!(mask.get_pixel(20, 20)[0], 0);

        flood_fill(&mut mask, 30, 30, region);
        assert_eq!(mask.pixels().filter(|p| p[0] == 255).count(), filled);
    }

    #[test]
    fn small_hull_yields_no_features() {
        let triangle = poly(&[(10, 10), (60, 10), (30, 50)]);
        let mut mask = mask_for(100, 100, &triangle);
        assert!(extract(&triangle, &mut mask, &FeatureConfig::default()).is_none());
    }

    #[test]
    fn quadrant_follows_centroid() {
        let square = poly(&[(100, 70), (140, 70), (140, 110), (120, 112), (100, 110)]);
        let mut mask = mask_for(160, 120, &square);
        let features = extract(&square, &mut mask, &FeatureConfig::default()).unwrap();
        assert!(!features.top_screen);
        assert!(!features.left_screen);

        let c = centroid(&poly(&[(0, 0), (10, 0), (10, 10), (0, 10)])).unwrap();
        assert!((c.x - 5.0).abs() < 1e-9 && (c.y - 5.0).abs() < 1e-9);
        assert!(centroid(&poly(&[(0, 0), (5, 5), (10, 10)])).is_none());
    }

    #[test]
    fn direction_rounds_half_to_vertical() {
        let mut features = PoseFeatures::default();
        assert_eq!(features.direction(), Direction::NoDirection);

        features.defects = vec![defect(10.0, 50.0)];
        assert_eq!(features.direction(), Direction::Horizontal);
        features.defects = vec![defect(10.0, 50.0), defect(90.0, 50.0)];
        assert_eq!(features.direction(), Direction::Vertical);
        features.defects = vec![defect(10.0, 50.0), defect(140.0, 50.0), defect(90.0, 50.0)];
        assert_eq!(features.direction(), Direction::Horizontal);
        features.defects = vec![defect(45.0, 50.0)];
        assert_eq!(features.direction(), Direction::Horizontal);
    }

    #[test]
    fn u_check_uses_both_angles_of_the_same_defect() {
        let features = PoseFeatures {
            defects: vec![defect(80.0, 30.0), defect(20.0, 70.0)],
            ..PoseFeatures::default()
        };
        assert!(!features.check_for_u());
    }

    #[test]
    fn merge_takes_quadrant_from_first_contour() {
        let first = PoseFeatures {
            defects: vec![defect(90.0, 40.0)],
            num_holes: 1,
            top_screen: true,
            left_screen: false,
            ..PoseFeatures::default()
        };
        let second = PoseFeatures {
            defects: vec![defect(10.0, 70.0), defect(20.0, 80.0)],
            narrow_vertical_angle: true,
            top_screen: false,
            left_screen: true,
            ..PoseFeatures::default()
        };
        let merged = PoseFeatures::merge(vec![first, second]);
        assert_eq!(merged.finger_defects(), 3);
        assert_eq!(merged.num_holes, 1);
        assert!(merged.narrow_vertical_angle);
        assert!(merged.top_screen);
        assert!(!merged.left_screen);
        assert_eq!(merged.defects[1], defect(10.0, 70.0));

        assert_eq!(PoseFeatures::merge(Vec::new()), PoseFeatures::default());
    }
}
