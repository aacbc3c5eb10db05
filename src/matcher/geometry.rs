//! Point-sequence geometry shared by template construction and queries.
//!
//! Every function is pure: inputs are borrowed, results are fresh vectors.

use super::{GeometryError, MatcherConfig};

/// Golden ratio conjugate used by the angular search.
const PHI: f64 = 0.618_033_988_749_895;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(self, other: Point) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Point::new(x, y)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub width: f64,
    pub height: f64,
}

/// Runs the full normalization chain and returns the canonical sequence of
/// `config.num_points` points centred on the origin.
pub fn normalize(points: &[Point], config: &MatcherConfig) -> Result<Vec<Point>, GeometryError> {
    let resampled = resample(points, config.num_points)?;
    let radians = indicative_angle(&resampled);
    let rotated = rotate_by(&resampled, -radians);
    let mut scaled = scale_dim_to(&rotated, config.square_size, config.one_d_threshold)?;
    if config.bounded_rotation_invariance {
        scaled = rotate_by(&scaled, radians);
    }
    Ok(translate_to(&scaled, Point::ORIGIN))
}

pub fn path_length(points: &[Point]) -> f64 {
    points
        .windows(2)
        .map(|pair| pair[0].distance_to(pair[1]))
        .sum()
}

pub fn resample(points: &[Point], n: usize) -> Result<Vec<Point>, GeometryError> {
    if points.len() < 2 || n < 2 {
        return Err(GeometryError::TooFewPoints(points.len()));
    }
    let interval = path_length(points) / (n - 1) as f64;
    if !interval.is_finite() || interval <= 0.0 {
        return Err(GeometryError::ZeroLength);
    }

    let mut resampled = Vec::with_capacity(n);
    resampled.push(points[0]);

    let mut accumulated = 0.0;
    let mut prev = points[0];
    let mut i = 1;
    while i < points.len() && resampled.len() < n {
        let current = points[i];
        let d = prev.distance_to(current);
        if d > 0.0 && accumulated + d >= interval {
            let t = (interval - accumulated) / d;
            let q = Point::new(prev.x + t * (current.x - prev.x), prev.y + t * (current.y - prev.y));
            resampled.push(q);
            // q splits the segment; keep walking from it toward the same vertex.
            prev = q;
            accumulated = 0.0;
        } else {
            accumulated += d;
            prev = current;
            i += 1;
        }
    }

    // Rounding can leave us one interval short of the final vertex.
    let last = points[points.len() - 1];
    while resampled.len() < n {
        resampled.push(last);
    }
    Ok(resampled)
}

pub fn centroid(points: &[Point]) -> Point {
    if points.is_empty() {
        return Point::ORIGIN;
    }
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    let n = points.len() as f64;
    Point::new(sx / n, sy / n)
}

pub fn indicative_angle(points: &[Point]) -> f64 {
    let c = centroid(points);
    (c.y - points[0].y).atan2(c.x - points[0].x)
}

pub fn rotate_by(points: &[Point], radians: f64) -> Vec<Point> {
    let c = centroid(points);
    let (sin, cos) = radians.sin_cos();
    points
        .iter()
        .map(|p| {
            let dx = p.x - c.x;
            let dy = p.y - c.y;
            Point::new(dx * cos - dy * sin + c.x, dx * sin + dy * cos + c.y)
        })
        .collect()
}

pub fn bounding_box(points: &[Point]) -> Bounds {
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Bounds {
        min_x,
        min_y,
        width: max_x - min_x,
        height: max_y - min_y,
    }
}

/// Scales uniformly for one-dimensional strokes and per axis for filled shapes.
pub fn scale_dim_to(points: &[Point], size: f64, ratio_1d: f64) -> Result<Vec<Point>, GeometryError> {
    let b = bounding_box(points);
    let longest = b.width.max(b.height);
    if !longest.is_finite() || longest <= 0.0 {
        return Err(GeometryError::EmptyBounds);
    }
    let aspect = (b.width / b.height).min(b.height / b.width);
    let uniform = aspect.is_nan() || aspect <= ratio_1d;
    let (sx, sy) = if uniform {
        (size / longest, size / longest)
    } else {
        (size / b.width, size / b.height)
    };
    Ok(points.iter().map(|p| Point::new(p.x * sx, p.y * sy)).collect())
}

pub fn translate_to(points: &[Point], target: Point) -> Vec<Point> {
    let c = centroid(points);
    points
        .iter()
        .map(|p| Point::new(p.x + target.x - c.x, p.y + target.y - c.y))
        .collect()
}

/// Unit vector from the first point toward `points[index]`.
///
/// A zero-length start yields the zero vector, which fails every start-angle gate.
pub fn start_unit_vector(points: &[Point], index: usize) -> Point {
    let Some(first) = points.first() else {
        return Point::ORIGIN;
    };
    let target = points[index.min(points.len() - 1)];
    let vx = target.x - first.x;
    let vy = target.y - first.y;
    let len = (vx * vx + vy * vy).sqrt();
    if len <= f64::EPSILON {
        return Point::ORIGIN;
    }
    Point::new(vx / len, vy / len)
}

pub fn angle_between_unit_vectors(a: Point, b: Point) -> f64 {
    (a.x * b.x + a.y * b.y).clamp(-1.0, 1.0).acos()
}

/// Flattens the sequence into a unit-length `2n` vector, optionally snapped
/// to the nearest 45° base orientation first.
pub fn vectorize(points: &[Point], bounded_rotation_invariance: bool) -> Result<Vec<f64>, GeometryError> {
    let (mut cos, mut sin) = (1.0, 0.0);
    if bounded_rotation_invariance {
        if let Some(first) = points.first() {
            let indicative = first.y.atan2(first.x);
            let step = std::f64::consts::FRAC_PI_4;
            let base = step * ((indicative + step / 2.0) / step).floor();
            (sin, cos) = (base - indicative).sin_cos();
        }
    }

    let mut vector = Vec::with_capacity(points.len() * 2);
    let mut sum = 0.0;
    for p in points {
        let x = p.x * cos - p.y * sin;
        let y = p.y * cos + p.x * sin;
        vector.push(x);
        vector.push(y);
        sum += x * x + y * y;
    }

    let magnitude = sum.sqrt();
    if magnitude <= f64::EPSILON {
        return Err(GeometryError::ZeroMagnitude);
    }
    vector.iter_mut().for_each(|v| *v /= magnitude);
    Ok(vector)
}

/// Closed-form angular distance between two unit vectors at their best rotation.
pub fn optimal_cosine_distance(v1: &[f64], v2: &[f64]) -> f64 {
    debug_assert_eq!(v1.len(), v2.len(), "vector lengths must match");
    let mut a = 0.0;
    let mut b = 0.0;
    for (p, q) in v1.chunks_exact(2).zip(v2.chunks_exact(2)) {
        a += p[0] * q[0] + p[1] * q[1];
        b += p[0] * q[1] - p[1] * q[0];
    }
    let angle = if a == 0.0 {
        std::f64::consts::FRAC_PI_2.copysign(b)
    } else {
        (b / a).atan()
    };
    (a * angle.cos() + b * angle.sin()).clamp(-1.0, 1.0).acos()
}

pub fn path_distance(a: &[Point], b: &[Point]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "paths must have equal point counts");
    if a.is_empty() {
        return 0.0;
    }
    let total: f64 = a.iter().zip(b).map(|(p, q)| p.distance_to(*q)).sum();
    total / a.len() as f64
}

pub fn distance_at_angle(points: &[Point], template: &[Point], radians: f64) -> f64 {
    path_distance(&rotate_by(points, radians), template)
}

/// Golden-section search for the rotation in `[from, to]` minimizing the path distance.
pub fn distance_at_best_angle(
    points: &[Point],
    template: &[Point],
    mut from: f64,
    mut to: f64,
    threshold: f64,
) -> f64 {
    let mut x1 = PHI * from + (1.0 - PHI) * to;
    let mut f1 = distance_at_angle(points, template, x1);
    let mut x2 = (1.0 - PHI) * from + PHI * to;
    let mut f2 = distance_at_angle(points, template, x2);

    while (to - from).abs() > threshold {
        if f1 < f2 {
            to = x2;
            x2 = x1;
            f2 = f1;
            x1 = PHI * from + (1.0 - PHI) * to;
            f1 = distance_at_angle(points, template, x1);
        } else {
            from = x1;
            x1 = x2;
            f1 = f2;
            x2 = (1.0 - PHI) * from + PHI * to;
            f2 = distance_at_angle(points, template, x2);
        }
    }
    f1.min(f2)
}
