//! Zhang–Suen thinning, skeleton tracing and the raster drawing helpers used
//! to render masks and previews.

use image::{GrayImage, Luma};
use imageproc::contours::{self, BorderType, Contour};
use imageproc::drawing::{draw_line_segment_mut, draw_polygon_mut};
use imageproc::geometry::{arc_length, contour_area};
use imageproc::point::Point;
use rayon::prelude::*;

use crate::matcher;

pub const SKELETON_GRAY: u8 = 192;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Subiteration {
    First,
    Second,
}

/// Thins a binary mask in place until a full round deletes nothing.
/// Returns the number of rounds run, including the final idle one.
pub fn thin(mask: &mut GrayImage) -> usize {
    let mut rounds = 0;
    loop {
        rounds += 1;
        let first = thinning_pass(mask, Subiteration::First);
        let second = thinning_pass(mask, Subiteration::Second);
        if !first && !second {
            return rounds;
        }
    }
}

fn thinning_pass(mask: &mut GrayImage, pass: Subiteration) -> bool {
    let (width, height) = mask.dimensions();
    if width < 3 || height < 3 {
        return false;
    }
    let w = width as usize;
    let h = height as usize;

    let pixels: &[u8] = mask.as_raw();
    let marked: Vec<usize> = (1..h - 1)
        .into_par_iter()
        .flat_map_iter(|y| {
            (1..w - 1).filter_map(move |x| {
                let i = y * w + x;
                (pixels[i] != 0 && deletable(pixels, i, w, pass)).then_some(i)
            })
        })
        .collect();

    let buffer: &mut [u8] = mask;
    for &i in &marked {
        buffer[i] = 0;
    }
    !marked.is_empty()
}

fn deletable(pixels: &[u8], i: usize, w: usize, pass: Subiteration) -> bool {
    let on = |j: usize| u8::from(pixels[j] != 0);
    // Clockwise from north: p2, p3, ..., p9.
    let ring = [
        on(i - w),
        on(i - w + 1),
        on(i + 1),
        on(i + w + 1),
        on(i + w),
        on(i + w - 1),
        on(i - 1),
        on(i - w - 1),
    ];
    let transitions = (0..8)
        .filter(|&k| ring[k] == 0 && ring[(k + 1) % 8] == 1)
        .count();
    let filled: u8 = ring.iter().sum();
    let [p2, _, p4, _, p6, _, p8, _] = ring;
    let (m1, m2) = match pass {
        Subiteration::First => (p2 * p4 * p6, p4 * p6 * p8),
        Subiteration::Second => (p2 * p4 * p8, p2 * p6 * p8),
    };
    transitions == 1 && (2..=6).contains(&filled) && m1 == 0 && m2 == 0
}

/// What the thinned mask yields for classification.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SkeletonTrace {
    /// Border of the skeleton contour with the greatest closed arc length.
    pub stroke: Option<Vec<Point<i32>>>,
    pub holes: usize,
}

pub fn trace(skeleton: &GrayImage, min_hole_area: f64) -> SkeletonTrace {
    let found = contours::find_contours::<i32>(skeleton);
    SkeletonTrace {
        stroke: longest_contour(&found).map(|c| c.points.clone()),
        holes: count_holes(&found, min_hole_area),
    }
}

pub fn count_holes(found: &[Contour<i32>], min_area: f64) -> usize {
    found
        .iter()
        .filter(|c| c.border_type == BorderType::Hole && contour_area(&c.points) > min_area)
        .count()
}

pub fn longest_contour(found: &[Contour<i32>]) -> Option<&Contour<i32>> {
    let mut best: Option<(&Contour<i32>, f64)> = None;
    for contour in found {
        let length = arc_length(&contour.points, true);
        if best.is_none_or(|(_, l)| length > l) {
            best = Some((contour, length));
        }
    }
    best.map(|(contour, _)| contour)
}

pub fn to_stroke(points: &[Point<i32>]) -> Vec<matcher::Point> {
    points
        .iter()
        .map(|p| matcher::Point::new(f64::from(p.x), f64::from(p.y)))
        .collect()
}

pub fn fill_polygon(canvas: &mut GrayImage, points: &[Point<i32>], value: u8) {
    let mut poly = points.to_vec();
    while poly.len() > 1 && poly.first() == poly.last() {
        poly.pop();
    }
    match poly.len() {
        0 => {}
        1 | 2 => draw_outline(canvas, &poly, value),
        _ => draw_polygon_mut(canvas, &poly, Luma([value])),
    }
}

pub fn draw_outline(canvas: &mut GrayImage, points: &[Point<i32>], value: u8) {
    let color = Luma([value]);
    match points {
        [] => {}
        [p] => put_pixel_safe(canvas, p.x, p.y, value),
        _ => {
            for (i, a) in points.iter().enumerate() {
                let b = points[(i + 1) % points.len()];
                draw_line_segment_mut(
                    canvas,
                    (a.x as f32, a.y as f32),
                    (b.x as f32, b.y as f32),
                    color,
                );
            }
        }
    }
}

pub fn draw_skeleton(canvas: &mut GrayImage, stroke: &[Point<i32>]) {
    draw_outline(canvas, stroke, SKELETON_GRAY);
}

pub fn put_pixel_safe(canvas: &mut GrayImage, x: i32, y: i32, value: u8) {
    if x >= 0 && y >= 0 && (x as u32) < canvas.width() && (y as u32) < canvas.height() {
        canvas.put_pixel(x as u32, y as u32, Luma([value]));
    }
}
