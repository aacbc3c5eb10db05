//! $N-style multistroke matcher.
//!
//! Templates are expanded into every stroke order and direction up front, so
//! a query is a single normalized unistroke compared against each variant.

pub mod geometry;
pub mod template;

use thiserror::Error;

pub use geometry::Point;
pub use template::{Multistroke, Unistroke};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GeometryError {
    #[error("stroke needs at least two points, got {0}")]
    TooFewPoints(usize),
    #[error("stroke has zero path length")]
    ZeroLength,
    #[error("stroke collapses to a single location")]
    EmptyBounds,
    #[error("normalized vector has zero magnitude")]
    ZeroMagnitude,
    #[error("no strokes supplied")]
    NoStrokes,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MatchStrategy {
    /// Golden-section search over the bounded rotation range.
    #[default]
    GoldenSection,
    /// Closed-form cosine distance between unit vectors.
    Protractor,
}

#[derive(Clone, Debug)]
pub struct MatcherConfig {
    pub num_points: usize,
    pub square_size: f64,
    /// Aspect ratio at or below which a stroke is scaled uniformly.
    pub one_d_threshold: f64,
    pub bounded_rotation_invariance: bool,
    pub angle_range: f64,
    pub angle_precision: f64,
    pub start_angle_threshold: f64,
    pub strategy: MatchStrategy,
    pub require_same_stroke_count: bool,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            num_points: 96,
            square_size: 160.0,
            one_d_threshold: 0.25,
            bounded_rotation_invariance: true,
            angle_range: 45f64.to_radians(),
            angle_precision: 2f64.to_radians(),
            start_angle_threshold: 30f64.to_radians(),
            strategy: MatchStrategy::GoldenSection,
            require_same_stroke_count: false,
        }
    }
}

impl MatcherConfig {
    pub fn start_angle_index(&self) -> usize {
        self.num_points / 8
    }

    pub fn half_diagonal(&self) -> f64 {
        0.5 * (2.0 * self.square_size * self.square_size).sqrt()
    }
}

/// Restricts which template kinds a query may be compared with.
#[derive(Clone, Copy, Debug, Default)]
pub enum CandidateFilter<'a> {
    #[default]
    All,
    Kinds(&'a [i32]),
}

impl CandidateFilter<'_> {
    pub fn allows(&self, kind: i32) -> bool {
        match self {
            CandidateFilter::All => true,
            CandidateFilter::Kinds(kinds) => kinds.contains(&kind),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchResult {
    pub kind: i32,
    pub score: f64,
    pub distance: f64,
}

#[derive(Clone, Debug, Default)]
pub struct MultistrokeMatcher {
    config: MatcherConfig,
}

impl MultistrokeMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    pub fn build_template(&self, kind: i32, strokes: Vec<Vec<Point>>) -> Result<Multistroke, GeometryError> {
        Multistroke::new(kind, strokes, &self.config)
    }

    /// Finds the closest template among those the filter allows.
    ///
    /// Returns `None` when the query cannot be normalized or no candidate
    /// passes the stroke-count and start-angle gates.
    pub fn recognize<'t>(
        &self,
        strokes: &[Vec<Point>],
        templates: impl IntoIterator<Item = &'t Multistroke>,
        filter: CandidateFilter<'_>,
    ) -> Option<MatchResult> {
        let combined: Vec<Point> = strokes.iter().flatten().copied().collect();
        let query = match Unistroke::from_points(&combined, &self.config) {
            Ok(query) => query,
            Err(err) => {
                log::debug!("query stroke rejected: {err}");
                return None;
            }
        };

        let mut best: Option<(i32, f64)> = None;
        for template in templates {
            if !filter.allows(template.kind) {
                continue;
            }
            if self.config.require_same_stroke_count && template.num_strokes != strokes.len() {
                continue;
            }
            for variant in &template.unistrokes {
                let start_angle = geometry::angle_between_unit_vectors(query.start_vector, variant.start_vector);
                if start_angle > self.config.start_angle_threshold {
                    continue;
                }
                let distance = self.distance(&query, variant);
                if best.is_none_or(|(_, b)| distance < b) {
                    best = Some((template.kind, distance));
                }
            }
        }

        let (kind, distance) = best?;
        let score = match self.config.strategy {
            MatchStrategy::GoldenSection => 1.0 - distance / self.config.half_diagonal(),
            MatchStrategy::Protractor => 1.0 / distance,
        };
        log::trace!("best template {kind} at distance {distance:.4} (score {score:.4})");
        Some(MatchResult { kind, score, distance })
    }

    fn distance(&self, query: &Unistroke, variant: &Unistroke) -> f64 {
        match self.config.strategy {
            MatchStrategy::GoldenSection => geometry::distance_at_best_angle(
                &query.points,
                &variant.points,
                -self.config.angle_range,
                self.config.angle_range,
                self.config.angle_precision,
            ),
            MatchStrategy::Protractor => geometry::optimal_cosine_distance(&variant.vector, &query.vector),
        }
    }
}
