use super::geometry::{self, Point};
use super::{GeometryError, MatcherConfig};

/// One normalized ordering of a multistroke, ready for comparison.
#[derive(Clone, Debug, PartialEq)]
pub struct Unistroke {
    pub points: Vec<Point>,
    pub start_vector: Point,
    pub vector: Vec<f64>,
}

impl Unistroke {
    pub fn from_points(points: &[Point], config: &MatcherConfig) -> Result<Self, GeometryError> {
        let points = geometry::normalize(points, config)?;
        let start_vector = geometry::start_unit_vector(&points, config.start_angle_index());
        let vector = geometry::vectorize(&points, config.bounded_rotation_invariance)?;
        Ok(Self {
            points,
            start_vector,
            vector,
        })
    }
}

/// A labelled template: every stroke-order and direction variant of the
/// strokes it was recorded from.
#[derive(Clone, Debug, PartialEq)]
pub struct Multistroke {
    pub kind: i32,
    pub num_strokes: usize,
    pub unistrokes: Vec<Unistroke>,
    pub original_strokes: Vec<Vec<Point>>,
}

impl Multistroke {
    pub fn new(kind: i32, strokes: Vec<Vec<Point>>, config: &MatcherConfig) -> Result<Self, GeometryError> {
        if strokes.is_empty() {
            return Err(GeometryError::NoStrokes);
        }
        if let Some(short) = strokes.iter().find(|s| s.is_empty()) {
            return Err(GeometryError::TooFewPoints(short.len()));
        }

        let unistrokes = expand_unistrokes(&strokes)
            .iter()
            .map(|combined| Unistroke::from_points(combined, config))
            .collect::<Result<Vec<_>, _>>()?;
        log::debug!(
            "built template {kind} from {} strokes into {} unistrokes",
            strokes.len(),
            unistrokes.len()
        );

        Ok(Self {
            kind,
            num_strokes: strokes.len(),
            unistrokes,
            original_strokes: strokes,
        })
    }
}

/// Every stroke order, each with every combination of per-stroke reversal,
/// concatenated into single point sequences.
pub fn expand_unistrokes(strokes: &[Vec<Point>]) -> Vec<Vec<Point>> {
    let mut order: Vec<usize> = (0..strokes.len()).collect();
    let mut orders = Vec::new();
    heap_permute(strokes.len(), &mut order, &mut orders);

    let variants = 1usize << strokes.len();
    let mut out = Vec::with_capacity(orders.len() * variants);
    for order in &orders {
        for mask in 0..variants {
            let mut combined = Vec::new();
            for (position, &stroke) in order.iter().enumerate() {
                if mask & (1 << position) != 0 {
                    combined.extend(strokes[stroke].iter().rev().copied());
                } else {
                    combined.extend(strokes[stroke].iter().copied());
                }
            }
            out.push(combined);
        }
    }
    out
}

fn heap_permute(n: usize, order: &mut Vec<usize>, orders: &mut Vec<Vec<usize>>) {
    if n <= 1 {
        orders.push(order.clone());
        return;
    }
    for i in 0..n {
        heap_permute(n - 1, order, orders);
        let swap_with = if n % 2 == 1 { 0 } else { i };
        order.swap(swap_with, n - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stroke(points: &[(f64, f64)]) -> Vec<Point> {
        points.iter().copied().map(Point::from).collect()
    }

    #[test]
    fn expansion_covers_orders_and_directions() {
        let a = stroke(&[(0.0, 0.0), (10.0, 0.0)]);
        let b = stroke(&[(0.0, 5.0), (0.0, 20.0)]);
        let c = stroke(&[(4.0, 4.0), (9.0, 9.0)]);

        assert_eq!(expand_unistrokes(std::slice::from_ref(&a)).len(), 2);
        assert_eq!(expand_unistrokes(&[a.clone(), b.clone()]).len(), 8);

        let three = expand_unistrokes(&[a.clone(), b.clone(), c]);
        assert_eq!(three.len(), 48);
        for (i, x) in three.iter().enumerate() {
            assert!(three[i + 1..].iter().all(|y| y != x), "variant {i} repeated");
        }
    }

    #[test]
    fn single_stroke_expands_to_itself_and_reverse() {
        let a = stroke(&[(0.0, 0.0), (1.0, 2.0), (3.0, 3.0)]);
        let expanded = expand_unistrokes(std::slice::from_ref(&a));
        let reversed: Vec<Point> = a.iter().rev().copied().collect();
        assert!(expanded.contains(&a));
        assert!(expanded.contains(&reversed));
    }

    #[test]
    fn template_keeps_original_strokes() {
        let config = MatcherConfig::default();
        let strokes = vec![stroke(&[(0.0, 0.0), (0.0, 50.0), (30.0, 50.0)])];
        let template = Multistroke::new(7, strokes.clone(), &config).unwrap();
        assert_eq!(template.kind, 7);
        assert_eq!(template.num_strokes, 1);
        assert_eq!(template.unistrokes.len(), 2);
        assert_eq!(template.original_strokes, strokes);
        for u in &template.unistrokes {
            assert_eq!(u.points.len(), config.num_points);
            assert_eq!(u.vector.len(), config.num_points * 2);
        }
    }

    #[test]
    fn template_rejects_empty_or_degenerate_strokes() {
        let config = MatcherConfig::default();
        assert_eq!(Multistroke::new(1, Vec::new(), &config), Err(GeometryError::NoStrokes));
        assert_eq!(
            Multistroke::new(1, vec![Vec::new()], &config),
            Err(GeometryError::TooFewPoints(0))
        );
        assert!(Multistroke::new(1, vec![stroke(&[(2.0, 2.0), (2.0, 2.0)])], &config).is_err());
    }
}
