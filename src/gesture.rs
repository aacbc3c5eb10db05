//! Pose classification: a fixed decision tree over hand features, with the
//! stroke matcher deciding between poses the features cannot tell apart.

use crate::features::{Direction, PoseFeatures};
use crate::matcher::{self, CandidateFilter, MatcherConfig, MultistrokeMatcher};
use crate::templates::Pose;
use crate::types::PoseKind;

pub const ONE_FINGER_POSES: &[PoseKind] = &[PoseKind::L, PoseKind::InverseL, PoseKind::TopDownL, PoseKind::U];
pub const HORIZONTAL_POSES: &[PoseKind] = &[PoseKind::C, PoseKind::Minus];
pub const TWO_FINGER_POSES: &[PoseKind] = &[PoseKind::L, PoseKind::InverseL, PoseKind::TopDownL, PoseKind::W];
pub const BOTTOM_LEFT_POSES: &[PoseKind] = &[PoseKind::L, PoseKind::W];
pub const BOTTOM_RIGHT_POSES: &[PoseKind] = &[PoseKind::InverseL, PoseKind::W];
pub const TOP_LEFT_POSES: &[PoseKind] = &[PoseKind::TopDownL, PoseKind::W];
pub const LINE_POSES: &[PoseKind] = &[PoseKind::I, PoseKind::Minus];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Direct(PoseKind),
    /// Match the skeleton against templates of these poses only.
    Match(&'static [PoseKind]),
    FullSearch,
}

pub fn decide(features: &PoseFeatures) -> Decision {
    let top = features.top_screen;
    let left = features.left_screen;
    match features.finger_defects() {
        0 if features.num_holes >= 1 => Decision::Direct(PoseKind::O),
        0 => match skeleton_orientation(features.skeleton.as_deref()) {
            Some(true) => Decision::Direct(PoseKind::Minus),
            Some(false) => Decision::Direct(PoseKind::I),
            None => Decision::Match(LINE_POSES),
        },
        1 => {
            if features.num_holes >= 1 {
                Decision::Direct(PoseKind::Ok)
            } else if features.narrow_vertical_angle {
                Decision::Direct(PoseKind::V)
            } else if features.check_for_u() {
                Decision::Direct(PoseKind::U)
            } else if top && left {
                Decision::Direct(PoseKind::TopDownL)
            } else if features.direction() == Direction::Horizontal {
                Decision::Match(HORIZONTAL_POSES)
            } else if !top && left {
                Decision::Direct(PoseKind::L)
            } else if !top && !left {
                Decision::Direct(PoseKind::InverseL)
            } else {
                Decision::Match(ONE_FINGER_POSES)
            }
        }
        2 => {
            if features.direction() == Direction::Horizontal {
                Decision::Direct(PoseKind::E)
            } else if top && left {
                Decision::Match(TOP_LEFT_POSES)
            } else if !top && left {
                Decision::Match(BOTTOM_LEFT_POSES)
            } else if !top && !left {
                Decision::Match(BOTTOM_RIGHT_POSES)
            } else {
                Decision::Match(TWO_FINGER_POSES)
            }
        }
        3 if features.direction() == Direction::Horizontal => Decision::Direct(PoseKind::E),
        3 => Decision::Direct(PoseKind::W),
        _ => Decision::FullSearch,
    }
}

/// `Some(true)` when the skeleton is wider than tall, `None` without a usable skeleton.
fn skeleton_orientation(skeleton: Option<&[matcher::Point]>) -> Option<bool> {
    let points = skeleton.filter(|s| !s.is_empty())?;
    let bounds = matcher::geometry::bounding_box(points);
    if !bounds.width.is_finite() || !bounds.height.is_finite() {
        return None;
    }
    Some(bounds.width > bounds.height)
}

pub struct PoseClassifier {
    matcher: MultistrokeMatcher,
}

impl PoseClassifier {
    pub fn new(config: MatcherConfig) -> Self {
        Self {
            matcher: MultistrokeMatcher::new(config),
        }
    }

    pub fn matcher(&self) -> &MultistrokeMatcher {
        &self.matcher
    }

    /// Runs the decision tree; undecided frames go to the matcher, restricted
    /// to the routed subset when there is one.
    pub fn classify(&self, features: &PoseFeatures, poses: &[Pose]) -> Option<PoseKind> {
        let decision = decide(features);
        log::debug!(
            "{} defects, {} holes, top={} left={} -> {decision:?}",
            features.finger_defects(),
            features.num_holes,
            features.top_screen,
            features.left_screen
        );
        match decision {
            Decision::Direct(kind) => Some(kind),
            Decision::Match(subset) => self.match_skeleton(features, poses, Some(subset)),
            Decision::FullSearch => self.match_skeleton(features, poses, None),
        }
    }

    fn match_skeleton(&self, features: &PoseFeatures, poses: &[Pose], subset: Option<&[PoseKind]>) -> Option<PoseKind> {
        let skeleton = features.skeleton.as_ref()?;
        let codes: Vec<i32> = subset.map(|s| s.iter().map(|k| k.code()).collect()).unwrap_or_default();
        let filter = match subset {
            Some(_) => CandidateFilter::Kinds(&codes),
            None => CandidateFilter::All,
        };
        let result = self.matcher.recognize(
            std::slice::from_ref(skeleton),
            poses.iter().map(|p| &p.template),
            filter,
        )?;
        log::debug!("matched pose {} with score {:.3}", result.kind, result.score);
        PoseKind::from_code(result.kind)
    }
}

impl Default for PoseClassifier {
    fn default() -> Self {
        Self::new(MatcherConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FingerDefect;
    use crate::matcher::Point;

    fn defect(bisect_angle: f64, interior_angle: f64) -> FingerDefect {
        FingerDefect {
            bisect_angle,
            interior_angle,
        }
    }

    fn features(defects: Vec<FingerDefect>, top: bool, left: bool) -> PoseFeatures {
        PoseFeatures {
            defects,
            top_screen: top,
            left_screen: left,
            ..PoseFeatures::default()
        }
    }

    fn stroke(points: &[(f64, f64)]) -> Vec<Point> {
        points.iter().copied().map(Point::from).collect()
    }

    fn ell() -> Vec<Point> {
        stroke(&[(0.0, 0.0), (0.0, 100.0), (60.0, 100.0)])
    }

    fn zig() -> Vec<Point> {
        stroke(&[(0.0, 0.0), (40.0, 80.0), (80.0, 0.0), (120.0, 80.0)])
    }

    fn pose(classifier: &PoseClassifier, kind: PoseKind, points: Vec<Point>) -> Pose {
        Pose::new(classifier.matcher().build_template(kind.code(), vec![points]).unwrap())
    }

    #[test]
    fn ring_is_decided_without_matching() {
        let ring = PoseFeatures {
            num_holes: 1,
            ..PoseFeatures::default()
        };
        assert_eq!(decide(&ring), Decision::Direct(PoseKind::O));
        // No templates at all, still recognized.
        assert_eq!(PoseClassifier::default().classify(&ring, &[]), Some(PoseKind::O));
    }

    #[test]
    fn line_poses_follow_skeleton_aspect() {
        let with_skeleton = |points: Vec<Point>| PoseFeatures {
            skeleton: Some(points),
            ..PoseFeatures::default()
        };
        let wide = with_skeleton(stroke(&[(0.0, 0.0), (50.0, 5.0), (100.0, 0.0)]));
        assert_eq!(decide(&wide), Decision::Direct(PoseKind::Minus));
        let tall = with_skeleton(stroke(&[(0.0, 0.0), (5.0, 50.0), (0.0, 100.0)]));
        assert_eq!(decide(&tall), Decision::Direct(PoseKind::I));

        assert_eq!(decide(&PoseFeatures::default()), Decision::Match(LINE_POSES));
        assert_eq!(decide(&with_skeleton(Vec::new())), Decision::Match(LINE_POSES));
    }

    #[test]
    fn single_defect_branches_in_priority_order() {
        let mut f = features(vec![defect(90.0, 70.0)], true, true);
        f.num_holes = 1;
        f.narrow_vertical_angle = true;
        assert_eq!(decide(&f), Decision::Direct(PoseKind::Ok));
        f.num_holes = 0;
        assert_eq!(decide(&f), Decision::Direct(PoseKind::V));
        f.narrow_vertical_angle = false;
        assert_eq!(decide(&f), Decision::Direct(PoseKind::U));

        // Not U-shaped from here on.
        let vertical = defect(110.0, 50.0);
        let horizontal = defect(10.0, 50.0);
        assert_eq!(decide(&features(vec![vertical], true, true)), Decision::Direct(PoseKind::TopDownL));
        assert_eq!(decide(&features(vec![horizontal], true, true)), Decision::Direct(PoseKind::TopDownL));
        assert_eq!(decide(&features(vec![horizontal], false, true)), Decision::Match(HORIZONTAL_POSES));
        assert_eq!(decide(&features(vec![vertical], false, true)), Decision::Direct(PoseKind::L));
        assert_eq!(decide(&features(vec![vertical], false, false)), Decision::Direct(PoseKind::InverseL));
        assert_eq!(decide(&features(vec![vertical], true, false)), Decision::Match(ONE_FINGER_POSES));
    }

    #[test]
    fn two_vertical_defects_top_left_match_top_left_subset_only() {
        let f = features(vec![defect(80.0, 40.0), defect(100.0, 40.0)], true, true);
        assert_eq!(f.direction(), Direction::Vertical);
        assert_eq!(decide(&f), Decision::Match(TOP_LEFT_POSES));
        assert_eq!(TOP_LEFT_POSES, &[PoseKind::TopDownL, PoseKind::W]);
    }

    #[test]
    fn two_defect_quadrants() {
        let vertical = || vec![defect(80.0, 40.0), defect(100.0, 40.0)];
        assert_eq!(decide(&features(vertical(), false, true)), Decision::Match(BOTTOM_LEFT_POSES));
        assert_eq!(decide(&features(vertical(), false, false)), Decision::Match(BOTTOM_RIGHT_POSES));
        assert_eq!(decide(&features(vertical(), true, false)), Decision::Match(TWO_FINGER_POSES));
        let horizontal = vec![defect(10.0, 40.0), defect(170.0, 40.0)];
        assert_eq!(decide(&features(horizontal, true, true)), Decision::Direct(PoseKind::E));
    }

    #[test]
    fn three_defects_use_direction_and_more_search_everything() {
        let three_vertical = vec![defect(80.0, 40.0), defect(90.0, 40.0), defect(10.0, 40.0)];
        assert_eq!(decide(&features(three_vertical, false, false)), Decision::Direct(PoseKind::W));
        let three_horizontal = vec![defect(10.0, 40.0), defect(170.0, 40.0), defect(90.0, 40.0)];
        assert_eq!(decide(&features(three_horizontal, false, false)), Decision::Direct(PoseKind::E));
        let four = vec![defect(90.0, 40.0); 4];
        assert_eq!(decide(&features(four, false, false)), Decision::FullSearch);
    }

    #[test]
    fn subset_match_picks_closest_allowed_template() {
        let classifier = PoseClassifier::default();
        let poses = vec![pose(&classifier, PoseKind::L, ell()), pose(&classifier, PoseKind::W, zig())];

        let mut f = features(vec![defect(80.0, 40.0), defect(100.0, 40.0)], false, true);
        f.skeleton = Some(ell());
        assert_eq!(classifier.classify(&f, &poses), Some(PoseKind::L));

        f.skeleton = Some(zig());
        assert_eq!(classifier.classify(&f, &poses), Some(PoseKind::W));
    }

    #[test]
    fn subset_miss_never_searches_other_poses() {
        let classifier = PoseClassifier::default();
        let poses = vec![pose(&classifier, PoseKind::L, ell())];

        // Bottom right routes to {InverseL, W}; neither has a template.
        let mut f = features(vec![defect(80.0, 40.0), defect(100.0, 40.0)], false, false);
        f.skeleton = Some(ell());
        assert_eq!(decide(&f), Decision::Match(BOTTOM_RIGHT_POSES));
        assert_eq!(classifier.classify(&f, &poses), None);

        // Top left routes to {TopDownL, W}.
        f.top_screen = true;
        f.left_screen = true;
        assert_eq!(decide(&f), Decision::Match(TOP_LEFT_POSES));
        assert_eq!(classifier.classify(&f, &poses), None);
    }

    #[test]
    fn nothing_to_match_reports_no_pose() {
        let classifier = PoseClassifier::default();
        let f = features(vec![defect(90.0, 40.0); 5], false, false);
        assert_eq!(classifier.classify(&f, &[]), None);

        let poses = vec![pose(&classifier, PoseKind::W, zig())];
        assert_eq!(classifier.classify(&f, &poses), None);
    }
}
