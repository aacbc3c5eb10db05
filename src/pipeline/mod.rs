pub mod background;
pub mod contours;
pub mod detector;
pub mod recognizer;
pub mod segmentation;
pub mod skeleton;

use crate::features::FeatureConfig;
use crate::matcher::MatcherConfig;

// Re-exports for convenience
pub use background::{BackgroundError, BackgroundStore};
pub use contours::{ContourConfig, FrameRotation};
pub use detector::{Detection, DetectorPhase, HandDetector};
pub use recognizer::{PoseRecognizer, RecognizerControl, start_recognizer};
pub use segmentation::SegmentationConfig;

/// Every tunable of the recognition pipeline, one section per stage.
#[derive(Clone, Debug, Default)]
pub struct PipelineConfig {
    pub segmentation: SegmentationConfig,
    pub contours: ContourConfig,
    pub features: FeatureConfig,
    pub matcher: MatcherConfig,
    pub rotation: FrameRotation,
}
