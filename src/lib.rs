pub mod features;
pub mod gesture;
pub mod matcher;
pub mod pipeline;
pub mod templates;
pub mod types;

pub use pipeline::{PipelineConfig, PoseRecognizer};
pub use types::{Frame, NO_POSE, PoseKind, Recognition};
