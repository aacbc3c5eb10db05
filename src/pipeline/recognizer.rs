use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender};

use crate::gesture::PoseClassifier;
use crate::pipeline::PipelineConfig;
use crate::pipeline::detector::HandDetector;
use crate::templates::{Pose, TemplateError, TemplateStore};
use crate::types::{Frame, PoseKind, Recognition};

/// Frame-to-pose entry point plus the template authoring operations.
pub struct PoseRecognizer {
    detector: HandDetector,
    classifier: PoseClassifier,
    templates: Arc<TemplateStore>,
}

impl PoseRecognizer {
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_templates(config, Arc::new(TemplateStore::new()))
    }

    /// Shares `templates` with other threads; edits made there apply from the next frame.
    pub fn with_templates(config: PipelineConfig, templates: Arc<TemplateStore>) -> Self {
        let classifier = PoseClassifier::new(config.matcher.clone());
        Self {
            detector: HandDetector::new(config),
            classifier,
            templates,
        }
    }

    pub fn templates(&self) -> &Arc<TemplateStore> {
        &self.templates
    }

    pub fn detector(&self) -> &HandDetector {
        &self.detector
    }

    pub fn detector_mut(&mut self) -> &mut HandDetector {
        &mut self.detector
    }

    pub fn recognize(&mut self, frame: &Frame, want_recognition: bool) -> Recognition {
        let detection = self.detector.detect(frame, want_recognition);
        let classify = want_recognition || self.detector.record_mode();
        let pose = match &detection.features {
            Some(features) if classify => {
                let poses = self.templates.snapshot();
                self.classifier.classify(features, &poses)
            }
            _ => None,
        };
        Recognition {
            pose,
            preview: detection.preview,
            non_empty: detection.non_empty,
        }
    }

    pub fn record_next_skeleton(&mut self) {
        self.detector.record_next_skeleton();
    }

    /// Stores the last recorded skeleton as the template for `kind`,
    /// replacing any previous template of that kind.
    pub fn commit_pose(&mut self, kind: PoseKind) -> Result<(), TemplateError> {
        let skeleton = self
            .detector
            .recorded_skeleton()
            .filter(|points| !points.is_empty())
            .ok_or(TemplateError::NothingRecorded)?
            .to_vec();
        let template = self.classifier.matcher().build_template(kind.code(), vec![skeleton])?;
        self.templates.commit_pose(template);
        Ok(())
    }

    pub fn delete_pose(&self, index: usize) -> Result<Pose, TemplateError> {
        self.templates.delete_pose(index)
    }

    pub fn reset_all(&mut self) {
        self.templates.reset();
        self.detector.take_recorded_skeleton();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecognizerControl {
    RequestBackground,
    SetRecordMode(bool),
    RecordNextSkeleton,
    CommitPose(PoseKind),
}

fn apply_control(recognizer: &mut PoseRecognizer, control: RecognizerControl) {
    match control {
        RecognizerControl::RequestBackground => recognizer.detector_mut().request_background(),
        RecognizerControl::SetRecordMode(enable) => recognizer.detector_mut().set_record_mode(enable),
        RecognizerControl::RecordNextSkeleton => recognizer.record_next_skeleton(),
        RecognizerControl::CommitPose(kind) => {
            if let Err(err) = recognizer.commit_pose(kind) {
                log::warn!("failed to commit pose {}: {err}", kind.display_name());
            }
        }
    }
}

fn run_worker_loop(
    mut recognizer: PoseRecognizer,
    frame_rx: Receiver<Frame>,
    control_rx: Receiver<RecognizerControl>,
    result_tx: Sender<Recognition>,
) -> PoseRecognizer {
    while let Some(frame) = recv_latest_frame(&frame_rx) {
        for control in control_rx.try_iter() {
            apply_control(&mut recognizer, control);
        }
        let recognition = recognizer.recognize(&frame, true);
        let _ = result_tx.try_send(recognition);
    }
    for control in control_rx.try_iter() {
        apply_control(&mut recognizer, control);
    }
    recognizer
}

fn recv_latest_frame(frame_rx: &Receiver<Frame>) -> Option<Frame> {
    let mut frame = frame_rx.recv().ok()?;
    while let Ok(newer) = frame_rx.try_recv() {
        frame = newer;
    }
    Some(frame)
}

/// Runs `recognizer` on its own thread until `frame_rx` disconnects, then
/// hands it back through the join handle.
pub fn start_recognizer(
    recognizer: PoseRecognizer,
    frame_rx: Receiver<Frame>,
    control_rx: Receiver<RecognizerControl>,
    result_tx: Sender<Recognition>,
) -> thread::JoinHandle<PoseRecognizer> {
    log::info!(
        "starting pose recognizer with {} templates",
        recognizer.templates().len()
    );
    thread::spawn(move || run_worker_loop(recognizer, frame_rx, control_rx, result_tx))
}
