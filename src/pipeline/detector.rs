//! Per-frame orchestration: background capture, segmentation, contour
//! extraction, feature extraction and skeleton thinning.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, RgbImage};

use crate::features::{self, PoseFeatures};
use crate::matcher;
use crate::pipeline::PipelineConfig;
use crate::pipeline::background::BackgroundStore;
use crate::pipeline::contours::{self, Region};
use crate::pipeline::segmentation::{self, HsvImage};
use crate::pipeline::skeleton;
use crate::types::Frame;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectorPhase {
    Uninitialized,
    AwaitingBackground,
    Ready,
}

/// Sizes derived from the first frame.
#[derive(Clone, Debug)]
struct FrameGeometry {
    frame: (u32, u32),
    scaled: (u32, u32),
    /// Scaled size after rotation; masks are rendered at this size.
    rotated: (u32, u32),
    blank: DynamicImage,
}

/// Where the per-pixel background comes from once captured.
#[derive(Clone, Debug)]
enum Reference {
    Snapshot(Vec<u8>),
    /// Follows the background store, so averaging keeps feeding detection.
    Store,
}

#[derive(Debug)]
enum DetectorState {
    Uninitialized,
    AwaitingBackground(FrameGeometry),
    Ready(FrameGeometry, Reference),
}

#[derive(Clone, Debug)]
pub struct Detection {
    /// Merged features, present when requested and at least one contour yielded some.
    pub features: Option<PoseFeatures>,
    pub preview: DynamicImage,
    pub non_empty: bool,
}

pub struct HandDetector {
    config: PipelineConfig,
    state: DetectorState,
    background: BackgroundStore,
    capture_requested: bool,
    record_mode: bool,
    record_next: bool,
    recorded: Option<Vec<matcher::Point>>,
}

impl HandDetector {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            state: DetectorState::Uninitialized,
            background: BackgroundStore::new(),
            capture_requested: false,
            record_mode: false,
            record_next: false,
            recorded: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn phase(&self) -> DetectorPhase {
        match self.state {
            DetectorState::Uninitialized => DetectorPhase::Uninitialized,
            DetectorState::AwaitingBackground(_) => DetectorPhase::AwaitingBackground,
            DetectorState::Ready(..) => DetectorPhase::Ready,
        }
    }

    pub fn background(&self) -> &BackgroundStore {
        &self.background
    }

    pub fn background_mut(&mut self) -> &mut BackgroundStore {
        &mut self.background
    }

    pub fn request_background(&mut self) {
        self.capture_requested = true;
    }

    /// Drops the captured reference; detection pauses until the next capture.
    pub fn reset_background(&mut self) {
        let state = std::mem::replace(&mut self.state, DetectorState::Uninitialized);
        self.state = match state {
            DetectorState::Ready(geometry, _) => DetectorState::AwaitingBackground(geometry),
            other => other,
        };
    }

    pub fn record_mode(&self) -> bool {
        self.record_mode
    }

    /// In record mode every frame is analysed; a background is requested if missing.
    pub fn set_record_mode(&mut self, enable: bool) {
        self.record_mode = enable;
        if enable && self.phase() != DetectorPhase::Ready {
            self.request_background();
        }
    }

    pub fn record_next_skeleton(&mut self) {
        self.record_next = true;
    }

    pub fn recorded_skeleton(&self) -> Option<&[matcher::Point]> {
        self.recorded.as_deref()
    }

    pub fn take_recorded_skeleton(&mut self) -> Option<Vec<matcher::Point>> {
        self.recorded.take()
    }

    pub fn detect(&mut self, frame: &Frame, want_features: bool) -> Detection {
        let rgb = frame
            .is_valid()
            .then(|| RgbImage::from_raw(frame.width, frame.height, frame.rgb.clone()))
            .flatten();
        let Some(rgb) = rgb else {
            log::warn!(
                "dropping malformed frame {}x{} with {} bytes",
                frame.width,
                frame.height,
                frame.rgb.len()
            );
            return Detection {
                features: None,
                preview: DynamicImage::new_luma8(0, 0),
                non_empty: false,
            };
        };
        self.ensure_geometry(frame.width, frame.height);

        let small = segmentation::downscale(&rgb, &self.config.segmentation);
        let hsv = HsvImage::from_rgb(&small);

        if self.capture_requested {
            self.capture_background(&hsv);
        }
        if self.background.is_recording() {
            self.background.add_frame(&hsv.data);
        }

        let mask = match &self.state {
            DetectorState::Ready(_, reference) => {
                let data = match reference {
                    Reference::Snapshot(data) => Some(data.as_slice()),
                    Reference::Store => self.background.background(),
                };
                match data {
                    Some(data) if data.len() == hsv.data.len() => {
                        Some(segmentation::classify(&hsv, data, &self.config.segmentation))
                    }
                    Some(data) => {
                        log::warn!(
                            "background has {} bytes but frame has {}, recapturing",
                            data.len(),
                            hsv.data.len()
                        );
                        None
                    }
                    None => None,
                }
            }
            _ => None,
        };
        let Some(mask) = mask else {
            if self.phase() == DetectorPhase::Ready {
                self.reset_background();
                self.request_background();
            }
            return self.pass_through(rgb);
        };

        let opened = segmentation::open(&mask, &self.config.segmentation);
        let regions = contours::extract_regions(&opened, &self.config.contours, self.config.rotation);
        let want_features = want_features || self.record_mode;
        self.analyse(&regions, want_features)
    }

    fn ensure_geometry(&mut self, width: u32, height: u32) {
        let cached = match &self.state {
            DetectorState::AwaitingBackground(g) | DetectorState::Ready(g, _) => Some(g.frame),
            DetectorState::Uninitialized => None,
        };
        if cached == Some((width, height)) {
            return;
        }
        if let Some((w, h)) = cached {
            log::warn!("frame size changed from {w}x{h} to {width}x{height}, recapturing background");
            self.capture_requested = true;
        }

        let factor = self.config.segmentation.scale_factor(width);
        let scaled = if factor == 1 {
            (width, height)
        } else {
            (width / factor, height / factor)
        };
        let rotated = self.config.rotation.dimensions(scaled.0, scaled.1);
        let (pw, ph) = self.config.rotation.dimensions(width, height);
        log::debug!("frame {width}x{height}, scaled {}x{}, factor {factor}", scaled.0, scaled.1);
        self.state = DetectorState::AwaitingBackground(FrameGeometry {
            frame: (width, height),
            scaled,
            rotated,
            blank: DynamicImage::new_luma8(pw, ph),
        });
    }

    fn capture_background(&mut self, hsv: &HsvImage) {
        let state = std::mem::replace(&mut self.state, DetectorState::Uninitialized);
        let geometry = match state {
            DetectorState::AwaitingBackground(g) | DetectorState::Ready(g, _) => g,
            DetectorState::Uninitialized => return,
        };
        let reference = if self.background.use_saved() {
            let stale = self
                .background
                .background()
                .is_none_or(|data| data.len() != hsv.data.len());
            if stale {
                self.background.reset();
                self.background.add_frame(&hsv.data);
            }
            Reference::Store
        } else {
            Reference::Snapshot(hsv.data.clone())
        };
        log::info!(
            "background captured at {}x{} ({})",
            geometry.scaled.0,
            geometry.scaled.1,
            if matches!(reference, Reference::Store) {
                "saved"
            } else {
                "snapshot"
            }
        );
        self.state = DetectorState::Ready(geometry, reference);
        self.capture_requested = false;
    }

    fn geometry(&self) -> Option<&FrameGeometry> {
        match &self.state {
            DetectorState::AwaitingBackground(g) | DetectorState::Ready(g, _) => Some(g),
            DetectorState::Uninitialized => None,
        }
    }

    fn pass_through(&self, rgb: RgbImage) -> Detection {
        Detection {
            features: None,
            preview: self.config.rotation.rotate_image(&DynamicImage::ImageRgb8(rgb)),
            non_empty: false,
        }
    }

    fn analyse(&mut self, regions: &[Region], want_features: bool) -> Detection {
        let Some(geometry) = self.geometry().cloned() else {
            return Detection {
                features: None,
                preview: DynamicImage::new_luma8(0, 0),
                non_empty: false,
            };
        };
        if !regions.iter().any(|r| !r.is_hole) {
            return Detection {
                features: None,
                preview: geometry.blank,
                non_empty: false,
            };
        }

        let (rw, rh) = geometry.rotated;
        let mut preview = contours::render_mask(regions, rw, rh, self.record_mode);
        let mut working = contours::render_mask(regions, rw, rh, true);
        let per_contour: Vec<PoseFeatures> = if want_features {
            regions
                .iter()
                .filter(|r| !r.is_hole)
                .filter_map(|r| features::extract(&r.simplified, &mut working, &self.config.features))
                .collect()
        } else {
            Vec::new()
        };
        let found = !per_contour.is_empty();
        let mut merged = PoseFeatures::merge(per_contour);

        let rounds = skeleton::thin(&mut working);
        let traced = skeleton::trace(&working, self.config.features.min_hole_area);
        if let Some(stroke) = &traced.stroke {
            skeleton::draw_skeleton(&mut preview, stroke);
        }
        merged.num_holes = traced.holes;
        merged.skeleton = traced.stroke.as_deref().map(skeleton::to_stroke);
        log::debug!(
            "{} regions, {} finger defects, {} holes, thinned in {rounds} rounds",
            regions.len(),
            merged.finger_defects(),
            merged.num_holes
        );

        if self.record_next {
            self.record_next = false;
            self.recorded = merged.skeleton.clone();
            match &self.recorded {
                Some(points) => log::info!("recorded skeleton with {} points", points.len()),
                None => log::warn!("no skeleton to record in this frame"),
            }
        }

        Detection {
            features: found.then_some(merged),
            preview: upscale(&preview, &geometry),
            non_empty: true,
        }
    }
}

fn upscale(mask: &GrayImage, geometry: &FrameGeometry) -> DynamicImage {
    let (width, height) = (geometry.blank.width(), geometry.blank.height());
    if mask.dimensions() == (width, height) {
        return DynamicImage::ImageLuma8(mask.clone());
    }
    DynamicImage::ImageLuma8(imageops::resize(mask, width, height, FilterType::CatmullRom))
}
