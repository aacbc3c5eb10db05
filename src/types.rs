use std::time::Instant;

use image::DynamicImage;

/// Sentinel pose code reported when nothing is confidently recognized.
pub const NO_POSE: i32 = -1;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgb: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

impl Frame {
    pub fn new(rgb: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            rgb,
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.rgb.len() == (self.width as usize) * (self.height as usize) * 3
    }
}

#[derive(Clone, Debug)]
pub struct Recognition {
    pub pose: Option<PoseKind>,
    pub preview: DynamicImage,
    /// At least one foreground region survived the area filter.
    pub non_empty: bool,
}

impl Recognition {
    pub fn pose_type(&self) -> i32 {
        self.pose.map(PoseKind::code).unwrap_or(NO_POSE)
    }

    pub fn display_text(&self) -> String {
        match self.pose {
            Some(pose) => format!("{} ({})", pose.display_name(), pose.code()),
            None if self.non_empty => "hand, no pose".to_string(),
            None => "no hand".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PoseKind {
    O,
    Minus,
    I,
    V,
    U,
    C,
    Ok,
    L,
    InverseL,
    TopDownL,
    W,
    E,
}

impl PoseKind {
    pub const ALL: [PoseKind; 12] = [
        PoseKind::O,
        PoseKind::Minus,
        PoseKind::I,
        PoseKind::V,
        PoseKind::U,
        PoseKind::C,
        PoseKind::Ok,
        PoseKind::L,
        PoseKind::InverseL,
        PoseKind::TopDownL,
        PoseKind::W,
        PoseKind::E,
    ];

    pub fn code(self) -> i32 {
        match self {
            PoseKind::O => 0,
            PoseKind::Minus => 1,
            PoseKind::I => 2,
            PoseKind::V => 3,
            PoseKind::U => 4,
            PoseKind::C => 5,
            PoseKind::Ok => 6,
            PoseKind::L => 7,
            PoseKind::InverseL => 8,
            PoseKind::TopDownL => 9,
            PoseKind::W => 10,
            PoseKind::E => 11,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|pose| pose.code() == code)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PoseKind::O => "O",
            PoseKind::Minus => "Minus",
            PoseKind::I => "I",
            PoseKind::V => "V",
            PoseKind::U => "U",
            PoseKind::C => "C",
            PoseKind::Ok => "OK",
            PoseKind::L => "L",
            PoseKind::InverseL => "Inverse L",
            PoseKind::TopDownL => "Top down L",
            PoseKind::W => "W",
            PoseKind::E => "E",
        }
    }
}

/// Human readable label for a raw pose code, as shown in template lists.
pub fn describe(code: i32) -> &'static str {
    if code == NO_POSE {
        return "n/a";
    }
    PoseKind::from_code(code)
        .map(|pose| pose.display_name())
        .unwrap_or("")
}
