//! Persisted pose templates and the shared template set used for matching.

use std::path::Path;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::matcher::{GeometryError, Multistroke, Point, Unistroke};

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("no skeleton has been recorded")]
    NothingRecorded,
    #[error("pose index {index} out of range for {len} poses")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("template data truncated at byte {0}")]
    Truncated(usize),
    #[error("invalid element count {count} at byte {offset}")]
    InvalidCount { count: i32, offset: usize },
    #[error("list of {0} elements does not fit the template format")]
    TooLarge(usize),
    #[error("{0} unexpected trailing bytes after template data")]
    TrailingBytes(usize),
    #[error("recorded skeleton is degenerate: {0}")]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Pose {
    pub kind: i32,
    pub template: Multistroke,
}

impl Pose {
    pub fn new(template: Multistroke) -> Self {
        Self {
            kind: template.kind,
            template,
        }
    }
}

/// Copy-on-write template set.
///
/// Readers take an `Arc` snapshot and never observe a half-applied edit;
/// writers build a fresh vector and swap it in.
#[derive(Debug, Default)]
pub struct TemplateStore {
    poses: RwLock<Arc<Vec<Pose>>>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poses(poses: Vec<Pose>) -> Self {
        let store = Self::new();
        store.replace_all(poses);
        store
    }

    pub fn snapshot(&self) -> Arc<Vec<Pose>> {
        let guard = self.poses.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn replace_all(&self, poses: Vec<Pose>) {
        self.update(|current| *current = poses);
    }

    /// Adds a pose, replacing any existing pose of the same type.
    pub fn commit_pose(&self, template: Multistroke) {
        let kind = template.kind;
        let replaced = self.update(|poses| {
            let before = poses.len();
            poses.retain(|pose| pose.kind != kind);
            let replaced = poses.len() < before;
            poses.push(Pose::new(template));
            replaced
        });
        log::info!(
            "{} pose template {kind}",
            if replaced { "replaced" } else { "added" }
        );
    }

    /// Removes the pose at `index` in type order.
    pub fn delete_pose(&self, index: usize) -> Result<Pose, TemplateError> {
        let removed = self.update(|poses| {
            if index < poses.len() {
                Ok(poses.remove(index))
            } else {
                Err(TemplateError::IndexOutOfRange {
                    index,
                    len: poses.len(),
                })
            }
        })?;
        log::info!("deleted pose template {}", removed.kind);
        Ok(removed)
    }

    pub fn reset(&self) {
        self.replace_all(Vec::new());
        log::info!("template set cleared");
    }

    fn update<R>(&self, edit: impl FnOnce(&mut Vec<Pose>) -> R) -> R {
        let mut guard = self.poses.write().unwrap_or_else(|e| e.into_inner());
        let mut poses = guard.as_ref().clone();
        let result = edit(&mut poses);
        poses.sort_by_key(|pose| pose.kind);
        *guard = Arc::new(poses);
        result
    }

    /// Replaces the active set with the file's contents.
    ///
    /// Any failure leaves the set empty.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<usize, TemplateError> {
        let path = path.as_ref();
        let result = std::fs::read(path)
            .map_err(TemplateError::from)
            .and_then(|bytes| deserialize(&bytes));
        match result {
            Ok(poses) => {
                let count = poses.len();
                self.replace_all(poses);
                log::info!("loaded {count} pose templates from {}", path.display());
                Ok(count)
            }
            Err(err) => {
                log::warn!("failed to load templates from {}: {err}", path.display());
                self.replace_all(Vec::new());
                Err(err)
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), TemplateError> {
        let path = path.as_ref();
        let snapshot = self.snapshot();
        std::fs::write(path, serialize(&snapshot)?)?;
        log::info!("saved {} pose templates to {}", snapshot.len(), path.display());
        Ok(())
    }
}

pub fn serialize(poses: &[Pose]) -> Result<Vec<u8>, TemplateError> {
    let mut out = Vec::new();
    put_len(&mut out, poses.len())?;
    for pose in poses {
        let template = &pose.template;
        put_i32(&mut out, pose.kind);
        put_len(&mut out, template.num_strokes)?;
        put_len(&mut out, template.unistrokes.len())?;
        for unistroke in &template.unistrokes {
            put_points(&mut out, &unistroke.points)?;
            put_f64(&mut out, unistroke.start_vector.x);
            put_f64(&mut out, unistroke.start_vector.y);
            put_len(&mut out, unistroke.vector.len())?;
            for v in &unistroke.vector {
                put_f64(&mut out, *v);
            }
        }
        put_len(&mut out, template.original_strokes.len())?;
        for stroke in &template.original_strokes {
            put_points(&mut out, stroke)?;
        }
    }
    Ok(out)
}

pub fn deserialize(bytes: &[u8]) -> Result<Vec<Pose>, TemplateError> {
    let mut reader = ByteReader::new(bytes);
    // Smallest pose record: type, stroke count, two empty list counts.
    let count = reader.read_len(16)?;
    let mut poses = Vec::with_capacity(count);
    for _ in 0..count {
        let kind = reader.read_i32()?;
        let num_strokes = reader.read_len(0)?;
        let unistroke_count = reader.read_len(24)?;
        let mut unistrokes = Vec::with_capacity(unistroke_count);
        for _ in 0..unistroke_count {
            let points = reader.read_points()?;
            let start_vector = Point::new(reader.read_f64()?, reader.read_f64()?);
            let len = reader.read_len(8)?;
            let vector = (0..len).map(|_| reader.read_f64()).collect::<Result<_, _>>()?;
            unistrokes.push(Unistroke {
                points,
                start_vector,
                vector,
            });
        }
        let stroke_count = reader.read_len(4)?;
        let original_strokes = (0..stroke_count)
            .map(|_| reader.read_points())
            .collect::<Result<_, _>>()?;
        poses.push(Pose {
            kind,
            template: Multistroke {
                kind,
                num_strokes,
                unistrokes,
                original_strokes,
            },
        });
    }
    let remaining = reader.remaining();
    if remaining > 0 {
        return Err(TemplateError::TrailingBytes(remaining));
    }
    poses.sort_by_key(|pose| pose.kind);
    Ok(poses)
}

fn put_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn put_len(out: &mut Vec<u8>, len: usize) -> Result<(), TemplateError> {
    let len = i32::try_from(len).map_err(|_| TemplateError::TooLarge(len))?;
    put_i32(out, len);
    Ok(())
}

fn put_f64(out: &mut Vec<u8>, value: f64) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn put_points(out: &mut Vec<u8>, points: &[Point]) -> Result<(), TemplateError> {
    put_len(out, points.len())?;
    for p in points {
        put_f64(out, p.x);
        put_f64(out, p.y);
    }
    Ok(())
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], TemplateError> {
        let end = self.offset + N;
        let chunk = self
            .bytes
            .get(self.offset..end)
            .ok_or(TemplateError::Truncated(self.offset))?;
        let mut buf = [0u8; N];
        buf.copy_from_slice(chunk);
        self.offset = end;
        Ok(buf)
    }

    fn read_i32(&mut self) -> Result<i32, TemplateError> {
        self.take::<4>().map(i32::from_be_bytes)
    }

    fn read_f64(&mut self) -> Result<f64, TemplateError> {
        self.take::<8>().map(f64::from_be_bytes)
    }

    /// Reads an element count, rejecting negatives and counts that cannot fit
    /// in the remaining bytes at `min_item_size` bytes each.
    fn read_len(&mut self, min_item_size: usize) -> Result<usize, TemplateError> {
        let offset = self.offset;
        let count = self.read_i32()?;
        let len = usize::try_from(count).map_err(|_| TemplateError::InvalidCount { count, offset })?;
        if len.saturating_mul(min_item_size) > self.remaining() {
            return Err(TemplateError::Truncated(self.offset));
        }
        Ok(len)
    }

    fn read_points(&mut self) -> Result<Vec<Point>, TemplateError> {
        let len = self.read_len(16)?;
        (0..len)
            .map(|_| -> Result<Point, TemplateError> { Ok(Point::new(self.read_f64()?, self.read_f64()?)) })
            .collect()
    }
}
