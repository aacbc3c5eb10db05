use std::path::Path;

use rayon::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackgroundError {
    #[error("background data truncated: header says {expected} bytes, found {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Running HSV background reference.
///
/// New frames are folded in as `floor(old * 0.25 + new * 0.75)` per byte.
#[derive(Clone, Debug, Default)]
pub struct BackgroundStore {
    background: Option<Vec<u8>>,
    recording: bool,
    use_saved: bool,
}

impl BackgroundStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn background(&self) -> Option<&[u8]> {
        self.background.as_deref()
    }

    /// Seeds the reference, or averages into it when one of the same size exists.
    pub fn add_frame(&mut self, frame: &[u8]) {
        match self.background.as_mut() {
            Some(background) if background.len() == frame.len() => {
                background
                    .par_iter_mut()
                    .zip(frame.par_iter())
                    .for_each(|(old, &new)| {
                        *old = ((u16::from(*old) + 3 * u16::from(new)) / 4) as u8;
                    });
            }
            _ => {
                log::debug!("seeding background reference with {} bytes", frame.len());
                self.background = Some(frame.to_vec());
            }
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Discards the current reference and starts averaging every processed frame.
    pub fn start_recording(&mut self) {
        self.background = None;
        self.recording = true;
        log::info!("background recording started");
    }

    pub fn stop_recording(&mut self) {
        self.recording = false;
        log::info!("background recording stopped");
    }

    pub fn use_saved(&self) -> bool {
        self.use_saved
    }

    pub fn set_use_saved(&mut self, enable: bool) {
        self.use_saved = enable;
    }

    pub fn reset(&mut self) {
        self.background = None;
    }

    /// Length-prefixed (`u32` big-endian) raw bytes; zero length means no background.
    pub fn to_bytes(&self) -> Vec<u8> {
        let data = self.background.as_deref().unwrap_or_default();
        let mut out = Vec::with_capacity(4 + data.len());
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(data);
        out
    }

    /// Replaces the reference from bytes produced by [`to_bytes`](Self::to_bytes).
    /// On error the reference is cleared.
    pub fn load_bytes(&mut self, bytes: &[u8]) -> Result<(), BackgroundError> {
        self.background = None;
        let Some((header, body)) = bytes.split_first_chunk::<4>() else {
            return Err(BackgroundError::Truncated {
                expected: 4,
                actual: bytes.len(),
            });
        };
        let expected = u32::from_be_bytes(*header) as usize;
        if body.len() < expected {
            return Err(BackgroundError::Truncated {
                expected,
                actual: body.len(),
            });
        }
        if expected > 0 {
            self.background = Some(body[..expected].to_vec());
        }
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), BackgroundError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_bytes())?;
        log::info!("saved background to {}", path.display());
        Ok(())
    }

    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), BackgroundError> {
        let path = path.as_ref();
        match std::fs::read(path) {
            Ok(bytes) => self.load_bytes(&bytes)?,
            Err(err) => {
                self.background = None;
                return Err(err.into());
            }
        }
        log::info!(
            "loaded background from {} ({} bytes)",
            path.display(),
            self.background.as_ref().map_or(0, Vec::len)
        );
        Ok(())
    }
}
