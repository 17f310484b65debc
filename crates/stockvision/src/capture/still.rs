use std::path::{Path, PathBuf};

use image::{RgbImage, imageops::FilterType};
use tracing::debug;

use crate::{
    error::DeviceError,
    traits::{CaptureDevice, FrameSource},
    types::Resolution,
};

/// A frame source backed by image files; device id `n` is the `n`th path.
#[derive(Debug, Clone, Default)]
pub struct StillImageSource {
    paths: Vec<PathBuf>,
}

impl StillImageSource {
    pub fn new(paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn single(path: impl AsRef<Path>) -> Self {
        Self::new([path.as_ref().to_path_buf()])
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for StillImageSource {
    type Device = StillImageDevice;

    /// Loads the image; a zero width or height keeps its native size, otherwise it is resampled.
    fn open(&self, device_id: u32, width: u32, height: u32) -> Result<Self::Device, DeviceError> {
        let path = self.paths.get(device_id as usize).ok_or_else(|| DeviceError::Unavailable {
            device_id,
            reason: format!("only {} image(s) configured", self.paths.len()),
        })?;

        let frame = image::open(path)
            .map_err(|err| DeviceError::Unavailable {
                device_id,
                reason: format!("{}: {err}", path.display()),
            })?
            .to_rgb8();

        let frame = if width == 0 || height == 0 || frame.dimensions() == (width, height) {
            frame
        } else {
            image::imageops::resize(&frame, width, height, FilterType::Triangle)
        };
        debug!(device_id, path = %path.display(), resolution = %Resolution::of(&frame), "opened still image");
        Ok(StillImageDevice { frame })
    }
}

/// An open still image; every read returns the same frame.
#[derive(Debug, Clone)]
pub struct StillImageDevice {
    frame: RgbImage,
}

impl StillImageDevice {
    pub fn from_frame(frame: RgbImage) -> Self {
        Self { frame }
    }
}

impl CaptureDevice for StillImageDevice {
    fn read(&mut self) -> Result<RgbImage, DeviceError> {
        Ok(self.frame.clone())
    }

    fn resolution(&self) -> Resolution {
        Resolution::of(&self.frame)
    }
}
