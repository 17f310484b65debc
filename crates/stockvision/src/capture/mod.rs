//! Frame acquisition: device ownership, live preview and multi-frame capture.

pub mod accumulator;
pub mod preview;
pub mod still;

pub use accumulator::{AveragedCapture, DEFAULT_CAPTURE_FRAMES, FrameAccumulator, capture_averaged};
pub use preview::{FrameBuffer, PreviewLoop, PreviewSlot, SharedPipeline};
pub use still::{StillImageDevice, StillImageSource};

use image::RgbImage;
use tracing::info;

use crate::{
    error::DeviceError,
    traits::{CaptureDevice, FrameSource},
    types::{ReferencePoint, Resolution},
};

/// Owns at most one open device from a [`FrameSource`].
///
/// Opening a device always releases the previous handle first, so a backend
/// that allows a single open camera never sees two.
pub struct CameraSession<S: FrameSource> {
    source: S,
    device: Option<S::Device>,
    device_id: Option<u32>,
}

impl<S: FrameSource> CameraSession<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            device: None,
            device_id: None,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn device_id(&self) -> Option<u32> {
        self.device_id
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    pub fn open(&mut self, device_id: u32, width: u32, height: u32) -> Result<Resolution, DeviceError> {
        self.close();
        let device = self.source.open(device_id, width, height)?;
        let resolution = device.resolution();
        info!(device_id, %resolution, "camera opened");
        self.device = Some(device);
        self.device_id = Some(device_id);
        Ok(resolution)
    }

    /// Switch to another device or resolution.
    pub fn switch(&mut self, device_id: u32, width: u32, height: u32) -> Result<Resolution, DeviceError> {
        self.open(device_id, width, height)
    }

    pub fn close(&mut self) {
        if self.device.take().is_some() {
            info!(device_id = ?self.device_id, "camera released");
        }
        self.device_id = None;
    }

    pub fn read(&mut self) -> Result<RgbImage, DeviceError> {
        self.device.as_mut().ok_or(DeviceError::NotOpen)?.read()
    }

    pub fn resolution(&self) -> Option<Resolution> {
        self.device.as_ref().map(|d| d.resolution())
    }

    pub fn device_mut(&mut self) -> Option<&mut S::Device> {
        self.device.as_mut()
    }

    /// Hand the open device to a preview loop. The session no longer owns it.
    pub fn take_device(&mut self) -> Option<S::Device> {
        self.device.take()
    }

    /// Take back a device returned by a stopped preview loop.
    pub fn restore_device(&mut self, device: S::Device) {
        self.device = Some(device);
    }

    /// The reference point expressed at the open device's resolution.
    pub fn rescale_reference(&self, reference: &ReferencePoint) -> ReferencePoint {
        match self.resolution() {
            Some(resolution) => reference.at_resolution(resolution),
            None => *reference,
        }
    }
}
