use std::path::Path;

use image::RgbImage;
use crate::{
    error::{DeviceError, ExportError},
    types::Resolution,
};

/// A camera (or camera-like) backend that can hand out exclusive device handles.
///
/// Closing a device is dropping its handle.
pub trait FrameSource {
    /// The open device this source produces
    type Device: CaptureDevice;

    /// Open a device at the requested resolution
    fn open(&self, device_id: u32, width: u32, height: u32) -> Result<Self::Device, DeviceError>;
}

/// An open capture device
pub trait CaptureDevice: Send {
    /// Read the next frame, in RGB channel order
    fn read(&mut self) -> Result<RgbImage, DeviceError>;

    /// Resolution of the frames this device delivers
    fn resolution(&self) -> Resolution;
}

/// Destination for closed polylines in physical units.
///
/// Coordinates handed to a sink are final; the sink applies no further transform.
pub trait VectorSink {
    /// Append one polyline
    fn add_polyline(&mut self, points: &[[f64; 2]], closed: bool) -> Result<(), ExportError>;

    /// Serialize everything added so far to `path`
    fn save(&self, path: &Path) -> Result<(), ExportError>;
}
