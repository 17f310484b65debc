use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Failed to load image: {0}")]
    ImageLoad(#[from] image::ImageError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Calibration error: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Frame source failures. Live preview reports these without stopping.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("Device {device_id} is unavailable: {reason}")]
    Unavailable { device_id: u32, reason: String },

    #[error("Frame read failed: {0}")]
    ReadFailed(String),

    #[error("No device is open")]
    NotOpen,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("Known distance must be positive, got {0}")]
    InvalidDistance(f64),

    #[error("Calibration points coincide; pixel distance is zero")]
    DegeneratePoints,

    #[error("Calibration is not in a state that accepts {0}")]
    UnexpectedAction(&'static str),
}

/// Raised inside colour segmentation only; callers see an empty mask instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SegmentationError {
    #[error("Image has no pixels")]
    EmptyImage,

    #[error("Non-finite colour value during HSV conversion")]
    NonFinite,
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("No image loaded or captured")]
    NoImage,

    #[error("Inches per pixel must be greater than 0, got {0}")]
    InvalidScale(f64),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No contours found")]
    NoContours,

    #[error("Failed to write output: {0}")]
    WriteFailed(String),
}

impl From<dxf::DxfError> for ExportError {
    fn from(err: dxf::DxfError) -> Self {
        ExportError::WriteFailed(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VisionError>;
