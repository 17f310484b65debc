use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use stockvision::{
    ExportError, PipelineBuilder, PipelineConfig, ReferencePoint, Resolution, capture::DEFAULT_CAPTURE_FRAMES,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
    #[error(transparent)]
    TomlDeError(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSerError(#[from] toml::ser::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error("Invalid settings: {0}")]
    Invalid(#[from] ExportError),
    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,
}

/// Which camera to open and at what resolution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct CameraSettings {
    pub device_id: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            device_id: 0,
            width: 1920,
            height: 1080,
        }
    }
}

impl CameraSettings {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

/// Everything a session remembers between runs.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Frames averaged per capture
    pub capture_frames: usize,
    pub camera: CameraSettings,
    pub pipeline: PipelineConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            capture_frames: DEFAULT_CAPTURE_FRAMES,
            camera: CameraSettings::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Settings {
    /// Load Settings from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(content)?)
    }

    /// Load Settings from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Auto-detect file format and load
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path_ref = path.as_ref();
        match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_file(path),
            Some("json") => Self::from_json_file(path),
            _ => Err(SettingsError::UnsupportedFileFormat),
        }
    }

    /// Load `path` if it is given, defaults otherwise
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self, SettingsError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn to_toml(&self) -> Result<String, SettingsError> {
        Ok(toml::to_string_pretty(&self)?)
    }

    pub fn to_json(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(&self)?)
    }

    /// Save in the format named by the extension
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SettingsError> {
        let path_ref = path.as_ref();
        let content = match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => self.to_toml()?,
            Some("json") => self.to_json()?,
            _ => return Err(SettingsError::UnsupportedFileFormat),
        };
        fs::write(path_ref, content)?;
        Ok(())
    }

    /// The validated pipeline snapshot
    pub fn pipeline_config(&self) -> Result<PipelineConfig, SettingsError> {
        Ok(PipelineBuilder::from_config(self.pipeline.clone()).build_config()?)
    }

    /// The stored reference point expressed at the configured camera resolution
    pub fn reference_at_camera(&self) -> ReferencePoint {
        self.pipeline.registration.reference.at_resolution(self.camera.resolution())
    }

    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(Settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockvision::{ColorSample, EdgeMode, ToleranceTier, ToleranceTiers};

    fn tuned() -> Settings {
        let mut settings = Settings::default();
        settings.capture_frames = 4;
        settings.camera = CameraSettings { device_id: 1, width: 1280, height: 720 };
        settings.pipeline.edge_mode = EdgeMode::Color;
        settings.pipeline.color_sample = Some(ColorSample::new(12, 200, 37));
        settings.pipeline.canny.low = 35;
        settings.pipeline.registration.rotation_degrees = -0.5;
        settings.pipeline.registration.use_reference_point = false;
        settings.pipeline.add_table_boundary = false;
        settings.pipeline.tracer.tiers = ToleranceTiers::new(vec![
            ToleranceTier { min_area: 500.0, tolerance: 0.25 },
            ToleranceTier { min_area: 0.0, tolerance: 0.6 },
        ])
        .unwrap();
        settings
    }

    #[test]
    fn toml_round_trip_is_lossless() {
        let settings = tuned();
        let text = settings.to_toml().unwrap();
        assert_eq!(Settings::from_toml(&text).unwrap(), settings);
        assert_eq!(Settings::from_toml(&Settings::default().to_toml().unwrap()).unwrap(), Settings::default());
    }

    #[test]
    fn json_round_trip_is_lossless() {
        let settings = tuned();
        let text = settings.to_json().unwrap();
        assert_eq!(Settings::from_json(&text).unwrap(), settings);
    }

    #[test]
    fn files_are_read_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let settings = tuned();
        for name in ["settings.toml", "settings.json"] {
            let path = dir.path().join(name);
            settings.save(&path).unwrap();
            assert_eq!(Settings::from_file(&path).unwrap(), settings);
        }
        let bad = dir.path().join("settings.yaml");
        assert!(matches!(settings.save(&bad), Err(SettingsError::UnsupportedFileFormat)));
        assert!(matches!(Settings::from_file(&bad), Err(SettingsError::UnsupportedFileFormat)));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let settings = Settings::from_toml("capture_frames = 3\n[camera]\ndevice_id = 2\n").unwrap();
        assert_eq!(settings.capture_frames, 3);
        assert_eq!(settings.camera.device_id, 2);
        assert_eq!(settings.camera.width, 1920);
        assert_eq!(settings.pipeline, PipelineConfig::default());
    }

    #[test]
    fn reference_point_can_be_switched_off_alone() {
        let settings = Settings::from_toml("[pipeline.registration]\nuse_reference_point = false\n").unwrap();
        assert!(!settings.pipeline.registration.use_reference_point);
        let defaults = Settings::default().pipeline.registration;
        assert_eq!(settings.pipeline.registration.reference, defaults.reference);
        assert_eq!(settings.pipeline.registration.scale, defaults.scale);
    }

    #[test]
    fn invalid_pipeline_is_reported() {
        let mut settings = Settings::default();
        settings.pipeline.edge_detection_scale = 0.1;
        assert!(matches!(settings.pipeline_config(), Err(SettingsError::Invalid(_))));
    }

    #[test]
    fn reference_follows_camera_resolution() {
        let mut settings = Settings::default();
        settings.camera.width = 960;
        settings.camera.height = 540;
        let reference = settings.reference_at_camera();
        assert_eq!(reference.pixel, [478.0, 269.5]);
    }
}
