use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    algorithms::{CannyThresholds, EdgeMode, TracerConfig},
    error::ExportError,
    geometry::Registration,
    types::{ColorSample, TableBoundary, ToleranceBand},
};

/// Smallest accepted detection resampling factor.
pub const MIN_EDGE_DETECTION_SCALE: f64 = 0.5;

/// How preview frames are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PreviewStyle {
    /// Preview size relative to the captured frame
    pub scale: f64,
    /// Colour edge pixels are painted in
    pub edge_color: ColorSample,
    /// Opacity of the red tint over colour-matched pixels
    pub mask_tint: f32,
}

impl Default for PreviewStyle {
    fn default() -> Self {
        Self {
            scale: 0.5,
            edge_color: ColorSample::new(0, 255, 0),
            mask_tint: 0.3,
        }
    }
}

/// Immutable snapshot of every pipeline tunable.
///
/// Each pipeline call works from one snapshot, so a preview iteration never
/// sees half-applied settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PipelineConfig {
    pub edge_mode: EdgeMode,
    pub canny: CannyThresholds,
    /// Target colour for [`EdgeMode::Color`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_sample: Option<ColorSample>,
    pub tolerance: ToleranceBand,
    /// Radius of the disc averaged when picking a colour
    pub sample_radius: u32,
    /// Frames are resampled by this factor before detection
    pub edge_detection_scale: f64,
    pub tracer: TracerConfig,
    pub registration: Registration,
    pub table: TableBoundary,
    /// Emit the table outline as the first polyline
    pub add_table_boundary: bool,
    /// Remove edges present in the captured background
    pub subtract_background: bool,
    pub preview: PreviewStyle,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            edge_mode: EdgeMode::Grayscale,
            canny: CannyThresholds::default(),
            color_sample: None,
            tolerance: ToleranceBand::default(),
            sample_radius: 2,
            edge_detection_scale: 1.0,
            tracer: TracerConfig::default(),
            registration: Registration::default(),
            table: TableBoundary::default(),
            add_table_boundary: true,
            subtract_background: false,
            preview: PreviewStyle::default(),
        }
    }
}

impl PipelineConfig {
    /// Checks that cannot be expressed in the field types themselves.
    pub fn validate(&self) -> Result<(), ExportError> {
        let scale = self.registration.scale.inches_per_pixel();
        if !(scale.is_finite() && scale > 0.0) {
            return Err(ExportError::InvalidScale(scale));
        }
        if !(self.edge_detection_scale.is_finite() && self.edge_detection_scale >= MIN_EDGE_DETECTION_SCALE) {
            return Err(ExportError::InvalidConfig(format!(
                "edge detection scale must be at least {MIN_EDGE_DETECTION_SCALE}, got {}",
                self.edge_detection_scale
            )));
        }
        if self.edge_mode == EdgeMode::Color {
            let band = self.tolerance;
            if band.hue == 0 || band.saturation == 0 || band.value == 0 {
                return Err(ExportError::InvalidConfig(format!(
                    "colour tolerance must be non-zero on every channel, got {band:?}"
                )));
            }
        }
        if !self.registration.rotation_degrees.is_finite() {
            return Err(ExportError::InvalidConfig("rotation must be finite".to_string()));
        }
        if !(self.table.width > 0.0 && self.table.height > 0.0) {
            return Err(ExportError::InvalidConfig(format!(
                "table must have positive extents, got {}x{}",
                self.table.width, self.table.height
            )));
        }
        if !(self.preview.scale.is_finite() && self.preview.scale > 0.0 && self.preview.scale <= 1.0) {
            return Err(ExportError::InvalidConfig(format!(
                "preview scale must be in (0, 1], got {}",
                self.preview.scale
            )));
        }
        if !(0.0..=1.0).contains(&self.preview.mask_tint) {
            return Err(ExportError::InvalidConfig(format!(
                "mask tint must be in [0, 1], got {}",
                self.preview.mask_tint
            )));
        }
        self.tracer
            .validate()
            .map_err(|err| ExportError::InvalidConfig(err.to_string()))
    }

    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(PipelineConfig)
    }
}
