use crate::{
    algorithms::{CannyThresholds, EdgeMode, RetrievalMode, ToleranceTiers},
    error::ExportError,
    geometry::Registration,
    pipeline::{Pipeline, PipelineConfig},
    types::{ColorSample, ReferencePoint, ScaleFactor, TableBoundary, ToleranceBand},
};

/// Builder for creating pipelines with a fluent API.
///
/// Raw values are only checked in [`build`](Self::build), so a bad scale
/// surfaces as [`ExportError::InvalidScale`] rather than a panic mid-chain.
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    config: PipelineConfig,
    inches_per_pixel: Option<f64>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing snapshot
    pub fn from_config(config: PipelineConfig) -> Self {
        Self {
            config,
            inches_per_pixel: None,
        }
    }

    pub fn edge_mode(mut self, mode: EdgeMode) -> Self {
        self.config.edge_mode = mode;
        self
    }

    pub fn canny(mut self, low: u8, high: u8) -> Self {
        self.config.canny = CannyThresholds { low, high };
        self
    }

    /// Switch to colour mode and segment around `sample`
    pub fn color(mut self, sample: ColorSample, tolerance: ToleranceBand) -> Self {
        self.config.edge_mode = EdgeMode::Color;
        self.config.color_sample = Some(sample);
        self.config.tolerance = tolerance;
        self
    }

    pub fn sample_radius(mut self, radius: u32) -> Self {
        self.config.sample_radius = radius;
        self
    }

    pub fn edge_detection_scale(mut self, scale: f64) -> Self {
        self.config.edge_detection_scale = scale;
        self
    }

    pub fn retrieval(mut self, mode: RetrievalMode) -> Self {
        self.config.tracer.retrieval = mode;
        self
    }

    pub fn min_area(mut self, area: f64) -> Self {
        self.config.tracer.min_area = area;
        self
    }

    pub fn tolerance_tiers(mut self, tiers: ToleranceTiers) -> Self {
        self.config.tracer.tiers = tiers;
        self
    }

    pub fn simplification_normalizer(mut self, normalizer: f64) -> Self {
        self.config.tracer.normalizer = normalizer;
        self
    }

    pub fn inches_per_pixel(mut self, inches_per_pixel: f64) -> Self {
        self.inches_per_pixel = Some(inches_per_pixel);
        self
    }

    pub fn rotation_degrees(mut self, degrees: f64) -> Self {
        self.config.registration.rotation_degrees = degrees;
        self
    }

    pub fn reference(mut self, reference: ReferencePoint) -> Self {
        self.config.registration.reference = reference;
        self
    }

    pub fn use_reference_point(mut self, enabled: bool) -> Self {
        self.config.registration.use_reference_point = enabled;
        self
    }

    pub fn registration(mut self, registration: Registration) -> Self {
        self.config.registration = registration;
        self.inches_per_pixel = None;
        self
    }

    pub fn table(mut self, table: TableBoundary) -> Self {
        self.config.table = table;
        self
    }

    pub fn add_table_boundary(mut self, enabled: bool) -> Self {
        self.config.add_table_boundary = enabled;
        self
    }

    pub fn subtract_background(mut self, enabled: bool) -> Self {
        self.config.subtract_background = enabled;
        self
    }

    /// Validate and produce the configuration snapshot.
    pub fn build_config(self) -> Result<PipelineConfig, ExportError> {
        let mut config = self.config;
        if let Some(raw) = self.inches_per_pixel {
            config.registration.scale = ScaleFactor::new(raw).map_err(|_| ExportError::InvalidScale(raw))?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn build(self) -> Result<Pipeline, ExportError> {
        Ok(Pipeline::new(self.build_config()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_scale_fails_at_build() {
        let err = PipelineBuilder::new().inches_per_pixel(0.0).build().unwrap_err();
        assert!(matches!(err, ExportError::InvalidScale(s) if s == 0.0));
        assert!(matches!(
            PipelineBuilder::new().inches_per_pixel(-2.0).build(),
            Err(ExportError::InvalidScale(_))
        ));
    }

    #[test]
    fn fluent_settings_reach_the_snapshot() {
        let config = PipelineBuilder::new()
            .canny(30, 120)
            .color(ColorSample::new(10, 200, 10), ToleranceBand { hue: 10, saturation: 80, value: 80 })
            .inches_per_pixel(0.05)
            .rotation_degrees(0.0)
            .use_reference_point(false)
            .add_table_boundary(false)
            .build_config()
            .unwrap();
        assert_eq!(config.canny, CannyThresholds { low: 30, high: 120 });
        assert_eq!(config.edge_mode, EdgeMode::Color);
        assert_eq!(config.registration.scale.inches_per_pixel(), 0.05);
        assert!(!config.add_table_boundary);
        assert!(!config.registration.use_reference_point);
    }

    #[test]
    fn invalid_tracer_settings_are_config_errors() {
        let err = PipelineBuilder::new().simplification_normalizer(0.0).build().unwrap_err();
        assert!(matches!(err, ExportError::InvalidConfig(_)));
    }
}
