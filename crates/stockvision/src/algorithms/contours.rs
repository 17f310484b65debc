use image::GrayImage;
use imageproc::contours::BorderType;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::debug;

use super::simplification::{ToleranceTiers, simplify_ring};
use crate::{
    error::{Result, VisionError},
    types::{BorderKind, Contour, SimplifiedContour},
};

/// Which borders to keep when tracing.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema, Display, EnumString
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RetrievalMode {
    /// Outermost borders only
    #[default]
    External,
    /// Every border, including hole rims and islands inside holes
    All,
}

/// Tracing and simplification parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TracerConfig {
    pub retrieval: RetrievalMode,
    /// Contours enclosing less than this many square pixels are noise
    pub min_area: f64,
    pub tiers: ToleranceTiers,
    /// `epsilon = tolerance * perimeter / normalizer`
    pub normalizer: f64,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            retrieval: RetrievalMode::External,
            min_area: 3.0,
            tiers: ToleranceTiers::default(),
            normalizer: 100.0,
        }
    }
}

impl TracerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.min_area.is_finite() && self.min_area >= 0.0) {
            return Err(VisionError::InvalidValue(format!(
                "minimum contour area must be non-negative, got {}",
                self.min_area
            )));
        }
        if !(self.normalizer.is_finite() && self.normalizer > 0.0) {
            return Err(VisionError::InvalidValue(format!(
                "simplification normalizer must be positive, got {}",
                self.normalizer
            )));
        }
        Ok(())
    }
}

/// Extracts and simplifies closed boundaries from a binary raster.
#[derive(Debug, Clone, Default)]
pub struct ContourTracer {
    pub config: TracerConfig,
}

impl ContourTracer {
    pub fn new(config: TracerConfig) -> Self {
        Self { config }
    }

    /// Raw borders of foreground regions, filtered by retrieval mode.
    pub fn trace_raw(&self, binary: &GrayImage) -> Vec<Contour> {
        imageproc::contours::find_contours::<i32>(binary)
            .into_iter()
            .filter(|c| match self.config.retrieval {
                RetrievalMode::External => c.border_type == BorderType::Outer && c.parent.is_none(),
                RetrievalMode::All => true,
            })
            .map(|c| {
                let kind = match c.border_type {
                    BorderType::Outer => BorderKind::Outer,
                    BorderType::Hole => BorderKind::Hole,
                };
                let points = c.points.iter().map(|p| [p.x as f64, p.y as f64]).collect();
                Contour::new(points, kind)
            })
            .collect()
    }

    /// Simplify one contour with the tolerance its area selects.
    ///
    /// Returns `None` for contours under the area threshold or that collapse below three points.
    pub fn simplify(&self, contour: &Contour) -> Option<SimplifiedContour> {
        if contour.points.len() < 3 {
            return None;
        }
        let area = contour.area();
        if area < self.config.min_area {
            return None;
        }

        let tolerance = self.config.tiers.tolerance_for(area);
        let epsilon = tolerance * contour.perimeter() / self.config.normalizer;
        let points = simplify_ring(&contour.points, epsilon);
        if points.len() < 3 {
            return None;
        }

        Some(SimplifiedContour {
            points,
            kind: contour.kind,
            source_area: area,
        })
    }

    pub fn trace(&self, binary: &GrayImage) -> Vec<SimplifiedContour> {
        let raw = self.trace_raw(binary);
        let traced = raw.len();
        let simplified: Vec<SimplifiedContour> = raw.iter().filter_map(|c| self.simplify(c)).collect();
        debug!(traced, kept = simplified.len(), "traced contours");
        simplified
    }
}
