//! Pixel → table coordinate mapping.
//!
//! Every point goes through the same fixed sequence: scale to inches, flip the
//! y axis so it grows upward, rotate about the image centre, then translate so
//! the registered reference pixel lands on its table position. The translation
//! is skipped when the reference point is switched off.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::types::{MappedPolygon, ReferencePoint, Resolution, ScaleFactor, SimplifiedContour, TableBoundary};

/// Express a reference pixel recorded at `old` resolution at `new` resolution.
pub fn rescale_reference_point(point: [f64; 2], old: Resolution, new: Resolution) -> [f64; 2] {
    if old.width == 0 || old.height == 0 {
        return point;
    }
    [
        point[0] * new.width as f64 / old.width as f64,
        point[1] * new.height as f64 / old.height as f64,
    ]
}

/// Everything the mapper needs besides the contours themselves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Registration {
    pub scale: ScaleFactor,
    /// Degrees, counter-clockwise positive
    pub rotation_degrees: f64,
    /// Translate so `reference` lands on its table position; off leaves the
    /// bottom-left pixel corner at the table origin
    pub use_reference_point: bool,
    pub reference: ReferencePoint,
}

impl Default for Registration {
    fn default() -> Self {
        Self {
            scale: ScaleFactor::default(),
            rotation_degrees: -0.25,
            use_reference_point: true,
            reference: ReferencePoint::new(
                [956.0, 539.0],
                [72.63324, 30.54024],
                Resolution::new(1920, 1080),
            ),
        }
    }
}

/// Polygons that survived the boundary filter, and how many did not.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingOutcome {
    pub polygons: Vec<MappedPolygon>,
    pub dropped: usize,
}

/// Maps pixel contours of one frame size into table inches.
#[derive(Debug, Clone, Copy)]
pub struct GeometryMapper {
    scale: f64,
    frame_height: f64,
    center: [f64; 2],
    /// `(sin, cos)`, absent when the rotation angle is exactly zero
    rotation: Option<(f64, f64)>,
    translation: [f64; 2],
    boundary: Option<TableBoundary>,
}

impl GeometryMapper {
    /// Build a mapper for frames of `frame` resolution.
    ///
    /// The reference pixel is first rescaled to `frame` if it was recorded at another resolution.
    /// Without a reference point only the scale, flip and rotation apply.
    pub fn new(registration: &Registration, frame: Resolution) -> Self {
        let scale = registration.scale.inches_per_pixel();
        let (width, height) = (frame.width as f64, frame.height as f64);
        let translation = if registration.use_reference_point {
            let reference = registration.reference.at_resolution(frame);
            [
                reference.table[0] - reference.pixel[0] * scale,
                reference.table[1] - (height - reference.pixel[1]) * scale,
            ]
        } else {
            [0.0, 0.0]
        };
        let rotation = (registration.rotation_degrees != 0.0).then(|| {
            let radians = registration.rotation_degrees.to_radians();
            radians.sin_cos()
        });

        Self {
            scale,
            frame_height: height,
            center: [width * scale / 2.0, height * scale / 2.0],
            rotation,
            translation,
            boundary: None,
        }
    }

    /// Drop any polygon with a point outside `boundary`.
    pub fn with_boundary(mut self, boundary: TableBoundary) -> Self {
        self.boundary = Some(boundary);
        self
    }

    pub fn translation(&self) -> [f64; 2] {
        self.translation
    }

    pub fn map_point(&self, [px, py]: [f64; 2]) -> [f64; 2] {
        let x = px * self.scale;
        let y = self.frame_height * self.scale - py * self.scale;

        let [x, y] = match self.rotation {
            Some((sin, cos)) => {
                let (dx, dy) = (x - self.center[0], y - self.center[1]);
                [
                    self.center[0] + dx * cos - dy * sin,
                    self.center[1] + dx * sin + dy * cos,
                ]
            }
            None => [x, y],
        };

        [x + self.translation[0], y + self.translation[1]]
    }

    pub fn map_contour(&self, contour: &SimplifiedContour) -> MappedPolygon {
        MappedPolygon::closed(contour.points.iter().map(|&p| self.map_point(p)).collect())
    }

    /// Map every contour and apply the boundary filter. Polygons are dropped whole, never clipped.
    pub fn map_all(&self, contours: &[SimplifiedContour]) -> MappingOutcome {
        let mut outcome = MappingOutcome::default();
        for contour in contours {
            let polygon = self.map_contour(contour);
            match &self.boundary {
                Some(boundary) if !boundary.contains_polygon(&polygon) => {
                    debug!(points = polygon.points.len(), "polygon leaves the table, dropped");
                    outcome.dropped += 1;
                }
                _ => outcome.polygons.push(polygon),
            }
        }
        if outcome.dropped > 0 {
            info!(
                dropped = outcome.dropped,
                kept = outcome.polygons.len(),
                "boundary filter removed polygons"
            );
        }
        outcome
    }
}
