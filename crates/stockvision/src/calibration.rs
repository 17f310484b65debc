use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr, VariantNames};
use tracing::{info, warn};

use crate::{
    error::CalibrationError,
    types::{Resolution, ScaleFactor},
};

/// Inches per pixel from two pixel positions a known physical distance apart.
pub fn measure_scale(p1: [f64; 2], p2: [f64; 2], distance: f64) -> Result<ScaleFactor, CalibrationError> {
    if !(distance.is_finite() && distance > 0.0) {
        return Err(CalibrationError::InvalidDistance(distance));
    }
    let pixels = (p2[0] - p1[0]).hypot(p2[1] - p1[1]);
    if pixels == 0.0 {
        return Err(CalibrationError::DegeneratePoints);
    }
    ScaleFactor::new(distance / pixels).map_err(|_| CalibrationError::InvalidDistance(distance))
}

/// Map a click on a downscaled preview back to full-frame pixels.
pub fn preview_to_frame(point: [f64; 2], preview: Resolution, frame: Resolution) -> [f64; 2] {
    crate::geometry::rescale_reference_point(point, preview, frame)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CalibrationState {
    Idle,
    AwaitingFirstPoint { distance: f64 },
    AwaitingSecondPoint { distance: f64, first: [f64; 2] },
    Computed { distance: f64, first: [f64; 2], second: [f64; 2], scale: ScaleFactor },
}

/// Operations a calibration front end can issue.
#[derive(
    Debug, Clone, Copy, PartialEq,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, VariantNames, IntoStaticStr
)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CalibrationCommand {
    /// Begin a measurement of a known physical distance in inches
    Start { distance: f64 },
    /// A point picked in full-frame pixels
    Click { point: [f64; 2] },
    /// Commit the computed scale
    Accept,
    /// Abandon the current measurement
    Cancel,
}

/// Two-click scale measurement.
///
/// The committed scale only changes on [`CalibrationEngine::accept`].
#[derive(Debug, Clone)]
pub struct CalibrationEngine {
    state: CalibrationState,
    committed: ScaleFactor,
}

impl CalibrationEngine {
    pub fn new(committed: ScaleFactor) -> Self {
        Self {
            state: CalibrationState::Idle,
            committed,
        }
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn committed(&self) -> ScaleFactor {
        self.committed
    }

    pub fn start(&mut self, distance: f64) -> Result<(), CalibrationError> {
        if !(distance.is_finite() && distance > 0.0) {
            return Err(CalibrationError::InvalidDistance(distance));
        }
        self.state = CalibrationState::AwaitingFirstPoint { distance };
        Ok(())
    }

    /// Record a point in full-frame pixels. Returns the state after the click.
    pub fn click(&mut self, point: [f64; 2]) -> Result<CalibrationState, CalibrationError> {
        self.state = match self.state {
            CalibrationState::AwaitingFirstPoint { distance } => {
                CalibrationState::AwaitingSecondPoint { distance, first: point }
            }
            CalibrationState::AwaitingSecondPoint { distance, first } => {
                match measure_scale(first, point, distance) {
                    Ok(scale) => {
                        info!(
                            inches_per_pixel = scale.inches_per_pixel(),
                            distance,
                            "calibration measured"
                        );
                        CalibrationState::Computed { distance, first, second: point, scale }
                    }
                    Err(err) => {
                        warn!(%err, "calibration points rejected, starting over");
                        self.state = CalibrationState::Idle;
                        return Err(err);
                    }
                }
            }
            CalibrationState::Idle | CalibrationState::Computed { .. } => {
                return Err(CalibrationError::UnexpectedAction("click"));
            }
        };
        Ok(self.state)
    }

    /// Record a point picked on a preview of `preview` size showing a frame of `frame` size.
    pub fn click_preview(
        &mut self,
        point: [f64; 2],
        preview: Resolution,
        frame: Resolution,
    ) -> Result<CalibrationState, CalibrationError> {
        self.click(preview_to_frame(point, preview, frame))
    }

    /// Commit the computed scale and return to idle.
    pub fn accept(&mut self) -> Result<ScaleFactor, CalibrationError> {
        match self.state {
            CalibrationState::Computed { scale, .. } => {
                self.committed = scale;
                self.state = CalibrationState::Idle;
                info!(inches_per_pixel = scale.inches_per_pixel(), "calibration accepted");
                Ok(scale)
            }
            _ => Err(CalibrationError::UnexpectedAction("accept")),
        }
    }

    pub fn cancel(&mut self) {
        self.state = CalibrationState::Idle;
    }

    /// Discard any measurement in progress.
    pub fn reset(&mut self) {
        self.cancel();
    }

    pub fn execute(&mut self, command: CalibrationCommand) -> Result<CalibrationState, CalibrationError> {
        match command {
            CalibrationCommand::Start { distance } => self.start(distance)?,
            CalibrationCommand::Click { point } => {
                self.click(point)?;
            }
            CalibrationCommand::Accept => {
                self.accept()?;
            }
            CalibrationCommand::Cancel => self.cancel(),
        }
        Ok(self.state)
    }
}

impl Default for CalibrationEngine {
    fn default() -> Self {
        Self::new(ScaleFactor::default())
    }
}
