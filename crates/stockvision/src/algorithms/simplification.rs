use geo::{LineString, Simplify};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VisionError};

/// One row of the area-tiered tolerance table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ToleranceTier {
    /// Contours with enclosed area strictly above this use `tolerance`
    pub min_area: f64,
    pub tolerance: f64,
}

/// Area → simplification tolerance lookup.
///
/// Larger contours get a smaller tolerance so they keep proportionally more points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(try_from = "Vec<ToleranceTier>", into = "Vec<ToleranceTier>")]
pub struct ToleranceTiers {
    /// Sorted by `min_area`, largest first
    tiers: Vec<ToleranceTier>,
}

impl ToleranceTiers {
    pub fn new(mut tiers: Vec<ToleranceTier>) -> Result<Self> {
        if tiers.is_empty() {
            return Err(VisionError::InvalidValue("tolerance table is empty".to_string()));
        }
        if let Some(bad) = tiers.iter().find(|t| {
            !(t.min_area.is_finite() && t.tolerance.is_finite()) || t.min_area < 0.0 || t.tolerance < 0.0
        }) {
            return Err(VisionError::InvalidValue(format!(
                "tolerance tier must be finite and non-negative: {bad:?}"
            )));
        }

        tiers.sort_by(|a, b| b.min_area.total_cmp(&a.min_area));
        if tiers.windows(2).any(|w| w[0].tolerance > w[1].tolerance) {
            return Err(VisionError::InvalidValue(
                "tolerance must not grow with contour area".to_string(),
            ));
        }
        Ok(Self { tiers })
    }

    pub fn tolerance_for(&self, area: f64) -> f64 {
        self.tiers
            .iter()
            .find(|tier| area > tier.min_area)
            .or(self.tiers.last())
            .map(|tier| tier.tolerance)
            .unwrap_or_default()
    }

    pub fn tiers(&self) -> &[ToleranceTier] {
        &self.tiers
    }
}

impl Default for ToleranceTiers {
    fn default() -> Self {
        Self {
            tiers: vec![
                ToleranceTier { min_area: 1000.0, tolerance: 0.3 },
                ToleranceTier { min_area: 100.0, tolerance: 0.4 },
                ToleranceTier { min_area: 0.0, tolerance: 0.5 },
            ],
        }
    }
}

impl TryFrom<Vec<ToleranceTier>> for ToleranceTiers {
    type Error = VisionError;

    fn try_from(tiers: Vec<ToleranceTier>) -> Result<Self> {
        Self::new(tiers)
    }
}

impl From<ToleranceTiers> for Vec<ToleranceTier> {
    fn from(table: ToleranceTiers) -> Self {
        table.tiers
    }
}

/// Smallest epsilon handed to Douglas-Peucker; a zero tolerance still drops exactly collinear points.
const MIN_EPSILON: f64 = 1e-9;

fn farthest_from(points: &[[f64; 2]], origin: [f64; 2]) -> (usize, f64) {
    points
        .iter()
        .enumerate()
        .map(|(i, p)| (i, (p[0] - origin[0]).hypot(p[1] - origin[1])))
        .fold((0, 0.0), |best, cur| if cur.1 > best.1 { cur } else { best })
}

/// Two far-apart ring vertices used to split the ring, in index order.
///
/// The first is the vertex farthest from the ring start, the second the vertex farthest
/// from that one; both lie on the convex hull.
fn ring_anchors(points: &[[f64; 2]]) -> Option<(usize, usize)> {
    let (a, distance) = farthest_from(points, points[0]);
    if distance == 0.0 {
        return None;
    }
    let (b, _) = farthest_from(points, points[a]);
    Some((a.min(b), a.max(b)))
}

/// Simplify a closed ring (first point implicitly joins the last).
///
/// The ring is split at two anchor vertices and each half is reduced with
/// Douglas-Peucker, so the result stays closed without a repeated vertex.
pub fn simplify_ring(points: &[[f64; 2]], epsilon: f64) -> Vec<[f64; 2]> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let Some((a, b)) = ring_anchors(points) else {
        return vec![points[0]];
    };

    let epsilon = epsilon.max(MIN_EPSILON);
    let first: LineString<f64> = points[a..=b].iter().copied().collect();
    let second: LineString<f64> = points[b..].iter().chain(&points[..=a]).copied().collect();
    let first = first.simplify(&epsilon);
    let second = second.simplify(&epsilon);

    // the second half starts where the first ends and ends where it starts
    let tail = &second.0[1..second.0.len() - 1];
    first.0.iter().chain(tail).map(|c| [c.x, c.y]).collect()
}
