use geo_types::{Coord, LineString, Polygon, Rect, coord};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VisionError};

/// Capture resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn of<I: image::GenericImageView>(image: &I) -> Self {
        let (width, height) = image.dimensions();
        Self { width, height }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Target colour picked by the user, in RGB channel order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ColorSample {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl ColorSample {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_rgb(self) -> image::Rgb<u8> {
        image::Rgb([self.r, self.g, self.b])
    }
}

impl From<image::Rgb<u8>> for ColorSample {
    fn from(pixel: image::Rgb<u8>) -> Self {
        let [r, g, b] = pixel.0;
        Self { r, g, b }
    }
}

/// Per-channel HSV tolerances. Hue is measured on the 0..180 circle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ToleranceBand {
    pub hue: u8,
    pub saturation: u8,
    pub value: u8,
}

impl Default for ToleranceBand {
    fn default() -> Self {
        Self {
            hue: 15,
            saturation: 100,
            value: 100,
        }
    }
}

/// Whether a traced border is the outside of a region or the rim of a hole in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BorderKind {
    Outer,
    Hole,
}

/// A closed boundary traced from a binary raster, in pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    pub points: Vec<[f64; 2]>,
    pub kind: BorderKind,
}

impl Contour {
    pub fn new(points: Vec<[f64; 2]>, kind: BorderKind) -> Self {
        Self { points, kind }
    }

    /// Convert to a geo-types polygon; the ring is closed automatically.
    pub fn to_geo_polygon(&self) -> Polygon<f64> {
        ring_polygon(&self.points)
    }

    /// Enclosed area in square pixels.
    pub fn area(&self) -> f64 {
        use geo::Area;
        self.to_geo_polygon().unsigned_area()
    }

    /// Length of the closed ring, including the segment back to the first point.
    pub fn perimeter(&self) -> f64 {
        use geo::EuclideanLength;
        self.to_geo_polygon().exterior().euclidean_length()
    }
}

/// A contour after polygon approximation. Always holds at least three points.
#[derive(Debug, Clone, PartialEq)]
pub struct SimplifiedContour {
    pub points: Vec<[f64; 2]>,
    pub kind: BorderKind,
    /// Enclosed area of the contour before simplification.
    pub source_area: f64,
}

impl SimplifiedContour {
    pub fn area(&self) -> f64 {
        use geo::Area;
        ring_polygon(&self.points).unsigned_area()
    }

    /// Uniformly rescale the pixel coordinates, used when detection ran on a resized frame.
    pub fn scaled(mut self, factor: f64) -> Self {
        for point in &mut self.points {
            point[0] *= factor;
            point[1] *= factor;
        }
        self.source_area *= factor * factor;
        self
    }
}

/// A polygon in physical table units (inches), ready for the vector sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedPolygon {
    pub points: Vec<[f64; 2]>,
    pub closed: bool,
}

impl MappedPolygon {
    pub fn closed(points: Vec<[f64; 2]>) -> Self {
        Self {
            points,
            closed: true,
        }
    }

    pub fn to_geo_polygon(&self) -> Polygon<f64> {
        ring_polygon(&self.points)
    }

    /// Get the bounding box of the polygon
    pub fn bounding_box(&self) -> ([f64; 2], [f64; 2]) {
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;

        for &[x, y] in &self.points {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }

        ([min_x, min_y], [max_x, max_y])
    }
}

/// Inches per pixel. Always finite and strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, JsonSchema)]
#[serde(try_from = "f64", into = "f64")]
pub struct ScaleFactor(f64);

impl ScaleFactor {
    pub fn new(inches_per_pixel: f64) -> Result<Self> {
        if inches_per_pixel.is_finite() && inches_per_pixel > 0.0 {
            Ok(Self(inches_per_pixel))
        } else {
            Err(VisionError::InvalidValue(format!(
                "inches per pixel must be finite and positive, got {inches_per_pixel}"
            )))
        }
    }

    pub fn inches_per_pixel(self) -> f64 {
        self.0
    }
}

impl Default for ScaleFactor {
    fn default() -> Self {
        Self(0.0604)
    }
}

impl TryFrom<f64> for ScaleFactor {
    type Error = VisionError;

    fn try_from(value: f64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ScaleFactor> for f64 {
    fn from(scale: ScaleFactor) -> Self {
        scale.0
    }
}

/// A pixel location registered to a known position on the machine table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReferencePoint {
    /// Pixel position `[x, y]` at `resolution`.
    pub pixel: [f64; 2],
    /// Table position `[x, y]` in inches.
    pub table: [f64; 2],
    /// Capture resolution at which `pixel` was recorded.
    pub resolution: Resolution,
}

impl ReferencePoint {
    pub fn new(pixel: [f64; 2], table: [f64; 2], resolution: Resolution) -> Self {
        Self {
            pixel,
            table,
            resolution,
        }
    }

    /// The same physical reference expressed at another capture resolution.
    pub fn at_resolution(&self, resolution: Resolution) -> Self {
        if resolution == self.resolution {
            return *self;
        }
        Self {
            pixel: crate::geometry::rescale_reference_point(self.pixel, self.resolution, resolution),
            table: self.table,
            resolution,
        }
    }
}

/// Physical extents of the machine table, anchored at the origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TableBoundary {
    pub width: f64,
    pub height: f64,
}

impl Default for TableBoundary {
    fn default() -> Self {
        Self {
            width: 144.0,
            height: 61.0,
        }
    }
}

impl TableBoundary {
    pub fn new(width: f64, height: f64) -> Result<Self> {
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(VisionError::InvalidValue(format!(
                "table dimensions must be positive, got {width}x{height}"
            )));
        }
        Ok(Self { width, height })
    }

    pub fn rect(&self) -> Rect<f64> {
        Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: self.width, y: self.height })
    }

    /// Inclusive containment; points on the edge count as inside.
    pub fn contains_point(&self, [x, y]: [f64; 2]) -> bool {
        (0.0..=self.width).contains(&x) && (0.0..=self.height).contains(&y)
    }

    pub fn contains_polygon(&self, polygon: &MappedPolygon) -> bool {
        polygon.points.iter().all(|&p| self.contains_point(p))
    }

    /// The table outline as a closed four-point polygon, counter-clockwise from the origin.
    pub fn polygon(&self) -> MappedPolygon {
        let rect = self.rect();
        let (min, max) = (rect.min(), rect.max());
        MappedPolygon::closed(vec![
            [min.x, min.y],
            [max.x, min.y],
            [max.x, max.y],
            [min.x, max.y],
        ])
    }
}

fn ring_polygon(points: &[[f64; 2]]) -> Polygon<f64> {
    let coords: Vec<Coord<f64>> = points.iter().map(|&[x, y]| Coord { x, y }).collect();
    // LineString -> Polygon closes the ring if needed
    Polygon::new(LineString::new(coords), vec![])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_factor_rejects_non_positive() {
        assert!(ScaleFactor::new(0.0).is_err());
        assert!(ScaleFactor::new(-0.01).is_err());
        assert!(ScaleFactor::new(f64::NAN).is_err());
        assert_eq!(ScaleFactor::new(0.05).unwrap().inches_per_pixel(), 0.05);
    }

    #[test]
    fn scale_factor_deserialization_is_validated() {
        assert!(serde_json::from_str::<ScaleFactor>("0.0").is_err());
        let scale: ScaleFactor = serde_json::from_str("0.0604").unwrap();
        assert_eq!(scale.inches_per_pixel(), 0.0604);
    }

    #[test]
    fn contour_area_and_perimeter_close_the_ring() {
        let contour = Contour::new(
            vec![[0.0, 0.0], [10.0, 0.0], [10.0, 5.0], [0.0, 5.0]],
            BorderKind::Outer,
        );
        assert_eq!(contour.area(), 50.0);
        assert_eq!(contour.perimeter(), 30.0);
    }

    #[test]
    fn table_polygon_starts_at_origin() {
        let table = TableBoundary::new(144.0, 61.0).unwrap();
        let polygon = table.polygon();
        assert!(polygon.closed);
        assert_eq!(
            polygon.points,
            vec![[0.0, 0.0], [144.0, 0.0], [144.0, 61.0], [0.0, 61.0]]
        );
    }

    #[test]
    fn table_containment_is_inclusive() {
        let table = TableBoundary::new(10.0, 5.0).unwrap();
        assert!(table.contains_point([0.0, 0.0]));
        assert!(table.contains_point([10.0, 5.0]));
        assert!(!table.contains_point([10.0001, 2.0]));
        assert!(!table.contains_point([2.0, -0.1]));
    }
}
