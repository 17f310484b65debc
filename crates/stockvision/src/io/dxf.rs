use std::path::Path;

use dxf::{
    Drawing, LwPolylineVertex,
    entities::{Entity, EntityCommon, EntityType, LwPolyline},
    enums::{AcadVersion, DrawingUnits, UnitFormat, Units},
};
use tracing::info;

use super::write_failed;
use crate::{error::ExportError, traits::VectorSink};

/// Layer every polyline is placed on.
pub const STOCK_LAYER: &str = "STOCK";

/// Writes polylines as LWPOLYLINE entities in an inch-based R2010 drawing.
pub struct DxfSink {
    drawing: Drawing,
    polylines: usize,
}

impl DxfSink {
    pub fn new() -> Self {
        let mut drawing = Drawing::new();
        drawing.header.version = AcadVersion::R2010;
        drawing.header.default_drawing_units = Units::Inches;
        drawing.header.unit_format = UnitFormat::Decimal;
        drawing.header.drawing_units = DrawingUnits::English;
        Self { drawing, polylines: 0 }
    }

    pub fn polyline_count(&self) -> usize {
        self.polylines
    }

    pub fn drawing(&self) -> &Drawing {
        &self.drawing
    }
}

impl Default for DxfSink {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorSink for DxfSink {
    fn add_polyline(&mut self, points: &[[f64; 2]], closed: bool) -> Result<(), ExportError> {
        let mut polyline = LwPolyline::default();
        polyline.vertices = points
            .iter()
            .map(|&[x, y]| LwPolylineVertex {
                x,
                y,
                ..Default::default()
            })
            .collect();
        polyline.set_is_closed(closed);

        let common = EntityCommon {
            layer: STOCK_LAYER.to_string(),
            ..Default::default()
        };
        self.drawing.add_entity(Entity {
            common,
            specific: EntityType::LwPolyline(polyline),
        });
        self.polylines += 1;
        Ok(())
    }

    fn save(&self, path: &Path) -> Result<(), ExportError> {
        self.drawing.save_file(path).map_err(|err| write_failed(path, err))?;
        info!(path = %path.display(), polylines = self.polylines, "wrote DXF");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polylines_survive_a_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stock.dxf");

        let mut sink = DxfSink::new();
        sink.add_polyline(&[[0.0, 0.0], [144.0, 0.0], [144.0, 61.0], [0.0, 61.0]], true)
            .unwrap();
        sink.add_polyline(&[[10.0, 10.0], [20.5, 10.0], [20.5, 30.25]], true).unwrap();
        sink.save(&path).unwrap();
        assert_eq!(sink.polyline_count(), 2);

        let drawing = Drawing::load_file(&path).unwrap();
        assert_eq!(drawing.header.default_drawing_units, Units::Inches);
        let polylines: Vec<&LwPolyline> = drawing
            .entities()
            .filter_map(|e| match &e.specific {
                EntityType::LwPolyline(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(polylines.len(), 2);
        assert_eq!(polylines[0].vertices.len(), 4);
        assert!(polylines[0].is_closed());
        assert_eq!(polylines[1].vertices[2].x, 20.5);
        assert_eq!(polylines[1].vertices[2].y, 30.25);
    }

    #[test]
    fn unwritable_path_reports_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("stock.dxf");
        let sink = DxfSink::new();
        assert!(matches!(sink.save(&path), Err(ExportError::WriteFailed(_))));
    }
}
