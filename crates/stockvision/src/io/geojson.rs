use std::path::Path;

use geojson::{Feature, FeatureCollection, Geometry, Value, feature::Id};
use tracing::info;

use super::write_failed;
use crate::{error::ExportError, traits::VectorSink};

/// Collects polylines as GeoJSON features: closed polylines become polygons,
/// open ones line strings. Coordinates are table inches.
#[derive(Debug, Default)]
pub struct GeoJsonSink {
    features: Vec<Feature>,
}

impl GeoJsonSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_feature_collection(&self) -> FeatureCollection {
        let mut foreign_members = serde_json::Map::new();
        foreign_members.insert("units".to_string(), serde_json::Value::from("inches"));
        foreign_members.insert("polyline_count".to_string(), serde_json::Value::from(self.features.len()));

        FeatureCollection {
            bbox: None,
            features: self.features.clone(),
            foreign_members: Some(foreign_members),
        }
    }

    pub fn to_geojson_string(&self) -> Result<String, ExportError> {
        serde_json::to_string_pretty(&self.to_feature_collection())
            .map_err(|err| ExportError::WriteFailed(err.to_string()))
    }
}

impl VectorSink for GeoJsonSink {
    fn add_polyline(&mut self, points: &[[f64; 2]], closed: bool) -> Result<(), ExportError> {
        let mut positions: Vec<Vec<f64>> = points.iter().map(|&[x, y]| vec![x, y]).collect();
        let value = if closed {
            // GeoJSON rings repeat their first position
            if let Some(first) = positions.first().cloned() {
                if positions.last() != Some(&first) {
                    positions.push(first);
                }
            }
            Value::Polygon(vec![positions])
        } else {
            Value::LineString(positions)
        };

        let mut properties = serde_json::Map::new();
        properties.insert("closed".to_string(), serde_json::Value::Bool(closed));
        properties.insert("vertex_count".to_string(), serde_json::Value::from(points.len()));

        let id = self.features.len();
        self.features.push(Feature {
            bbox: None,
            geometry: Some(Geometry::new(value)),
            id: Some(Id::Number(serde_json::Number::from(id))),
            properties: Some(properties),
            foreign_members: None,
        });
        Ok(())
    }

    fn save(&self, path: &Path) -> Result<(), ExportError> {
        let content = self.to_geojson_string()?;
        std::fs::write(path, content).map_err(|err| write_failed(path, err))?;
        info!(path = %path.display(), polylines = self.features.len(), "wrote GeoJSON");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_polylines_become_closed_polygons() {
        let mut sink = GeoJsonSink::new();
        sink.add_polyline(&[[0.0, 0.0], [4.0, 0.0], [4.0, 3.0]], true).unwrap();
        sink.add_polyline(&[[1.0, 1.0], [2.0, 2.0]], false).unwrap();

        let collection = sink.to_feature_collection();
        assert_eq!(collection.features.len(), 2);
        match &collection.features[0].geometry.as_ref().unwrap().value {
            Value::Polygon(rings) => {
                assert_eq!(rings[0].len(), 4);
                assert_eq!(rings[0].first(), rings[0].last());
            }
            other => panic!("expected polygon, got {other:?}"),
        }
        assert!(matches!(
            collection.features[1].geometry.as_ref().unwrap().value,
            Value::LineString(_)
        ));
    }

    #[test]
    fn saved_file_parses_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stock.geojson");
        let mut sink = GeoJsonSink::new();
        sink.add_polyline(&[[0.0, 0.0], [144.0, 0.0], [144.0, 61.0], [0.0, 61.0]], true)
            .unwrap();
        sink.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: FeatureCollection = text.parse().unwrap();
        assert_eq!(parsed.features.len(), 1);
        let members = parsed.foreign_members.unwrap();
        assert_eq!(members["units"], "inches");
    }
}
