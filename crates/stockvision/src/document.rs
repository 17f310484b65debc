use std::path::Path;

use tracing::debug;

use crate::{
    error::ExportError,
    traits::VectorSink,
    types::{MappedPolygon, TableBoundary},
};

/// An ordered set of closed polygons in table inches, ready to emit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorDocument {
    boundary: Option<MappedPolygon>,
    polygons: Vec<MappedPolygon>,
}

impl VectorDocument {
    pub fn builder() -> VectorDocumentBuilder {
        VectorDocumentBuilder::default()
    }

    pub fn boundary(&self) -> Option<&MappedPolygon> {
        self.boundary.as_ref()
    }

    pub fn polygons(&self) -> &[MappedPolygon] {
        &self.polygons
    }

    /// Number of polylines [`emit`](Self::emit) will produce.
    pub fn len(&self) -> usize {
        self.polygons.len() + usize::from(self.boundary.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hand every polygon to the sink, the table boundary first.
    pub fn emit(&self, sink: &mut dyn VectorSink) -> Result<usize, ExportError> {
        let mut emitted = 0;
        for polygon in self.boundary.iter().chain(&self.polygons) {
            sink.add_polyline(&polygon.points, polygon.closed)?;
            emitted += 1;
        }
        debug!(emitted, "emitted polylines");
        Ok(emitted)
    }

    /// Emit into `sink` and save it to `path`.
    pub fn write_to(&self, mut sink: Box<dyn VectorSink>, path: &Path) -> Result<usize, ExportError> {
        let emitted = self.emit(sink.as_mut())?;
        sink.save(path)?;
        Ok(emitted)
    }
}

#[derive(Debug, Clone, Default)]
pub struct VectorDocumentBuilder {
    boundary: Option<TableBoundary>,
    polygons: Vec<MappedPolygon>,
}

impl VectorDocumentBuilder {
    /// Emit the table outline as the first polyline.
    pub fn with_boundary(mut self, boundary: TableBoundary) -> Self {
        self.boundary = Some(boundary);
        self
    }

    pub fn add_polygon(mut self, polygon: MappedPolygon) -> Self {
        self.polygons.push(polygon);
        self
    }

    pub fn add_polygons(mut self, polygons: impl IntoIterator<Item = MappedPolygon>) -> Self {
        self.polygons.extend(polygons);
        self
    }

    pub fn build(self) -> VectorDocument {
        VectorDocument {
            boundary: self.boundary.map(|b| b.polygon()),
            polygons: self.polygons,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Sink that records what it was given.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingSink {
        pub polylines: Vec<(Vec<[f64; 2]>, bool)>,
    }

    impl VectorSink for RecordingSink {
        fn add_polyline(&mut self, points: &[[f64; 2]], closed: bool) -> Result<(), ExportError> {
            self.polylines.push((points.to_vec(), closed));
            Ok(())
        }

        fn save(&self, _path: &Path) -> Result<(), ExportError> {
            Ok(())
        }
    }

    #[test]
    fn boundary_is_emitted_first() {
        let stock = MappedPolygon::closed(vec![[10.0, 10.0], [20.0, 10.0], [20.0, 20.0]]);
        let document = VectorDocument::builder()
            .add_polygon(stock.clone())
            .with_boundary(TableBoundary::default())
            .build();

        let mut sink = RecordingSink::default();
        assert_eq!(document.emit(&mut sink).unwrap(), 2);
        assert_eq!(
            sink.polylines[0],
            (vec![[0.0, 0.0], [144.0, 0.0], [144.0, 61.0], [0.0, 61.0]], true)
        );
        assert_eq!(sink.polylines[1], (stock.points, true));
    }

    #[test]
    fn coordinates_pass_through_untouched() {
        let points = vec![[0.1 + 0.2, 1.0 / 3.0], [5.5, 7.25], [9.0, 0.5]];
        let document = VectorDocument::builder()
            .add_polygons([MappedPolygon::closed(points.clone())])
            .build();
        let mut sink = RecordingSink::default();
        document.emit(&mut sink).unwrap();
        assert_eq!(sink.polylines, vec![(points, true)]);
        assert_eq!(document.len(), 1);
    }

    #[test]
    fn empty_document_emits_nothing() {
        let document = VectorDocument::builder().build();
        let mut sink = RecordingSink::default();
        assert_eq!(document.emit(&mut sink).unwrap(), 0);
        assert!(document.is_empty());
    }
}
