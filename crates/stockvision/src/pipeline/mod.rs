pub mod builder;
pub mod config;

pub use builder::PipelineBuilder;
pub use config::{MIN_EDGE_DETECTION_SCALE, PipelineConfig, PreviewStyle};

use std::{path::Path, sync::Arc};

use image::{GrayImage, Rgb, RgbImage, imageops::FilterType};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    algorithms::{ColorSegmenter, ContourTracer, EdgeExtractor, EdgeMap, EdgeMode, sample_color},
    document::VectorDocument,
    error::ExportError,
    geometry::{GeometryMapper, MappingOutcome},
    io::OutputFormat,
    traits::VectorSink,
    types::{ColorSample, Resolution, SimplifiedContour},
};

/// Counts reported after an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    /// Contours surviving tracing and simplification
    pub traced: usize,
    /// Polygons removed by the table boundary filter
    pub dropped: usize,
    /// Polylines handed to the sink, table outline included
    pub emitted: usize,
    pub resolution: Resolution,
}

/// One rendered preview: the downscaled frame with edges painted over it.
#[derive(Debug, Clone)]
pub struct PreviewFrame {
    pub image: RgbImage,
    /// Edge and mask rasters at preview size
    pub edges: EdgeMap,
    pub contour_count: usize,
    /// Resolution of the captured frame the preview was made from
    pub source: Resolution,
}

/// The vision-to-vector pipeline for one configuration snapshot.
///
/// Cloning is cheap; the background edge mask is shared.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
    background: Option<Arc<GrayImage>>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            background: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Replace the configuration, keeping any captured background.
    pub fn with_config(&self, config: PipelineConfig) -> Self {
        Self {
            config,
            background: self.background.clone(),
        }
    }

    /// Remember a background tracing raster (at detection scale) to subtract from later frames.
    pub fn set_background(&mut self, raster: GrayImage) {
        self.background = Some(Arc::new(raster));
    }

    pub fn clear_background(&mut self) {
        self.background = None;
    }

    pub fn background(&self) -> Option<&GrayImage> {
        self.background.as_deref()
    }

    /// Average colour around a picked pixel, using the configured sample radius.
    pub fn sample_color(&self, frame: &RgbImage, x: u32, y: u32) -> ColorSample {
        sample_color(frame, x, y, self.config.sample_radius)
    }

    /// The edge stage for this configuration. Colour mode without a sample falls back to grayscale.
    pub fn extractor(&self) -> EdgeExtractor {
        match (self.config.edge_mode, self.config.color_sample) {
            (EdgeMode::Color, Some(sample)) => {
                EdgeExtractor::Color(ColorSegmenter::new(sample, self.config.tolerance))
            }
            (EdgeMode::Color, None) => {
                warn!("colour mode without a sampled colour, using grayscale edges");
                EdgeExtractor::Grayscale(self.config.canny)
            }
            (EdgeMode::Grayscale, _) => EdgeExtractor::Grayscale(self.config.canny),
        }
    }

    fn detection_frame(&self, frame: &RgbImage) -> RgbImage {
        let factor = self.config.edge_detection_scale;
        if factor == 1.0 {
            return frame.clone();
        }
        let (width, height) = frame.dimensions();
        let scaled = |side: u32| ((side as f64 * factor).round() as u32).max(1);
        image::imageops::resize(frame, scaled(width), scaled(height), FilterType::Triangle)
    }

    /// Edge extraction at detection scale, with the background subtracted when enabled.
    pub fn detect(&self, frame: &RgbImage) -> EdgeMap {
        let mut map = self.extractor().extract(&self.detection_frame(frame));
        if self.config.subtract_background {
            match &self.background {
                Some(background) => map.subtract_background(background),
                None => debug!("background subtraction enabled but no background captured"),
            }
        }
        map
    }

    /// Simplified contours in capture pixels.
    pub fn trace(&self, frame: &RgbImage) -> Vec<SimplifiedContour> {
        let map = self.detect(frame);
        let contours = ContourTracer::new(self.config.tracer.clone()).trace(map.tracing_raster());

        let factor = self.config.edge_detection_scale;
        if factor == 1.0 {
            contours
        } else {
            contours.into_iter().map(|c| c.scaled(1.0 / factor)).collect()
        }
    }

    /// Mapper for `frame`; polygons leaving the table are dropped only while the table boundary is on.
    pub fn mapper(&self, frame: Resolution) -> GeometryMapper {
        let mapper = GeometryMapper::new(&self.config.registration, frame);
        if self.config.add_table_boundary {
            mapper.with_boundary(self.config.table)
        } else {
            mapper
        }
    }

    pub fn map(&self, contours: &[SimplifiedContour], frame: Resolution) -> MappingOutcome {
        self.mapper(frame).map_all(contours)
    }

    /// Run every stage and assemble the vector document.
    pub fn build_document(&self, frame: Option<&RgbImage>) -> Result<(VectorDocument, ExportSummary), ExportError> {
        self.config.validate()?;
        let frame = frame.ok_or(ExportError::NoImage)?;
        let resolution = Resolution::of(frame);

        let contours = self.trace(frame);
        if contours.is_empty() {
            return Err(ExportError::NoContours);
        }
        let outcome = self.map(&contours, resolution);
        if outcome.polygons.is_empty() {
            warn!(dropped = outcome.dropped, "every polygon fell outside the table");
        }

        let mut builder = VectorDocument::builder();
        if self.config.add_table_boundary {
            builder = builder.with_boundary(self.config.table);
        }
        let document = builder.add_polygons(outcome.polygons).build();

        let summary = ExportSummary {
            traced: contours.len(),
            dropped: outcome.dropped,
            emitted: document.len(),
            resolution,
        };
        Ok((document, summary))
    }

    /// Export `frame` into `sink` and save it to `path`.
    pub fn export(
        &self,
        frame: Option<&RgbImage>,
        sink: &mut dyn VectorSink,
        path: &Path,
    ) -> Result<ExportSummary, ExportError> {
        let (document, summary) = self.build_document(frame)?;
        document.emit(sink)?;
        sink.save(path)?;
        info!(
            path = %path.display(),
            traced = summary.traced,
            dropped = summary.dropped,
            emitted = summary.emitted,
            "export complete"
        );
        Ok(summary)
    }

    /// Export with the sink chosen from the file extension.
    pub fn export_to_file(&self, frame: Option<&RgbImage>, path: &Path) -> Result<ExportSummary, ExportError> {
        let mut sink = OutputFormat::from_path(path).sink();
        self.export(frame, sink.as_mut(), path)
    }

    /// Downscaled frame with the detected edges drawn over it.
    pub fn preview(&self, frame: &RgbImage) -> PreviewFrame {
        let source = Resolution::of(frame);
        let style = self.config.preview;
        let scaled = |side: u32| ((side as f64 * style.scale).round() as u32).max(1);
        let (width, height) = (scaled(source.width), scaled(source.height));

        let detected = self.detect(frame);
        let contour_count = ContourTracer::new(self.config.tracer.clone())
            .trace(detected.tracing_raster())
            .len();
        let edges = if detected.dimensions() == (width, height) {
            detected
        } else {
            detected.resized(width, height)
        };

        let mut image = if (width, height) == frame.dimensions() {
            frame.clone()
        } else {
            image::imageops::resize(frame, width, height, FilterType::Triangle)
        };
        paint_overlay(&mut image, &edges, style);

        PreviewFrame {
            image,
            edges,
            contour_count,
            source,
        }
    }
}

/// Tint mask pixels red, then paint edge pixels solid.
fn paint_overlay(image: &mut RgbImage, edges: &EdgeMap, style: PreviewStyle) {
    let tint = style.mask_tint;
    if let Some(mask) = &edges.mask {
        for (pixel, m) in image.pixels_mut().zip(mask.pixels()) {
            if m.0[0] > 127 {
                let [r, g, b] = pixel.0;
                let blend = |c: u8, target: f32| (c as f32 * (1.0 - tint) + target * tint).round() as u8;
                *pixel = Rgb([blend(r, 255.0), blend(g, 0.0), blend(b, 0.0)]);
            }
        }
    }
    let edge_color = style.edge_color.to_rgb();
    for (pixel, e) in image.pixels_mut().zip(edges.edges.pixels()) {
        if e.0[0] > 127 {
            *pixel = edge_color;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        algorithms::{RetrievalMode, ToleranceTier, ToleranceTiers},
        document::tests::RecordingSink,
        geometry::Registration,
        types::{ReferencePoint, ScaleFactor, TableBoundary, ToleranceBand},
    };

    fn square_frame(width: u32, height: u32, x0: u32, y0: u32, side: u32, color: [u8; 3]) -> RgbImage {
        let mut img = RgbImage::new(width, height);
        for y in y0..y0 + side {
            for x in x0..x0 + side {
                img.put_pixel(x, y, Rgb(color));
            }
        }
        img
    }

    /// Unit scale with pixel (0, H) at the table origin and no rotation.
    fn identity_registration(frame: Resolution) -> Registration {
        Registration {
            scale: ScaleFactor::new(1.0).unwrap(),
            rotation_degrees: 0.0,
            reference: ReferencePoint::new([0.0, frame.height as f64], [0.0, 0.0], frame),
            use_reference_point: true,
        }
    }

    #[test]
    fn white_square_traces_to_one_quadrilateral() {
        let frame = square_frame(200, 200, 50, 50, 100, [255, 255, 255]);
        let pipeline = Pipeline::builder().canny(50, 150).build().unwrap();

        let contours = pipeline.trace(&frame);
        assert_eq!(contours.len(), 1, "{contours:?}");
        assert_eq!(contours[0].points.len(), 4, "{:?}", contours[0].points);
        let error = (contours[0].source_area - 10_000.0).abs() / 10_000.0;
        assert!(error < 0.02, "area {}", contours[0].source_area);

        // each corner of the 50..150 square is within a couple of pixels of a kept vertex
        for corner in [[50.0, 50.0], [149.0, 50.0], [149.0, 149.0], [50.0, 149.0]] {
            let nearest = contours[0]
                .points
                .iter()
                .map(|p: &[f64; 2]| (p[0] - corner[0]).hypot(p[1] - corner[1]))
                .fold(f64::INFINITY, f64::min);
            assert!(nearest <= 2.0, "{corner:?} vs {:?}", contours[0].points);
        }
    }

    #[test]
    fn export_without_frame_is_no_image() {
        let pipeline = Pipeline::default();
        let mut sink = RecordingSink::default();
        let err = pipeline.export(None, &mut sink, Path::new("unused.dxf")).unwrap_err();
        assert!(matches!(err, ExportError::NoImage));
        assert!(sink.polylines.is_empty());
    }

    #[test]
    fn invalid_config_is_reported_before_any_stage() {
        let config = PipelineConfig {
            edge_detection_scale: 0.1,
            ..PipelineConfig::default()
        };
        let err = Pipeline::new(config).build_document(None).unwrap_err();
        assert!(matches!(err, ExportError::InvalidConfig(_)));
    }

    #[test]
    fn blank_frame_has_no_contours() {
        let frame = RgbImage::new(64, 64);
        let err = Pipeline::default().build_document(Some(&frame)).unwrap_err();
        assert!(matches!(err, ExportError::NoContours));
    }

    #[test]
    fn export_emits_boundary_then_stock() {
        let resolution = Resolution::new(120, 100);
        let frame = square_frame(120, 100, 20, 20, 40, [40, 180, 40]);
        let pipeline = Pipeline::builder()
            .color(ColorSample::new(40, 180, 40), ToleranceBand::default())
            .registration(identity_registration(resolution))
            .table(TableBoundary::new(120.0, 100.0).unwrap())
            .build()
            .unwrap();

        let mut sink = RecordingSink::default();
        let summary = pipeline.export(Some(&frame), &mut sink, Path::new("unused.dxf")).unwrap();
        assert_eq!(summary.traced, 1);
        assert_eq!(summary.dropped, 0);
        assert_eq!(summary.emitted, 2);
        assert_eq!(sink.polylines[0].0, vec![[0.0, 0.0], [120.0, 0.0], [120.0, 100.0], [0.0, 100.0]]);

        // the traced square sits around pixels 20..60, y flipped into 40..80
        let (min, max) = crate::types::MappedPolygon::closed(sink.polylines[1].0.clone()).bounding_box();
        assert!((min[0] - 20.0).abs() <= 2.0 && (max[0] - 59.0).abs() <= 2.0, "{min:?} {max:?}");
        assert!((min[1] - 41.0).abs() <= 2.0 && (max[1] - 80.0).abs() <= 2.0, "{min:?} {max:?}");
    }

    #[test]
    fn stock_off_the_table_is_dropped_not_clipped() {
        let resolution = Resolution::new(120, 100);
        let frame = square_frame(120, 100, 70, 20, 40, [255, 255, 255]);
        let pipeline = Pipeline::builder()
            .registration(identity_registration(resolution))
            .table(TableBoundary::new(80.0, 100.0).unwrap())
            .build()
            .unwrap();

        let (document, summary) = pipeline.build_document(Some(&frame)).unwrap();
        assert_eq!(summary.dropped, 1);
        assert!(document.polygons().is_empty());
        assert!(document.boundary().is_some());
    }

    #[test]
    fn stock_off_the_table_survives_without_boundary() {
        let resolution = Resolution::new(120, 100);
        let frame = square_frame(120, 100, 70, 20, 40, [255, 255, 255]);
        let pipeline = Pipeline::builder()
            .registration(identity_registration(resolution))
            .table(TableBoundary::new(80.0, 100.0).unwrap())
            .add_table_boundary(false)
            .build()
            .unwrap();

        let (document, summary) = pipeline.build_document(Some(&frame)).unwrap();
        assert_eq!(summary.traced, 1);
        assert_eq!(summary.dropped, 0);
        assert_eq!(summary.emitted, 1);
        let (_, max) = document.polygons()[0].bounding_box();
        assert!(max[0] > 80.0, "{max:?}");
    }

    #[test]
    fn edge_scale_keeps_contours_in_capture_pixels() {
        let frame = square_frame(200, 200, 40, 40, 120, [255, 255, 255]);
        let tiers = ToleranceTiers::new(vec![ToleranceTier { min_area: 0.0, tolerance: 0.3 }]).unwrap();
        let full = Pipeline::builder()
            .color(ColorSample::new(255, 255, 255), ToleranceBand::default())
            .tolerance_tiers(tiers.clone())
            .build()
            .unwrap();
        let doubled = Pipeline::builder()
            .color(ColorSample::new(255, 255, 255), ToleranceBand::default())
            .tolerance_tiers(tiers)
            .edge_detection_scale(2.0)
            .build()
            .unwrap();

        let a = full.trace(&frame);
        let b = doubled.trace(&frame);
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
        let ratio = b[0].source_area / a[0].source_area;
        assert!((ratio - 1.0).abs() < 0.05, "ratio {ratio}");
    }

    #[test]
    fn background_edges_are_ignored_when_enabled() {
        let background = square_frame(100, 100, 10, 10, 30, [255, 255, 255]);
        let mut scene = background.clone();
        for y in 60..90 {
            for x in 60..90 {
                scene.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }

        let mut pipeline = Pipeline::builder()
            .subtract_background(true)
            .retrieval(RetrievalMode::External)
            .build()
            .unwrap();
        assert_eq!(pipeline.trace(&scene).len(), 2);

        // background edges thickened by a dilation so small shifts still cancel
        let raster = pipeline.detect(&background).edges;
        let thick = imageproc::morphology::dilate(&raster, imageproc::distance_transform::Norm::LInf, 1);
        pipeline.set_background(thick);
        assert_eq!(pipeline.trace(&scene).len(), 1);
    }

    #[test]
    fn colour_mode_without_sample_uses_grayscale() {
        let config = PipelineConfig {
            edge_mode: EdgeMode::Color,
            ..PipelineConfig::default()
        };
        assert_eq!(Pipeline::new(config).extractor().mode(), EdgeMode::Grayscale);
    }

    #[test]
    fn preview_is_downscaled_and_painted() {
        let frame = square_frame(200, 100, 50, 25, 50, [200, 30, 30]);
        let pipeline = Pipeline::builder()
            .color(ColorSample::new(200, 30, 30), ToleranceBand::default())
            .build()
            .unwrap();
        let preview = pipeline.preview(&frame);
        assert_eq!(preview.image.dimensions(), (100, 50));
        assert_eq!(preview.edges.dimensions(), (100, 50));
        assert_eq!(preview.source, Resolution::new(200, 100));
        assert_eq!(preview.contour_count, 1);
        assert!(preview.image.pixels().any(|p| p.0 == [0, 255, 0]));
    }
}
