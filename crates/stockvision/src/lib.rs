//! # Stock Vision
//!
//! Turns a camera image of stock material lying on a CNC table into closed
//! polylines in table inches, written as DXF (or GeoJSON) for toolpath software.
//!
//! ## Core Features
//!
//! - **Two edge modes**: gradient edges on luma, or the boundary of a colour-matched region
//! - **Area-tiered simplification**: larger outlines keep proportionally more vertices
//! - **Registration**: scale, y flip, rotation and a reference point tie pixels to the table
//! - **Calibration**: two clicks over a known distance measure inches per pixel
//! - **Capture plumbing**: exclusive device sessions, a live preview thread and frame averaging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stockvision::Pipeline;
//! use std::path::Path;
//!
//! let pipeline = Pipeline::builder()
//!     .inches_per_pixel(0.0604)
//!     .canny(50, 150)
//!     .build()?;
//!
//! let frame = image::open("table.jpg")?.to_rgb8();
//! let summary = pipeline.export_to_file(Some(&frame), Path::new("stock.dxf"))?;
//! println!("{} polylines written", summary.emitted);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Colour Mode
//!
//! ```rust,no_run
//! use stockvision::{Pipeline, ToleranceBand};
//!
//! let frame = image::open("table.jpg")?.to_rgb8();
//! let picker = Pipeline::default();
//! let sample = picker.sample_color(&frame, 640, 360);
//!
//! let pipeline = Pipeline::builder()
//!     .color(sample, ToleranceBand::default())
//!     .build()?;
//! let contours = pipeline.trace(&frame);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod algorithms;
pub mod calibration;
pub mod capture;
pub mod document;
pub mod error;
pub mod geometry;
pub mod io;
pub mod pipeline;
pub mod traits;
pub mod types;

pub use algorithms::{
    CannyThresholds, ColorSegmenter, ContourTracer, EdgeExtractor, EdgeMap, EdgeMode, RetrievalMode,
    ToleranceTier, ToleranceTiers, TracerConfig,
};
pub use calibration::{CalibrationCommand, CalibrationEngine, CalibrationState, measure_scale};
pub use capture::{CameraSession, FrameAccumulator, FrameBuffer, PreviewLoop, StillImageSource};
pub use document::{VectorDocument, VectorDocumentBuilder};
pub use error::{CalibrationError, DeviceError, ExportError, Result, SegmentationError, VisionError};
pub use geometry::{GeometryMapper, MappingOutcome, Registration, rescale_reference_point};
pub use io::{DxfSink, GeoJsonSink, OutputFormat};
pub use pipeline::{ExportSummary, Pipeline, PipelineBuilder, PipelineConfig, PreviewFrame};
pub use traits::*;
pub use types::{
    BorderKind, ColorSample, Contour, MappedPolygon, ReferencePoint, Resolution, ScaleFactor,
    SimplifiedContour, TableBoundary, ToleranceBand,
};
