//! Raster stages of the pipeline: colour segmentation, edge extraction,
//! contour tracing and ring simplification.

pub mod color;
pub mod contours;
pub mod edges;
pub mod simplification;

pub use color::{ColorSegmenter, HsvBounds, HueRange, Hsv8, sample_color};
pub use contours::{ContourTracer, RetrievalMode, TracerConfig};
pub use edges::{CannyThresholds, EdgeExtractor, EdgeMap, EdgeMode};
pub use simplification::{ToleranceTier, ToleranceTiers, simplify_ring};
