//! Bundled [`VectorSink`](crate::traits::VectorSink) implementations.

pub mod dxf;
pub mod geojson;

pub use self::dxf::DxfSink;
pub use self::geojson::GeoJsonSink;

use std::path::Path;

use crate::{error::ExportError, traits::VectorSink};

/// Output formats a document can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    Dxf,
    GeoJson,
}

impl OutputFormat {
    /// Pick a format from the file extension; anything unrecognised is DXF.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("geojson") || ext.eq_ignore_ascii_case("json") => {
                Self::GeoJson
            }
            _ => Self::Dxf,
        }
    }

    pub fn sink(self) -> Box<dyn VectorSink> {
        match self {
            Self::Dxf => Box::new(DxfSink::new()),
            Self::GeoJson => Box::new(GeoJsonSink::new()),
        }
    }
}

pub(crate) fn write_failed(path: &Path, err: impl std::fmt::Display) -> ExportError {
    ExportError::WriteFailed(format!("{}: {err}", path.display()))
}
