use image::{GrayImage, Luma, RgbImage};
use tracing::debug;

use crate::{
    error::{Result, VisionError},
    pipeline::Pipeline,
    traits::CaptureDevice,
};

/// Default number of frames averaged per capture.
pub const DEFAULT_CAPTURE_FRAMES: usize = 10;

/// Averages frames and OR-combines their edge rasters to suppress sensor noise.
#[derive(Debug, Clone)]
pub struct FrameAccumulator {
    sums: Vec<u32>,
    dimensions: Option<(u32, u32)>,
    edges: Option<GrayImage>,
    frames: usize,
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self {
            sums: Vec::new(),
            dimensions: None,
            edges: None,
            frames: 0,
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Add one frame and, optionally, the edge raster extracted from it.
    ///
    /// Every frame must share the dimensions of the first; edge rasters must share theirs.
    pub fn push(&mut self, frame: &RgbImage, edges: Option<&GrayImage>) -> Result<()> {
        match self.dimensions {
            None => {
                self.dimensions = Some(frame.dimensions());
                self.sums = vec![0; frame.as_raw().len()];
            }
            Some(expected) if expected != frame.dimensions() => {
                return Err(VisionError::InvalidValue(format!(
                    "frame is {:?}, accumulator holds {:?}",
                    frame.dimensions(),
                    expected
                )));
            }
            Some(_) => {}
        }

        if let Some(edges) = edges {
            match &mut self.edges {
                None => self.edges = Some(edges.clone()),
                Some(combined) if combined.dimensions() != edges.dimensions() => {
                    return Err(VisionError::InvalidValue(format!(
                        "edge raster is {:?}, accumulator holds {:?}",
                        edges.dimensions(),
                        combined.dimensions()
                    )));
                }
                Some(combined) => {
                    for (acc, e) in combined.pixels_mut().zip(edges.pixels()) {
                        if e.0[0] > 0 {
                            *acc = Luma([255]);
                        }
                    }
                }
            }
        }

        for (sum, &value) in self.sums.iter_mut().zip(frame.as_raw()) {
            *sum += value as u32;
        }
        self.frames += 1;
        Ok(())
    }

    /// Pixel-wise mean of every pushed frame, truncated to `u8`.
    pub fn mean(&self) -> Option<RgbImage> {
        let (width, height) = self.dimensions?;
        let count = self.frames as u32;
        let raw = self.sums.iter().map(|&sum| (sum / count) as u8).collect();
        RgbImage::from_raw(width, height, raw)
    }

    /// Union of every pushed edge raster.
    pub fn combined_edges(&self) -> Option<&GrayImage> {
        self.edges.as_ref()
    }

    pub fn into_parts(self) -> Option<(RgbImage, Option<GrayImage>)> {
        let mean = self.mean()?;
        Some((mean, self.edges))
    }
}

impl Default for FrameAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of averaging several reads from one device.
#[derive(Debug, Clone)]
pub struct AveragedCapture {
    pub frame: RgbImage,
    /// OR of every frame's tracing raster, at detection scale
    pub edges: GrayImage,
    pub frames: usize,
}

/// Read `count` frames, averaging them and combining their tracing rasters.
pub fn capture_averaged<D: CaptureDevice + ?Sized>(
    device: &mut D,
    pipeline: &Pipeline,
    count: usize,
) -> Result<AveragedCapture> {
    let mut accumulator = FrameAccumulator::new();
    for _ in 0..count.max(1) {
        let frame = device.read()?;
        let map = pipeline.detect(&frame);
        accumulator.push(&frame, Some(map.tracing_raster()))?;
    }

    let frames = accumulator.frames();
    let (frame, edges) = accumulator
        .into_parts()
        .ok_or_else(|| VisionError::InvalidValue("no frames captured".to_string()))?;
    let edges = edges.unwrap_or_else(|| GrayImage::new(frame.width(), frame.height()));
    debug!(frames, "averaged capture");
    Ok(AveragedCapture { frame, edges, frames })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use crate::{capture::StillImageDevice, error::DeviceError, types::Resolution};

    #[test]
    fn mean_is_truncated() {
        let mut acc = FrameAccumulator::new();
        acc.push(&RgbImage::from_pixel(2, 2, Rgb([10, 0, 255])), None).unwrap();
        acc.push(&RgbImage::from_pixel(2, 2, Rgb([11, 1, 254])), None).unwrap();
        let mean = acc.mean().unwrap();
        assert_eq!(mean.get_pixel(1, 1).0, [10, 0, 254]);
        assert_eq!(acc.frames(), 2);
    }

    #[test]
    fn edges_are_or_combined() {
        let mut a = GrayImage::new(3, 1);
        a.put_pixel(0, 0, Luma([255]));
        let mut b = GrayImage::new(3, 1);
        b.put_pixel(2, 0, Luma([255]));

        let frame = RgbImage::new(3, 1);
        let mut acc = FrameAccumulator::new();
        acc.push(&frame, Some(&a)).unwrap();
        acc.push(&frame, Some(&b)).unwrap();
        let edges = acc.combined_edges().unwrap();
        assert_eq!(edges.as_raw(), &vec![255, 0, 255]);
    }

    #[test]
    fn mismatched_frames_are_rejected() {
        let mut acc = FrameAccumulator::new();
        acc.push(&RgbImage::new(4, 4), None).unwrap();
        assert!(acc.push(&RgbImage::new(4, 5), None).is_err());
        assert!(acc.push(&RgbImage::new(4, 4), Some(&GrayImage::new(4, 4))).is_ok());
        assert!(acc.push(&RgbImage::new(4, 4), Some(&GrayImage::new(2, 2))).is_err());
        assert_eq!(acc.frames(), 2);
    }

    #[test]
    fn empty_accumulator_has_no_mean() {
        assert!(FrameAccumulator::new().mean().is_none());
    }

    struct Flaky {
        reads: usize,
    }

    impl CaptureDevice for Flaky {
        fn read(&mut self) -> std::result::Result<RgbImage, DeviceError> {
            self.reads += 1;
            if self.reads == 2 {
                Err(DeviceError::ReadFailed("dropped frame".to_string()))
            } else {
                Ok(RgbImage::new(8, 8))
            }
        }

        fn resolution(&self) -> Resolution {
            Resolution::new(8, 8)
        }
    }

    #[test]
    fn averaged_capture_reads_count_frames() {
        let mut device = StillImageDevice::from_frame(RgbImage::from_pixel(16, 16, Rgb([90, 90, 90])));
        let capture = capture_averaged(&mut device, &Pipeline::default(), 4).unwrap();
        assert_eq!(capture.frames, 4);
        assert_eq!(capture.frame.get_pixel(3, 3).0, [90, 90, 90]);
        assert_eq!(capture.edges.dimensions(), (16, 16));
    }

    #[test]
    fn read_failures_abort_the_capture() {
        let mut device = Flaky { reads: 0 };
        let err = capture_averaged(&mut device, &Pipeline::default(), 3).unwrap_err();
        assert!(matches!(err, VisionError::Device(DeviceError::ReadFailed(_))));
    }
}
