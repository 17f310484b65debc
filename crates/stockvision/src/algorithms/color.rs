//! Hue-circular HSV segmentation of a colour frame against a picked sample.

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::distance_transform::Norm;
use palette::{FromColor, Hsv, Srgb};
use tracing::{debug, warn};

use crate::{
    error::SegmentationError,
    types::{ColorSample, ToleranceBand},
};

/// Frames whose brightest channel stays below this are stretched before conversion.
pub const DARK_FRAME_CEILING: u8 = 200;

/// Hue range of the 8-bit HSV representation (degrees halved).
pub const HUE_RANGE: u16 = 180;

/// A colour in 8-bit HSV: hue in `0..180`, saturation and value in `0..=255`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hsv8 {
    pub h: u8,
    pub s: u8,
    pub v: u8,
}

impl Hsv8 {
    pub fn from_rgb(pixel: Rgb<u8>) -> Result<Self, SegmentationError> {
        let [r, g, b] = pixel.0;
        let rgb: Srgb<f32> = Srgb::new(r, g, b).into_format();
        let hsv: Hsv = Hsv::from_color(rgb);

        let degrees = hsv.hue.into_positive_degrees();
        if !(degrees.is_finite() && hsv.saturation.is_finite() && hsv.value.is_finite()) {
            return Err(SegmentationError::NonFinite);
        }

        let h = ((degrees / 2.0).round() as u16) % HUE_RANGE;
        Ok(Self {
            h: h as u8,
            s: (hsv.saturation * 255.0).round().clamp(0.0, 255.0) as u8,
            v: (hsv.value * 255.0).round().clamp(0.0, 255.0) as u8,
        })
    }
}

/// Inclusive hue interval on the 0..180 circle.
///
/// `lower > upper` means the interval straddles 0 and covers `[lower, 180) ∪ [0, upper]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HueRange {
    pub lower: u8,
    pub upper: u8,
    pub full: bool,
}

impl HueRange {
    pub fn around(center: u8, tolerance: u8) -> Self {
        let range = HUE_RANGE as i16;
        let tolerance = tolerance as i16;
        if 2 * tolerance >= range {
            return Self {
                lower: 0,
                upper: (range - 1) as u8,
                full: true,
            };
        }

        let center = center as i16 % range;
        let lower = (center - tolerance).rem_euclid(range);
        let upper = (center + tolerance).rem_euclid(range);
        Self {
            lower: lower as u8,
            upper: upper as u8,
            full: false,
        }
    }

    pub fn wraps(&self) -> bool {
        !self.full && self.lower > self.upper
    }

    pub fn contains(&self, hue: u8) -> bool {
        if self.full {
            true
        } else if self.wraps() {
            hue >= self.lower || hue <= self.upper
        } else {
            (self.lower..=self.upper).contains(&hue)
        }
    }
}

/// Per-channel acceptance bounds derived from a sample and a tolerance band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HsvBounds {
    pub hue: HueRange,
    pub saturation: (u8, u8),
    pub value: (u8, u8),
}

impl HsvBounds {
    pub fn around(center: Hsv8, band: ToleranceBand) -> Self {
        Self {
            hue: HueRange::around(center.h, band.hue),
            saturation: (
                center.s.saturating_sub(band.saturation),
                center.s.saturating_add(band.saturation),
            ),
            value: (
                center.v.saturating_sub(band.value),
                center.v.saturating_add(band.value),
            ),
        }
    }

    pub fn contains(&self, hsv: Hsv8) -> bool {
        self.hue.contains(hsv.h)
            && (self.saturation.0..=self.saturation.1).contains(&hsv.s)
            && (self.value.0..=self.value.1).contains(&hsv.v)
    }
}

/// Linearly stretch all channels so the darkest value maps to 0 and the brightest to 255.
///
/// Near-uniform images come back unchanged.
pub fn stretch_intensity(image: &RgbImage) -> RgbImage {
    let (min, max) = image
        .as_raw()
        .iter()
        .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let (min, max) = (min as f32, max as f32);

    if image.as_raw().is_empty() || max - min < 1e-6 {
        return image.clone();
    }

    let span = max - min;
    let mut out = image.clone();
    for value in out.iter_mut() {
        *value = (255.0 * (*value as f32 - min) / span).clamp(0.0, 255.0) as u8;
    }
    out
}

/// Stretch underexposed frames so hue is not computed from a compressed range.
pub fn normalize_dark_frame(image: &RgbImage) -> RgbImage {
    let brightest = image.as_raw().iter().copied().max().unwrap_or(0);
    if brightest < DARK_FRAME_CEILING {
        debug!(brightest, "stretching dark frame before colour conversion");
        stretch_intensity(image)
    } else {
        image.clone()
    }
}

/// Average colour of the disc of `radius` pixels around `(x, y)`.
///
/// The centre is pulled inwards so the disc fits the frame where possible.
pub fn sample_color(frame: &RgbImage, x: u32, y: u32, radius: u32) -> ColorSample {
    let (width, height) = frame.dimensions();
    let cx = x.min(width.saturating_sub(radius + 1)).max(radius).min(width.saturating_sub(1));
    let cy = y.min(height.saturating_sub(radius + 1)).max(radius).min(height.saturating_sub(1));

    let r = radius as i64;
    let mut sum = [0u64; 3];
    let mut count = 0u64;
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy > r * r {
                continue;
            }
            let (px, py) = (cx as i64 + dx, cy as i64 + dy);
            if px < 0 || py < 0 || px >= width as i64 || py >= height as i64 {
                continue;
            }
            let pixel = frame.get_pixel(px as u32, py as u32);
            for (acc, channel) in sum.iter_mut().zip(pixel.0) {
                *acc += channel as u64;
            }
            count += 1;
        }
    }

    if count == 0 {
        return ColorSample::from(*frame.get_pixel(cx, cy));
    }
    ColorSample::new(
        (sum[0] / count) as u8,
        (sum[1] / count) as u8,
        (sum[2] / count) as u8,
    )
}

/// Produces a binary mask of pixels matching a sampled colour.
#[derive(Debug, Clone, Copy)]
pub struct ColorSegmenter {
    pub sample: ColorSample,
    pub tolerance: ToleranceBand,
}

impl ColorSegmenter {
    pub fn new(sample: ColorSample, tolerance: ToleranceBand) -> Self {
        Self { sample, tolerance }
    }

    /// Segment the frame. Never fails: internal errors produce an all-zero mask.
    pub fn segment(&self, image: &RgbImage) -> GrayImage {
        match self.try_segment(image) {
            Ok(mask) => mask,
            Err(err) => {
                warn!(error = %err, "colour segmentation failed, reporting nothing detected");
                GrayImage::new(image.width(), image.height())
            }
        }
    }

    pub fn bounds(&self) -> Result<HsvBounds, SegmentationError> {
        let center = Hsv8::from_rgb(self.sample.to_rgb())?;
        Ok(HsvBounds::around(center, self.tolerance))
    }

    pub fn try_segment(&self, image: &RgbImage) -> Result<GrayImage, SegmentationError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(SegmentationError::EmptyImage);
        }

        let bounds = self.bounds()?;
        let normalized = normalize_dark_frame(image);

        let mut mask = GrayImage::new(image.width(), image.height());
        for (x, y, pixel) in normalized.enumerate_pixels() {
            if bounds.contains(Hsv8::from_rgb(*pixel)?) {
                mask.put_pixel(x, y, Luma([255u8]));
            }
        }

        // Fill pinholes, then bridge near-adjacent matches
        let closed = imageproc::morphology::close(&mask, Norm::LInf, 1);
        Ok(imageproc::morphology::dilate(&closed, Norm::LInf, 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn green_square_scene() -> RgbImage {
        let mut img = RgbImage::new(400, 400);
        for y in 100..300 {
            for x in 100..300 {
                img.put_pixel(x, y, Rgb([40, 180, 40]));
            }
        }
        img
    }

    #[test]
    fn hue_band_wraps_below_zero() {
        let range = HueRange::around(5, 15);
        assert!(range.wraps());
        assert_eq!((range.lower, range.upper), (170, 20));
        for hue in [170, 175, 179, 0, 5, 19, 20] {
            assert!(range.contains(hue), "hue {hue} should be inside");
        }
        for hue in [169, 21, 90] {
            assert!(!range.contains(hue), "hue {hue} should be outside");
        }
    }

    #[test]
    fn hue_band_wraps_above_180() {
        let range = HueRange::around(175, 10);
        assert!(range.wraps());
        assert_eq!((range.lower, range.upper), (165, 5));
        assert!(range.contains(165) && range.contains(179) && range.contains(5));
        assert!(!range.contains(6) && !range.contains(164));
    }

    #[test]
    fn hue_band_without_wrap_is_plain_interval() {
        for h in 0..180u8 {
            for t in 0..90u8 {
                let range = HueRange::around(h, t);
                assert!(range.contains(h));
                if !range.wraps() {
                    assert!(range.lower <= range.upper);
                }
            }
        }
    }

    #[test]
    fn wide_hue_tolerance_covers_the_circle() {
        let range = HueRange::around(60, 90);
        assert!(range.full);
        assert!((0..180u8).all(|h| range.contains(h)));
    }

    #[test]
    fn linear_bounds_clamp() {
        let bounds = HsvBounds::around(Hsv8 { h: 60, s: 20, v: 240 }, ToleranceBand::default());
        assert_eq!(bounds.saturation, (0, 120));
        assert_eq!(bounds.value, (140, 255));
    }

    #[test]
    fn hsv_conversion_uses_half_degrees() {
        let green = Hsv8::from_rgb(Rgb([40, 180, 40])).unwrap();
        assert_eq!(green.h, 60);
        assert_eq!(green.v, 180);
        assert_eq!(green.s, 198);

        let red = Hsv8::from_rgb(Rgb([255, 0, 0])).unwrap();
        assert_eq!(red.h, 0);

        let black = Hsv8::from_rgb(Rgb([0, 0, 0])).unwrap();
        assert_eq!((black.s, black.v), (0, 0));
    }

    #[test]
    fn stretch_leaves_uniform_image_alone() {
        let img = RgbImage::from_pixel(8, 8, Rgb([90, 90, 90]));
        assert_eq!(stretch_intensity(&img), img);
    }

    #[test]
    fn dark_frame_is_stretched_to_full_range() {
        let mut img = RgbImage::from_pixel(4, 4, Rgb([10, 10, 10]));
        img.put_pixel(0, 0, Rgb([110, 60, 10]));
        let out = normalize_dark_frame(&img);
        assert_eq!(out.get_pixel(0, 0).0, [255, 127, 0]);
        assert_eq!(out.get_pixel(1, 1).0, [0, 0, 0]);
    }

    #[test]
    fn bright_frame_is_not_stretched() {
        let mut img = RgbImage::from_pixel(4, 4, Rgb([10, 10, 10]));
        img.put_pixel(0, 0, Rgb([220, 60, 10]));
        assert_eq!(normalize_dark_frame(&img), img);
    }

    #[test]
    fn green_square_is_segmented() {
        let img = green_square_scene();
        let segmenter = ColorSegmenter::new(
            ColorSample::new(40, 180, 40),
            ToleranceBand { hue: 15, saturation: 100, value: 100 },
        );
        let mask = segmenter.segment(&img);

        let mut true_positive = 0u32;
        let mut false_positive = 0u32;
        for (x, y, p) in mask.enumerate_pixels() {
            let inside = (100..300).contains(&x) && (100..300).contains(&y);
            match (inside, p.0[0] > 0) {
                (true, true) => true_positive += 1,
                (false, true) => false_positive += 1,
                _ => {}
            }
        }
        let square = 200 * 200;
        let background = 400 * 400 - square;
        assert!(true_positive as f64 >= 0.95 * square as f64);
        assert!(false_positive as f64 <= 0.01 * background as f64);
    }

    #[test]
    fn empty_image_degrades_to_empty_mask() {
        let segmenter = ColorSegmenter::new(ColorSample::new(1, 2, 3), ToleranceBand::default());
        let img = RgbImage::new(0, 0);
        assert_eq!(segmenter.try_segment(&img), Err(SegmentationError::EmptyImage));
        let mask = segmenter.segment(&img);
        assert_eq!(mask.dimensions(), (0, 0));
    }

    #[test]
    fn sample_averages_disc() {
        let mut img = RgbImage::from_pixel(20, 20, Rgb([100, 100, 100]));
        img.put_pixel(10, 10, Rgb([200, 100, 0]));
        // radius 1 disc: centre plus 4 neighbours
        let sample = sample_color(&img, 10, 10, 1);
        assert_eq!(sample, ColorSample::new(120, 100, 80));

        let single = sample_color(&img, 10, 10, 0);
        assert_eq!(single, ColorSample::new(200, 100, 0));
    }

    #[test]
    fn sample_centre_is_clamped_inside_frame() {
        let mut img = RgbImage::from_pixel(10, 10, Rgb([0, 0, 0]));
        img.put_pixel(2, 2, Rgb([255, 255, 255]));
        // corner click with radius 2 samples around (2, 2)
        let sample = sample_color(&img, 0, 0, 2);
        assert_eq!(sample, ColorSample::new(19, 19, 19));
    }
}
