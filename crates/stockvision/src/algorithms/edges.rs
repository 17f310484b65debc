use image::{GrayImage, ImageBuffer, Luma, RgbImage, imageops::FilterType};
use imageproc::{
    definitions::Image,
    distance_transform::Norm,
    filter::{filter3x3, separable_filter_equal},
    gradients::{HORIZONTAL_SOBEL, VERTICAL_SOBEL},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};
use tracing::debug;

use super::color::ColorSegmenter;

/// Binomial 5-tap Gaussian (sigma about 1.1), applied along both axes before gradient detection.
pub const GAUSSIAN_5X5: [f32; 5] = [0.0625, 0.25, 0.375, 0.25, 0.0625];

#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EdgeMode {
    /// Gradient edges on the luma channel
    #[default]
    Grayscale,
    /// Boundary of the region matching the sampled colour
    Color,
}

/// Double-threshold levels for gradient edge detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CannyThresholds {
    pub low: u8,
    pub high: u8,
}

impl Default for CannyThresholds {
    fn default() -> Self {
        Self { low: 50, high: 150 }
    }
}

/// Output of edge extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeMap {
    /// Binary edge raster (0 or 255)
    pub edges: GrayImage,
    /// Colour match mask, present in colour mode
    pub mask: Option<GrayImage>,
}

impl EdgeMap {
    /// The raster contours are traced from: the mask in colour mode, the edges otherwise.
    pub fn tracing_raster(&self) -> &GrayImage {
        self.mask.as_ref().unwrap_or(&self.edges)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.edges.dimensions()
    }

    /// Resample every raster to `width` x `height`.
    pub fn resized(&self, width: u32, height: u32) -> Self {
        let resize = |img: &GrayImage| image::imageops::resize(img, width, height, FilterType::Triangle);
        Self {
            edges: resize(&self.edges),
            mask: self.mask.as_ref().map(resize),
        }
    }

    /// Remove pixels that are also set in a previously captured background edge mask.
    pub fn subtract_background(&mut self, background: &GrayImage) {
        let (width, height) = self.dimensions();
        let background = if background.dimensions() == (width, height) {
            background.clone()
        } else {
            image::imageops::resize(background, width, height, FilterType::Nearest)
        };

        let target = self.mask.as_mut().unwrap_or(&mut self.edges);
        for (pixel, bg) in target.pixels_mut().zip(background.pixels()) {
            let remaining = pixel.0[0].saturating_sub(bg.0[0]);
            *pixel = Luma([if remaining > 0 { 255 } else { 0 }]);
        }
    }
}

/// Produces a binary edge raster from a colour frame.
#[derive(Debug, Clone, Copy)]
pub enum EdgeExtractor {
    Grayscale(CannyThresholds),
    Color(ColorSegmenter),
}

impl EdgeExtractor {
    pub fn extract(&self, image: &RgbImage) -> EdgeMap {
        match self {
            Self::Grayscale(thresholds) => EdgeMap {
                edges: gradient_edges(image, *thresholds),
                mask: None,
            },
            Self::Color(segmenter) => {
                let mask = segmenter.segment(image);
                EdgeMap {
                    edges: mask_edges(&mask),
                    mask: Some(mask),
                }
            }
        }
    }

    pub fn mode(&self) -> EdgeMode {
        match self {
            Self::Grayscale(_) => EdgeMode::Grayscale,
            Self::Color(_) => EdgeMode::Color,
        }
    }
}

/// 5x5 Gaussian smoothing of the luma channel, kept in floating point.
pub fn smooth_gray(image: &RgbImage) -> Image<Luma<f32>> {
    let gray = image::imageops::grayscale(image);
    let gray: Image<Luma<f32>> = ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        Luma([gray.get_pixel(x, y).0[0] as f32])
    });
    separable_filter_equal(&gray, &GAUSSIAN_5X5)
}

/// Luma → Gaussian → Sobel → non-maximum suppression → hysteresis.
///
/// `low > high` is not an error; it yields an empty edge raster.
pub fn gradient_edges(image: &RgbImage, thresholds: CannyThresholds) -> GrayImage {
    let (width, height) = image.dimensions();
    if thresholds.low > thresholds.high {
        debug!(low = thresholds.low, high = thresholds.high, "inverted canny thresholds, no edges");
        return GrayImage::new(width, height);
    }
    if width < 3 || height < 3 {
        return GrayImage::new(width, height);
    }

    let blurred = smooth_gray(image);
    let magnitude = thin_gradients(&blurred);
    hysteresis(&magnitude, thresholds.low as f32, thresholds.high as f32)
}

/// Sobel magnitude with non-maximum suppression across the gradient direction.
///
/// Ties are broken toward the lower/left neighbour so a symmetric step yields
/// a single-pixel edge rather than a double one.
fn thin_gradients(gray: &Image<Luma<f32>>) -> Image<Luma<f32>> {
    let gx = filter3x3::<_, f32, f32>(gray, &HORIZONTAL_SOBEL.map(|k| k as f32));
    let gy = filter3x3::<_, f32, f32>(gray, &VERTICAL_SOBEL.map(|k| k as f32));
    let (width, height) = gray.dimensions();

    let magnitude = ImageBuffer::from_fn(width, height, |x, y| {
        Luma([gx.get_pixel(x, y).0[0].hypot(gy.get_pixel(x, y).0[0])])
    });

    let mut thinned = ImageBuffer::from_pixel(width, height, Luma([0.0f32]));
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let m = magnitude.get_pixel(x, y).0[0];
            if m == 0.0 {
                continue;
            }
            let (dx, dy) = (gx.get_pixel(x, y).0[0], gy.get_pixel(x, y).0[0]);
            let mut angle = dy.atan2(dx).to_degrees();
            if angle < 0.0 {
                angle += 180.0;
            }
            // (before, after) along the gradient
            let (before, after) = match angle {
                a if !(22.5..157.5).contains(&a) => ((x - 1, y), (x + 1, y)),
                a if a < 67.5 => ((x - 1, y - 1), (x + 1, y + 1)),
                a if a < 112.5 => ((x, y - 1), (x, y + 1)),
                _ => ((x + 1, y - 1), (x - 1, y + 1)),
            };
            if m > magnitude.get_pixel(before.0, before.1).0[0]
                && m >= magnitude.get_pixel(after.0, after.1).0[0]
            {
                thinned.put_pixel(x, y, Luma([m]));
            }
        }
    }
    thinned
}

/// Double threshold: keep weak pixels only when 8-connected to a strong one.
fn hysteresis(magnitude: &Image<Luma<f32>>, low: f32, high: f32) -> GrayImage {
    let (width, height) = magnitude.dimensions();
    let mut edges = GrayImage::new(width, height);
    let mut stack = Vec::new();

    for (x, y, pixel) in magnitude.enumerate_pixels() {
        if pixel.0[0] > 0.0 && pixel.0[0] >= high && edges.get_pixel(x, y).0[0] == 0 {
            edges.put_pixel(x, y, Luma([255]));
            stack.push((x, y));
            while let Some((cx, cy)) = stack.pop() {
                for ny in cy.saturating_sub(1)..=(cy + 1).min(height - 1) {
                    for nx in cx.saturating_sub(1)..=(cx + 1).min(width - 1) {
                        let m = magnitude.get_pixel(nx, ny).0[0];
                        if edges.get_pixel(nx, ny).0[0] == 0 && m > 0.0 && m >= low {
                            edges.put_pixel(nx, ny, Luma([255]));
                            stack.push((nx, ny));
                        }
                    }
                }
            }
        }
    }
    edges
}

/// Boundary of a binary mask, thickened by one dilation pass.
pub fn mask_edges(mask: &GrayImage) -> GrayImage {
    let eroded = imageproc::morphology::erode(mask, Norm::LInf, 1);
    let mut boundary = mask.clone();
    for (pixel, inner) in boundary.pixels_mut().zip(eroded.pixels()) {
        *pixel = Luma([pixel.0[0].saturating_sub(inner.0[0])]);
    }
    imageproc::morphology::dilate(&boundary, Norm::LInf, 1)
}
