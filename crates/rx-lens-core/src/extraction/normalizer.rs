//! Grayscale upscale and adaptive Gaussian thresholding.

use image::imageops::FilterType;
use image::{GrayImage, Luma};
use tracing::debug;

use super::{ImagingError, ImagingResult};

/// Neighborhood size of the adaptive threshold.
pub const DEFAULT_BLOCK_SIZE: u32 = 31;

/// Constant subtracted from the weighted neighborhood mean.
pub const DEFAULT_BIAS: f64 = 2.0;

/// Linear upscale factor applied before thresholding.
pub const UPSCALE_FACTOR: u32 = 2;

/// Prepares prescription photos for OCR.
#[derive(Debug, Clone)]
pub struct ImageNormalizer {
    block_size: u32,
    bias: f64,
    kernel: Vec<f32>,
}

impl Default for ImageNormalizer {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            bias: DEFAULT_BIAS,
            kernel: gaussian_kernel(DEFAULT_BLOCK_SIZE),
        }
    }
}

impl ImageNormalizer {
    /// Create a normalizer with a custom neighborhood and bias.
    pub fn new(block_size: u32, bias: f64) -> ImagingResult<Self> {
        if block_size < 3 || block_size % 2 == 0 {
            return Err(ImagingError::InvalidBlockSize(block_size));
        }
        Ok(Self {
            block_size,
            bias,
            kernel: gaussian_kernel(block_size),
        })
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    /// Decode, upscale and binarize an uploaded image.
    ///
    /// The result is exactly twice the decoded width and height and holds only
    /// the values 0 and 255.
    pub fn normalize(&self, bytes: &[u8]) -> ImagingResult<GrayImage> {
        let decoded =
            image::load_from_memory(bytes).map_err(|e| ImagingError::Decode(e.to_string()))?;
        let gray = decoded.to_luma8();
        let (width, height) = gray.dimensions();
        if width == 0 || height == 0 {
            return Err(ImagingError::Decode("image has no pixels".into()));
        }

        let upscaled = image::imageops::resize(
            &gray,
            width * UPSCALE_FACTOR,
            height * UPSCALE_FACTOR,
            FilterType::CatmullRom,
        );
        debug!(
            width,
            height,
            out_width = upscaled.width(),
            out_height = upscaled.height(),
            "Upscaled image for OCR"
        );

        Ok(self.threshold(&upscaled))
    }

    /// Binarize against a Gaussian-weighted neighborhood mean.
    pub fn threshold(&self, src: &GrayImage) -> GrayImage {
        let mean = self.gaussian_blur(src);
        let offset = self.bias.ceil() as i32;

        let mut out = GrayImage::new(src.width(), src.height());
        for (x, y, pixel) in src.enumerate_pixels() {
            let local = mean[(y * src.width() + x) as usize] as i32;
            let value = if pixel[0] as i32 - local > -offset { 255 } else { 0 };
            out.put_pixel(x, y, Luma([value]));
        }
        out
    }

    /// Separable Gaussian blur with replicated borders, rounded to u8.
    fn gaussian_blur(&self, src: &GrayImage) -> Vec<u8> {
        let (width, height) = (src.width() as i64, src.height() as i64);
        let radius = (self.kernel.len() / 2) as i64;
        let clamp = |v: i64, max: i64| v.clamp(0, max - 1) as u32;

        let mut horizontal = vec![0f32; (width * height) as usize];
        for y in 0..height {
            for x in 0..width {
                let mut acc = 0f32;
                for (k, weight) in self.kernel.iter().enumerate() {
                    let sx = clamp(x + k as i64 - radius, width);
                    acc += weight * src.get_pixel(sx, y as u32)[0] as f32;
                }
                horizontal[(y * width + x) as usize] = acc;
            }
        }

        let mut blurred = vec![0u8; (width * height) as usize];
        for y in 0..height {
            for x in 0..width {
                let mut acc = 0f32;
                for (k, weight) in self.kernel.iter().enumerate() {
                    let sy = clamp(y + k as i64 - radius, height) as i64;
                    acc += weight * horizontal[(sy * width + x) as usize];
                }
                blurred[(y * width + x) as usize] = acc.round().clamp(0.0, 255.0) as u8;
            }
        }
        blurred
    }
}

/// Normalized 1-D Gaussian weights for an odd window size.
fn gaussian_kernel(size: u32) -> Vec<f32> {
    let sigma = 0.3 * ((size as f64 - 1.0) * 0.5 - 1.0) + 0.8;
    let center = (size / 2) as f64;
    let raw: Vec<f64> = (0..size)
        .map(|i| {
            let d = i as f64 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = raw.iter().sum();
    raw.into_iter().map(|w| (w / sum) as f32).collect()
}
