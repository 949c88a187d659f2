//! Image normalization and text extraction.
//!
//! Pipeline: RawImage bytes → grayscale 2× raster → adaptive threshold → OCR → text

mod normalizer;
mod ocr;

pub use normalizer::*;
pub use ocr::*;

use thiserror::Error;

/// Image decoding and preprocessing errors. Fatal for an upload.
#[derive(Error, Debug)]
pub enum ImagingError {
    #[error("Cannot decode image: {0}")]
    Decode(String),

    #[error("Threshold block size must be odd and at least 3, got {0}")]
    InvalidBlockSize(u32),
}

pub type ImagingResult<T> = Result<T, ImagingError>;

/// OCR engine errors. Absorbed by [`TextExtractor`].
#[derive(Error, Debug)]
pub enum OcrError {
    #[error("Failed to encode raster for OCR: {0}")]
    Encode(String),

    #[error("Failed to start OCR engine: {0}")]
    Spawn(String),

    #[error("OCR I/O error: {0}")]
    Io(String),

    #[error("OCR timed out after {0}s")]
    Timeout(u64),

    #[error("OCR engine exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
}

pub type OcrResult<T> = Result<T, OcrError>;
