//! OCR engines and the sentinel-producing text extractor.

use std::io::{Cursor, Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use image::{DynamicImage, GrayImage, ImageFormat};
use tracing::{debug, info, warn};

use super::{OcrError, OcrResult};

/// Returned when OCR succeeds but finds nothing.
pub const NO_TEXT_EXTRACTED: &str = "No text extracted";

/// Returned when the OCR engine fails.
pub const ERROR_EXTRACTING_TEXT: &str = "Error extracting text";

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Page segmentation strategy handed to the OCR engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentationMode {
    /// Fully automatic page segmentation
    Auto,
    /// Assume a single uniform block of text
    SingleBlock,
    /// Treat the image as a single text line
    SingleLine,
}

impl SegmentationMode {
    /// Tesseract `--psm` value.
    pub fn psm(&self) -> &'static str {
        match self {
            SegmentationMode::Auto => "3",
            SegmentationMode::SingleBlock => "6",
            SegmentationMode::SingleLine => "7",
        }
    }
}

/// Anything that can turn a raster into text.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &GrayImage, mode: SegmentationMode) -> OcrResult<String>;
}

/// Tesseract invoked as a subprocess, fed through stdin.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    program: PathBuf,
    language: String,
    timeout: Duration,
}

impl TesseractCli {
    pub fn new(program: impl Into<PathBuf>, language: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            program: program.into(),
            language: language.into(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Check whether the binary can be started at all.
    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    }
}

impl OcrEngine for TesseractCli {
    fn recognize(&self, image: &GrayImage, mode: SegmentationMode) -> OcrResult<String> {
        let png = encode_png(image)?;

        let mut child = Command::new(&self.program)
            .args(["stdin", "stdout", "--oem", "3", "--psm", mode.psm()])
            .arg("-l")
            .arg(&self.language)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| OcrError::Spawn(format!("{}: {}", self.program.display(), e)))?;

        let (Some(mut stdin), Some(mut stdout), Some(mut stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(OcrError::Io("OCR process pipes unavailable".into()));
        };

        // Pipes are drained on their own threads so a full buffer cannot
        // deadlock the child.
        let writer = thread::spawn(move || stdin.write_all(&png));
        let out_reader = thread::spawn(move || {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).map(|_| buf)
        });
        let err_reader = thread::spawn(move || {
            let mut buf = Vec::new();
            stderr.read_to_end(&mut buf).map(|_| buf)
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = writer.join();
                    let _ = out_reader.join();
                    let _ = err_reader.join();
                    return Err(OcrError::Timeout(self.timeout.as_secs()));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    return Err(OcrError::Io(e.to_string()));
                }
            }
        };

        // A write error here only means tesseract stopped reading early;
        // the exit status reports the real problem.
        let _ = writer.join();
        let stdout = join_output(out_reader)?;
        let stderr = join_output(err_reader)?;

        if !status.success() {
            return Err(OcrError::Failed {
                code: status.code(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}

fn join_output(handle: thread::JoinHandle<std::io::Result<Vec<u8>>>) -> OcrResult<Vec<u8>> {
    handle
        .join()
        .map_err(|_| OcrError::Io("pipe reader panicked".into()))?
        .map_err(|e| OcrError::Io(e.to_string()))
}

fn encode_png(image: &GrayImage) -> OcrResult<Vec<u8>> {
    let mut buf = Vec::new();
    DynamicImage::ImageLuma8(image.clone())
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| OcrError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Runs OCR and folds every outcome into a string.
pub struct TextExtractor {
    engine: Box<dyn OcrEngine>,
}

impl TextExtractor {
    pub fn new(engine: Box<dyn OcrEngine>) -> Self {
        Self { engine }
    }

    /// Extract trimmed text, or one of the two sentinels. Never fails.
    pub fn extract(&self, image: &GrayImage) -> String {
        match self.engine.recognize(image, SegmentationMode::SingleBlock) {
            Ok(text) => {
                let text = text.trim();
                if text.is_empty() {
                    info!(stage = "ocr", "OCR returned no text");
                    NO_TEXT_EXTRACTED.to_string()
                } else {
                    debug!(stage = "ocr", chars = text.len(), "Extracted text");
                    text.to_string()
                }
            }
            Err(e) => {
                warn!(stage = "ocr", error = %e, "OCR failed");
                ERROR_EXTRACTING_TEXT.to_string()
            }
        }
    }
}

/// Scripted OCR engine for tests and offline runs.
pub struct MockOcrEngine {
    reply: Option<String>,
    modes: Mutex<Vec<SegmentationMode>>,
}

impl MockOcrEngine {
    /// Always return `text`.
    pub fn returning(text: impl Into<String>) -> Self {
        Self {
            reply: Some(text.into()),
            modes: Mutex::new(Vec::new()),
        }
    }

    /// Always fail as if the engine crashed.
    pub fn failing() -> Self {
        Self {
            reply: None,
            modes: Mutex::new(Vec::new()),
        }
    }

    /// Segmentation modes seen so far.
    pub fn modes(&self) -> Vec<SegmentationMode> {
        self.modes.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

impl OcrEngine for MockOcrEngine {
    fn recognize(&self, _image: &GrayImage, mode: SegmentationMode) -> OcrResult<String> {
        if let Ok(mut modes) = self.modes.lock() {
            modes.push(mode);
        }
        match &self.reply {
            Some(text) => Ok(text.clone()),
            None => Err(OcrError::Failed {
                code: Some(1),
                stderr: "mock engine failure".into(),
            }),
        }
    }
}

impl<T: OcrEngine + ?Sized> OcrEngine for std::sync::Arc<T> {
    fn recognize(&self, image: &GrayImage, mode: SegmentationMode) -> OcrResult<String> {
        (**self).recognize(image, mode)
    }
}
