use image::{DynamicImage, GrayImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Trimmed text shorter than this triggers the sparse-text retry.
pub const MIN_USABLE_TEXT_LEN: usize = 20;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Failed to encode image for OCR: {0}")]
    ImageEncode(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
    #[error("Tesseract not available: build with `tesseract` feature")]
    NotAvailable,
}

/// Layout assumption handed to the OCR engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentationMode {
    /// A single uniform block of text.
    UniformBlock,
    /// As much text as possible, in no particular order.
    SparseText,
}

impl SegmentationMode {
    /// Tesseract `--psm` value for this mode.
    pub fn tesseract_psm(self) -> u8 {
        match self {
            SegmentationMode::UniformBlock => 6,
            SegmentationMode::SparseText => 11,
        }
    }
}

impl std::fmt::Display for SegmentationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SegmentationMode::UniformBlock => write!(f, "uniform_block"),
            SegmentationMode::SparseText => write!(f, "sparse_text"),
        }
    }
}

/// Abstraction over an OCR backend.
/// Implementations receive the binarized image and return the recognized text;
/// empty text is a valid result, not an error.
pub trait OcrBackend: Send + Sync {
    fn recognize(&self, image: &GrayImage, mode: SegmentationMode) -> Result<String, OcrError>;
}

impl<T: OcrBackend + ?Sized> OcrBackend for Box<T> {
    fn recognize(&self, image: &GrayImage, mode: SegmentationMode) -> Result<String, OcrError> {
        (**self).recognize(image, mode)
    }
}

impl<T: OcrBackend + ?Sized> OcrBackend for Arc<T> {
    fn recognize(&self, image: &GrayImage, mode: SegmentationMode) -> Result<String, OcrError> {
        (**self).recognize(image, mode)
    }
}

// ── Retry policy ──────────────────────────────────────────────────────────────

/// Text produced by [`recognize_with_fallback`] and the attempt that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recognition {
    pub text: String,
    pub mode: SegmentationMode,
    pub attempts: u8,
}

/// Run OCR in uniform-block mode, and once more in sparse-text mode if the
/// first result has fewer than `min_chars` characters after trimming.
/// The second result is used as-is even if it is also short.
pub fn recognize_with_fallback<R: OcrBackend + ?Sized>(
    backend: &R,
    image: &GrayImage,
    min_chars: usize,
) -> Result<Recognition, OcrError> {
    let text = backend.recognize(image, SegmentationMode::UniformBlock)?;
    let usable = text.trim().chars().count();
    if usable >= min_chars {
        return Ok(Recognition { text, mode: SegmentationMode::UniformBlock, attempts: 1 });
    }

    debug!(usable, min_chars, "short OCR result, retrying in sparse text mode");
    let text = backend.recognize(image, SegmentationMode::SparseText)?;
    Ok(Recognition { text, mode: SegmentationMode::SparseText, attempts: 2 })
}

#[cfg_attr(not(feature = "tesseract"), allow(dead_code))]
pub(crate) fn encode_png(image: &GrayImage) -> Result<Vec<u8>, OcrError> {
    let mut buf = Vec::new();
    DynamicImage::ImageLuma8(image.clone())
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| OcrError::ImageEncode(e.to_string()))?;
    Ok(buf)
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Returns pre-set text per mode and counts how often each mode was asked for.
pub struct MockRecognizer {
    block_text: String,
    sparse_text: String,
    block_calls: AtomicUsize,
    sparse_calls: AtomicUsize,
}

impl MockRecognizer {
    /// Same text for both modes.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            sparse_text: text.clone(),
            block_text: text,
            block_calls: AtomicUsize::new(0),
            sparse_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_sparse_text(mut self, text: impl Into<String>) -> Self {
        self.sparse_text = text.into();
        self
    }

    pub fn calls(&self, mode: SegmentationMode) -> usize {
        match mode {
            SegmentationMode::UniformBlock => self.block_calls.load(Ordering::SeqCst),
            SegmentationMode::SparseText => self.sparse_calls.load(Ordering::SeqCst),
        }
    }
}

impl OcrBackend for MockRecognizer {
    fn recognize(&self, _image: &GrayImage, mode: SegmentationMode) -> Result<String, OcrError> {
        match mode {
            SegmentationMode::UniformBlock => {
                self.block_calls.fetch_add(1, Ordering::SeqCst);
                Ok(self.block_text.clone())
            }
            SegmentationMode::SparseText => {
                self.sparse_calls.fetch_add(1, Ordering::SeqCst);
                Ok(self.sparse_text.clone())
            }
        }
    }
}

/// Stand-in used when no OCR engine was compiled in. Every call fails.
pub struct UnavailableRecognizer;

impl OcrBackend for UnavailableRecognizer {
    fn recognize(&self, _image: &GrayImage, _mode: SegmentationMode) -> Result<String, OcrError> {
        Err(OcrError::NotAvailable)
    }
}

// ── Tesseract backend (optional, gated behind `tesseract` feature) ─────────────

#[cfg(feature = "tesseract")]
pub mod tesseract_backend {
    use super::{encode_png, OcrBackend, OcrError, SegmentationMode};
    use image::GrayImage;
    use leptess::{LepTess, Variable};

    /// A fresh engine handle is created per call, so concurrent scans never
    /// share Tesseract state.
    pub struct TesseractRecognizer {
        data_path: Option<String>,
        lang: String,
    }

    impl TesseractRecognizer {
        pub fn new(data_path: Option<String>, lang: &str) -> Self {
            Self { data_path, lang: lang.to_string() }
        }
    }

    impl OcrBackend for TesseractRecognizer {
        fn recognize(&self, image: &GrayImage, mode: SegmentationMode) -> Result<String, OcrError> {
            let png = encode_png(image)?;
            let mut lt = LepTess::new(self.data_path.as_deref(), &self.lang)
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            lt.set_variable(Variable::TesseditPagesegMode, &mode.tesseract_psm().to_string())
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            lt.set_image_from_mem(&png)
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            lt.get_utf8_text().map_err(|e| OcrError::Engine(e.to_string()))
        }
    }
}
