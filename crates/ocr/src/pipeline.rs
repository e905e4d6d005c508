use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;
use tracing::debug;

use crate::decode::{decode_image, DecodeError};
use crate::extract::Extractor;
use crate::preprocess::{preprocess, PreprocessConfig, PreprocessError};
use crate::recognizer::{recognize_with_fallback, OcrBackend, OcrError, MIN_USABLE_TEXT_LEN};
use crate::types::{FailureKind, ScanReport, ScanResult};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("Image preprocessing failed: {0}")]
    Preprocess(#[from] PreprocessError),
    #[error("OCR recognition failed: {0}")]
    Recognition(#[from] OcrError),
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Decode(_) => FailureKind::Input,
            PipelineError::Recognition(_) => FailureKind::Recognition,
            PipelineError::Preprocess(_) => FailureKind::Unexpected,
        }
    }
}

/// Orchestrates: decode → preprocess → OCR (with retry) → extract.
///
/// Holds only immutable configuration, so one instance can serve any number
/// of concurrent scans.
pub struct ScanPipeline<R: OcrBackend> {
    recognizer: R,
    preprocess: PreprocessConfig,
    min_text_len: usize,
}

impl<R: OcrBackend> ScanPipeline<R> {
    pub fn new(recognizer: R) -> Self {
        Self {
            recognizer,
            preprocess: PreprocessConfig::default(),
            min_text_len: MIN_USABLE_TEXT_LEN,
        }
    }

    pub fn with_preprocess(mut self, config: PreprocessConfig) -> Self {
        self.preprocess = config;
        self
    }

    pub fn with_min_text_len(mut self, min_text_len: usize) -> Self {
        self.min_text_len = min_text_len;
        self
    }

    pub fn recognizer(&self) -> &R {
        &self.recognizer
    }

    /// Run every stage, stopping at the first error.
    pub fn try_scan(&self, data: &[u8]) -> Result<ScanReport, PipelineError> {
        let image = decode_image(data)?;
        debug!(width = image.width(), height = image.height(), "decoded image");

        let binarized = preprocess(&image, &self.preprocess)?;

        let recognition = recognize_with_fallback(&self.recognizer, &binarized, self.min_text_len)?;
        debug!(
            mode = %recognition.mode,
            attempts = recognition.attempts,
            chars = recognition.text.chars().count(),
            "recognized text"
        );

        let (device, shipping) = Extractor::extract(&recognition.text);
        Ok(ScanReport { device, shipping, raw_text: recognition.text })
    }

    /// Like [`try_scan`](Self::try_scan), but every failure, including a panic
    /// inside a stage, comes back as [`ScanResult::Failure`].
    pub fn scan(&self, data: &[u8]) -> ScanResult {
        match panic::catch_unwind(AssertUnwindSafe(|| self.try_scan(data))) {
            Ok(Ok(report)) => ScanResult::Success(report),
            Ok(Err(e)) => ScanResult::failure(e.kind(), e.to_string()),
            Err(_) => ScanResult::failure(FailureKind::Unexpected, "Unexpected error while scanning image"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
