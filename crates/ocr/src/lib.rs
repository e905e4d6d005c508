pub mod decode;
pub mod extract;
pub mod pipeline;
pub mod preprocess;
pub mod recognizer;
pub mod types;

pub use decode::{decode_image, decode_image_with_limits, default_limits, DecodeError};
pub use extract::Extractor;
pub use pipeline::{PipelineError, ScanPipeline};
pub use preprocess::{preprocess, PreprocessConfig, PreprocessError, PreprocessMode};
pub use recognizer::{
    recognize_with_fallback, MockRecognizer, OcrBackend, OcrError, Recognition, SegmentationMode,
    UnavailableRecognizer, MIN_USABLE_TEXT_LEN,
};
#[cfg(feature = "tesseract")]
pub use recognizer::tesseract_backend::TesseractRecognizer;
pub use types::{Carrier, DeviceInfo, FailureKind, ScanReport, ScanResult, ShippingInfo};
