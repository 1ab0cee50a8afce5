//! OCRS engine implementation
//!
//! Pure Rust OCR engine using the ocrs library. No system dependencies required.
//! Downloads neural network models automatically on first use.

use super::{cache_dir, ensure_downloaded};
use crate::config::Config;
use crate::engine::{OcrEngine, OcrResult, RecognitionOptions};
use crate::error::LedgerError;
use image::DynamicImage;
use ocrs::{DecodeMethod, ImageSource, OcrEngine as OcrsOcrEngine, OcrEngineParams};
use rten::Model;

/// Default model URLs from the ocrs project
const DETECTION_MODEL_URL: &str =
    "https://ocrs-models.s3-accelerate.amazonaws.com/text-detection.rten";
const RECOGNITION_MODEL_URL: &str =
    "https://ocrs-models.s3-accelerate.amazonaws.com/text-recognition.rten";

/// OCR Engine wrapping the ocrs library
pub struct OcrsEngine {
    engine: OcrsOcrEngine,
}

impl OcrsEngine {
    /// Create a new OCR processor, downloading models if needed
    pub fn new(_config: &Config) -> Result<Self, LedgerError> {
        let models = cache_dir("models")?;
        let detection_model_path =
            ensure_downloaded(DETECTION_MODEL_URL, &models, "text-detection.rten")?;
        let recognition_model_path =
            ensure_downloaded(RECOGNITION_MODEL_URL, &models, "text-recognition.rten")?;

        let detection_model = Model::load_file(&detection_model_path).map_err(|e| {
            LedgerError::OcrInitialization(format!("Failed to load detection model: {}", e))
        })?;
        let recognition_model = Model::load_file(&recognition_model_path).map_err(|e| {
            LedgerError::OcrInitialization(format!("Failed to load recognition model: {}", e))
        })?;

        let engine = OcrsOcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            decode_method: DecodeMethod::Greedy,
            ..Default::default()
        })
        .map_err(|e| {
            LedgerError::OcrInitialization(format!("Failed to create OCR engine: {}", e))
        })?;

        tracing::info!("ocrs engine initialized successfully");

        Ok(Self { engine })
    }

    fn read_lines(&self, image: &DynamicImage) -> Result<String, LedgerError> {
        // HWC layout, which is what ImageSource::from_bytes expects
        let rgb_img = image.to_rgb8();
        let dimensions = rgb_img.dimensions();

        let img_source = ImageSource::from_bytes(rgb_img.as_raw(), dimensions).map_err(|e| {
            LedgerError::Processing(format!("Failed to create image source: {}", e))
        })?;

        let ocr_input = self
            .engine
            .prepare_input(img_source)
            .map_err(|e| LedgerError::Processing(format!("Failed to prepare input: {}", e)))?;

        let word_rects = self
            .engine
            .detect_words(&ocr_input)
            .map_err(|e| LedgerError::Processing(format!("Failed to detect words: {}", e)))?;

        let line_rects = self.engine.find_text_lines(&ocr_input, &word_rects);

        let line_texts = self
            .engine
            .recognize_text(&ocr_input, &line_rects)
            .map_err(|e| LedgerError::Processing(format!("Failed to recognize text: {}", e)))?;

        Ok(line_texts
            .iter()
            .filter_map(|line| line.as_ref())
            .map(|line| {
                line.words()
                    .map(|word| word.to_string())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

impl OcrEngine for OcrsEngine {
    fn name(&self) -> &'static str {
        "ocrs"
    }

    fn description(&self) -> &'static str {
        "Pure Rust OCR engine - fast, no system dependencies required"
    }

    /// ocrs has no character whitelist and no per-character scores, so the
    /// allowed set is applied afterwards and confidence is the share of raw
    /// output that already fell inside it.
    fn recognize(
        &self,
        image: &DynamicImage,
        options: &RecognitionOptions,
    ) -> Result<OcrResult, LedgerError> {
        let raw = self.read_lines(image)?;
        let confidence = options.coverage(&raw);

        tracing::debug!(
            "ocrs read {} chars ({:.0}% inside the allowed set)",
            raw.chars().count(),
            confidence * 100.0
        );

        Ok(OcrResult {
            text: options.restrict(&raw),
            confidence,
        })
    }

    fn supported_languages(&self) -> Vec<String> {
        // Latin alphabet models; Spanish diacritics are recognized
        vec!["eng".to_string(), "spa".to_string()]
    }
}
