//! Leptess/Tesseract engine implementation
//!
//! Tesseract-based OCR engine. Better for noisy/messy images like phone photos.
//! Uses tesseract-static crate for static linking (no system dependencies).
//! Downloads tessdata (training data) automatically on first use.

use super::{cache_dir, ensure_downloaded};
use crate::config::Config;
use crate::engine::{OcrEngine, OcrResult, RecognitionOptions};
use crate::error::LedgerError;
use image::DynamicImage;
use std::path::PathBuf;
use tesseract_static::tesseract::Tesseract;

/// Tesseract OCR Engine
pub struct LeptessEngine {
    /// Path to tessdata directory
    tessdata_path: String,
    /// Language the training data was fetched for
    language: String,
}

impl LeptessEngine {
    pub fn new(config: &Config) -> Result<Self, LedgerError> {
        let language = config.ocr_language.clone();
        let tessdata_path = match &config.tessdata_path {
            Some(path) => path.clone(),
            None => ensure_tessdata_available(&language)?,
        };

        // Validate that tessdata is accessible by doing a test initialization
        Tesseract::new(Some(&tessdata_path), Some(&language)).map_err(|e| {
            LedgerError::OcrInitialization(format!("Failed to initialize Tesseract: {}", e))
        })?;

        tracing::info!(
            "Leptess engine initialized (tessdata: {}, language: {})",
            tessdata_path,
            language
        );

        Ok(Self {
            tessdata_path,
            language,
        })
    }
}

impl OcrEngine for LeptessEngine {
    fn name(&self) -> &'static str {
        "leptess"
    }

    fn description(&self) -> &'static str {
        "Tesseract OCR engine - better for noisy/messy images like phone photos"
    }

    fn recognize(
        &self,
        image: &DynamicImage,
        options: &RecognitionOptions,
    ) -> Result<OcrResult, LedgerError> {
        let rgb_img = image.to_rgb8();
        let (width, height) = rgb_img.dimensions();

        // BMP is always supported by leptonica
        let mut bmp_data = Vec::new();
        rgb_img
            .write_to(&mut std::io::Cursor::new(&mut bmp_data), image::ImageFormat::Bmp)
            .map_err(|e| LedgerError::Processing(format!("Failed to convert to BMP: {}", e)))?;

        if options.language != self.language {
            tracing::debug!(
                "Requested language {} differs from loaded {}; using {}",
                options.language,
                self.language,
                self.language
            );
        }

        let mut tess = Tesseract::new(Some(&self.tessdata_path), Some(&self.language))
            .map_err(|e| LedgerError::Processing(format!("Failed to create Tesseract: {}", e)))?;

        tess = tess
            .set_variable("tessedit_char_whitelist", &options.allowed_chars)
            .map_err(|e| LedgerError::Processing(format!("Failed to set whitelist: {}", e)))?;

        tess = tess.set_image_from_mem(&bmp_data).map_err(|e| {
            LedgerError::Processing(format!(
                "Failed to set image ({}x{}, {} bytes): {}",
                width,
                height,
                bmp_data.len(),
                e
            ))
        })?;

        tess = tess
            .recognize()
            .map_err(|e| LedgerError::Processing(format!("Failed to recognize text: {}", e)))?;

        let text = tess
            .get_text()
            .map_err(|e| LedgerError::Processing(format!("Failed to get text: {}", e)))?;

        // 0-100 scale
        let confidence = tess.mean_text_conf() as f32 / 100.0;

        Ok(OcrResult {
            text: options.restrict(text.trim()),
            confidence,
        })
    }

    fn supported_languages(&self) -> Vec<String> {
        vec![self.language.clone()]
    }
}

/// Ensure tessdata is available, downloading if needed. Returns the
/// directory, which is what Tesseract expects.
fn ensure_tessdata_available(language: &str) -> Result<String, LedgerError> {
    let dir: PathBuf = cache_dir("tessdata")?;
    ensure_downloaded(
        &tessdata_url(language),
        &dir,
        &format!("{}.traineddata", language),
    )?;

    dir.to_str()
        .map(|s| s.to_string())
        .ok_or_else(|| LedgerError::OcrInitialization("Invalid tessdata path".to_string()))
}

/// Get tessdata download URL for a language
fn tessdata_url(language: &str) -> String {
    // tessdata_fast for smaller, faster downloads
    format!(
        "https://github.com/tesseract-ocr/tessdata_fast/raw/main/{}.traineddata",
        language
    )
}
