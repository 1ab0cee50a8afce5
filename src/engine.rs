use crate::error::LedgerError;
use image::DynamicImage;

/// Characters registry documents are printed with: Latin letters, digits,
/// dashes and Spanish diacritics.
pub const SPANISH_CHARSET: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-áéíóúüñÁÉÍÓÚÜÑ";

/// Recognized text of one image
#[derive(Debug, Clone, PartialEq)]
pub struct OcrResult {
    pub text: String,
    pub confidence: f32,
}

/// Per-call recognition settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionOptions {
    /// Tesseract-style language code, e.g. `spa`
    pub language: String,
    pub allowed_chars: String,
}

impl RecognitionOptions {
    pub fn spanish() -> Self {
        Self::for_language("spa")
    }

    pub fn for_language(language: &str) -> Self {
        Self {
            language: language.to_string(),
            allowed_chars: SPANISH_CHARSET.to_string(),
        }
    }

    pub fn allows(&self, c: char) -> bool {
        self.allowed_chars.contains(c)
    }

    /// Drop every character outside the allowed set. Whitespace is kept so
    /// line structure survives.
    pub fn restrict(&self, text: &str) -> String {
        text.chars()
            .filter(|&c| c.is_whitespace() || self.allows(c))
            .collect()
    }

    /// Share of non-whitespace characters inside the allowed set.
    pub fn coverage(&self, text: &str) -> f32 {
        let (total, allowed) = text
            .chars()
            .filter(|c| !c.is_whitespace())
            .fold((0usize, 0usize), |(total, allowed), c| {
                (total + 1, allowed + usize::from(self.allows(c)))
            });

        if total == 0 {
            0.0
        } else {
            allowed as f32 / total as f32
        }
    }
}

impl Default for RecognitionOptions {
    fn default() -> Self {
        Self::spanish()
    }
}

/// Trait that all OCR engines must implement
pub trait OcrEngine: Send + Sync {
    /// Returns the engine identifier (e.g., "ocrs", "leptess")
    fn name(&self) -> &'static str;

    /// Returns a human-readable description of the engine
    fn description(&self) -> &'static str;

    /// Recognize the text of a single page or photo
    fn recognize(
        &self,
        image: &DynamicImage,
        options: &RecognitionOptions,
    ) -> Result<OcrResult, LedgerError>;

    /// Get supported languages
    fn supported_languages(&self) -> Vec<String>;
}
