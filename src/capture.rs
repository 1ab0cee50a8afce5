//! Document or photo → OCR text → extracted fields.

use crate::engine::{OcrEngine, RecognitionOptions};
use crate::error::{LedgerError, Result};
use crate::extract::{extract, Extraction};
use crate::pdf::{text_layer, Rasterizer};
use crate::preprocess::Preset;
use serde::Serialize;
use std::sync::Arc;

/// PDFs are OCR'd up to this many pages.
pub const MAX_PDF_PAGES: usize = 3;

/// An uploaded or opened file.
#[derive(Debug, Clone)]
pub struct CaptureFile {
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl CaptureFile {
    pub fn new(name: impl Into<String>, content_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type,
            bytes,
        }
    }

    /// `%PDF-` magic, a `.pdf` name or a PDF content type.
    pub fn is_pdf(&self) -> bool {
        self.bytes.starts_with(b"%PDF-")
            || self.name.to_lowercase().ends_with(".pdf")
            || self
                .content_type
                .as_deref()
                .is_some_and(|ct| ct.eq_ignore_ascii_case("application/pdf"))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptureOutput {
    /// Recognized text of every processed page, newline-joined
    pub text: String,
    pub extraction: Extraction,
    pub pages: usize,
    pub confidence: f32,
    /// Engine that produced the text, or `pdf-text` for a text layer
    pub engine: String,
}

pub struct CapturePipeline {
    engine: Arc<dyn OcrEngine>,
    rasterizer: Arc<dyn Rasterizer>,
    options: RecognitionOptions,
    preset: Preset,
}

impl CapturePipeline {
    pub fn new(engine: Arc<dyn OcrEngine>, rasterizer: Arc<dyn Rasterizer>) -> Self {
        Self {
            engine,
            rasterizer,
            options: RecognitionOptions::spanish(),
            preset: Preset::Default,
        }
    }

    pub fn with_options(mut self, options: RecognitionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_preset(mut self, preset: Preset) -> Self {
        self.preset = preset;
        self
    }

    /// Run the whole capture. Any page that fails aborts the capture and
    /// nothing is returned for the pages that succeeded.
    pub fn run(&self, file: &CaptureFile) -> Result<CaptureOutput> {
        if file.bytes.is_empty() {
            return Err(LedgerError::CaptureFailed(format!("{} is empty", file.name)));
        }

        let (text, pages, confidence, engine) = if file.is_pdf() {
            match text_layer(&file.bytes) {
                Some(text) => (text, 1, 1.0, "pdf-text".to_string()),
                None => {
                    let images = self
                        .rasterizer
                        .rasterize(&file.bytes, MAX_PDF_PAGES)
                        .map_err(|e| LedgerError::CaptureFailed(e.to_string()))?;
                    self.recognize_pages(images.into_iter().take(MAX_PDF_PAGES).collect())?
                }
            }
        } else {
            let image = image::load_from_memory(&file.bytes).map_err(|e| {
                LedgerError::CaptureFailed(format!("{} is not a readable image: {}", file.name, e))
            })?;
            self.recognize_pages(vec![image])?
        };

        tracing::info!(
            "Captured {} chars from {} page(s) of {} via {}",
            text.chars().count(),
            pages,
            file.name,
            engine
        );

        Ok(CaptureOutput {
            extraction: extract(&text),
            text,
            pages,
            confidence,
            engine,
        })
    }

    fn recognize_pages(
        &self,
        images: Vec<image::DynamicImage>,
    ) -> Result<(String, usize, f32, String)> {
        let total = images.len();
        let mut texts = Vec::with_capacity(total);
        let mut confidence_sum = 0.0;

        for (i, image) in images.into_iter().enumerate() {
            tracing::debug!("Recognizing page {} of {}", i + 1, total);
            let prepared = self.preset.apply(image);
            let result = self
                .engine
                .recognize(&prepared, &self.options)
                .map_err(|e| {
                    LedgerError::CaptureFailed(format!("page {} of {}: {}", i + 1, total, e))
                })?;
            confidence_sum += result.confidence;
            texts.push(self.options.restrict(&result.text));
        }

        let confidence = if total == 0 {
            0.0
        } else {
            confidence_sum / total as f32
        };

        Ok((
            texts.join("\n"),
            total,
            confidence,
            self.engine.name().to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::OcrResult;
    use image::{DynamicImage, GrayImage, ImageFormat};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Returns scripted page texts in order; `None` fails that page.
    struct ScriptedEngine {
        pages: Mutex<Vec<Option<&'static str>>>,
        calls: AtomicUsize,
    }

    impl ScriptedEngine {
        fn new(pages: Vec<Option<&'static str>>) -> Arc<Self> {
            Arc::new(Self {
                pages: Mutex::new(pages),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl OcrEngine for ScriptedEngine {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn description(&self) -> &'static str {
            "scripted test engine"
        }

        fn recognize(
            &self,
            _image: &DynamicImage,
            options: &RecognitionOptions,
        ) -> std::result::Result<OcrResult, LedgerError> {
            assert_eq!(options.language, "spa");
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.pages.lock().unwrap().remove(0) {
                Some(text) => Ok(OcrResult {
                    text: text.to_string(),
                    confidence: 0.5,
                }),
                None => Err(LedgerError::Processing("unreadable".to_string())),
            }
        }

        fn supported_languages(&self) -> Vec<String> {
            vec!["spa".to_string()]
        }
    }

    /// Yields `pages` blank images, honoring the page cap like a real one.
    struct BlankPages(usize);

    impl Rasterizer for BlankPages {
        fn rasterize(&self, _bytes: &[u8], max_pages: usize) -> Result<Vec<DynamicImage>> {
            Ok((0..self.0.min(max_pages))
                .map(|_| DynamicImage::ImageLuma8(GrayImage::new(8, 8)))
                .collect())
        }
    }

    fn scanned_pdf() -> CaptureFile {
        CaptureFile::new("scan.pdf", Some("application/pdf".to_string()), b"%PDF-1.5\n".to_vec())
    }

    fn png_file() -> CaptureFile {
        let mut bytes = Vec::new();
        DynamicImage::ImageLuma8(GrayImage::new(8, 8))
            .write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        CaptureFile::new("foto.png", Some("image/png".to_string()), bytes)
    }

    #[test]
    fn test_is_pdf_detection() {
        assert!(CaptureFile::new("x.bin", None, b"%PDF-1.7".to_vec()).is_pdf());
        assert!(CaptureFile::new("PADRON.PDF", None, vec![1]).is_pdf());
        assert!(CaptureFile::new("x", Some("Application/PDF".into()), vec![1]).is_pdf());
        assert!(!png_file().is_pdf());
    }

    #[test]
    fn test_image_capture_extracts_fields() {
        let engine =
            ScriptedEngine::new(vec![Some("Patente: GHJK55\nMarca: Kia Rio\nAño: 2019 §")]);
        let pipeline = CapturePipeline::new(engine.clone(), Arc::new(BlankPages(0)));

        let output = pipeline.run(&png_file()).unwrap();
        assert_eq!(output.pages, 1);
        assert_eq!(output.engine, "scripted");
        assert_eq!(output.extraction.plate, "GHJK55");
        assert_eq!(output.text, "Patente GHJK55\nMarca Kia Rio\nAño 2019 ");
        assert_eq!(output.extraction.features.brand, "Kia Rio");
        assert_eq!(output.extraction.features.year, "2019");
    }

    #[test]
    fn test_pdf_pages_are_capped_and_joined() {
        let engine = ScriptedEngine::new(vec![
            Some("Patente GHJK55"),
            Some("Marca     Kia"),
            Some("Color     Rojo"),
            Some("Modelo    Rio"),
        ]);
        let pipeline = CapturePipeline::new(engine.clone(), Arc::new(BlankPages(5)))
            .with_preset(Preset::None);

        let output = pipeline.run(&scanned_pdf()).unwrap();
        assert_eq!(engine.calls.load(Ordering::SeqCst), MAX_PDF_PAGES);
        assert_eq!(output.pages, MAX_PDF_PAGES);
        assert_eq!(output.text, "Patente GHJK55\nMarca     Kia\nColor     Rojo");
        assert_eq!(output.extraction.plate, "GHJK55");
        assert_eq!(output.extraction.features.color, "Rojo");
        assert_eq!(output.extraction.features.model, "");
        assert!((output.confidence - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_failing_page_aborts_without_partial_output() {
        let engine = ScriptedEngine::new(vec![Some("Patente GHJK55"), None, Some("Marca Kia")]);
        let pipeline = CapturePipeline::new(engine.clone(), Arc::new(BlankPages(3)))
            .with_preset(Preset::None);

        let err = pipeline.run(&scanned_pdf()).unwrap_err();
        match err {
            LedgerError::CaptureFailed(message) => assert!(message.contains("page 2 of 3")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unreadable_image_is_a_capture_failure() {
        let engine = ScriptedEngine::new(vec![]);
        let pipeline = CapturePipeline::new(engine.clone(), Arc::new(BlankPages(0)));

        let file = CaptureFile::new("foto.jpg", None, b"garbage".to_vec());
        assert!(matches!(pipeline.run(&file), Err(LedgerError::CaptureFailed(_))));
        assert!(matches!(
            pipeline.run(&CaptureFile::new("vacio.png", None, Vec::new())),
            Err(LedgerError::CaptureFailed(_))
        ));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }
}
