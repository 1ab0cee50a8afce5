//! Page images and text layer of uploaded PDFs.

use crate::error::{LedgerError, Result};
use image::DynamicImage;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

/// Text layers shorter than this are treated as absent.
const MIN_TEXT_LAYER_CHARS: usize = 10;

/// Turns a PDF into one raster image per page.
pub trait Rasterizer: Send + Sync {
    /// Images for the first `max_pages` pages, in page order. A page that
    /// cannot be rendered fails the whole call.
    fn rasterize(&self, bytes: &[u8], max_pages: usize) -> Result<Vec<DynamicImage>>;
}

/// Rasterizer for scanned documents: each page is represented by the
/// largest image it paints.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfRasterizer;

impl Rasterizer for LopdfRasterizer {
    fn rasterize(&self, bytes: &[u8], max_pages: usize) -> Result<Vec<DynamicImage>> {
        let doc = Document::load_mem(bytes)
            .map_err(|e| LedgerError::Processing(format!("Failed to load PDF: {}", e)))?;

        let pages = doc.get_pages();
        if pages.is_empty() {
            return Err(LedgerError::Processing("PDF has no pages".to_string()));
        }
        if pages.len() > max_pages {
            tracing::info!(
                "PDF has {} pages, only the first {} are processed",
                pages.len(),
                max_pages
            );
        }

        pages
            .values()
            .take(max_pages)
            .enumerate()
            .map(|(i, &page_id)| {
                page_image(&doc, page_id).map_err(|e| {
                    LedgerError::Processing(format!("Page {}: {}", i + 1, e))
                })
            })
            .collect()
    }
}

/// Embedded text of a PDF, when it has a meaningful amount of it.
pub fn text_layer(bytes: &[u8]) -> Option<String> {
    match pdf_extract::extract_text_from_mem(bytes) {
        Ok(text) => {
            let text = text.trim();
            if text.chars().count() > MIN_TEXT_LAYER_CHARS {
                tracing::info!("Extracted {} chars of text directly from PDF", text.len());
                Some(text.to_string())
            } else {
                None
            }
        }
        Err(e) => {
            tracing::debug!("No usable PDF text layer: {}", e);
            None
        }
    }
}

fn page_image(doc: &Document, page_id: ObjectId) -> Result<DynamicImage> {
    let stream = page_image_streams(doc, page_id)?
        .into_iter()
        .max_by_key(|stream| {
            let (w, h) = dimensions(stream).unwrap_or((0, 0));
            u64::from(w) * u64::from(h)
        })
        .ok_or_else(|| LedgerError::Processing("no scanned image on page".to_string()))?;

    extract_image_from_stream(doc, stream)
}

/// Image XObjects listed in the page's resources, inherited ones included.
fn page_image_streams(doc: &Document, page_id: ObjectId) -> Result<Vec<&Stream>> {
    let mut node = doc
        .get_dictionary(page_id)
        .map_err(|e| LedgerError::Processing(format!("Invalid page object: {}", e)))?;

    let resources = loop {
        if let Some(resources) = node.get(b"Resources").ok().and_then(|o| resolve_dict(doc, o)) {
            break Some(resources);
        }
        match node.get(b"Parent").ok().and_then(|o| resolve_dict(doc, o)) {
            Some(parent) => node = parent,
            None => break None,
        }
    };

    let Some(xobjects) = resources
        .and_then(|r| r.get(b"XObject").ok())
        .and_then(|o| resolve_dict(doc, o))
    else {
        return Ok(Vec::new());
    };

    Ok(xobjects
        .iter()
        .filter_map(|(_, obj)| match obj {
            Object::Reference(id) => doc.get_object(*id).ok(),
            other => Some(other),
        })
        .filter_map(|obj| obj.as_stream().ok())
        .filter(|stream| {
            stream
                .dict
                .get(b"Subtype")
                .and_then(Object::as_name)
                .is_ok_and(|name| name == b"Image")
        })
        .collect())
}

fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match obj {
        Object::Dictionary(dict) => Some(dict),
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        _ => None,
    }
}

fn dimensions(stream: &Stream) -> Option<(u32, u32)> {
    let get = |key: &[u8]| {
        stream
            .dict
            .get(key)
            .ok()
            .and_then(|v| v.as_i64().ok())
            .and_then(|v| u32::try_from(v).ok())
    };
    Some((get(b"Width")?, get(b"Height")?))
}

fn filter_names(stream: &Stream) -> Vec<Vec<u8>> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_name().ok())
            .map(<[u8]>::to_vec)
            .collect(),
        _ => Vec::new(),
    }
}

/// Decode an image XObject into pixels
fn extract_image_from_stream(doc: &Document, stream: &Stream) -> Result<DynamicImage> {
    let filters = filter_names(stream);
    if filters.iter().any(|f| f == b"DCTDecode") {
        return image::load_from_memory(&stream.content)
            .map_err(|e| LedgerError::Processing(format!("Failed to decode JPEG image: {}", e)));
    }
    if let Some(other) = filters
        .iter()
        .find(|f| matches!(f.as_slice(), b"JPXDecode" | b"CCITTFaxDecode" | b"JBIG2Decode"))
    {
        return Err(LedgerError::UnsupportedFormat(format!(
            "{} page images",
            String::from_utf8_lossy(other)
        )));
    }

    let (width, height) = dimensions(stream)
        .ok_or_else(|| LedgerError::Processing("Missing image dimensions".to_string()))?;

    let data = if filters.is_empty() {
        stream.content.clone()
    } else {
        stream
            .decompressed_content()
            .map_err(|e| LedgerError::Processing(format!("Failed to decompress image: {}", e)))?
    };

    let color_space = get_color_space(doc, stream);
    let bits_per_component = stream
        .dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|b| b.as_i64().ok())
        .unwrap_or(8);

    tracing::debug!(
        "PDF image: {}x{}, {} bits, color_space={}, data_len={}",
        width,
        height,
        bits_per_component,
        color_space,
        data.len()
    );

    if bits_per_component != 8 {
        return Err(LedgerError::UnsupportedFormat(format!(
            "{} bits per component in {} image",
            bits_per_component, color_space
        )));
    }

    let pixels = width as usize * height as usize;
    let invalid = || LedgerError::Processing(format!("Invalid {} image data", color_space));

    match color_space.as_str() {
        "DeviceGray" | "CalGray" if data.len() >= pixels => {
            image::GrayImage::from_raw(width, height, data[..pixels].to_vec())
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(invalid)
        }
        // ICCBased with 3 components is typically RGB
        "DeviceRGB" | "CalRGB" | "ICCBased" if data.len() >= pixels * 3 => {
            image::RgbImage::from_raw(width, height, data[..pixels * 3].to_vec())
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(invalid)
        }
        "DeviceCMYK" if data.len() >= pixels * 4 => {
            let rgb_data = data[..pixels * 4]
                .chunks_exact(4)
                .flat_map(|px| {
                    let k = 1.0 - px[3] as f32 / 255.0;
                    [0, 1, 2].map(|i| ((1.0 - px[i] as f32 / 255.0) * k * 255.0) as u8)
                })
                .collect();
            image::RgbImage::from_raw(width, height, rgb_data)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(invalid)
        }
        "DeviceGray" | "CalGray" | "DeviceRGB" | "CalRGB" | "ICCBased" | "DeviceCMYK" => {
            Err(LedgerError::Processing(format!(
                "Truncated {} image: {} bytes for {}x{}",
                color_space,
                data.len(),
                width,
                height
            )))
        }
        _ => Err(LedgerError::UnsupportedFormat(format!(
            "color space {}",
            color_space
        ))),
    }
}

/// Get the color space name from a PDF stream, resolving indirect references
fn get_color_space(doc: &Document, stream: &Stream) -> String {
    let cs_obj = match stream.dict.get(b"ColorSpace") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(resolved) => resolved,
            Err(_) => return "DeviceRGB".to_string(),
        },
        Ok(obj) => obj,
        Err(_) => return "DeviceRGB".to_string(),
    };

    // Either a name or an array like [/ICCBased ref]
    let name = match cs_obj {
        Object::Array(items) => items.first().and_then(|first| first.as_name().ok()),
        other => other.as_name().ok(),
    };

    name.map(|n| String::from_utf8_lossy(n).to_string())
        .unwrap_or_else(|| "DeviceRGB".to_string())
}
