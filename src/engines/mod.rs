//! OCR engine implementations
//!
//! Engines are conditionally compiled based on feature flags. Model files
//! are fetched once into the user cache directory.

#[cfg(feature = "engine-ocrs")]
pub mod ocrs;

#[cfg(feature = "engine-leptess")]
pub mod leptess;

use crate::config::Config;
use crate::engine::OcrEngine;
use crate::error::LedgerError;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Information about an available engine
#[derive(Debug, Clone, Serialize)]
pub struct EngineInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub supported_languages: Vec<String>,
}

/// Registry of available OCR engines
pub struct EngineRegistry {
    engines: Vec<Arc<dyn OcrEngine>>,
    default_engine: String,
}

impl EngineRegistry {
    /// Create a new engine registry with all available engines initialized
    #[allow(unused_variables)]
    pub fn new(config: &Config) -> Result<Self, LedgerError> {
        let mut engines: Vec<Arc<dyn OcrEngine>> = Vec::new();

        #[cfg(feature = "engine-ocrs")]
        {
            tracing::info!("Initializing ocrs engine...");
            engines.push(Arc::new(ocrs::OcrsEngine::new(config)?));
        }

        #[cfg(feature = "engine-leptess")]
        {
            tracing::info!("Initializing leptess engine...");
            engines.push(Arc::new(leptess::LeptessEngine::new(config)?));
        }

        Self::from_engines(engines)
    }

    /// Registry over already constructed engines; the first is the default.
    pub fn from_engines(engines: Vec<Arc<dyn OcrEngine>>) -> Result<Self, LedgerError> {
        let default_engine = engines
            .first()
            .map(|e| e.name().to_string())
            .ok_or_else(|| {
                LedgerError::OcrInitialization(
                    "No OCR engines available. Build with --features engine-ocrs or --features engine-leptess".to_string(),
                )
            })?;

        Ok(Self {
            engines,
            default_engine,
        })
    }

    /// Get an engine by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn OcrEngine>> {
        self.engines.iter().find(|e| e.name() == name).cloned()
    }

    /// Get the default engine
    pub fn default(&self) -> Option<Arc<dyn OcrEngine>> {
        self.get(&self.default_engine)
    }

    /// Named engine, or the default when `name` is `None`
    pub fn select(&self, name: Option<&str>) -> Result<Arc<dyn OcrEngine>, LedgerError> {
        match name {
            Some(name) => self.get(name).ok_or_else(|| {
                LedgerError::InvalidRequest(format!(
                    "Unknown engine '{}'. Available: {}",
                    name,
                    self.list().join(", ")
                ))
            }),
            None => self.default().ok_or_else(|| {
                LedgerError::OcrInitialization("Default engine missing".to_string())
            }),
        }
    }

    /// Get the default engine name
    pub fn default_name(&self) -> &str {
        &self.default_engine
    }

    /// List all available engine names
    pub fn list(&self) -> Vec<&str> {
        self.engines.iter().map(|e| e.name()).collect()
    }

    /// Get info about all available engines
    pub fn info(&self) -> Vec<EngineInfo> {
        self.engines
            .iter()
            .map(|e| EngineInfo {
                name: e.name(),
                description: e.description(),
                supported_languages: e.supported_languages(),
            })
            .collect()
    }
}

/// Names of the engines compiled into this build, without initializing them.
pub fn compiled_engines() -> Vec<&'static str> {
    let mut names = Vec::new();
    if cfg!(feature = "engine-ocrs") {
        names.push("ocrs");
    }
    if cfg!(feature = "engine-leptess") {
        names.push("leptess");
    }
    names
}

/// `<cache dir>/plate-ledger/<subdir>`, created if missing
pub(crate) fn cache_dir(subdir: &str) -> Result<PathBuf, LedgerError> {
    let dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("plate-ledger")
        .join(subdir);

    std::fs::create_dir_all(&dir).map_err(|e| {
        LedgerError::OcrInitialization(format!("Failed to create cache directory: {}", e))
    })?;

    Ok(dir)
}

/// Return `dir/filename`, downloading it from `url` first if it is not cached
pub(crate) fn ensure_downloaded(
    url: &str,
    dir: &Path,
    filename: &str,
) -> Result<PathBuf, LedgerError> {
    let path = dir.join(filename);

    if !path.exists() {
        tracing::info!("Downloading {} (this may take a moment)...", filename);
        download_file(url, &path)?;
        tracing::info!("Downloaded {} to {:?}", filename, path);
    } else {
        tracing::info!("Using cached {} from {:?}", filename, path);
    }

    Ok(path)
}

/// Download a file from URL to path using ureq. The body lands in a temp
/// file next to `path` so an interrupted download never looks cached.
fn download_file(url: &str, path: &Path) -> Result<(), LedgerError> {
    let response = ureq::get(url)
        .call()
        .map_err(|e| LedgerError::OcrInitialization(format!("Failed to download {}: {}", url, e)))?;

    let buffer = response.into_body().read_to_vec().map_err(|e| {
        LedgerError::OcrInitialization(format!("Failed to read response body: {}", e))
    })?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        LedgerError::OcrInitialization(format!("Failed to create download file: {}", e))
    })?;
    file.write_all(&buffer).map_err(|e| {
        LedgerError::OcrInitialization(format!("Failed to write download file: {}", e))
    })?;
    file.persist(path).map_err(|e| {
        LedgerError::OcrInitialization(format!("Failed to store {:?}: {}", path, e))
    })?;

    Ok(())
}
