use clap::Args;
use std::path::PathBuf;
use url::Url;

/// Options shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Directory holding the saved records (defaults to the user data dir)
    #[arg(long, env = "PLATE_LEDGER_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Base URL of a running `plate-ledger serve`, tried first on lookups
    #[arg(long, env = "PLATE_LEDGER_PROXY_URL", global = true)]
    pub proxy_url: Option<Url>,

    /// Host address to bind to
    #[arg(long, env = "PLATE_LEDGER_HOST", default_value = "127.0.0.1", global = true)]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PLATE_LEDGER_PORT", default_value = "8000", global = true)]
    pub port: u16,

    /// Maximum upload size in bytes (default: 20MB)
    #[arg(
        long,
        env = "PLATE_LEDGER_MAX_FILE_SIZE",
        default_value = "20971520",
        global = true
    )]
    pub max_file_size: usize,

    /// OCR language (Tesseract code, e.g. "spa")
    #[arg(long, env = "PLATE_LEDGER_OCR_LANGUAGE", default_value = "spa", global = true)]
    pub ocr_language: String,

    /// Path to tessdata directory (uses TESSDATA_PREFIX env var if not set)
    #[arg(long, env = "TESSDATA_PREFIX", global = true)]
    pub tessdata_path: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info", global = true)]
    pub log_level: String,
}

/// Resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub proxy_url: Option<Url>,
    pub host: String,
    pub port: u16,
    pub max_file_size: usize,
    pub ocr_language: String,
    pub tessdata_path: Option<String>,
}

impl Config {
    /// `<user data dir>/plate-ledger`, or a directory under the temp dir
    /// on platforms without one.
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("plate-ledger")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: Self::default_data_dir(),
            proxy_url: None,
            host: "127.0.0.1".to_string(),
            port: 8000,
            max_file_size: 20 * 1024 * 1024,
            ocr_language: "spa".to_string(),
            tessdata_path: None,
        }
    }
}

impl From<ConfigArgs> for Config {
    fn from(args: ConfigArgs) -> Self {
        Self {
            data_dir: args.data_dir.unwrap_or_else(Self::default_data_dir),
            proxy_url: args.proxy_url,
            host: args.host,
            port: args.port,
            max_file_size: args.max_file_size,
            ocr_language: args.ocr_language,
            tessdata_path: args.tessdata_path,
        }
    }
}
