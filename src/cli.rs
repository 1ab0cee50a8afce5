//! Command-line surface over the record store, extractor, lookup and
//! capture pipeline.

use crate::capture::{CaptureFile, CapturePipeline};
use crate::config::{Config, ConfigArgs};
use crate::engine::RecognitionOptions;
use crate::engines::EngineRegistry;
use crate::extract::{extract, labels::normalize_label, Extraction};
use crate::lookup::LookupOrchestrator;
use crate::pdf::LopdfRasterizer;
use crate::preprocess::Preset;
use crate::record::{Features, Field, Record, DEFAULT_SEGMENTS};
use crate::store::{FileBlobStore, RecordStore};
use crate::summary::{format_features, truncate};
use anyhow::{bail, Context};
use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// List columns are cut to these lengths.
const DETAILS_WIDTH: usize = 120;
const NOTES_WIDTH: usize = 160;
const EMPTY_CELL: &str = "—";

#[derive(Parser, Debug)]
#[command(name = "plate-ledger")]
#[command(about = "Keep track of vehicle plate leads and the registry data behind them")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Save a new plate lead
    Add {
        /// Plate; taken from --text when omitted
        plate: Option<String>,

        /// Defaults to the first suggested segment
        #[arg(long, default_value = DEFAULT_SEGMENTS[0])]
        segment: String,

        #[arg(long, default_value = "")]
        notes: String,

        /// Comma separated tags
        #[arg(long, default_value = "")]
        tags: String,

        /// Vehicle attribute as `field=value` (e.g. `marca=Toyota`), repeatable
        #[arg(long = "feature", value_name = "FIELD=VALUE")]
        features: Vec<String>,

        /// Fill missing fields from pasted registry text (`-` for stdin)
        #[arg(long, value_name = "FILE")]
        text: Option<PathBuf>,

        /// Query the registry and keep its summary as notes
        #[arg(long)]
        lookup: bool,
    },

    /// List saved leads, newest first
    List {
        /// Plate fragment to search for
        #[arg(long)]
        plate: Option<String>,

        #[arg(long)]
        segment: Option<String>,

        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete a lead by id
    Delete { id: String },

    /// Segments offered for new leads
    Segments,

    /// Extract plate and vehicle fields from text (`-` or no file for stdin)
    Extract {
        file: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Query the registry for a plate
    Lookup { plate: String },

    /// OCR an image or PDF and extract its fields
    Capture {
        file: PathBuf,

        /// OCR engine (defaults to the first one compiled in)
        #[arg(long)]
        engine: Option<String>,

        /// Preprocessing preset: none or default
        #[arg(long, default_value = "default")]
        preset: Preset,

        /// Save the result as a new lead in this segment
        #[arg(long, value_name = "SEGMENT")]
        save: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Run the local proxy and capture HTTP service
    Serve,
}

pub async fn execute(command: Command, config: Config) -> anyhow::Result<()> {
    match command {
        Command::Add {
            plate,
            segment,
            notes,
            tags,
            features,
            text,
            lookup,
        } => {
            let mut feature_values = parse_features(&features)?;
            let mut plate = plate.unwrap_or_default();

            if let Some(path) = text {
                let extraction = extract(&read_text(Some(path.as_path()))?);
                if plate.trim().is_empty() {
                    plate = extraction.plate.clone();
                }
                feature_values.merge_missing(&extraction.features);
            }

            let mut notes = notes;
            if lookup {
                let outcome = orchestrator(&config)?.lookup(&plate).await?;
                println!("Registry data via {}", outcome.source);
                feature_values.merge_missing(&extract(&outcome.summary).features);
                if notes.trim().is_empty() {
                    notes = outcome.summary;
                }
            }

            let segment = match segment.trim() {
                "" => DEFAULT_SEGMENTS[0],
                chosen => chosen,
            };
            let record = Record::new(&plate, segment, &notes, &tags, feature_values)?;
            let mut store = open_store(&config);
            store.insert(record.clone())?;
            println!("Saved {} ({})", record.plate, record.id);
        }

        Command::List {
            plate,
            segment,
            json,
        } => {
            let store = open_store(&config);
            let records = store.query(plate.as_deref(), segment.as_deref());
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No saved plates yet.");
            } else {
                for record in records {
                    println!("{}", render_row(record));
                }
            }
        }

        Command::Delete { id } => {
            let mut store = open_store(&config);
            if store.delete(&id)? {
                println!("Deleted {}", id);
            } else {
                println!("No record with id {}", id);
            }
        }

        Command::Segments => {
            for segment in open_store(&config).segments() {
                println!("{}", segment);
            }
        }

        Command::Extract { file, json } => {
            let extraction = extract(&read_text(file.as_deref())?);
            if json {
                println!("{}", serde_json::to_string_pretty(&extraction)?);
            } else {
                print_extraction(&extraction);
            }
        }

        Command::Lookup { plate } => {
            let outcome = orchestrator(&config)?.lookup(&plate).await?;
            println!("Source: {}", outcome.source);
            println!("{}", outcome.summary);
        }

        Command::Capture {
            file,
            engine,
            preset,
            save,
            json,
        } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            if bytes.len() > config.max_file_size {
                return Err(crate::LedgerError::FileTooLarge {
                    size: bytes.len(),
                    max: config.max_file_size,
                }
                .into());
            }

            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| file.display().to_string());
            let upload = CaptureFile::new(name, None, bytes);
            let options = RecognitionOptions::for_language(&config.ocr_language);
            let engine_config = config.clone();

            // Model loading and OCR are CPU-bound
            let output = tokio::task::spawn_blocking(move || {
                let registry = EngineRegistry::new(&engine_config)?;
                let engine = registry.select(engine.as_deref())?;
                CapturePipeline::new(engine, Arc::new(LopdfRasterizer))
                    .with_options(options)
                    .with_preset(preset)
                    .run(&upload)
            })
            .await??;

            if json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!(
                    "Read {} page(s) with {} (confidence {:.2})",
                    output.pages, output.engine, output.confidence
                );
                print_extraction(&output.extraction);
            }

            if let Some(segment) = save {
                let record = Record::new(
                    &output.extraction.plate,
                    &segment,
                    "",
                    "",
                    output.extraction.features,
                )?;
                open_store(&config).insert(record.clone())?;
                println!("Saved {} ({})", record.plate, record.id);
            }
        }

        Command::Serve => {
            tracing::info!("Starting plate-ledger v{}", env!("CARGO_PKG_VERSION"));
            tracing::info!("Binding to {}:{}", config.host, config.port);
            crate::server::run(config).await?;
        }
    }

    Ok(())
}

fn open_store(config: &Config) -> RecordStore<FileBlobStore> {
    tracing::debug!("Using data directory {}", config.data_dir.display());
    RecordStore::load(FileBlobStore::new(&config.data_dir))
}

fn orchestrator(config: &Config) -> anyhow::Result<LookupOrchestrator> {
    let client = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;
    Ok(LookupOrchestrator::for_deployment(
        client,
        config.proxy_url.clone(),
    ))
}

/// Whole file, or stdin for `-` / no path.
fn read_text(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        _ => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            Ok(text)
        }
    }
}

/// `field=value` pairs; the field is a stored key (`brand`) or a display
/// label (`Marca`, `Nº Motor`). Unknown fields go to the extra bucket.
pub fn parse_features(pairs: &[String]) -> anyhow::Result<Features> {
    let mut features = Features::default();
    for pair in pairs {
        let Some((name, value)) = pair.split_once('=') else {
            bail!("Expected FIELD=VALUE, got '{}'", pair);
        };
        let wanted = normalize_label(name);
        if wanted.is_empty() {
            bail!("Missing field name in '{}'", pair);
        }

        let field = Field::ALL.into_iter().find(|field| {
            normalize_label(field.key()) == wanted || normalize_label(field.label()) == wanted
        });
        match field {
            Some(field) => features.set(field, value.trim()),
            None => features.push_extra(name.trim(), value),
        }
    }
    Ok(features)
}

/// One list line: plate, segment, details, notes, tags, saved-at.
pub fn render_row(record: &Record) -> String {
    let details = format_features(&record.features);
    let details = if details.is_empty() {
        EMPTY_CELL.to_string()
    } else {
        truncate(&details, DETAILS_WIDTH)
    };
    let notes = if record.notes.is_empty() {
        EMPTY_CELL.to_string()
    } else {
        truncate(&record.notes.replace('\n', " "), NOTES_WIDTH)
    };
    let tags = if record.tags.is_empty() {
        EMPTY_CELL.to_string()
    } else {
        record.tags.join(", ")
    };

    format!(
        "{} | {} | {} | {} | {} | {} | {}",
        record.plate,
        if record.segment.is_empty() {
            EMPTY_CELL
        } else {
            record.segment.as_str()
        },
        details,
        notes,
        tags,
        format_timestamp(record.timestamp),
        record.id
    )
}

/// Short local date and time, day first.
pub fn format_timestamp(millis: i64) -> String {
    match Local.timestamp_millis_opt(millis).single() {
        Some(at) => at.format("%d-%m-%y %H:%M").to_string(),
        None => EMPTY_CELL.to_string(),
    }
}

fn print_extraction(extraction: &Extraction) {
    if extraction.is_empty() {
        println!("Nothing recognizable in the text.");
        return;
    }
    if !extraction.summary.is_empty() {
        println!("{}", extraction.summary);
    }
    if !extraction.features.extra.is_empty() {
        println!("{}", extraction.features.extra);
    }
}
