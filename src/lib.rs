//! Plate lead ledger: records of vehicle plates of interest, with registry
//! lookups and OCR capture of registry documents.

pub mod capture;
pub mod cli;
pub mod config;
pub mod engine;
pub mod engines;
pub mod error;
pub mod extract;
pub mod lookup;
pub mod pdf;
pub mod plate;
pub mod preprocess;
pub mod record;
pub mod server;
pub mod store;
pub mod summary;

pub use error::{LedgerError, Result};
