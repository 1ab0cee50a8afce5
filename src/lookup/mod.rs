//! Registry lookup over an ordered list of transports.
//!
//! Transports are tried one at a time; the first one that produces a
//! non-empty summary wins. When all of them fail the caller gets a single
//! advisory error pointing at the registry page.

pub mod transports;

use crate::error::{LedgerError, Result};
use crate::plate::normalize_plate;
use futures::future::BoxFuture;
use serde::Serialize;
use std::net::{Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

pub use transports::{AllOriginsTransport, JinaTransport, LocalProxyTransport};

/// Public registry page queried by every transport.
pub const REGISTRY_URL: &str = "https://www.patentechile.com/";

/// A way of turning a plate into a registry summary.
pub trait Transport: Send + Sync {
    /// Short name used in logs and in [`LookupOutcome::source`].
    fn label(&self) -> &'static str;

    /// Fetch the registry data for an already normalized plate and return
    /// a non-empty summary.
    fn fetch<'a>(&'a self, plate: &'a str) -> BoxFuture<'a, Result<String>>;
}

/// Where the ledger is running relative to its local proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deployment {
    /// No local proxy can be assumed.
    Static,
    /// A local proxy is reachable on a loopback or `.local` host.
    Served,
}

impl Deployment {
    pub fn classify(origin: Option<&Url>) -> Self {
        let Some(origin) = origin else {
            return Deployment::Static;
        };
        if origin.scheme() == "file" {
            return Deployment::Static;
        }

        let local = match origin.host() {
            Some(Host::Domain(domain)) => domain == "localhost" || domain.ends_with(".local"),
            Some(Host::Ipv4(ip)) => ip == Ipv4Addr::LOCALHOST,
            Some(Host::Ipv6(ip)) => ip == Ipv6Addr::LOCALHOST,
            None => false,
        };

        if local {
            Deployment::Served
        } else {
            Deployment::Static
        }
    }
}

/// A successful lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupOutcome {
    pub summary: String,
    pub source: String,
}

/// Registry page for `plate`, shown to the user when every transport fails.
pub fn registry_url(plate: &str) -> String {
    match Url::parse_with_params(REGISTRY_URL, &[("patente", plate)]) {
        Ok(url) => url.to_string(),
        Err(_) => format!("{}?patente={}", REGISTRY_URL, plate),
    }
}

pub struct LookupOrchestrator {
    transports: Vec<Box<dyn Transport>>,
}

impl LookupOrchestrator {
    pub fn new(transports: Vec<Box<dyn Transport>>) -> Self {
        Self { transports }
    }

    /// Default chain for a deployment: the local proxy (served only), then
    /// the public mirrors.
    pub fn for_deployment(client: reqwest::Client, proxy_url: Option<Url>) -> Self {
        let deployment = Deployment::classify(proxy_url.as_ref());
        tracing::debug!("Lookup deployment classified as {:?}", deployment);

        let mut transports: Vec<Box<dyn Transport>> = Vec::new();
        if let (Deployment::Served, Some(base)) = (deployment, proxy_url) {
            transports.push(Box::new(LocalProxyTransport::new(client.clone(), base)));
        }
        transports.push(Box::new(AllOriginsTransport::new(client.clone())));
        transports.push(Box::new(JinaTransport::new(client)));

        Self::new(transports)
    }

    pub fn transport_labels(&self) -> Vec<&'static str> {
        self.transports.iter().map(|t| t.label()).collect()
    }

    pub async fn lookup(&self, plate: &str) -> Result<LookupOutcome> {
        let plate = normalize_plate(plate);
        if plate.is_empty() {
            return Err(LedgerError::Validation(
                "Enter a plate before looking it up".to_string(),
            ));
        }

        let mut attempts = 0;
        for transport in &self.transports {
            attempts += 1;
            tracing::debug!("Looking up {} via {}", plate, transport.label());

            match transport.fetch(&plate).await {
                Ok(summary) if !summary.trim().is_empty() => {
                    tracing::info!("Lookup for {} answered by {}", plate, transport.label());
                    return Ok(LookupOutcome {
                        summary,
                        source: transport.label().to_string(),
                    });
                }
                Ok(_) => {
                    tracing::warn!("{} returned no data for {}", transport.label(), plate);
                }
                Err(e) => {
                    tracing::warn!("{} failed for {}: {}", transport.label(), plate, e);
                }
            }
        }

        Err(LedgerError::LookupExhausted {
            attempts,
            manual_url: registry_url(&plate),
        })
    }
}
