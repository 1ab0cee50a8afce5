use super::{registry_url, Transport};
use crate::error::{LedgerError, Result};
use crate::summary::{build_summary, summarize_html, ProxyPayload};
use futures::future::BoxFuture;
use reqwest::{header, StatusCode};
use url::Url;

const ALLORIGINS_RAW: &str = "https://api.allorigins.win/raw";
const JINA_READER: &str = "https://r.jina.ai/";

/// The ledger's own `serve` endpoint.
pub struct LocalProxyTransport {
    client: reqwest::Client,
    base: Url,
}

impl LocalProxyTransport {
    pub fn new(client: reqwest::Client, base: Url) -> Self {
        Self { client, base }
    }

    async fn fetch_summary(&self, plate: &str) -> Result<String> {
        let endpoint = proxy_endpoint(&self.base, plate)?;
        let response = self
            .client
            .get(endpoint)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(format!("Local proxy unreachable: {}", e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(LedgerError::Transport(
                "Local proxy not available".to_string(),
            ));
        }
        if !status.is_success() {
            return Err(LedgerError::Transport(format!("HTTP {}", status.as_u16())));
        }

        let payload: ProxyPayload = response
            .json()
            .await
            .map_err(|e| LedgerError::Transport(format!("Invalid proxy response: {}", e)))?;
        if let Some(error) = payload.error.as_deref().filter(|e| !e.trim().is_empty()) {
            return Err(LedgerError::Transport(error.to_string()));
        }

        non_empty(build_summary(&payload))
    }
}

impl Transport for LocalProxyTransport {
    fn label(&self) -> &'static str {
        "local-proxy"
    }

    fn fetch<'a>(&'a self, plate: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.fetch_summary(plate))
    }
}

/// AllOrigins raw mirror of the registry page.
pub struct AllOriginsTransport {
    client: reqwest::Client,
}

impl AllOriginsTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch_summary(&self, plate: &str) -> Result<String> {
        let html = get_text(
            &self.client,
            &allorigins_url(&registry_url(plate)),
            Some("text/html"),
        )
        .await?;
        non_empty(summarize_html(&html))
    }
}

impl Transport for AllOriginsTransport {
    fn label(&self) -> &'static str {
        "allorigins"
    }

    fn fetch<'a>(&'a self, plate: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.fetch_summary(plate))
    }
}

/// Jina reader mirror of the registry page.
pub struct JinaTransport {
    client: reqwest::Client,
}

impl JinaTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch_summary(&self, plate: &str) -> Result<String> {
        let body = get_text(&self.client, &jina_url(&registry_url(plate)), None).await?;
        non_empty(summarize_html(from_html_tag(&body)))
    }
}

impl Transport for JinaTransport {
    fn label(&self) -> &'static str {
        "jina"
    }

    fn fetch<'a>(&'a self, plate: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.fetch_summary(plate))
    }
}

/// `<base>/api/proxy?plate=<plate>`
pub fn proxy_endpoint(base: &Url, plate: &str) -> Result<Url> {
    let mut endpoint = base
        .join("/api/proxy")
        .map_err(|e| LedgerError::Transport(format!("Invalid proxy URL: {}", e)))?;
    endpoint.query_pairs_mut().append_pair("plate", plate);
    Ok(endpoint)
}

pub fn allorigins_url(target: &str) -> String {
    match Url::parse_with_params(ALLORIGINS_RAW, &[("url", target)]) {
        Ok(url) => url.to_string(),
        Err(_) => format!("{}?url={}", ALLORIGINS_RAW, target),
    }
}

pub fn jina_url(target: &str) -> String {
    format!("{}{}", JINA_READER, target)
}

/// The reader prefixes the page with its own metadata; keep the document
/// from its `<html` tag on when there is one.
pub fn from_html_tag(body: &str) -> &str {
    match body.to_ascii_lowercase().find("<html") {
        Some(start) => &body[start..],
        None => body,
    }
}

async fn get_text(client: &reqwest::Client, url: &str, accept: Option<&str>) -> Result<String> {
    let mut request = client.get(url);
    if let Some(accept) = accept {
        request = request.header(header::ACCEPT, accept);
    }

    let response = request
        .send()
        .await
        .map_err(|e| LedgerError::Transport(format!("Request failed: {}", e)))?;
    let status = response.status();
    if !status.is_success() {
        return Err(LedgerError::Transport(format!("HTTP {}", status.as_u16())));
    }

    response
        .text()
        .await
        .map_err(|e| LedgerError::Transport(format!("Failed to read body: {}", e)))
}

fn non_empty(summary: String) -> Result<String> {
    if summary.trim().is_empty() {
        Err(LedgerError::Transport("No registry data in response".to_string()))
    } else {
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_endpoint_replaces_path_and_encodes_plate() {
        let base = Url::parse("http://localhost:8000/app/").unwrap();
        let endpoint = proxy_endpoint(&base, "AB1234").unwrap();
        assert_eq!(endpoint.as_str(), "http://localhost:8000/api/proxy?plate=AB1234");
    }

    #[test]
    fn test_allorigins_url_encodes_target() {
        let url = allorigins_url("https://www.patentechile.com/?patente=AB1234");
        assert_eq!(
            url,
            "https://api.allorigins.win/raw?url=https%3A%2F%2Fwww.patentechile.com%2F%3Fpatente%3DAB1234"
        );
    }

    #[test]
    fn test_jina_url_prefixes_target() {
        assert_eq!(
            jina_url("https://www.patentechile.com/?patente=AB1234"),
            "https://r.jina.ai/https://www.patentechile.com/?patente=AB1234"
        );
    }

    #[test]
    fn test_from_html_tag() {
        let body = "Title: Patente\nURL Source: x\n\n<HTML><body>hi</body></HTML>";
        assert_eq!(from_html_tag(body), "<HTML><body>hi</body></HTML>");
        assert_eq!(from_html_tag("plain text"), "plain text");
    }

    #[test]
    fn test_non_empty_rejects_blank_summary() {
        assert!(non_empty("  \n".to_string()).is_err());
        assert_eq!(non_empty("Marca: Kia".to_string()).unwrap(), "Marca: Kia");
    }
}
