//! Flat `"label: value"` renderings of features, proxy payloads and
//! registry HTML tables.

use crate::record::{Features, BULLET};
use scraper::{ElementRef, Html, Node, Selector};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// Visible-text fallback is cut to this many characters.
pub const MAX_TEXT_FALLBACK: usize = 1200;

/// Header rows of the registry table that carry no data.
const NOISE_HEADERS: [&str; 1] = ["información vehicular"];

static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("static selector"));
static CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("th, td").expect("static selector"));
static BODY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("static selector"));

/// Body of a local proxy response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyPayload {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub fields: Option<Map<String, Value>>,
    #[serde(default)]
    pub html: Option<String>,
}

/// Filled canonical fields joined by bullets; the `extra` bucket when none
/// are filled.
pub fn format_features(features: &Features) -> String {
    let line = features
        .filled()
        .map(|(field, value)| format!("{}: {}", field.label(), value))
        .collect::<Vec<_>>()
        .join(BULLET);

    if line.is_empty() {
        features.extra.trim().to_string()
    } else {
        line
    }
}

/// `"key: value"` lines in the map's order.
pub fn format_fields(fields: &Map<String, Value>) -> String {
    fields
        .iter()
        .map(|(key, value)| match value {
            Value::String(s) => format!("{}: {}", key, s),
            other => format!("{}: {}", key, other),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Key/value pairs of every table row with at least two cells.
pub fn table_pairs(html: &str) -> Vec<(String, String)> {
    // Bare `<tr>` fragments are dropped by the HTML parser outside a table.
    let lower = html.to_ascii_lowercase();
    let document = if lower.contains("<tr") && !lower.contains("<table") {
        Html::parse_document(&format!("<table>{}</table>", html))
    } else {
        Html::parse_document(html)
    };

    document
        .select(&ROW)
        .filter_map(|row| {
            let mut cells = row.select(&CELL);
            let key = cell_text(cells.next()?);
            let value = cell_text(cells.next()?);
            if key.is_empty() || value.is_empty() || is_noise(&key) {
                return None;
            }
            Some((key, value))
        })
        .collect()
}

/// Summary of a registry page: table rows as `"key: value"` lines, or the
/// page's visible text (truncated) when it has no usable table.
pub fn summarize_html(html: &str) -> String {
    let pairs = table_pairs(html);
    if !pairs.is_empty() {
        return pairs
            .iter()
            .map(|(key, value)| format!("{}: {}", key, value))
            .collect::<Vec<_>>()
            .join("\n");
    }

    truncate(&visible_text(html), MAX_TEXT_FALLBACK)
}

/// Pick the best summary a proxy payload offers.
pub fn build_summary(payload: &ProxyPayload) -> String {
    if let Some(summary) = payload.summary.as_deref().map(str::trim) {
        if !summary.is_empty() {
            return summary.to_string();
        }
    }

    if let Some(fields) = payload.fields.as_ref().filter(|f| !f.is_empty()) {
        return format_fields(fields);
    }

    payload
        .html
        .as_deref()
        .map(summarize_html)
        .unwrap_or_default()
}

/// Cut `text` to `max` characters, marking the cut with an ellipsis.
pub fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_noise(key: &str) -> bool {
    let key = key.to_lowercase();
    NOISE_HEADERS.iter().any(|noise| key.contains(noise))
}

/// Text nodes under `<body>`, script and style excluded, one per line.
fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let root = match document.select(&BODY).next() {
        Some(body) => body,
        None => document.root_element(),
    };

    root.descendants()
        .filter_map(|node| match node.value() {
            Node::Text(text) => {
                let hidden = node
                    .ancestors()
                    .filter_map(ElementRef::wrap)
                    .any(|el| matches!(el.value().name(), "script" | "style" | "noscript"));
                (!hidden).then(|| text.trim().to_string())
            }
            _ => None,
        })
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
