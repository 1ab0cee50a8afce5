//! Turn noisy text (OCR output, scraped tables, pasted notes) into plate
//! and vehicle fields.
//!
//! Every field is resolved on its own: a labeled-plate regex (plate only),
//! then the label map, then a label-prefixed line, then a field specific
//! regex over the lines not bound to some other known label.

pub mod labels;
pub mod strategies;

use crate::plate::normalize_plate;
use crate::record::{Features, Field};
use labels::{strip_label_prefix, CANONICAL_SYNONYMS, EXTRA_SYNONYMS, PLATE_LABEL, PLATE_SYNONYMS};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use strategies::{first_success, LabelMap};

static LABELED_PLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:patente|placa)\b[ \t]*[:\-]?[ \t]*([A-Z0-9]{5,8})\b")
        .expect("static regex")
});
static BARE_PLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:[A-Z]{4}[0-9]{2}|[A-Z]{2}[0-9]{4})\b").expect("static regex")
});
static YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\ba[ñn]o\b[^0-9\n]{0,20}((?:19|20)[0-9]{2})\b").expect("static regex")
});
static ENGINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bmotor\b[^A-Za-z0-9\n]{0,6}([A-Z0-9][A-Z0-9-]{4,})").expect("static regex")
});
static CHASSIS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:chasis|serie|vin)\b[^A-Za-z0-9\n]{0,6}([A-Z0-9][A-Z0-9-]{7,})")
        .expect("static regex")
});

/// Fields recovered from a text, plus a display summary of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Extraction {
    pub plate: String,
    pub features: Features,
    pub summary: String,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.plate.is_empty() && self.features == Features::default()
    }
}

/// Extract plate and vehicle fields from free text. Never fails: text with
/// nothing recognizable yields an empty extraction.
pub fn extract(raw_text: &str) -> Extraction {
    let lines = split_lines(raw_text);
    let map = LabelMap::build(&lines);
    let leftovers: Vec<&str> = map.unclaimed().iter().map(|&i| lines[i]).collect();
    let scope = Scope {
        lines: &lines,
        map: &map,
        leftovers: &leftovers,
    };

    let plate = first_success(&[
        &|| first_token_with_digit(&LABELED_PLATE, raw_text),
        &|| scope.resolve(PLATE_SYNONYMS, Some(&*BARE_PLATE)),
    ])
    .map(|plate| normalize_plate(&plate))
    .unwrap_or_default();

    let mut features = Features::default();
    for (field, synonyms) in CANONICAL_SYNONYMS {
        if let Some(value) = scope.resolve(synonyms, fallback_for(field)) {
            features.set(field, value);
        }
    }
    for (label, synonyms) in EXTRA_SYNONYMS {
        if let Some(value) = scope.resolve(synonyms, None) {
            features.push_extra(label, &value);
        }
    }

    let summary = summarize(&plate, &features);
    tracing::debug!(
        "Extracted plate {:?} and {} canonical fields from {} lines",
        plate,
        features.filled().count(),
        lines.len()
    );

    Extraction {
        plate,
        features,
        summary,
    }
}

/// `"Label: value"` lines for the plate and every filled canonical field.
pub fn summarize(plate: &str, features: &Features) -> String {
    let plate_line = (!plate.is_empty()).then(|| format!("{}: {}", PLATE_LABEL, plate));
    plate_line
        .into_iter()
        .chain(
            features
                .filled()
                .map(|(field, value)| format!("{}: {}", field.label(), value)),
        )
        .collect::<Vec<_>>()
        .join("\n")
}

/// Non-empty trimmed lines; bullet separators count as line breaks.
fn split_lines(text: &str) -> Vec<&str> {
    text.lines()
        .flat_map(|line| line.split('•'))
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

fn fallback_for(field: Field) -> Option<&'static Regex> {
    match field {
        Field::Year => Some(&*YEAR),
        Field::Engine => Some(&*ENGINE),
        Field::Chassis => Some(&*CHASSIS),
        _ => None,
    }
}

fn first_token_with_digit(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures_iter(text)
        .filter_map(|captures| captures.get(1))
        .map(|token| token.as_str())
        .find(|token| token.chars().any(|c| c.is_ascii_digit()))
        .map(str::to_string)
}

struct Scope<'a> {
    lines: &'a [&'a str],
    map: &'a LabelMap,
    leftovers: &'a [&'a str],
}

impl Scope<'_> {
    fn resolve(&self, synonyms: &[&str], fallback: Option<&Regex>) -> Option<String> {
        first_success(&[
            &|| {
                synonyms
                    .iter()
                    .find_map(|label| self.map.get(label))
                    .map(str::to_string)
            },
            &|| {
                synonyms
                    .iter()
                    .find_map(|label| {
                        self.leftovers
                            .iter()
                            .find_map(|line| strip_label_prefix(line, label))
                    })
                    .map(str::to_string)
            },
            &|| {
                fallback.and_then(|pattern| {
                    first_token_with_digit(pattern, &self.free_text(synonyms))
                })
            },
        ])
    }

    fn free_text(&self, synonyms: &[&str]) -> String {
        self.map
            .free_lines(self.lines.len(), synonyms)
            .into_iter()
            .map(|i| self.lines[i])
            .collect::<Vec<_>>()
            .join("\n")
    }
}
