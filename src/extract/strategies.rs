//! Line strategies that bind labels to values.
//!
//! Each strategy looks at the line under the cursor and either returns a
//! [`Binding`] or gives up; the label map applies them in order and keeps
//! the first success.

use super::labels::{is_known_label, normalize_label};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static SPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}|\t").expect("static regex"));

/// A label/value pair found at the cursor and how many lines it used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub label: String,
    pub value: String,
    pub consumed: usize,
}

/// Position inside the non-empty lines of the text being scanned.
pub struct Cursor<'a> {
    lines: &'a [&'a str],
    index: usize,
    map: &'a LabelMap,
}

impl<'a> Cursor<'a> {
    fn line(&self) -> &'a str {
        self.lines[self.index]
    }

    fn next_line(&self) -> Option<&'a str> {
        self.lines.get(self.index + 1).copied()
    }
}

pub type Strategy = fn(&Cursor<'_>) -> Option<Binding>;

/// Strategies in priority order.
pub const STRATEGIES: [Strategy; 3] = [colon_pair, spaced_pair, standalone_label];

/// Run attempts in order and return the first value produced.
pub fn first_success<T>(attempts: &[&dyn Fn() -> Option<T>]) -> Option<T> {
    attempts.iter().find_map(|attempt| attempt())
}

/// `label: value`, split at the first colon.
pub fn colon_pair(cursor: &Cursor<'_>) -> Option<Binding> {
    let (label, value) = cursor.line().split_once(':')?;
    bind(label, value, 1)
}

/// `label   value`, two tokens separated by a run of spaces or a tab.
pub fn spaced_pair(cursor: &Cursor<'_>) -> Option<Binding> {
    let mut parts = SPACE_RUN.split(cursor.line());
    let (label, value) = (parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    bind(label, value, 1)
}

/// A known label alone on its line, value on the following line.
pub fn standalone_label(cursor: &Cursor<'_>) -> Option<Binding> {
    let label = normalize_label(cursor.line());
    if !is_known_label(&label) || cursor.map.contains(&label) {
        return None;
    }
    let value = cursor.next_line()?.trim();
    if value.is_empty() {
        return None;
    }
    Some(Binding {
        label,
        value: value.to_string(),
        consumed: 2,
    })
}

fn bind(label: &str, value: &str, consumed: usize) -> Option<Binding> {
    let label = normalize_label(label);
    let value = value.trim();
    if label.is_empty() || value.is_empty() {
        return None;
    }
    Some(Binding {
        label,
        value: value.to_string(),
        consumed,
    })
}

/// Normalized label → value, filled once per text.
#[derive(Debug, Default)]
pub struct LabelMap {
    values: HashMap<String, String>,
    unclaimed: Vec<usize>,
    /// `(first line, lines used, label)` of every binding to a known label
    known: Vec<(usize, usize, String)>,
}

impl LabelMap {
    /// Scan `lines` once, binding labels with the first matching strategy.
    /// Lines no strategy claims are remembered for the prefix fallback.
    pub fn build(lines: &[&str]) -> Self {
        let mut map = Self::default();
        let mut index = 0;

        while index < lines.len() {
            let found = {
                let cursor = Cursor {
                    lines,
                    index,
                    map: &map,
                };
                STRATEGIES.iter().find_map(|strategy| strategy(&cursor))
            };

            match found {
                Some(binding) => {
                    if is_known_label(&binding.label) {
                        map.known
                            .push((index, binding.consumed, binding.label.clone()));
                    }
                    index += binding.consumed;
                    map.values.entry(binding.label).or_insert(binding.value);
                }
                None => {
                    map.unclaimed.push(index);
                    index += 1;
                }
            }
        }

        map
    }

    pub fn contains(&self, normalized: &str) -> bool {
        self.values.contains_key(normalized)
    }

    /// Value bound to any spelling of `label`.
    pub fn get(&self, label: &str) -> Option<&str> {
        self.values
            .get(&normalize_label(label))
            .map(String::as_str)
    }

    /// Indices of lines no strategy could split.
    pub fn unclaimed(&self) -> &[usize] {
        &self.unclaimed
    }

    /// Indices of the `total` lines that are free text for a field spelled
    /// `synonyms`: every line except those bound to another known label.
    pub fn free_lines(&self, total: usize, synonyms: &[&str]) -> Vec<usize> {
        let own: Vec<String> = synonyms.iter().map(|s| normalize_label(s)).collect();
        let mut taken = vec![false; total];
        for (start, consumed, label) in &self.known {
            if own.contains(label) {
                continue;
            }
            for slot in taken.iter_mut().skip(*start).take(*consumed) {
                *slot = true;
            }
        }
        (0..total).filter(|&i| !taken[i]).collect()
    }
}
