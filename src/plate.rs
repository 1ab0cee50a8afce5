//! Plate and tag normalization shared by every entry point.

/// Canonical plate form: alphanumerics only, upper-cased.
///
/// Separators people type or OCR picks up (spaces, dashes, dots, the `·`
/// printed on Chilean plates) are dropped.
pub fn normalize_plate(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Split a comma-separated tag list, trimming and dropping empty entries.
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}
