//! Label vocabulary of the registry pages and helpers to compare labels
//! regardless of case, accents and punctuation.

use crate::record::Field;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Labels that carry the plate itself.
pub const PLATE_LABEL: &str = "Patente";
pub const PLATE_SYNONYMS: &[&str] = &["Patente", "Placa Patente", "PPU", "Placa"];

/// Synonyms per canonical field, most specific first.
pub const CANONICAL_SYNONYMS: [(Field, &[&str]); 11] = [
    (Field::Type, &["Tipo Vehículo", "Tipo de vehículo", "Tipo"]),
    (Field::Brand, &["Marca"]),
    (Field::Model, &["Modelo"]),
    (Field::Year, &["Año", "Año fabricación", "Año de fabricación"]),
    (Field::Color, &["Color"]),
    (Field::Engine, &["Nº Motor", "N° Motor", "Número de motor", "Motor"]),
    (Field::Chassis, &["Nº Chasis", "N° Chasis", "Chasis", "N° de serie", "VIN"]),
    (Field::Origin, &["Procedencia", "Origen", "País de origen"]),
    (Field::Manufacturer, &["Fabricante"]),
    (Field::Seal, &["Sello", "Tipo de sello"]),
    (Field::Fuel, &["Combustible", "Tipo de combustible"]),
];

/// Attributes kept in the free-text bucket: display label and synonyms.
pub const EXTRA_SYNONYMS: [(&str, &[&str]); 4] = [
    ("Permiso", &["Permiso de circulación", "Permiso"]),
    ("Revisión técnica", &["Revisión técnica", "Última R.T.", "Revisión"]),
    ("Kilometraje", &["Kilometraje", "Kms", "Km"]),
    ("Precio", &["Precio", "Tasación", "Avalúo"]),
];

static KNOWN_LABELS: LazyLock<HashSet<String>> = LazyLock::new(|| {
    PLATE_SYNONYMS
        .iter()
        .chain(CANONICAL_SYNONYMS.iter().flat_map(|(_, s)| s.iter()))
        .chain(EXTRA_SYNONYMS.iter().flat_map(|(_, s)| s.iter()))
        .map(|label| normalize_label(label))
        .collect()
});

/// Whether a normalized line is one of the labels we know how to bind.
pub fn is_known_label(normalized: &str) -> bool {
    KNOWN_LABELS.contains(normalized)
}

/// Lower-case, accent-free, alphanumeric-only form of a label.
pub fn normalize_label(label: &str) -> String {
    label
        .chars()
        .flat_map(fold_char)
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Case and accent folding of a single character. Ordinal markers fold to
/// nothing so `Nº`, `N°` and `N` compare equal.
fn fold_char(c: char) -> impl Iterator<Item = char> {
    c.to_lowercase().filter_map(strip_accent)
}

fn strip_accent(c: char) -> Option<char> {
    let base = match c {
        'á' | 'à' | 'ä' | 'â' => 'a',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' => 'o',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        'º' | '°' | 'ª' => return None,
        other => other,
    };
    Some(base)
}

/// If `line` starts with `label` (folded comparison) followed by whitespace,
/// return the trimmed rest of the line.
pub fn strip_label_prefix<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let wanted: Vec<char> = label.chars().flat_map(fold_char).collect();
    if wanted.is_empty() {
        return None;
    }

    let mut matched = 0;
    for (idx, c) in line.char_indices() {
        if matched == wanted.len() {
            if !c.is_whitespace() {
                return None;
            }
            let rest = line[idx..].trim();
            return (!rest.is_empty()).then_some(rest);
        }
        for folded in fold_char(c) {
            if matched < wanted.len() && wanted[matched] == folded {
                matched += 1;
            } else {
                return None;
            }
        }
    }

    None
}
