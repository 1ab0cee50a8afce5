//! Plate lead records and the load-time migration of older stored shapes.

use crate::plate::{normalize_plate, parse_tags};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Separator used when several `"Label: value"` segments share one line.
pub const BULLET: &str = " • ";

/// Segment candidates offered before any record exists.
pub const DEFAULT_SEGMENTS: [&str; 5] = [
    "Autos para comprar",
    "Autos de remates",
    "Camiones mineros",
    "Camiones transportistas",
    "Otro",
];

/// Canonical vehicle attributes with a dedicated slot in [`Features`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Type,
    Brand,
    Model,
    Year,
    Color,
    Engine,
    Chassis,
    Origin,
    Manufacturer,
    Seal,
    Fuel,
}

impl Field {
    /// Display order used by every summary.
    pub const ALL: [Field; 11] = [
        Field::Type,
        Field::Brand,
        Field::Model,
        Field::Year,
        Field::Color,
        Field::Engine,
        Field::Chassis,
        Field::Origin,
        Field::Manufacturer,
        Field::Seal,
        Field::Fuel,
    ];

    /// Key used for the field in stored JSON.
    pub fn key(self) -> &'static str {
        match self {
            Field::Type => "type",
            Field::Brand => "brand",
            Field::Model => "model",
            Field::Year => "year",
            Field::Color => "color",
            Field::Engine => "engine",
            Field::Chassis => "chassis",
            Field::Origin => "origin",
            Field::Manufacturer => "manufacturer",
            Field::Seal => "seal",
            Field::Fuel => "fuel",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Field::Type => "Tipo",
            Field::Brand => "Marca",
            Field::Model => "Modelo",
            Field::Year => "Año",
            Field::Color => "Color",
            Field::Engine => "Nº Motor",
            Field::Chassis => "Nº Chasis",
            Field::Origin => "Procedencia",
            Field::Manufacturer => "Fabricante",
            Field::Seal => "Sello",
            Field::Fuel => "Combustible",
        }
    }
}

/// Known vehicle attributes plus a free-text bucket for everything else.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    #[serde(rename = "type")]
    pub kind: String,
    pub brand: String,
    pub model: String,
    pub year: String,
    pub color: String,
    pub engine: String,
    pub chassis: String,
    pub origin: String,
    pub manufacturer: String,
    pub seal: String,
    pub fuel: String,
    pub extra: String,
}

impl Features {
    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::Type => &self.kind,
            Field::Brand => &self.brand,
            Field::Model => &self.model,
            Field::Year => &self.year,
            Field::Color => &self.color,
            Field::Engine => &self.engine,
            Field::Chassis => &self.chassis,
            Field::Origin => &self.origin,
            Field::Manufacturer => &self.manufacturer,
            Field::Seal => &self.seal,
            Field::Fuel => &self.fuel,
        }
    }

    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        let slot = match field {
            Field::Type => &mut self.kind,
            Field::Brand => &mut self.brand,
            Field::Model => &mut self.model,
            Field::Year => &mut self.year,
            Field::Color => &mut self.color,
            Field::Engine => &mut self.engine,
            Field::Chassis => &mut self.chassis,
            Field::Origin => &mut self.origin,
            Field::Manufacturer => &mut self.manufacturer,
            Field::Seal => &mut self.seal,
            Field::Fuel => &mut self.fuel,
        };
        *slot = value.into();
    }

    /// Canonical fields that carry a value, in display order.
    pub fn filled(&self) -> impl Iterator<Item = (Field, &str)> + '_ {
        Field::ALL
            .into_iter()
            .map(|field| (field, self.get(field).trim()))
            .filter(|(_, value)| !value.is_empty())
    }

    /// Fill empty slots from `other`, leaving values already set untouched.
    pub fn merge_missing(&mut self, other: &Features) {
        for field in Field::ALL {
            if self.get(field).trim().is_empty() && !other.get(field).trim().is_empty() {
                self.set(field, other.get(field));
            }
        }
        if self.extra.trim().is_empty() {
            self.extra = other.extra.clone();
        }
    }

    /// Append a `"Label: value"` segment to `extra` unless it is already there.
    pub fn push_extra(&mut self, label: &str, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        let segment = format!("{}: {}", label, value);
        if self.extra.split(BULLET).any(|existing| existing.trim() == segment) {
            return;
        }
        if !self.extra.trim().is_empty() {
            self.extra.push_str(BULLET);
        }
        self.extra.push_str(&segment);
    }
}

/// One tracked plate lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub plate: String,
    pub segment: String,
    pub notes: String,
    pub tags: Vec<String>,
    pub features: Features,
    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl Record {
    /// Build a new record, rejecting plates that normalize to nothing.
    pub fn new(
        plate: &str,
        segment: &str,
        notes: &str,
        tags: &str,
        features: Features,
    ) -> crate::Result<Self> {
        let plate = normalize_plate(plate);
        if plate.is_empty() {
            return Err(crate::LedgerError::Validation(
                "A plate is required".to_string(),
            ));
        }

        Ok(Self {
            id: new_id(),
            plate,
            segment: segment.trim().to_string(),
            notes: notes.trim().to_string(),
            tags: parse_tags(tags),
            features,
            timestamp: chrono::Utc::now().timestamp_millis(),
        })
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Legacy first-class attributes that newer records keep inside `extra`.
/// The first non-empty key of each entry wins.
const LEGACY_EXTRAS: [(&[&str], &str); 4] = [
    (&["permit"], "Permiso"),
    (&["inspection"], "Revisión técnica"),
    (&["kms", "odometer"], "Kilometraje"),
    (&["price"], "Precio"),
];

/// Bring every stored value to the current record shape.
///
/// Entries that are not objects or have no usable plate are dropped; ids
/// are regenerated when missing or already taken.
pub fn migrate(values: Vec<Value>) -> Vec<Record> {
    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(values.len());

    for (index, value) in values.into_iter().enumerate() {
        let Some(mut record) = migrate_one(value) else {
            tracing::warn!("Dropping stored record #{} with an unreadable shape", index);
            continue;
        };
        if record.id.is_empty() || seen.contains(&record.id) {
            record.id = new_id();
        }
        seen.insert(record.id.clone());
        records.push(record);
    }

    records
}

fn migrate_one(value: Value) -> Option<Record> {
    let Value::Object(object) = value else {
        return None;
    };

    let plate = normalize_plate(object.get("plate")?.as_str()?);
    if plate.is_empty() {
        return None;
    }

    let tags = match object.get("tags") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(raw)) => parse_tags(raw),
        _ => Vec::new(),
    };

    let features = match object.get("features") {
        Some(Value::Object(raw)) => migrate_features(raw),
        _ => Features::default(),
    };

    let timestamp = object
        .get("timestamp")
        .and_then(|t| t.as_i64().or_else(|| t.as_f64().map(|f| f as i64)))
        .unwrap_or(0);

    Some(Record {
        id: string_field(&object, "id"),
        plate,
        segment: string_field(&object, "segment"),
        notes: string_field(&object, "notes"),
        tags,
        features,
        timestamp,
    })
}

fn migrate_features(raw: &Map<String, Value>) -> Features {
    let mut features = Features::default();
    for field in Field::ALL {
        features.set(field, string_field(raw, field.key()));
    }
    features.extra = string_field(raw, "extra");

    let vehicle = string_field(raw, "vehicle");
    if features.model.is_empty() && !vehicle.is_empty() {
        features.model = vehicle;
    }

    for (keys, label) in LEGACY_EXTRAS {
        if let Some(value) = keys
            .iter()
            .map(|key| string_field(raw, key))
            .find(|value| !value.is_empty())
        {
            features.push_extra(label, &value);
        }
    }

    features
}

fn string_field(object: &Map<String, Value>, key: &str) -> String {
    match object.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_record_normalizes_input() {
        let record = Record::new(" ab 1234 ", "Otro", " nota ", "a, b ,,c", Features::default())
            .unwrap();
        assert_eq!(record.plate, "AB1234");
        assert_eq!(record.notes, "nota");
        assert_eq!(record.tags, vec!["a", "b", "c"]);
        assert!(!record.id.is_empty());
        assert!(record.timestamp > 0);
    }

    #[test]
    fn test_new_record_rejects_blank_plate() {
        let err = Record::new("  - ", "Otro", "", "", Features::default()).unwrap_err();
        assert!(matches!(err, crate::LedgerError::Validation(_)));
    }

    #[test]
    fn test_features_serialize_type_key() {
        let mut features = Features::default();
        features.set(Field::Type, "Automóvil");
        let value = serde_json::to_value(&features).unwrap();
        assert_eq!(value["type"], "Automóvil");
    }

    #[test]
    fn test_migrate_backfills_missing_features() {
        let records = migrate(vec![json!({
            "id": "1",
            "plate": "ab1234",
            "segment": "Otro",
            "notes": "",
            "tags": [],
            "timestamp": 10
        })]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].plate, "AB1234");
        assert_eq!(records[0].features, Features::default());
    }

    #[test]
    fn test_migrate_promotes_vehicle_and_folds_legacy_extras() {
        let records = migrate(vec![json!({
            "id": "1",
            "plate": "AB1234",
            "segment": "Otro",
            "notes": "",
            "tags": "remate, urgente",
            "features": {
                "vehicle": "Hilux 2.4",
                "year": "2019",
                "permit": "Pagado",
                "kms": "120000",
                "price": ""
            },
            "timestamp": 10
        })]);
        let features = &records[0].features;
        assert_eq!(features.model, "Hilux 2.4");
        assert_eq!(features.year, "2019");
        assert_eq!(features.extra, "Permiso: Pagado • Kilometraje: 120000");
        assert_eq!(records[0].tags, vec!["remate", "urgente"]);
    }

    #[test]
    fn test_migrate_keeps_one_odometer_reading() {
        let records = migrate(vec![
            json!({
                "plate": "AB1234",
                "features": { "kms": "120000", "odometer": 118500 }
            }),
            json!({
                "plate": "CD5678",
                "features": { "kms": " ", "odometer": 64000 }
            }),
        ]);
        assert_eq!(records[0].features.extra, "Kilometraje: 120000");
        assert_eq!(records[1].features.extra, "Kilometraje: 64000");
    }

    #[test]
    fn test_migrate_accepts_numeric_feature_values() {
        let records = migrate(vec![json!({
            "plate": "AB1234",
            "features": { "year": 2015, "brand": "Kia" }
        })]);
        assert_eq!(records[0].features.year, "2015");
        assert_eq!(records[0].features.brand, "Kia");
    }

    #[test]
    fn test_migrate_keeps_existing_model_over_vehicle() {
        let records = migrate(vec![json!({
            "id": "1",
            "plate": "AB1234",
            "features": { "vehicle": "Hilux", "model": "Yaris" }
        })]);
        assert_eq!(records[0].features.model, "Yaris");
    }

    #[test]
    fn test_migrate_is_stable_on_current_shape() {
        let record = Record::new("AB1234", "Otro", "", "x", Features::default()).unwrap();
        let value = serde_json::to_value(&record).unwrap();
        let migrated = migrate(vec![value]);
        assert_eq!(migrated, vec![record]);
    }

    #[test]
    fn test_migrate_drops_unreadable_entries_and_fixes_ids() {
        let records = migrate(vec![
            json!("not a record"),
            json!({ "plate": "   " }),
            json!({ "id": "dup", "plate": "AA1111" }),
            json!({ "id": "dup", "plate": "BB2222" }),
            json!({ "plate": "CC3333" }),
        ]);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].id, "dup");
        assert_ne!(records[1].id, "dup");
        assert!(!records[2].id.is_empty());
        assert_eq!(records[2].timestamp, 0);
    }

    #[test]
    fn test_push_extra_skips_duplicates() {
        let mut features = Features::default();
        features.push_extra("Precio", "$5.000.000");
        features.push_extra("Precio", "$5.000.000");
        features.push_extra("Kilometraje", " ");
        assert_eq!(features.extra, "Precio: $5.000.000");
    }
}
