//! Product records as read from the catalog dataset.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Stable unique identifier of a source record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Num(u64),
    Str(String),
}

/// Identifier used as the vector store key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointKey {
    Num(u64),
    Uuid(String),
}

impl RecordId {
    /// Derive the vector store key for this record.
    ///
    /// Numbers map 1:1 and UUID strings are kept verbatim. Any other string is
    /// mapped to a UUIDv5 so re-ingesting the same record always overwrites the
    /// same point.
    pub fn point_key(&self) -> PointKey {
        match self {
            RecordId::Num(n) => PointKey::Num(*n),
            RecordId::Str(s) => match Uuid::parse_str(s) {
                Ok(uuid) => PointKey::Uuid(uuid.hyphenated().to_string()),
                Err(_) => PointKey::Uuid(
                    Uuid::new_v5(&Uuid::NAMESPACE_OID, s.as_bytes())
                        .hyphenated()
                        .to_string(),
                ),
            },
        }
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordId::Num(n) => write!(f, "{n}"),
            RecordId::Str(s) => f.write_str(s),
        }
    }
}

/// One catalog item. Immutable once read.
///
/// Only `id` is required and type-checked. Fields the pipeline does not
/// interpret, and known fields whose JSON type does not fit, are kept in
/// `extra` and stored alongside the known ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct Record {
    pub id: RecordId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_price: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_price: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shop_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record {
    /// Minimal record carrying only an id.
    pub fn new(id: RecordId) -> Self {
        Self {
            id,
            name: None,
            description: None,
            images: Vec::new(),
            current_price: None,
            old_price: None,
            currency: None,
            category_id: None,
            category_name: None,
            brand_name: None,
            shop_name: None,
            link: None,
            extra: Map::new(),
        }
    }

    /// Image handed to the embedding model, if any.
    pub fn primary_image(&self) -> Option<&str> {
        self.images
            .iter()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
    }

    /// Text handed to the embedding model: name and description joined.
    pub fn embedding_text(&self) -> Option<String> {
        let parts: Vec<&str> = [self.name.as_deref(), self.description.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(". "))
        }
    }

    /// Display payload stored next to the vector.
    pub fn payload(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

impl TryFrom<Map<String, Value>> for Record {
    type Error = String;

    fn try_from(mut fields: Map<String, Value>) -> Result<Self, Self::Error> {
        let id = match fields.remove("id") {
            None | Some(Value::Null) => return Err("missing field `id`".to_string()),
            Some(value) => serde_json::from_value::<RecordId>(value)
                .map_err(|_| "`id` must be a non-negative integer or a string".to_string())?,
        };

        let mut record = Record::new(id);
        record.name = take_field(&mut fields, "name", as_text);
        record.description = take_field(&mut fields, "description", as_text);
        record.images = take_field(&mut fields, "images", as_text_list).unwrap_or_default();
        record.current_price = take_field(&mut fields, "current_price", as_float);
        record.old_price = take_field(&mut fields, "old_price", as_float);
        record.currency = take_field(&mut fields, "currency", as_text);
        record.category_id = take_field(&mut fields, "category_id", as_integer);
        record.category_name = take_field(&mut fields, "category_name", as_text);
        record.brand_name = take_field(&mut fields, "brand_name", as_text);
        record.shop_name = take_field(&mut fields, "shop_name", as_text);
        record.link = take_field(&mut fields, "link", as_text);
        record.extra = fields;
        Ok(record)
    }
}

/// Move `key` out of `fields` if `convert` accepts it. Nulls are dropped;
/// values `convert` rejects stay in `fields`.
fn take_field<T>(
    fields: &mut Map<String, Value>,
    key: &str,
    convert: fn(&Value) -> Option<T>,
) -> Option<T> {
    let converted = match fields.get(key)? {
        Value::Null => None,
        value => Some(convert(value)?),
    };
    fields.remove(key);
    converted
}

fn as_text(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

fn as_text_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// The `(id, vector, payload)` tuple handed to the vector store.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductPoint {
    pub id: RecordId,
    pub vector: Vec<f32>,
    pub payload: Map<String, Value>,
}

impl ProductPoint {
    pub fn new(record: &Record, vector: Vec<f32>) -> Self {
        Self {
            id: record.id.clone(),
            vector,
            payload: record.payload(),
        }
    }
}
