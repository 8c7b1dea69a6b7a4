//! Conversion between JSON payloads and Qdrant payload values.

use std::collections::HashMap;

use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{ListValue, Struct, Value as QdrantValue};
use serde_json::{Map, Number, Value};

pub fn to_qdrant_payload(map: &Map<String, Value>) -> HashMap<String, QdrantValue> {
    map.iter()
        .map(|(k, v)| (k.clone(), to_qdrant_value(v)))
        .collect()
}

pub fn to_qdrant_value(value: &Value) -> QdrantValue {
    let kind = match value {
        Value::Null => Kind::NullValue(0),
        Value::Bool(b) => Kind::BoolValue(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Kind::IntegerValue(i),
            None => Kind::DoubleValue(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => Kind::StringValue(s.clone()),
        Value::Array(items) => Kind::ListValue(ListValue {
            values: items.iter().map(to_qdrant_value).collect(),
        }),
        Value::Object(map) => Kind::StructValue(Struct {
            fields: to_qdrant_payload(map),
        }),
    };
    QdrantValue { kind: Some(kind) }
}

pub fn from_qdrant_payload(payload: HashMap<String, QdrantValue>) -> Map<String, Value> {
    payload
        .into_iter()
        .map(|(k, v)| (k, from_qdrant_value(v)))
        .collect()
}

pub fn from_qdrant_value(value: QdrantValue) -> Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => Number::from_f64(d).map_or(Value::Null, Value::Number),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.into_iter().map(from_qdrant_value).collect())
        }
        Some(Kind::StructValue(s)) => Value::Object(from_qdrant_payload(s.fields)),
    }
}
