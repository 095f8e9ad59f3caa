//! Conversion between `serde_json::Value` and `prost_types::Struct`/`Value`,
//! used everywhere a gRPC message carries an arbitrary context map
//! (`google.protobuf.Struct`).

use prost_types::value::Kind;
use prost_types::{ListValue, Struct, Value as PbValue};

pub fn json_to_struct(value: &serde_json::Value) -> Struct {
    match value {
        serde_json::Value::Object(map) => Struct {
            fields: map
                .iter()
                .map(|(k, v)| (k.clone(), json_to_pb_value(v)))
                .collect(),
        },
        _ => Struct::default(),
    }
}

fn json_to_pb_value(value: &serde_json::Value) -> PbValue {
    let kind = match value {
        serde_json::Value::Null => Kind::NullValue(0),
        serde_json::Value::Bool(b) => Kind::BoolValue(*b),
        serde_json::Value::Number(n) => Kind::NumberValue(n.as_f64().unwrap_or_default()),
        serde_json::Value::String(s) => Kind::StringValue(s.clone()),
        serde_json::Value::Array(items) => Kind::ListValue(ListValue {
            values: items.iter().map(json_to_pb_value).collect(),
        }),
        serde_json::Value::Object(_) => Kind::StructValue(json_to_struct(value)),
    };
    PbValue { kind: Some(kind) }
}

pub fn struct_to_json(s: &Struct) -> serde_json::Value {
    serde_json::Value::Object(
        s.fields
            .iter()
            .map(|(k, v)| (k.clone(), pb_value_to_json(v)))
            .collect(),
    )
}

fn pb_value_to_json(value: &PbValue) -> serde_json::Value {
    match &value.kind {
        None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(*b),
        Some(Kind::NumberValue(n)) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Some(Kind::StringValue(s)) => serde_json::Value::String(s.clone()),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.iter().map(pb_value_to_json).collect())
        }
        Some(Kind::StructValue(s)) => struct_to_json(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_nested_object() {
        let original = serde_json::json!({
            "a": 1,
            "b": "two",
            "c": [true, false, null],
            "d": { "nested": 3.5 }
        });
        let s = json_to_struct(&original);
        let back = struct_to_json(&s);
        assert_eq!(original, back);
    }

    #[test]
    fn non_object_input_becomes_empty_struct() {
        let s = json_to_struct(&serde_json::json!("not an object"));
        assert!(s.fields.is_empty());
    }
}
