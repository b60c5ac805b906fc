//! Translation of device payload fields into tracking API parameters.

use relay_protocol::{params, payload, LocationParams};
use serde_json::{Map, Value};

type Convert = fn(f64) -> String;

struct FieldMapping {
    from: &'static str,
    to: &'static str,
    convert: Option<Convert>,
}

// Emission order of the produced parameters.
const FIELD_MAP: &[FieldMapping] = &[
    FieldMapping {
        from: payload::ACCURACY,
        to: params::ACCURACY,
        convert: None,
    },
    FieldMapping {
        from: payload::ALTITUDE,
        to: params::ALTITUDE,
        convert: None,
    },
    FieldMapping {
        from: payload::LATITUDE,
        to: params::LATITUDE,
        convert: None,
    },
    FieldMapping {
        from: payload::LONGITUDE,
        to: params::LONGITUDE,
        convert: None,
    },
    FieldMapping {
        from: payload::VELOCITY,
        to: params::SPEED,
        convert: Some(kmh_to_ms),
    },
    FieldMapping {
        from: payload::TIMESTAMP,
        to: params::TIME,
        convert: Some(whole_seconds),
    },
];

/// Map a location payload to tracking API parameters.
///
/// Returns `None` when the payload is not a location message. Unknown keys are
/// ignored, and mapped keys whose value is not a number are left out.
pub fn map_event(fields: &Map<String, Value>) -> Option<LocationParams> {
    if fields.get(payload::TYPE).and_then(Value::as_str) != Some(payload::TYPE_LOCATION) {
        return None;
    }
    let mut out = LocationParams::new();
    for mapping in FIELD_MAP {
        // as_f64 covers unsigned, signed and float representations alike
        let Some(value) = fields.get(mapping.from).and_then(Value::as_f64) else {
            continue;
        };
        let rendered = match mapping.convert {
            Some(convert) => convert(value),
            None => value.to_string(),
        };
        out.push(mapping.to, rendered);
    }
    Some(out)
}

fn kmh_to_ms(kmh: f64) -> String {
    (kmh / 3.6).to_string()
}

fn whole_seconds(epoch: f64) -> String {
    (epoch.trunc() as i64).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn owntracks_location() -> Map<String, Value> {
        fields(json!({
            "_type": "location",
            "acc": 5,
            "alt": 362,
            "batt": 76,
            "bs": 1,
            "conn": "w",
            "created_at": 1.61826091e9,
            "inregions": ["Home"],
            "lat": 47.5968792,
            "lon": 12.9540961,
            "t": "p",
            "tid": "dy",
            "tst": 1.618243873e9,
            "vac": 3,
            "vel": 42
        }))
    }

    #[test]
    fn maps_full_location_payload() {
        let params = map_event(&owntracks_location()).expect("location payload");
        let pairs: Vec<(&str, &str)> = params.iter().collect();
        assert_eq!(
            pairs,
            vec![
                ("acc", "5"),
                ("alt", "362"),
                ("lat", "47.5968792"),
                ("lon", "12.9540961"),
                ("spd", "11.666666666666666"),
                ("time", "1618243873"),
            ]
        );
    }

    #[test]
    fn velocity_keeps_full_precision() {
        let params = map_event(&fields(json!({"_type": "location", "vel": 42}))).unwrap();
        let spd: f64 = params.get("spd").unwrap().parse().unwrap();
        assert_eq!(spd, 42.0 / 3.6);
        assert_ne!(params.get("spd"), Some("11.666667"));
    }

    #[test]
    fn timestamp_is_truncated_not_rounded() {
        let params = map_event(&fields(json!({"_type": "location", "tst": 1618243873.9}))).unwrap();
        assert_eq!(params.get("time"), Some("1618243873"));
        let params =
            map_event(&fields(json!({"_type": "location", "tst": 1618243873.123}))).unwrap();
        assert_eq!(params.get("time"), Some("1618243873"));
        let params = map_event(&fields(json!({"_type": "location", "tst": 1618243873u64}))).unwrap();
        assert_eq!(params.get("time"), Some("1618243873"));
    }

    #[test]
    fn integer_and_float_inputs_render_alike() {
        let a = map_event(&fields(json!({"_type": "location", "acc": 12}))).unwrap();
        let b = map_event(&fields(json!({"_type": "location", "acc": 12.0}))).unwrap();
        let c = map_event(&fields(json!({"_type": "location", "alt": -4}))).unwrap();
        assert_eq!(a.get("acc"), Some("12"));
        assert_eq!(b.get("acc"), Some("12"));
        assert_eq!(c.get("alt"), Some("-4"));
    }

    #[test]
    fn non_numeric_values_are_omitted() {
        let params = map_event(&fields(json!({
            "_type": "location",
            "lat": "47.1",
            "lon": null,
            "alt": 100
        })))
        .unwrap();
        assert_eq!(params.get("lat"), None);
        assert_eq!(params.get("lon"), None);
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn other_message_types_are_rejected() {
        assert!(map_event(&fields(json!({"_type": "transition", "lat": 1.0}))).is_none());
        assert!(map_event(&fields(json!({"lat": 1.0}))).is_none());
        assert!(map_event(&fields(json!({"_type": 7}))).is_none());
    }

    #[test]
    fn location_without_mapped_fields_yields_empty_params() {
        let params = map_event(&fields(json!({"_type": "location", "batt": 50}))).unwrap();
        assert!(params.is_empty());
    }
}
