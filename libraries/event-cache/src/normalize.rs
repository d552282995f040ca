//! Shapes whatever the server answered into a sequence of records.
//!
//! List endpoints have been seen to return a bare array or an object wrapping
//! the array under one of a few names. A payload we do not recognise is not an
//! error: it simply has nothing to show.

use im::Vector;
use serde_json::Value;

use crate::record::EventRecord;

/// Probed in this order; the first one holding an array wins.
const WRAPPER_FIELDS: [&str; 3] = ["items", "events", "data"];

/// The raw elements of a list payload.
pub fn sequence(payload: &Value) -> &[Value] {
    if let Value::Array(items) = payload {
        return items;
    }

    let wrapped = WRAPPER_FIELDS
        .iter()
        .find_map(|field| payload.get(*field).and_then(Value::as_array));
    match wrapped {
        Some(items) => items.as_slice(),
        None => {
            if !payload.is_null() {
                log::debug!("Response has no recognised list shape, treating as empty");
            }
            &[]
        }
    }
}

/// Decode a list payload. Elements that are not valid records are skipped.
pub fn records(payload: &Value) -> Vector<EventRecord> {
    sequence(payload).iter().filter_map(decode).collect()
}

/// Decode a single-record payload into a sequence of at most one element.
pub fn detail(payload: &Value) -> Vector<EventRecord> {
    let single = if payload.get("id").is_some() {
        Some(payload)
    } else {
        WRAPPER_FIELDS
            .iter()
            .filter_map(|field| payload.get(*field))
            .find(|inner| inner.get("id").is_some())
    };

    match single {
        Some(value) => decode(value).into_iter().collect(),
        None => records(payload),
    }
}

fn decode(value: &Value) -> Option<EventRecord> {
    serde_json::from_value(value.clone())
        .inspect_err(|e| log::warn!("Skipping malformed event record: {e}"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids(records: &Vector<EventRecord>) -> Vec<String> {
        records.iter().map(|r| r.id.to_string()).collect()
    }

    #[test]
    fn test_bare_array_keeps_order() {
        let payload = json!([{"id": 3}, {"id": 1}, {"id": 2}]);
        assert_eq!(ids(&records(&payload)), vec!["3", "1", "2"]);
    }

    #[test]
    fn test_wrapper_priority() {
        let payload = json!({
            "data": [{"id": "d"}],
            "events": [{"id": "e"}],
        });
        assert_eq!(ids(&records(&payload)), vec!["e"]);

        let payload = json!({
            "items": "not a list",
            "data": [{"id": "d"}],
        });
        assert_eq!(ids(&records(&payload)), vec!["d"]);
    }

    #[test]
    fn test_unknown_shapes_are_empty() {
        assert!(records(&json!({"results": [{"id": 1}]})).is_empty());
        assert!(records(&json!("nope")).is_empty());
        assert!(records(&Value::Null).is_empty());
    }

    #[test]
    fn test_malformed_elements_are_skipped() {
        let payload = json!([{"id": 1}, {"name": "no id"}, 7, {"id": 2}]);
        assert_eq!(ids(&records(&payload)), vec!["1", "2"]);
    }

    #[test]
    fn test_bad_capacity_keeps_the_record() {
        let payload = json!([{"id": 1, "max_members": -1}, {"id": 2}]);
        assert_eq!(ids(&records(&payload)), vec!["1", "2"]);
    }

    #[test]
    fn test_detail_shapes() {
        assert_eq!(ids(&detail(&json!({"id": 9, "name": "x"}))), vec!["9"]);
        assert_eq!(ids(&detail(&json!({"data": {"id": 9}}))), vec!["9"]);
        assert_eq!(ids(&detail(&json!([{"id": 9}]))), vec!["9"]);
        assert!(detail(&Value::Null).is_empty());
    }
}
