//! Propiedades del pipeline de captura (proptest).
//!
//! - Si todos los campos trackeados conservan su texto, no hay evento.
//! - El payload, serializado y releído, reconstruye los mismos mapas.

use cdc_core::{change_payload, ChangePayload, RawRecord, TrackedEntityChange};
use proptest::prelude::*;
use serde_json::Value;

const FIELDS: [&str; 4] = ["deptno", "dname", "loc", "mgr"];

fn tracked() -> Vec<String> { FIELDS.iter().map(|s| s.to_string()).collect() }

fn record_strategy() -> impl Strategy<Value = RawRecord> {
    prop::collection::vec(prop::option::of("[a-zA-Z0-9 \"\\\\]{0,8}"), FIELDS.len()).prop_map(|values| {
        FIELDS.iter()
              .zip(values)
              .filter_map(|(f, v)| v.map(|v| (f.to_string(), Value::String(v))))
              .collect()
    })
}

proptest! {
    #[test]
    fn identical_tracked_values_never_produce_a_payload(before in record_strategy(), noise in "[a-z]{0,6}") {
        let mut after = before.clone();
        after.insert("untracked".into(), Value::String(noise));
        let change = TrackedEntityChange::update("r1", before, after);
        prop_assert_eq!(change_payload(&tracked(), &change).unwrap(), None);
    }

    #[test]
    fn payload_round_trips(before in record_strategy(), after in record_strategy()) {
        let change = TrackedEntityChange::update("r1", before.clone(), after.clone());
        if let Some(p) = change_payload(&tracked(), &change).unwrap() {
            let text = p.to_json_string().unwrap();
            let parsed = ChangePayload::from_json_str(&text).unwrap();
            prop_assert_eq!(&parsed, &p);
            for (field, value) in &parsed.new_values {
                prop_assert_eq!(after.get(field).and_then(Value::as_str), value.as_deref());
            }
            if let Some(old) = &parsed.old_values {
                for (field, value) in old {
                    prop_assert_eq!(before.get(field).and_then(Value::as_str), value.as_deref());
                }
            }
        } else {
            for f in FIELDS {
                prop_assert!(after.get(f).is_none() || after.get(f) == before.get(f));
            }
        }
    }
}
