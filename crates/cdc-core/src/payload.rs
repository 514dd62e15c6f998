//! Constructor del payload de cambio.
//!
//! Forma serializada:
//!
//! ```json
//! { "newValues": { "dname": "OPS" }, "oldValues": { "dname": "SALES" } }
//! ```
//!
//! - `newValues` siempre presente cuando hay cambio. En `Delete` va vacío: no
//!   existe estado posterior.
//! - `oldValues` sólo aparece si al menos un campo cambiado existía en before'
//!   (nunca en `Create`; siempre en `Delete`).
//! - Los valores viajan como cadenas; `null` viaja como `null`. Arrays y
//!   objetos se rechazan con `CaptureError::Serialization`.
//! - El orden de claves es el de declaración de los campos trackeados.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::change::{Diff, NormalizedChange, Operation, Record};
use crate::errors::CaptureError;

pub type FieldValues = IndexMap<String, Option<String>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePayload {
    #[serde(rename = "newValues")]
    pub new_values: FieldValues,
    #[serde(rename = "oldValues", default, skip_serializing_if = "Option::is_none")]
    pub old_values: Option<FieldValues>,
}

impl ChangePayload {
    pub fn to_value(&self) -> Result<Value, CaptureError> {
        serde_json::to_value(self).map_err(|e| CaptureError::Serialization { field: "*".into(), reason: e.to_string() })
    }

    pub fn to_json_string(&self) -> Result<String, CaptureError> {
        serde_json::to_string(self).map_err(|e| CaptureError::Serialization { field: "*".into(), reason: e.to_string() })
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> { serde_json::from_value(value) }

    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> { serde_json::from_str(s) }
}

/// Construye el payload a partir del cambio normalizado y su diff.
///
/// `Diff::NoChange` devuelve `Ok(None)`: no hay nada que publicar.
pub fn build_payload(change: &NormalizedChange, diff: &Diff) -> Result<Option<ChangePayload>, CaptureError> {
    let fields = match diff {
        Diff::NoChange => return Ok(None),
        Diff::Changed(fields) => fields,
    };
    let empty = Record::new();
    let before = change.before.as_ref().unwrap_or(&empty);
    let after = change.after.as_ref().unwrap_or(&empty);

    let mut new_values = FieldValues::new();
    let mut old_values = FieldValues::new();
    for field in fields {
        if change.operation != Operation::Delete {
            if let Some(v) = after.get(field) {
                new_values.insert(field.clone(), embed(field, v)?);
            }
        }
        if change.operation != Operation::Create {
            if let Some(v) = before.get(field) {
                old_values.insert(field.clone(), embed(field, v)?);
            }
        }
    }

    let old_values = if old_values.is_empty() { None } else { Some(old_values) };
    Ok(Some(ChangePayload { new_values, old_values }))
}

fn embed(field: &str, value: &Value) -> Result<Option<String>, CaptureError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Array(_) => Err(CaptureError::Serialization { field: field.to_string(), reason: "array values are not supported".into() }),
        Value::Object(_) => Err(CaptureError::Serialization { field: field.to_string(), reason: "object values are not supported".into() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::{diff, normalize, RawRecord};
    use serde_json::json;

    fn raw(v: Value) -> RawRecord { v.as_object().cloned().unwrap() }

    fn tracked() -> Vec<String> { vec!["deptno".into(), "dname".into(), "loc".into()] }

    fn payload_for(op: Operation, before: Option<Value>, after: Option<Value>) -> Result<Option<ChangePayload>, CaptureError> {
        let before = before.map(raw);
        let after = after.map(raw);
        let n = normalize(op, before.as_ref(), after.as_ref(), &tracked());
        build_payload(&n, &diff(&n))
    }

    #[test]
    fn update_carries_only_changed_fields() {
        let p = payload_for(Operation::Update,
                            Some(json!({"deptno": "10", "dname": "X", "loc": "NY"})),
                            Some(json!({"deptno": "10", "dname": "Y", "loc": "NY"}))).unwrap()
                                                                                     .unwrap();
        let v = p.to_value().unwrap();
        assert_eq!(v, json!({"newValues": {"dname": "Y"}, "oldValues": {"dname": "X"}}));
    }

    #[test]
    fn create_has_no_old_values_key() {
        let p = payload_for(Operation::Create, None, Some(json!({"deptno": "10", "dname": "SALES"}))).unwrap().unwrap();
        let s = p.to_json_string().unwrap();
        assert_eq!(s, r#"{"newValues":{"deptno":"10","dname":"SALES"}}"#);
        assert!(!s.contains("oldValues"));
    }

    #[test]
    fn delete_lists_every_tracked_field() {
        let p = payload_for(Operation::Delete, Some(json!({"deptno": "10", "dname": "SALES", "loc": "NY"})), None).unwrap()
                                                                                                                 .unwrap();
        assert!(p.new_values.is_empty());
        let old = p.old_values.unwrap();
        assert_eq!(old.keys().collect::<Vec<_>>(), vec!["deptno", "dname", "loc"]);
        assert_eq!(old["loc"], Some("NY".to_string()));
    }

    #[test]
    fn first_seen_field_omits_old_values() {
        let p = payload_for(Operation::Update, Some(json!({"deptno": "10"})), Some(json!({"deptno": "10", "loc": "NY"}))).unwrap()
                                                                                                                        .unwrap();
        assert_eq!(p.old_values, None);
        assert_eq!(p.new_values["loc"], Some("NY".to_string()));
    }

    #[test]
    fn no_change_builds_nothing() {
        let r = json!({"deptno": "10"});
        assert_eq!(payload_for(Operation::Update, Some(r.clone()), Some(r)).unwrap(), None);
    }

    #[test]
    fn quotes_are_escaped_and_parse_back() {
        let p = payload_for(Operation::Create, None, Some(json!({"dname": "O\"Brien \\ co"}))).unwrap().unwrap();
        let s = p.to_json_string().unwrap();
        assert!(s.contains(r#"O\"Brien \\ co"#));
        assert_eq!(ChangePayload::from_json_str(&s).unwrap(), p);
    }

    #[test]
    fn structured_value_is_serialization_failure() {
        let err = payload_for(Operation::Create, None, Some(json!({"loc": {"city": "NY"}}))).unwrap_err();
        assert!(matches!(err, CaptureError::Serialization { ref field, .. } if field == "loc"));
    }

    #[test]
    fn null_travels_as_null() {
        let p = payload_for(Operation::Update, Some(json!({"loc": "NY"})), Some(json!({"loc": null}))).unwrap().unwrap();
        assert_eq!(p.to_value().unwrap(), json!({"newValues": {"loc": null}, "oldValues": {"loc": "NY"}}));
    }
}
