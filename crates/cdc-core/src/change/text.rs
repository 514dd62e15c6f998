//! Representación textual de valores para comparación.
//!
//! El núcleo compara valores como texto opaco: no hay comparación numérica ni
//! por tipo. Los valores estructurados (arrays/objetos) se comparan por su
//! JSON canónico (claves ordenadas) para que reescribir el mismo documento
//! con otro orden de claves no cuente como cambio.

use serde_json::Value;
use std::collections::BTreeMap;

/// Texto de un valor para el chequeo de igualdad. `null` no tiene texto
/// (`None`), lo que lo distingue de la cadena vacía.
pub fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => Some(to_canonical_json(value)),
    }
}

/// JSON canónico mínimo: objetos con claves ordenadas, sin espacios.
pub fn to_canonical_json(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(_) => value.to_string(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(to_canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        Value::Object(map) => {
            let tree: BTreeMap<&String, String> = map.iter().map(|(k, v)| (k, to_canonical_json(v))).collect();
            let items: Vec<String> = tree.into_iter()
                                         .map(|(k, v)| format!("{}:{}", Value::from(k.as_str()), v))
                                         .collect();
            format!("{{{}}}", items.join(","))
        }
    }
}
