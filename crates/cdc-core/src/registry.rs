//! Registro de tracking: entidad -> lista ordenada de campos trackeados.
//!
//! Es configuración estática provista desde afuera; el núcleo no gestiona la
//! instalación del tracking, sólo lo consulta por llamada.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingRegistry {
    entities: IndexMap<String, Vec<String>>,
}

impl TrackingRegistry {
    pub fn new() -> Self { Self::default() }

    /// Registra (o reemplaza) los campos trackeados de una entidad. Los
    /// duplicados se descartan conservando la primera aparición.
    pub fn track<I, S>(mut self, entity: impl Into<String>, fields: I) -> Self
        where I: IntoIterator<Item = S>,
              S: Into<String>
    {
        let mut list: Vec<String> = Vec::new();
        for f in fields {
            let f = f.into();
            if !list.contains(&f) {
                list.push(f);
            }
        }
        self.entities.insert(entity.into(), list);
        self
    }

    pub fn tracked_fields(&self, entity: &str) -> Option<&[String]> { self.entities.get(entity).map(Vec::as_slice) }

    pub fn entities(&self) -> impl Iterator<Item = &str> { self.entities.keys().map(String::as_str) }

    pub fn is_empty(&self) -> bool { self.entities.is_empty() }

    /// Carga desde JSON: `{"dept": ["deptno", "dname", "loc"]}`.
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        let raw: IndexMap<String, Vec<String>> = serde_json::from_str(s)?;
        Ok(raw.into_iter().fold(Self::new(), |reg, (entity, fields)| reg.track(entity, fields)))
    }
}
