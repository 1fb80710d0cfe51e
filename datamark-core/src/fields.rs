//! Field mapping lookup: `(entity type, field name) -> wire selector`.

use crate::error::Result;
use crate::schema::{Schema, WireSelector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Compiled lookup table of every mapped field in a schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMap {
    entries: BTreeMap<String, BTreeMap<String, WireSelector>>,
}

impl FieldMap {
    pub fn compile(schema: &Schema) -> Self {
        let entries = schema
            .types
            .iter()
            .map(|entity| {
                let fields = entity
                    .fields
                    .iter()
                    .filter(|field| field.mapped)
                    .map(|field| (field.name.clone(), field.selector.clone()))
                    .collect();
                (entity.name.clone(), fields)
            })
            .collect();
        Self { entries }
    }

    pub fn lookup(&self, entity_type: &str, field: &str) -> Option<&WireSelector> {
        self.entries.get(entity_type)?.get(field)
    }

    /// Number of mapped fields.
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let map = FieldMap::compile(&Schema::stix());
        assert_eq!(
            map.lookup("Indicator", "title"),
            Some(&WireSelector::Element("indicator:Title".to_string()))
        );
        assert_eq!(
            map.lookup("Indicator", "id"),
            Some(&WireSelector::Attribute("id".to_string()))
        );
        assert_eq!(map.lookup("StructuredText", "value"), Some(&WireSelector::Text));
        assert_eq!(map.lookup("Indicator", "nope"), None);
        assert_eq!(map.lookup("Nope", "title"), None);
    }

    #[test]
    fn test_unmapped_fields_are_absent() {
        let schema = Schema::stix();
        let map = FieldMap::compile(&schema);
        assert!(schema.entity_type("Indicator").unwrap().field("xsi_type").is_some());
        assert_eq!(map.lookup("Indicator", "xsi_type"), None);
    }

    #[test]
    fn test_json_roundtrip() {
        let map = FieldMap::compile(&Schema::stix());
        let json = map.to_json().unwrap();
        assert!(json.contains("\"indicator:Title\""));
        let back = FieldMap::from_json(&json).unwrap();
        assert_eq!(back, map);
        assert!(!back.is_empty());
    }
}
