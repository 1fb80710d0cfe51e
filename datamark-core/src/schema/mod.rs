//! Statically declared entity schema.
//!
//! A [`Schema`] describes every entity type of a document: its fields, how
//! each field is encoded on the wire, and whether the type can host embedded
//! marking records. It is plain data and can be loaded from JSON.

mod stix;

use crate::error::{MarkingError, Result};
use crate::model::ScalarKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Namespace URI of the data marking vocabulary.
pub const MARKING_NS: &str = "http://data-marking.mitre.org/Marking-1";

/// Namespace URI of XML Schema instance attributes.
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Where a field lives on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "wire", content = "name", rename_all = "lowercase")]
pub enum WireSelector {
    /// Child element with the given qualified name.
    Element(String),
    /// Attribute with the given (possibly qualified) name.
    Attribute(String),
    /// Text content of the owning element.
    Text,
}

impl WireSelector {
    pub fn is_element(&self) -> bool {
        matches!(self, WireSelector::Element(_))
    }
}

impl fmt::Display for WireSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireSelector::Element(name) => f.write_str(name),
            WireSelector::Attribute(name) => write!(f, "@{name}"),
            WireSelector::Text => f.write_str("text()"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    #[default]
    One,
    Many,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Entity(String),
    Scalar(ScalarKind),
}

fn default_mapped() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub selector: WireSelector,
    #[serde(default)]
    pub cardinality: Cardinality,
    pub kind: FieldKind,
    /// Whether the field takes part in field mapping lookups. Unmapped fields
    /// are still read and written but cannot be addressed by a marking path.
    #[serde(default = "default_mapped", skip_serializing_if = "is_true")]
    pub mapped: bool,
}

impl FieldDef {
    pub fn attribute(name: &str, qname: &str, kind: ScalarKind) -> Self {
        Self::build(name, WireSelector::Attribute(qname.to_string()), FieldKind::Scalar(kind))
    }

    pub fn element(name: &str, qname: &str, kind: ScalarKind) -> Self {
        Self::build(name, WireSelector::Element(qname.to_string()), FieldKind::Scalar(kind))
    }

    pub fn text(name: &str, kind: ScalarKind) -> Self {
        Self::build(name, WireSelector::Text, FieldKind::Scalar(kind))
    }

    pub fn child(name: &str, qname: &str, type_name: &str) -> Self {
        Self::build(
            name,
            WireSelector::Element(qname.to_string()),
            FieldKind::Entity(type_name.to_string()),
        )
    }

    pub fn many(mut self) -> Self {
        self.cardinality = Cardinality::Many;
        self
    }

    pub fn unmapped(mut self) -> Self {
        self.mapped = false;
        self
    }

    pub fn is_many(&self) -> bool {
        self.cardinality == Cardinality::Many
    }

    fn build(name: &str, selector: WireSelector, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            selector,
            cardinality: Cardinality::One,
            kind,
            mapped: true,
        }
    }
}

/// Where an entity type keeps its embedded marking records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "placement", rename_all = "lowercase")]
pub enum HandlingSlot {
    /// A handling element directly under the entity element.
    Direct { element: String },
    /// A handling element under the entity's header child (`field`), which is
    /// created on demand.
    Header { field: String, element: String },
}

impl HandlingSlot {
    pub fn direct(element: &str) -> Self {
        HandlingSlot::Direct {
            element: element.to_string(),
        }
    }

    pub fn header(field: &str, element: &str) -> Self {
        HandlingSlot::Header {
            field: field.to_string(),
            element: element.to_string(),
        }
    }

    pub fn element(&self) -> &str {
        match self {
            HandlingSlot::Direct { element } | HandlingSlot::Header { element, .. } => element,
        }
    }

    /// Relative path from a record's controlled structure element back to the
    /// entity element that owns the record.
    pub fn anchor_path(&self) -> &'static str {
        match self {
            HandlingSlot::Direct { .. } => "../../..",
            HandlingSlot::Header { .. } => "../../../..",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityType {
    pub name: String,
    pub fields: Vec<FieldDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handling: Option<HandlingSlot>,
}

impl EntityType {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
            handling: None,
        }
    }

    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_handling(mut self, slot: HandlingSlot) -> Self {
        self.handling = Some(slot);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// Wire names used for embedded marking records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFormat {
    pub record: String,
    pub target: String,
    pub structure: String,
    pub kind_attribute: String,
}

impl Default for RecordFormat {
    fn default() -> Self {
        Self {
            record: "marking:Marking".to_string(),
            target: "marking:Controlled_Structure".to_string(),
            structure: "marking:Marking_Structure".to_string(),
            kind_attribute: "xsi:type".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Prefix to namespace URI.
    pub namespaces: BTreeMap<String, String>,
    pub root_type: String,
    pub root_element: String,
    pub types: Vec<EntityType>,
    #[serde(default)]
    pub records: RecordFormat,
}

impl Schema {
    /// Built-in STIX 1.x subset.
    pub fn stix() -> Self {
        stix::schema()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let schema: Schema = serde_json::from_str(json)?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn entity_type(&self, name: &str) -> Option<&EntityType> {
        self.types.iter().find(|t| t.name == name)
    }

    pub fn type_index(&self, name: &str) -> Option<usize> {
        self.types.iter().position(|t| t.name == name)
    }

    pub(crate) fn type_at(&self, index: usize) -> &EntityType {
        &self.types[index]
    }

    pub fn namespace(&self, prefix: &str) -> Option<&str> {
        self.namespaces.get(prefix).map(String::as_str)
    }

    /// Prefix registered for a namespace URI.
    pub fn prefix_for(&self, uri: &str) -> Option<&str> {
        self.namespaces
            .iter()
            .find(|(_, u)| u.as_str() == uri)
            .map(|(p, _)| p.as_str())
    }

    /// Resolves a qualified name to `(namespace URI, local name)`.
    pub fn resolve<'a>(&'a self, qname: &'a str) -> Option<(Option<&'a str>, &'a str)> {
        match qname.split_once(':') {
            Some((prefix, local)) => self.namespace(prefix).map(|uri| (Some(uri), local)),
            None => Some((None, qname)),
        }
    }

    /// Checks internal consistency: the root type exists and hosts a header
    /// handling slot, entity references resolve, and every prefix is declared.
    pub fn validate(&self) -> Result<()> {
        let root = self.entity_type(&self.root_type).ok_or_else(|| {
            MarkingError::Schema(format!("root type '{}' is not declared", self.root_type))
        })?;
        match &root.handling {
            Some(HandlingSlot::Header { .. }) => {}
            _ => {
                return Err(MarkingError::Schema(format!(
                    "root type '{}' must declare a header handling slot",
                    root.name
                )))
            }
        }
        self.check_qname(&self.root_element)?;
        for qname in [
            &self.records.record,
            &self.records.target,
            &self.records.structure,
            &self.records.kind_attribute,
        ] {
            self.check_qname(qname)?;
        }

        for entity in &self.types {
            if self.types.iter().filter(|t| t.name == entity.name).count() > 1 {
                return Err(MarkingError::Schema(format!(
                    "type '{}' is declared more than once",
                    entity.name
                )));
            }
            for field in &entity.fields {
                if let FieldKind::Entity(target) = &field.kind {
                    if self.entity_type(target).is_none() {
                        return Err(MarkingError::Schema(format!(
                            "field '{}.{}' references unknown type '{}'",
                            entity.name, field.name, target
                        )));
                    }
                    if !field.selector.is_element() {
                        return Err(MarkingError::Schema(format!(
                            "entity field '{}.{}' must be encoded as an element",
                            entity.name, field.name
                        )));
                    }
                }
                if let WireSelector::Element(q) | WireSelector::Attribute(q) = &field.selector {
                    self.check_qname(q)?;
                }
            }
            if let Some(slot) = &entity.handling {
                self.check_qname(slot.element())?;
                if let HandlingSlot::Header { field, .. } = slot {
                    let header = entity.field(field).ok_or_else(|| {
                        MarkingError::Schema(format!(
                            "header field '{}.{}' is not declared",
                            entity.name, field
                        ))
                    })?;
                    if header.is_many() || !matches!(header.kind, FieldKind::Entity(_)) {
                        return Err(MarkingError::Schema(format!(
                            "header field '{}.{}' must be a single entity",
                            entity.name, field
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn check_qname(&self, qname: &str) -> Result<()> {
        match self.resolve(qname) {
            Some(_) => Ok(()),
            None => Err(MarkingError::Schema(format!(
                "undeclared namespace prefix in '{qname}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_schema_is_valid() {
        let schema = Schema::stix();
        schema.validate().unwrap();
        assert_eq!(schema.root_type, "STIXPackage");
        assert_eq!(schema.namespace("marking"), Some(MARKING_NS));
        assert_eq!(schema.prefix_for(XSI_NS), Some("xsi"));
    }

    #[test]
    fn test_json_roundtrip() {
        let schema = Schema::stix();
        let json = schema.to_json().unwrap();
        let back = Schema::from_json(&json).unwrap();
        assert_eq!(back, schema);
    }

    #[test]
    fn test_selector_json_shape() {
        let json = serde_json::to_value(WireSelector::Attribute("id".to_string())).unwrap();
        assert_eq!(json, serde_json::json!({ "wire": "attribute", "name": "id" }));
        let text: WireSelector = serde_json::from_value(serde_json::json!({ "wire": "text" })).unwrap();
        assert_eq!(text, WireSelector::Text);
    }

    #[test]
    fn test_resolve() {
        let schema = Schema::stix();
        assert_eq!(
            schema.resolve("stix:Indicator"),
            Some((Some("http://stix.mitre.org/stix-1"), "Indicator"))
        );
        assert_eq!(schema.resolve("id"), Some((None, "id")));
        assert_eq!(schema.resolve("nope:Thing"), None);
    }

    #[test]
    fn test_validate_rejects_missing_root() {
        let mut schema = Schema::stix();
        schema.root_type = "Missing".to_string();
        assert!(matches!(schema.validate(), Err(MarkingError::Schema(_))));
    }

    #[test]
    fn test_validate_rejects_root_without_header() {
        let mut schema = Schema::stix();
        let root = schema.type_index("STIXPackage").unwrap();
        schema.types[root].handling = Some(HandlingSlot::direct("stix:Handling"));
        assert!(matches!(schema.validate(), Err(MarkingError::Schema(_))));
    }

    #[test]
    fn test_validate_rejects_unknown_reference() {
        let mut schema = Schema::stix();
        schema.types.push(
            EntityType::new("Broken").with_field(FieldDef::child("x", "stix:X", "Nowhere")),
        );
        let err = schema.validate().unwrap_err();
        assert!(err.to_string().contains("Nowhere"));
    }

    #[test]
    fn test_validate_rejects_undeclared_prefix() {
        let mut schema = Schema::stix();
        schema.types.push(
            EntityType::new("Broken").with_field(FieldDef::element(
                "x",
                "bogus:X",
                ScalarKind::Text,
            )),
        );
        assert!(matches!(schema.validate(), Err(MarkingError::Schema(_))));
    }

    #[test]
    fn test_anchor_paths() {
        assert_eq!(HandlingSlot::direct("indicator:Handling").anchor_path(), "../../..");
        assert_eq!(
            HandlingSlot::header("stix_header", "stix:Handling").anchor_path(),
            "../../../.."
        );
    }
}
