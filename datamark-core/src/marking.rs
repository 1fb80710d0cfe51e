//! Marking records.
//!
//! A [`Marking`] is an opaque payload (one or more [`MarkingStructure`]s) plus
//! an optional controlled structure: the path expression that locates the
//! nodes it covers once embedded in a document. Equality and hashing only
//! consider the payload, so a resolved copy of a record compares equal to the
//! unresolved record it was produced from.

use crate::error::{MarkingError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Kind of the STIX TLP marking structure.
pub const TLP_KIND: &str = "tlpMarking:TLPMarkingStructureType";

/// Kind of the STIX simple (free text) marking structure.
pub const SIMPLE_KIND: &str = "simpleMarking:SimpleMarkingStructureType";

/// One structure of a marking payload.
///
/// On the wire this is a single structure element: `kind` is its type
/// attribute, `attributes` its remaining attributes and `elements` its child
/// elements as `(qualified name, text)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarkingStructure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<(String, String)>,
}

impl MarkingStructure {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            ..Default::default()
        }
    }

    /// Traffic Light Protocol structure, e.g. `tlp("AMBER")`.
    pub fn tlp(color: impl Into<String>) -> Self {
        Self::new(TLP_KIND).with_attribute("color", color)
    }

    /// Simple marking carrying a free text statement.
    pub fn statement(text: impl Into<String>) -> Self {
        Self::new(SIMPLE_KIND).with_element("simpleMarking:Statement", text)
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_element(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.elements.push((name.into(), text.into()));
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn is_blank(&self) -> bool {
        self.kind.as_deref().map_or(true, str::is_empty)
            && self.attributes.is_empty()
            && self.elements.is_empty()
    }
}

impl fmt::Display for MarkingStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.as_deref().unwrap_or("untyped"))?;
        if self.attributes.is_empty() && self.elements.is_empty() {
            return Ok(());
        }
        f.write_str("[")?;
        let mut first = true;
        for (name, value) in &self.attributes {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value}")?;
            first = false;
        }
        for (name, text) in &self.elements {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{name}={text:?}")?;
            first = false;
        }
        f.write_str("]")
    }
}

/// A marking record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Marking {
    #[serde(default)]
    pub structures: Vec<MarkingStructure>,
    #[serde(default, rename = "target", skip_serializing_if = "Option::is_none")]
    pub controlled_structure: Option<String>,
}

impl Marking {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_structure(mut self, structure: MarkingStructure) -> Self {
        self.structures.push(structure);
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.controlled_structure = Some(target.into());
        self
    }

    /// Resolved target path, `None` while the record is unresolved.
    pub fn target(&self) -> Option<&str> {
        self.controlled_structure.as_deref()
    }

    pub fn is_resolved(&self) -> bool {
        self.controlled_structure.is_some()
    }

    /// Copy of this record with `target` as its controlled structure.
    pub fn resolved(&self, target: Option<String>) -> Marking {
        Marking {
            structures: self.structures.clone(),
            controlled_structure: target,
        }
    }

    /// Same payload and same target.
    pub fn same_record(&self, other: &Marking) -> bool {
        self == other && self.controlled_structure == other.controlled_structure
    }

    /// Checks that this is a recognizable marking record.
    ///
    /// Every structure must declare its kind. A record without structures is
    /// accepted, documents legitimately carry such records.
    pub fn validate(&self) -> Result<()> {
        for (index, structure) in self.structures.iter().enumerate() {
            if structure.kind.as_deref().map_or(true, str::is_empty) {
                return Err(MarkingError::UnknownMarking(format!(
                    "marking structure {} has no kind",
                    index + 1
                )));
            }
        }
        Ok(())
    }

    /// Checks that the record is valid and still unresolved.
    pub(crate) fn validate_unresolved(&self) -> Result<()> {
        self.validate()?;
        match &self.controlled_structure {
            Some(target) => Err(MarkingError::MarkingPathNotEmpty(target.clone())),
            None => Ok(()),
        }
    }
}

impl PartialEq for Marking {
    fn eq(&self, other: &Self) -> bool {
        self.structures == other.structures
    }
}

impl Eq for Marking {}

impl Hash for Marking {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.structures.hash(state);
    }
}

impl fmt::Display for Marking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.structures.is_empty() {
            return f.write_str("<empty>");
        }
        for (index, structure) in self.structures.iter().enumerate() {
            if index > 0 {
                f.write_str(" + ")?;
            }
            write!(f, "{structure}")?;
        }
        Ok(())
    }
}
