//! Binding between the XML wire form and the entity tree.
//!
//! [`read`] builds a [`Document`](crate::model::Document) from an
//! [`XmlDocument`](crate::xml::XmlDocument) following the schema's wire
//! selectors, and returns a [`Correlation`] that remembers which wire node
//! produced which tree node. [`write`] is the inverse and never needs the
//! correlation.

mod reader;
mod writer;

pub use reader::read;
pub use writer::write;

use crate::model::NodeId;
use crate::schema::Schema;
use crate::xml::{ElemId, WireNode, XmlElement};
use std::collections::HashMap;

/// Wire node to tree node correlation produced by [`read`].
#[derive(Debug, Clone, Default)]
pub struct Correlation {
    nodes: HashMap<WireNode, NodeId>,
    wires: HashMap<NodeId, WireNode>,
    /// Record element to (hosting entity, index in its handling list).
    records: HashMap<ElemId, (NodeId, usize)>,
}

impl Correlation {
    pub fn node(&self, wire: WireNode) -> Option<NodeId> {
        self.nodes.get(&wire).copied()
    }

    pub fn wire(&self, node: NodeId) -> Option<WireNode> {
        self.wires.get(&node).copied()
    }

    /// Entity hosting the record read from `element`, and the record's
    /// position in that entity's handling list.
    pub fn record(&self, element: ElemId) -> Option<(NodeId, usize)> {
        self.records.get(&element).copied()
    }

    /// Number of correlated tree nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn bind(&mut self, wire: WireNode, node: NodeId) {
        self.nodes.insert(wire, node);
        self.wires.insert(node, wire);
    }

    fn bind_record(&mut self, element: ElemId, owner: NodeId, index: usize) {
        self.records.insert(element, (owner, index));
    }
}

/// Whether `element` has the expanded name the schema gives `qname`.
fn is_named(schema: &Schema, element: &XmlElement, qname: &str) -> bool {
    schema
        .resolve(qname)
        .is_some_and(|(namespace, local)| element.is(namespace, local))
}

/// Spelling of a wire name using the schema's prefix for its namespace.
fn schema_qname(schema: &Schema, namespace: Option<&str>, local: &str, written: String) -> String {
    match namespace {
        None => local.to_string(),
        Some(uri) => match schema.prefix_for(uri) {
            Some(prefix) => format!("{prefix}:{local}"),
            None => written,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marking::{Marking, MarkingStructure};
    use crate::model::Scalar;
    use crate::xml::XmlDocument;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<stix:STIX_Package
    xmlns:stix="http://stix.mitre.org/stix-1"
    xmlns:indicator="http://stix.mitre.org/Indicator-2"
    xmlns:marking="http://data-marking.mitre.org/Marking-1"
    xmlns:tlp="http://data-marking.mitre.org/extensions/MarkingStructure#TLP-1"
    xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
    id="example:package-1" version="1.2">
  <stix:STIX_Header>
    <stix:Title>Sample</stix:Title>
    <stix:Handling>
      <marking:Marking>
        <marking:Controlled_Structure>//node() | //@*</marking:Controlled_Structure>
        <marking:Marking_Structure xsi:type="tlp:TLPMarkingStructureType" color="WHITE"/>
      </marking:Marking>
    </stix:Handling>
  </stix:STIX_Header>
  <stix:Indicators>
    <stix:Indicator id="example:indicator-1" negate="false">
      <indicator:Title>Bad IP</indicator:Title>
      <indicator:Alternative_ID>a</indicator:Alternative_ID>
      <indicator:Alternative_ID>a</indicator:Alternative_ID>
      <indicator:Unknown>skipped</indicator:Unknown>
      <indicator:Handling>
        <marking:Marking>
          <marking:Marking_Structure xsi:type="tlp:TLPMarkingStructureType" color="RED"/>
        </marking:Marking>
      </indicator:Handling>
    </stix:Indicator>
  </stix:Indicators>
</stix:STIX_Package>"#;

    fn read_sample() -> (crate::model::Document, Correlation, XmlDocument) {
        let xml = XmlDocument::parse(SAMPLE).unwrap();
        let (doc, correlation) = read(&Arc::new(Schema::stix()), &xml).unwrap();
        (doc, correlation, xml)
    }

    #[test]
    fn test_read_fields_and_handling() {
        let (doc, _, _) = read_sample();
        let root = doc.root();
        assert_eq!(doc.get_text(root, "id"), Some("example:package-1"));

        let header = doc.get(root, "stix_header").unwrap();
        assert_eq!(doc.get_text(header, "title"), Some("Sample"));

        let global = &doc.handling(root)[0];
        assert_eq!(global.target(), Some("//node() | //@*"));
        assert_eq!(
            global.structures,
            vec![MarkingStructure::new("tlp:TLPMarkingStructureType").with_attribute("color", "WHITE")]
        );

        let indicators = doc.get(root, "indicators").unwrap();
        let indicator = doc.items(indicators, "indicator")[0];
        assert_eq!(doc.get_scalar(indicator, "negate"), Some(&Scalar::Bool(false)));
        assert_eq!(doc.items(indicator, "alternative_id").len(), 2);
        assert_eq!(doc.handling(indicator).len(), 1);
        assert!(!doc.handling(indicator)[0].is_resolved());
    }

    #[test]
    fn test_equal_values_correlate_separately() {
        let (doc, correlation, _) = read_sample();
        let indicators = doc.get(doc.root(), "indicators").unwrap();
        let indicator = doc.items(indicators, "indicator")[0];
        let ids = doc.items(indicator, "alternative_id");

        let first = correlation.wire(ids[0]).unwrap();
        let second = correlation.wire(ids[1]).unwrap();
        assert_ne!(first, second);
        assert_eq!(correlation.node(first), Some(ids[0]));
        assert_eq!(correlation.node(second), Some(ids[1]));
    }

    #[test]
    fn test_record_correlation() {
        let (doc, correlation, xml) = read_sample();
        let records: Vec<ElemId> = xml
            .elements_named(Some(crate::schema::MARKING_NS), "Marking")
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(correlation.record(records[0]), Some((doc.root(), 0)));
        let (owner, index) = correlation.record(records[1]).unwrap();
        assert_eq!(doc.type_name(owner), Some("Indicator"));
        assert_eq!(index, 0);
    }

    #[test]
    fn test_invalid_root() {
        let xml = XmlDocument::parse(r#"<stix:Other xmlns:stix="http://stix.mitre.org/stix-1"/>"#)
            .unwrap();
        let err = read(&Arc::new(Schema::stix()), &xml).unwrap_err();
        assert!(matches!(err, crate::MarkingError::InvalidRoot { .. }));
    }

    #[test]
    fn test_write_then_read() {
        let (doc, _, _) = read_sample();
        let written = write(&doc).unwrap();
        let xml = XmlDocument::parse(&written).unwrap();
        let (again, _) = read(&Arc::new(Schema::stix()), &xml).unwrap();

        assert_eq!(again.embedded_markings().len(), 2);
        let indicators = again.get(again.root(), "indicators").unwrap();
        let indicator = again.items(indicators, "indicator")[0];
        assert_eq!(again.get_text(indicator, "title"), Some("Bad IP"));
        assert_eq!(again.handling(indicator), &[Marking::new()
            .with_structure(MarkingStructure::new("tlp:TLPMarkingStructureType").with_attribute("color", "RED"))]);
    }

    #[test]
    fn test_schema_qname() {
        let schema = Schema::stix();
        assert_eq!(
            schema_qname(&schema, Some(crate::schema::XSI_NS), "type", "x:type".to_string()),
            "xsi:type"
        );
        assert_eq!(schema_qname(&schema, None, "color", "color".to_string()), "color");
        assert_eq!(
            schema_qname(&schema, Some("urn:unknown"), "a", "u:a".to_string()),
            "u:a"
        );
    }
}
