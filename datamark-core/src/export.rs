//! JSON view of a document for inspection.
//!
//! Entities become objects with a `_type` key, their set fields and, when
//! they host records, a `handling` array. Repeated fields become arrays.
//! Scalars keep their JSON type where one exists; bytes are hex encoded and
//! dates use their wire form.

use crate::error::Result;
use crate::model::{Document, NodeId, NodeKind, Scalar};
use serde_json::{json, Map, Value};

pub fn to_json(doc: &Document) -> Result<Value> {
    node_to_json(doc, doc.root())
}

/// JSON view of one subtree.
pub fn node_to_json(doc: &Document, node: NodeId) -> Result<Value> {
    let value = match doc.kind(node) {
        Some(NodeKind::Scalar(scalar)) => scalar_to_json(scalar),
        Some(NodeKind::List(items)) => Value::Array(
            items
                .iter()
                .map(|item| node_to_json(doc, *item))
                .collect::<Result<Vec<_>>>()?,
        ),
        Some(NodeKind::Entity(_)) => {
            let mut object = Map::new();
            if let Some(type_name) = doc.type_name(node) {
                object.insert("_type".to_string(), json!(type_name));
            }
            for field in doc.typed_fields(node) {
                if let Some(value) = doc.get(node, &field.name) {
                    object.insert(field.name.clone(), node_to_json(doc, value)?);
                }
            }
            let handling = doc.handling(node);
            if !handling.is_empty() {
                object.insert("handling".to_string(), serde_json::to_value(handling)?);
            }
            Value::Object(object)
        }
        None => Value::Null,
    };
    Ok(value)
}

fn scalar_to_json(scalar: &Scalar) -> Value {
    match scalar {
        Scalar::Bool(b) => json!(b),
        Scalar::Int(i) => json!(i),
        Scalar::Float(f) => json!(f),
        other => json!(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marking::{Marking, MarkingStructure};
    use crate::schema::Schema;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn test_document_to_json() {
        let mut doc = Document::new(Arc::new(Schema::stix())).unwrap();
        let root = doc.root();
        doc.set_scalar(root, "version", "1.2").unwrap();
        let indicators = doc.create_entity("Indicators").unwrap();
        doc.set(root, "indicators", indicators).unwrap();
        let indicator = doc.create_entity("Indicator").unwrap();
        doc.push(indicators, "indicator", indicator).unwrap();
        doc.set_scalar(indicator, "negate", true).unwrap();
        doc.push_scalar(indicator, "alternative_id", "a").unwrap();
        doc.push_scalar(indicator, "alternative_id", "b").unwrap();
        doc.handling_mut(indicator).unwrap().push(
            Marking::new()
                .with_structure(MarkingStructure::tlp("RED"))
                .with_target("../../../self::node()"),
        );

        let expected = json!({
            "_type": "STIXPackage",
            "version": "1.2",
            "indicators": {
                "_type": "Indicators",
                "indicator": [{
                    "_type": "Indicator",
                    "negate": true,
                    "alternative_id": ["a", "b"],
                    "handling": [{
                        "structures": [{
                            "kind": "tlpMarking:TLPMarkingStructureType",
                            "attributes": {"color": "RED"}
                        }],
                        "target": "../../../self::node()"
                    }]
                }]
            }
        });
        assert_eq!(to_json(&doc).unwrap(), expected);
    }

    #[test]
    fn test_scalar_kinds() {
        assert_eq!(scalar_to_json(&Scalar::Int(7)), json!(7));
        assert_eq!(scalar_to_json(&Scalar::Bytes(vec![0xca, 0xfe])), json!("cafe"));
    }
}
