use super::{is_named, schema_qname, Correlation};
use crate::error::{MarkingError, Result};
use crate::marking::{Marking, MarkingStructure};
use crate::model::{Document, NodeId, Scalar};
use crate::schema::{FieldDef, FieldKind, HandlingSlot, Schema, WireSelector};
use crate::xml::{ElemId, WireNode, XmlDocument};
use std::sync::Arc;
use tracing::{debug, warn};

/// Builds the entity tree of `xml`.
///
/// Unknown attributes and elements are skipped with a warning. Embedded
/// marking records are stored in the handling list of the entity whose
/// handling slot holds them.
pub fn read(schema: &Arc<Schema>, xml: &XmlDocument) -> Result<(Document, Correlation)> {
    let root = xml.element(xml.root());
    if !is_named(schema, root, &schema.root_element) {
        return Err(MarkingError::InvalidRoot {
            expected: schema.root_element.clone(),
            found: root.qname(),
        });
    }

    let mut reader = Reader {
        schema: Arc::clone(schema),
        xml,
        doc: Document::new(Arc::clone(schema))?,
        correlation: Correlation::default(),
    };
    let root_node = reader.doc.root();
    reader.correlation.bind(WireNode::Element(xml.root()), root_node);
    reader.read_entity(root_node, xml.root(), None)?;

    debug!(
        "bound {} wire nodes, {} embedded records",
        reader.correlation.len(),
        reader.correlation.records.len()
    );
    Ok((reader.doc, reader.correlation))
}

struct Reader<'x> {
    schema: Arc<Schema>,
    xml: &'x XmlDocument,
    doc: Document,
    correlation: Correlation,
}

/// An entity whose handling element lives inside the entity being read.
struct HandlingHost<'s> {
    owner: NodeId,
    element: &'s str,
}

impl Reader<'_> {
    fn read_entity(
        &mut self,
        node: NodeId,
        element: ElemId,
        host: Option<HandlingHost<'_>>,
    ) -> Result<()> {
        let schema = Arc::clone(&self.schema);
        let xml = self.xml;
        let Some(entity_type) = self.doc.type_name(node).and_then(|name| schema.entity_type(name))
        else {
            return Err(MarkingError::InvalidStructure(format!("{node} is not an entity")));
        };
        let wire = xml.element(element);

        for (index, attribute) in wire.attributes.iter().enumerate() {
            let field = entity_type.fields.iter().find(|f| match &f.selector {
                WireSelector::Attribute(q) => schema.resolve(q).is_some_and(|(ns, local)| {
                    attribute.local == local && attribute.namespace.as_deref() == ns
                }),
                _ => false,
            });
            match field {
                Some(field) => {
                    let value = self.store_scalar(node, field, &attribute.value)?;
                    self.correlation.bind(WireNode::Attribute(element, index), value);
                }
                None => warn!(
                    "ignoring attribute '{}' on <{}>",
                    attribute.qname(),
                    wire.qname()
                ),
            }
        }

        if let Some((index, text)) = wire.first_text() {
            match entity_type.fields.iter().find(|f| f.selector == WireSelector::Text) {
                Some(field) => {
                    let value = self.store_scalar(node, field, text)?;
                    self.correlation.bind(WireNode::Text(element, index), value);
                }
                None => warn!("ignoring text content of <{}>", wire.qname()),
            }
        }

        for child in xml.child_elements(element) {
            let child_wire = xml.element(child);

            if let Some(HandlingSlot::Direct { element: handling }) = &entity_type.handling {
                if is_named(&schema, child_wire, handling) {
                    self.read_handling(node, child)?;
                    continue;
                }
            }
            if let Some(host) = &host {
                if is_named(&schema, child_wire, host.element) {
                    self.read_handling(host.owner, child)?;
                    continue;
                }
            }

            let field = entity_type.fields.iter().find(|f| match &f.selector {
                WireSelector::Element(q) => is_named(&schema, child_wire, q),
                _ => false,
            });
            let Some(field) = field else {
                warn!(
                    "ignoring element <{}> in <{}>",
                    child_wire.qname(),
                    wire.qname()
                );
                continue;
            };

            let value = match &field.kind {
                FieldKind::Entity(type_name) => {
                    let entity = self.doc.create_entity(type_name)?;
                    self.attach(node, field, entity)?;
                    let nested_host = match &entity_type.handling {
                        Some(HandlingSlot::Header {
                            field: header,
                            element,
                        }) if *header == field.name => Some(HandlingHost {
                            owner: node,
                            element: element.as_str(),
                        }),
                        _ => None,
                    };
                    self.read_entity(entity, child, nested_host)?;
                    entity
                }
                FieldKind::Scalar(_) => self.store_scalar(node, field, &xml.text(child))?,
            };
            self.correlation.bind(WireNode::Element(child), value);
        }
        Ok(())
    }

    fn store_scalar(&mut self, owner: NodeId, field: &FieldDef, text: &str) -> Result<NodeId> {
        let FieldKind::Scalar(kind) = &field.kind else {
            return Err(MarkingError::InvalidStructure(format!(
                "field '{}' does not hold a scalar",
                field.name
            )));
        };
        let value = self.doc.create_scalar(Scalar::parse(*kind, text)?);
        self.attach(owner, field, value)?;
        Ok(value)
    }

    fn attach(&mut self, owner: NodeId, field: &FieldDef, value: NodeId) -> Result<()> {
        if field.is_many() {
            self.doc.push(owner, &field.name, value)
        } else {
            if let Some(previous) = self.doc.set(owner, &field.name, value)? {
                warn!("field '{}' repeated on the wire, {previous} replaced", field.name);
            }
            Ok(())
        }
    }

    fn read_handling(&mut self, owner: NodeId, handling: ElemId) -> Result<()> {
        let xml = self.xml;
        for child in xml.child_elements(handling) {
            let element = xml.element(child);
            if !is_named(&self.schema, element, &self.schema.records.record) {
                warn!("ignoring <{}> in handling", element.qname());
                continue;
            }
            let marking = self.read_record(child);
            let Some(records) = self.doc.handling_mut(owner) else {
                return Err(MarkingError::InvalidStructure(format!(
                    "{owner} cannot host marking records"
                )));
            };
            records.push(marking);
            let index = records.len() - 1;
            self.correlation.bind_record(child, owner, index);
        }
        Ok(())
    }

    fn read_record(&self, record: ElemId) -> Marking {
        let xml = self.xml;
        let format = &self.schema.records;
        let mut marking = Marking::new();
        for child in xml.child_elements(record) {
            let element = xml.element(child);
            if is_named(&self.schema, element, &format.target) {
                let target = xml.text(child);
                let target = target.trim();
                if !target.is_empty() {
                    marking.controlled_structure = Some(target.to_string());
                }
            } else if is_named(&self.schema, element, &format.structure) {
                marking.structures.push(self.read_structure(child));
            } else {
                warn!("ignoring <{}> in marking record", element.qname());
            }
        }
        marking
    }

    fn read_structure(&self, structure: ElemId) -> MarkingStructure {
        let xml = self.xml;
        let schema = &self.schema;
        let element = xml.element(structure);
        let kind = schema.resolve(&schema.records.kind_attribute);

        let mut result = MarkingStructure::default();
        for attribute in &element.attributes {
            let is_kind = kind.is_some_and(|(ns, local)| {
                attribute.local == local && attribute.namespace.as_deref() == ns
            });
            if is_kind {
                result.kind = Some(attribute.value.clone());
                continue;
            }
            let name = schema_qname(
                schema,
                attribute.namespace.as_deref(),
                &attribute.local,
                attribute.qname(),
            );
            result.attributes.insert(name, attribute.value.clone());
        }
        for child in xml.child_elements(structure) {
            let element = xml.element(child);
            let name = schema_qname(
                schema,
                element.namespace.as_deref(),
                &element.local,
                element.qname(),
            );
            result.elements.push((name, xml.text(child)));
        }
        result
    }
}
