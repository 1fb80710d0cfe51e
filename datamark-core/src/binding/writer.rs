use crate::error::{MarkingError, Result};
use crate::marking::Marking;
use crate::model::{Document, NodeId};
use crate::schema::{FieldDef, FieldKind, HandlingSlot, RecordFormat, Schema, WireSelector};
use crate::xml::XmlWriter;

/// Serializes the tree with its embedded marking records.
///
/// The root element declares every namespace of the schema. Within an
/// element, attributes come first, then text content, then child elements in
/// schema order, and a direct handling element last. Records of a header
/// slot go inside the header element, which is emitted even when the tree
/// holds no header entity.
pub fn write(doc: &Document) -> Result<String> {
    let mut writer = TreeWriter {
        doc,
        schema: doc.schema(),
        out: XmlWriter::new(),
    };
    writer.write_document()?;
    writer.out.finish()
}

struct TreeWriter<'d> {
    doc: &'d Document,
    schema: &'d Schema,
    out: XmlWriter,
}

/// Records of an owning entity that are written inside a header element.
#[derive(Clone, Copy)]
struct Hosted<'d> {
    element: &'d str,
    records: &'d [Marking],
}

impl<'d> TreeWriter<'d> {
    fn write_document(&mut self) -> Result<()> {
        self.out.declaration()?;
        let declarations: Vec<(String, String)> = self
            .schema
            .namespaces
            .iter()
            .map(|(prefix, uri)| (format!("xmlns:{prefix}"), uri.clone()))
            .collect();
        let schema = self.schema;
        self.write_entity(self.doc.root(), &schema.root_element, declarations, None)
    }

    fn write_entity(
        &mut self,
        node: NodeId,
        qname: &str,
        mut attributes: Vec<(String, String)>,
        hosted: Option<Hosted<'d>>,
    ) -> Result<()> {
        let doc = self.doc;
        let entity_type = doc.entity_type(node).ok_or_else(|| {
            MarkingError::InvalidStructure(format!("{node} is not an entity"))
        })?;

        let mut text = None;
        let mut elements: Vec<&FieldDef> = Vec::new();
        for field in &entity_type.fields {
            match &field.selector {
                WireSelector::Attribute(name) => {
                    if let Some(value) = doc.get_scalar(node, &field.name) {
                        attributes.push((name.clone(), value.to_string()));
                    }
                }
                WireSelector::Text => {
                    text = doc.get_scalar(node, &field.name).map(|v| v.to_string());
                }
                WireSelector::Element(_) => elements.push(field),
            }
        }

        let own = doc.handling(node);
        let (direct, header) = match &entity_type.handling {
            Some(HandlingSlot::Direct { element }) => (Some(element.as_str()), None),
            Some(HandlingSlot::Header { field, element }) => (
                None,
                Some((field.as_str(), Hosted {
                    element: element.as_str(),
                    records: own,
                })),
            ),
            None => (None, None),
        };
        let has_children = elements.iter().any(|f| self.has_value(node, f))
            || !own.is_empty()
            || hosted.is_some_and(|h| !h.records.is_empty());

        let refs = attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()));
        if !has_children {
            return match &text {
                Some(text) => self.out.text_element(qname, refs, text),
                None => self.out.empty(qname, refs),
            };
        }

        self.out.start(qname, refs)?;
        if let Some(text) = &text {
            self.out.text(text)?;
        }
        for field in elements {
            let carried = header
                .filter(|(header_field, _)| *header_field == field.name)
                .map(|(_, hosted)| hosted);
            self.write_field(node, field, carried)?;
        }
        if let Some(element) = direct {
            self.write_handling(element, own)?;
        }
        if let Some(hosted) = hosted {
            self.write_handling(hosted.element, hosted.records)?;
        }
        self.out.end(qname)
    }

    fn write_field(
        &mut self,
        owner: NodeId,
        field: &FieldDef,
        carried: Option<Hosted<'d>>,
    ) -> Result<()> {
        let WireSelector::Element(qname) = &field.selector else {
            return Ok(());
        };
        let doc = self.doc;
        let values: Vec<NodeId> = if field.is_many() {
            doc.items(owner, &field.name).to_vec()
        } else {
            doc.get(owner, &field.name).into_iter().collect()
        };

        match &field.kind {
            FieldKind::Entity(_) => {
                if let Some(hosted) = carried.filter(|h| values.is_empty() && !h.records.is_empty()) {
                    // No header entity in the tree: emit a bare header to
                    // hold the records.
                    self.out.start(qname, [])?;
                    self.write_handling(hosted.element, hosted.records)?;
                    return self.out.end(qname);
                }
                for value in values {
                    self.write_entity(value, qname, Vec::new(), carried)?;
                }
            }
            FieldKind::Scalar(_) => {
                for value in values {
                    if let Some(scalar) = doc.scalar(value) {
                        self.out.text_element(qname, [], &scalar.to_string())?;
                    }
                }
            }
        }
        Ok(())
    }

    fn write_handling(&mut self, element: &str, records: &[Marking]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.out.start(element, [])?;
        for record in records {
            write_record(&mut self.out, &self.schema.records, record)?;
        }
        self.out.end(element)
    }

    fn has_value(&self, owner: NodeId, field: &FieldDef) -> bool {
        match self.doc.get(owner, &field.name) {
            Some(value) => !self.doc.is_list(value) || !self.doc.list_items(value).is_empty(),
            None => false,
        }
    }
}

/// Writes one marking record.
pub(crate) fn write_record(
    out: &mut XmlWriter,
    format: &RecordFormat,
    record: &Marking,
) -> Result<()> {
    if record.target().is_none() && record.structures.is_empty() {
        return out.empty(&format.record, []);
    }
    out.start(&format.record, [])?;
    if let Some(target) = record.target() {
        out.text_element(&format.target, [], target)?;
    }
    for structure in &record.structures {
        let mut attributes: Vec<(&str, &str)> = Vec::new();
        if let Some(kind) = &structure.kind {
            attributes.push((format.kind_attribute.as_str(), kind.as_str()));
        }
        attributes.extend(
            structure
                .attributes
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        );
        if structure.elements.is_empty() {
            out.empty(&format.structure, attributes)?;
            continue;
        }
        out.start(&format.structure, attributes)?;
        for (name, text) in &structure.elements {
            out.text_element(name, [], text)?;
        }
        out.end(&format.structure)?;
    }
    out.end(&format.record)
}
