use super::{ElemId, XmlAttribute, XmlChild, XmlDocument, XmlElement};
use crate::error::{MarkingError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

pub(super) fn parse(input: &str) -> Result<XmlDocument> {
    let mut reader = Reader::from_str(input);
    reader.config_mut().trim_text(true);

    let mut builder = Builder::default();
    loop {
        let event = reader.read_event().map_err(|err| {
            MarkingError::Xml(format!("{err} at byte {}", reader.buffer_position()))
        })?;
        match event {
            Event::Start(start) => {
                let id = builder.open(&start)?;
                builder.stack.push(id);
            }
            Event::Empty(start) => {
                builder.open(&start)?;
            }
            Event::End(_) => {
                builder.stack.pop();
            }
            Event::Text(text) => {
                let text = text.unescape()?;
                builder.text(&text)?;
            }
            Event::CData(data) => {
                let text = String::from_utf8(data.into_inner().into_owned())
                    .map_err(|err| MarkingError::Xml(err.to_string()))?;
                builder.text(&text)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = builder.stack.last() {
        return Err(MarkingError::Xml(format!(
            "unclosed element <{}>",
            builder.elements[open.index()].qname()
        )));
    }
    let root = builder
        .root
        .ok_or_else(|| MarkingError::Xml("document has no root element".to_string()))?;
    Ok(XmlDocument {
        elements: builder.elements,
        root,
    })
}

#[derive(Default)]
struct Builder {
    elements: Vec<XmlElement>,
    stack: Vec<ElemId>,
    root: Option<ElemId>,
}

impl Builder {
    fn open(&mut self, start: &BytesStart<'_>) -> Result<ElemId> {
        let parent = self.stack.last().copied();
        if parent.is_none() && self.root.is_some() {
            return Err(MarkingError::Xml("multiple root elements".to_string()));
        }

        let name = utf8(start.name().as_ref())?;
        let mut declarations = Vec::new();
        let mut raw_attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = utf8(attr.key.as_ref())?;
            let value = attr.unescape_value()?.into_owned();
            if key == "xmlns" {
                declarations.push((None, value));
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                declarations.push((Some(prefix.to_string()), value));
            } else {
                raw_attributes.push((key, value));
            }
        }

        let id = ElemId(self.elements.len() as u32);
        let (prefix, local) = split_qname(&name);
        self.elements.push(XmlElement {
            prefix: prefix.clone(),
            local,
            namespace: None,
            declarations,
            attributes: Vec::new(),
            children: Vec::new(),
            parent,
        });

        let namespace = self.resolve(id, prefix.as_deref(), &name, true)?;
        let mut attributes = Vec::with_capacity(raw_attributes.len());
        for (key, value) in raw_attributes {
            let (prefix, local) = split_qname(&key);
            let namespace = match prefix.as_deref() {
                Some(p) => self.resolve(id, Some(p), &key, false)?,
                None => None,
            };
            attributes.push(XmlAttribute {
                prefix,
                local,
                namespace,
                value,
            });
        }

        let element = &mut self.elements[id.index()];
        element.namespace = namespace;
        element.attributes = attributes;

        match parent {
            Some(parent) => self.elements[parent.index()]
                .children
                .push(XmlChild::Element(id)),
            None => self.root = Some(id),
        }
        Ok(id)
    }

    fn text(&mut self, text: &str) -> Result<()> {
        match self.stack.last() {
            Some(parent) => {
                self.elements[parent.index()]
                    .children
                    .push(XmlChild::Text(text.to_string()));
                Ok(())
            }
            None if text.trim().is_empty() => Ok(()),
            None => Err(MarkingError::Xml("text outside the root element".to_string())),
        }
    }

    /// Resolves a prefix against the declarations of `id` and its ancestors.
    /// An unprefixed element takes the default namespace, if any.
    fn resolve(
        &self,
        id: ElemId,
        prefix: Option<&str>,
        name: &str,
        element: bool,
    ) -> Result<Option<String>> {
        if prefix == Some("xml") {
            return Ok(Some(super::XML_NS.to_string()));
        }
        let mut current = Some(id);
        while let Some(elem) = current {
            let node = &self.elements[elem.index()];
            if let Some((_, uri)) = node.declarations.iter().find(|(p, _)| p.as_deref() == prefix) {
                return Ok(if uri.is_empty() { None } else { Some(uri.clone()) });
            }
            current = node.parent;
        }
        match prefix {
            Some(prefix) => Err(MarkingError::Xml(format!(
                "undeclared namespace prefix '{prefix}' in <{name}>{}",
                if element { "" } else { " attribute" }
            ))),
            None => Ok(None),
        }
    }
}

fn utf8(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|err| MarkingError::Xml(err.to_string()))
}

fn split_qname(name: &str) -> (Option<String>, String) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix.to_string()), local.to_string()),
        None => (None, name.to_string()),
    }
}
