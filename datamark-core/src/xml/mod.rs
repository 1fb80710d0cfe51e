//! Minimal namespace-aware XML DOM.
//!
//! Elements live in an arena indexed by [`ElemId`]; ids are assigned in
//! document order, so comparing ids compares document positions. Comments,
//! processing instructions and the XML declaration are not kept.

mod reader;
mod writer;

pub use writer::XmlWriter;

use crate::error::Result;
use std::collections::BTreeMap;

pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElemId(u32);

impl ElemId {
    /// Position in document order.
    pub fn raw(self) -> u32 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    pub prefix: Option<String>,
    pub local: String,
    pub namespace: Option<String>,
    pub value: String,
}

impl XmlAttribute {
    pub fn qname(&self) -> String {
        qualified(self.prefix.as_deref(), &self.local)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlChild {
    Element(ElemId),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    pub prefix: Option<String>,
    pub local: String,
    pub namespace: Option<String>,
    /// `xmlns` declarations made on this element; `None` is the default
    /// namespace.
    pub declarations: Vec<(Option<String>, String)>,
    pub attributes: Vec<XmlAttribute>,
    pub children: Vec<XmlChild>,
    pub parent: Option<ElemId>,
}

impl XmlElement {
    pub fn qname(&self) -> String {
        qualified(self.prefix.as_deref(), &self.local)
    }

    /// Matches on expanded name.
    pub fn is(&self, namespace: Option<&str>, local: &str) -> bool {
        self.local == local && self.namespace.as_deref() == namespace
    }

    pub fn attribute(&self, namespace: Option<&str>, local: &str) -> Option<(usize, &XmlAttribute)> {
        self.attributes
            .iter()
            .enumerate()
            .find(|(_, a)| a.local == local && a.namespace.as_deref() == namespace)
    }

    /// Position in `children` of the first text child.
    pub fn first_text(&self) -> Option<(usize, &str)> {
        self.children.iter().enumerate().find_map(|(i, c)| match c {
            XmlChild::Text(text) => Some((i, text.as_str())),
            XmlChild::Element(_) => None,
        })
    }
}

fn qualified(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}:{local}"),
        None => local.to_string(),
    }
}

/// Identity of a node of an [`XmlDocument`] that a path query can select.
///
/// Attribute and text keys carry their parent element, so two attributes with
/// the same value on different elements are different nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WireNode {
    Element(ElemId),
    /// Element and index into its attribute list.
    Attribute(ElemId, usize),
    /// Element and index into its child list.
    Text(ElemId, usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    elements: Vec<XmlElement>,
    root: ElemId,
}

impl XmlDocument {
    pub fn parse(input: &str) -> Result<Self> {
        reader::parse(input)
    }

    pub fn root(&self) -> ElemId {
        self.root
    }

    pub fn element(&self, id: ElemId) -> &XmlElement {
        &self.elements[id.index()]
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// All element ids in document order.
    pub fn ids(&self) -> impl Iterator<Item = ElemId> {
        (0..self.elements.len() as u32).map(ElemId)
    }

    pub fn child_elements(&self, id: ElemId) -> impl Iterator<Item = ElemId> + '_ {
        self.element(id).children.iter().filter_map(|c| match c {
            XmlChild::Element(child) => Some(*child),
            XmlChild::Text(_) => None,
        })
    }

    /// Concatenated text children.
    pub fn text(&self, id: ElemId) -> String {
        self.element(id)
            .children
            .iter()
            .filter_map(|c| match c {
                XmlChild::Text(text) => Some(text.as_str()),
                XmlChild::Element(_) => None,
            })
            .collect()
    }

    /// Namespace URI bound to `prefix` at `id`, `None` prefix meaning the
    /// default namespace.
    pub fn lookup_namespace(&self, id: ElemId, prefix: Option<&str>) -> Option<&str> {
        if prefix == Some("xml") {
            return Some(XML_NS);
        }
        let mut current = Some(id);
        while let Some(elem) = current {
            let element = self.element(elem);
            if let Some((_, uri)) = element
                .declarations
                .iter()
                .find(|(p, _)| p.as_deref() == prefix)
            {
                return if uri.is_empty() { None } else { Some(uri) };
            }
            current = element.parent;
        }
        None
    }

    /// Prefixed namespace bindings in scope at `id`.
    pub fn in_scope_namespaces(&self, id: ElemId) -> BTreeMap<String, String> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(elem) = current {
            chain.push(elem);
            current = self.element(elem).parent;
        }
        let mut scope = BTreeMap::new();
        for elem in chain.into_iter().rev() {
            for (prefix, uri) in &self.element(elem).declarations {
                if let Some(prefix) = prefix {
                    scope.insert(prefix.clone(), uri.clone());
                }
            }
        }
        scope
    }

    /// Elements with the given expanded name, in document order.
    pub fn elements_named<'a>(
        &'a self,
        namespace: Option<&'a str>,
        local: &'a str,
    ) -> impl Iterator<Item = ElemId> + 'a {
        self.ids()
            .filter(move |id| self.element(*id).is(namespace, local))
    }
}
