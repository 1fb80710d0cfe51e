use super::{Axis, Expr, NodeTest, Predicate, QueryError, QueryOptions, QueryResult, Step};
use crate::xml::{ElemId, WireNode, XmlChild, XmlDocument};
use std::collections::BTreeMap;

/// A node selected by a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XNode {
    /// The document node above the root element.
    Document,
    Element(ElemId),
    /// Element and index into its attribute list.
    Attribute(ElemId, usize),
    /// Element and index into its child list.
    Text(ElemId, usize),
}

impl XNode {
    pub fn wire(self) -> Option<WireNode> {
        match self {
            XNode::Document => None,
            XNode::Element(id) => Some(WireNode::Element(id)),
            XNode::Attribute(id, index) => Some(WireNode::Attribute(id, index)),
            XNode::Text(id, index) => Some(WireNode::Text(id, index)),
        }
    }
}

/// Evaluates `expr` with `context` as the context node.
///
/// `namespaces` binds the prefixes used in name tests. Unprefixed names match
/// only nodes in no namespace. The result is in document order without
/// duplicates.
pub fn evaluate(
    expr: &Expr,
    doc: &XmlDocument,
    context: XNode,
    namespaces: &BTreeMap<String, String>,
    options: &QueryOptions,
) -> QueryResult<Vec<XNode>> {
    let evaluator = Evaluator {
        doc,
        namespaces,
        options,
    };

    let mut result = Vec::new();
    for path in &expr.paths {
        let mut current = vec![if path.absolute {
            XNode::Document
        } else {
            context
        }];
        for step in &path.steps {
            let mut next = Vec::new();
            for node in &current {
                next.extend(evaluator.step(*node, step)?);
            }
            current = evaluator.normalize(next);
        }
        result.extend(current);
    }
    Ok(evaluator.normalize(result))
}

struct Evaluator<'a> {
    doc: &'a XmlDocument,
    namespaces: &'a BTreeMap<String, String>,
    options: &'a QueryOptions,
}

/// (element, tier, owner, index); sorts nodes into document order.
type OrderKey = (u32, u8, u32, usize);

impl<'a> Evaluator<'a> {
    fn step(&self, node: XNode, step: &Step) -> QueryResult<Vec<XNode>> {
        let mut selected = Vec::new();
        for candidate in self.axis(node, step.axis) {
            if self.test(candidate, &step.test, step.axis)? {
                selected.push(candidate);
            }
        }
        for predicate in &step.predicates {
            selected = self.filter(selected, predicate)?;
        }
        Ok(selected)
    }

    /// Nodes along `axis`, nearest first for reverse axes.
    fn axis(&self, node: XNode, axis: Axis) -> Vec<XNode> {
        match axis {
            Axis::Child => self.children(node),
            Axis::Attribute => match node {
                XNode::Element(id) => (0..self.doc.element(id).attributes.len())
                    .map(|index| XNode::Attribute(id, index))
                    .collect(),
                _ => Vec::new(),
            },
            Axis::SelfAxis => vec![node],
            Axis::Parent => self.parent(node).into_iter().collect(),
            Axis::Descendant => self.descendants(node),
            Axis::DescendantOrSelf => {
                let mut nodes = vec![node];
                nodes.extend(self.descendants(node));
                nodes
            }
            Axis::Ancestor => self.ancestors(node),
            Axis::AncestorOrSelf => {
                let mut nodes = vec![node];
                nodes.extend(self.ancestors(node));
                nodes
            }
        }
    }

    fn children(&self, node: XNode) -> Vec<XNode> {
        match node {
            XNode::Document => vec![XNode::Element(self.doc.root())],
            XNode::Element(id) => self
                .doc
                .element(id)
                .children
                .iter()
                .enumerate()
                .map(|(index, child)| match child {
                    XmlChild::Element(child) => XNode::Element(*child),
                    XmlChild::Text(_) => XNode::Text(id, index),
                })
                .collect(),
            XNode::Attribute(..) | XNode::Text(..) => Vec::new(),
        }
    }

    fn parent(&self, node: XNode) -> Option<XNode> {
        match node {
            XNode::Document => None,
            XNode::Element(id) => Some(
                self.doc
                    .element(id)
                    .parent
                    .map_or(XNode::Document, XNode::Element),
            ),
            XNode::Attribute(id, _) | XNode::Text(id, _) => Some(XNode::Element(id)),
        }
    }

    fn descendants(&self, node: XNode) -> Vec<XNode> {
        let mut nodes = Vec::new();
        let mut stack: Vec<XNode> = self.children(node).into_iter().rev().collect();
        while let Some(next) = stack.pop() {
            nodes.push(next);
            stack.extend(self.children(next).into_iter().rev());
        }
        nodes
    }

    fn ancestors(&self, node: XNode) -> Vec<XNode> {
        let mut nodes = Vec::new();
        let mut current = self.parent(node);
        while let Some(next) = current {
            nodes.push(next);
            current = self.parent(next);
        }
        nodes
    }

    fn test(&self, node: XNode, test: &NodeTest, axis: Axis) -> QueryResult<bool> {
        // The principal node type is attribute on the attribute axis and
        // element everywhere else.
        let principal = match (node, axis) {
            (XNode::Attribute(id, index), Axis::Attribute) => {
                let attribute = &self.doc.element(id).attributes[index];
                Some((attribute.namespace.as_deref(), attribute.local.as_str()))
            }
            (XNode::Element(id), axis) if axis != Axis::Attribute => {
                let element = self.doc.element(id);
                Some((element.namespace.as_deref(), element.local.as_str()))
            }
            _ => None,
        };

        match test {
            NodeTest::Node => Ok(true),
            NodeTest::Text => Ok(matches!(node, XNode::Text(..))),
            NodeTest::Wildcard { prefix } => {
                let Some((namespace, _)) = principal else {
                    return Ok(false);
                };
                match prefix {
                    None => Ok(true),
                    Some(prefix) => Ok(self.resolve(prefix)?.is_some_and(|uri| namespace == Some(uri))),
                }
            }
            NodeTest::Name { prefix, local } => {
                let Some((namespace, name)) = principal else {
                    return Ok(false);
                };
                if name != local {
                    return Ok(false);
                }
                match prefix {
                    None => Ok(namespace.is_none()),
                    Some(prefix) => Ok(self.resolve(prefix)?.is_some_and(|uri| namespace == Some(uri))),
                }
            }
        }
    }

    fn filter(&self, nodes: Vec<XNode>, predicate: &Predicate) -> QueryResult<Vec<XNode>> {
        match predicate {
            Predicate::Position(position) => Ok(position
                .checked_sub(1)
                .and_then(|index| nodes.get(index).copied())
                .into_iter()
                .collect()),
            Predicate::HasAttribute { prefix, local } => {
                let mut kept = Vec::new();
                for node in nodes {
                    if self.attribute_value(node, prefix.as_deref(), local)?.is_some() {
                        kept.push(node);
                    }
                }
                Ok(kept)
            }
            Predicate::AttributeEquals {
                prefix,
                local,
                value,
            } => {
                let mut kept = Vec::new();
                for node in nodes {
                    if self.attribute_value(node, prefix.as_deref(), local)? == Some(value.as_str()) {
                        kept.push(node);
                    }
                }
                Ok(kept)
            }
        }
    }

    fn attribute_value(
        &self,
        node: XNode,
        prefix: Option<&str>,
        local: &str,
    ) -> QueryResult<Option<&'a str>> {
        let XNode::Element(id) = node else {
            return Ok(None);
        };
        let namespace = match prefix {
            Some(prefix) => match self.resolve(prefix)? {
                Some(uri) => Some(uri),
                None => return Ok(None),
            },
            None => None,
        };
        Ok(self
            .doc
            .element(id)
            .attribute(namespace, local)
            .map(|(_, attribute)| attribute.value.as_str()))
    }

    /// `Ok(None)` for an unbound prefix when prefixes are not strict.
    fn resolve(&self, prefix: &str) -> QueryResult<Option<&'a str>> {
        if prefix == "xml" {
            return Ok(Some(crate::xml::XML_NS));
        }
        match self.namespaces.get(prefix) {
            Some(uri) => Ok(Some(uri.as_str())),
            None if self.options.strict_prefixes => {
                Err(QueryError::UnknownPrefix(prefix.to_string()))
            }
            None => Ok(None),
        }
    }

    fn normalize(&self, mut nodes: Vec<XNode>) -> Vec<XNode> {
        nodes.sort_by_key(|node| self.order_key(*node));
        nodes.dedup();
        nodes
    }

    fn order_key(&self, node: XNode) -> OrderKey {
        match node {
            XNode::Document => (0, 0, 0, 0),
            XNode::Element(id) => (rank(id), 0, 0, 0),
            XNode::Attribute(id, index) => (rank(id), 1, 0, index),
            XNode::Text(id, index) => {
                // A text node sits after the whole subtree of the element
                // child preceding it; deeper owners come first.
                let children = &self.doc.element(id).children;
                let previous = children[..index].iter().rev().find_map(|child| match child {
                    XmlChild::Element(child) => Some(*child),
                    XmlChild::Text(_) => None,
                });
                match previous {
                    Some(sibling) => (
                        rank(self.last_descendant(sibling)),
                        3,
                        u32::MAX - rank(id),
                        index,
                    ),
                    None => (rank(id), 2, 0, index),
                }
            }
        }
    }

    fn last_descendant(&self, id: ElemId) -> ElemId {
        let mut current = id;
        while let Some(last) = self.doc.child_elements(current).last() {
            current = last;
        }
        current
    }
}

fn rank(id: ElemId) -> u32 {
    id.raw() + 1
}
