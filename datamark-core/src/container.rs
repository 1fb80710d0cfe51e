//! The marking store.
//!
//! A [`MarkingContainer`] wraps one document and buffers markings added
//! through it in three scopes: global markings that cover the whole
//! document, field markings on individual nodes, and null markings that
//! cover nothing. [`MarkingContainer::flush`] embeds the buffered markings
//! into the document as path-addressed records and empties the buffers.
//!
//! Markings that were already embedded when the document was parsed are
//! attached to the nodes they cover and are not part of any buffer.

use crate::binding;
use crate::context::MarkingContext;
use crate::error::{MarkingError, Result};
use crate::markable::{self, Markable};
use crate::marking::Marking;
use crate::model::{Document, NodeId};
use crate::navigator;
use crate::serializer;
use std::collections::BTreeMap;
use tracing::debug;

/// A field marking and whether it also covers the node's descendants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMarking {
    pub marking: Marking,
    pub descendants: bool,
}

#[derive(Debug, Clone)]
pub struct MarkingContainer {
    context: MarkingContext,
    document: Document,
    global: Vec<Marking>,
    field: BTreeMap<NodeId, Vec<FieldMarking>>,
    null: Vec<Marking>,
}

impl MarkingContainer {
    /// Wraps `document` with empty buffers.
    pub fn new(document: Document, context: MarkingContext) -> Self {
        Self {
            context,
            document,
            global: Vec::new(),
            field: BTreeMap::new(),
            null: Vec::new(),
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Mutable access to the tree, e.g. to store a node returned by
    /// [`add_marking`](Self::add_marking) for a bare value.
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    pub fn context(&self) -> &MarkingContext {
        &self.context
    }

    pub fn global_markings(&self) -> &[Marking] {
        &self.global
    }

    pub fn field_markings(&self) -> &BTreeMap<NodeId, Vec<FieldMarking>> {
        &self.field
    }

    pub fn null_markings(&self) -> &[Marking] {
        &self.null
    }

    /// Marks `target`, or records a null marking when `target` is `None`.
    ///
    /// A bare value is given a node of its own, which is returned and must be
    /// stored in the tree by the caller. With `descendants`, the marking is
    /// attached to every descendant right away.
    ///
    /// # Errors
    ///
    /// - `MarkingPathNotEmpty` if `marking` already has a target.
    /// - `Unmarkable` for the document root (use [`add_global`](Self::add_global))
    ///   and for lists.
    /// - `DuplicateMarking` if the node already carries `marking`, directly,
    ///   through an ancestor, or globally.
    pub fn add_marking(
        &mut self,
        target: Option<Markable>,
        marking: Marking,
        descendants: bool,
    ) -> Result<Option<NodeId>> {
        marking.validate_unresolved()?;

        let Some(target) = target else {
            if self.null.contains(&marking) {
                return Err(MarkingError::duplicate("null markings", &marking));
            }
            debug!("null marking {marking}");
            self.null.push(marking);
            return Ok(None);
        };

        if let Markable::Node(node) = target {
            if node == self.document.root() {
                return Err(MarkingError::unmarkable(
                    node,
                    "the document root only takes global markings, use add_global",
                ));
            }
            if !markable::is_markable(&self.document, node) {
                return Err(MarkingError::unmarkable(node, "not an entity or scalar value"));
            }
        }

        let node = markable::coerce_if_needed(&mut self.document, target);
        if self.is_marked(node, Some(&marking), false)? {
            return Err(MarkingError::duplicate(format!("node {node}"), &marking));
        }

        markable::attach(&mut self.document, node, marking.clone())?;
        if descendants {
            for descendant in self.descendants(node) {
                markable::attach(&mut self.document, descendant, marking.clone())?;
            }
        }
        debug!("field marking {marking} on {node} (descendants: {descendants})");
        self.field
            .entry(node)
            .or_default()
            .push(FieldMarking {
                marking,
                descendants,
            });
        Ok(Some(node))
    }

    /// Adds a marking that covers the whole document.
    pub fn add_global(&mut self, marking: Marking) -> Result<()> {
        marking.validate_unresolved()?;
        if self.global.contains(&marking) {
            return Err(MarkingError::duplicate("global markings", &marking));
        }
        debug!("global marking {marking}");
        self.global.push(marking);
        Ok(())
    }

    /// Every marking that applies to `node`, without duplicates.
    ///
    /// Always includes buffered global markings and the node's own attached
    /// markings. With `descendants`, adds the attached markings of every
    /// descendant; with `include_null`, adds buffered null markings and
    /// embedded records without a target.
    pub fn get_markings(&self, node: NodeId, descendants: bool, include_null: bool) -> Vec<Marking> {
        let doc = &self.document;
        let mut result: Vec<Marking> = Vec::new();
        let mut add = |marking: &Marking| {
            if !result.contains(marking) {
                result.push(marking.clone());
            }
        };

        self.global.iter().for_each(&mut add);
        markable::markings(doc, node).iter().for_each(&mut add);
        if descendants {
            for descendant in navigator::walk(doc, node) {
                markable::markings(doc, descendant).iter().for_each(&mut add);
            }
        }
        if include_null {
            self.null.iter().for_each(&mut add);
            doc.embedded_null_markings().into_iter().for_each(&mut add);
        }
        result
    }

    /// Whether `node` carries any marking, or `marking` specifically.
    pub fn is_marked(
        &self,
        node: NodeId,
        marking: Option<&Marking>,
        descendants: bool,
    ) -> Result<bool> {
        if !markable::is_markable(&self.document, node) {
            return Err(MarkingError::unmarkable(node, "not an entity or scalar value"));
        }
        if let Some(marking) = marking {
            marking.validate()?;
        }
        let markings = self.get_markings(node, descendants, false);
        Ok(match marking {
            Some(marking) => markings.contains(marking),
            None => !markings.is_empty(),
        })
    }

    /// Removes `marking` from `target`, or a null marking when `target` is
    /// `None`.
    ///
    /// Buffered field markings need the exact `(marking, descendants)` pair
    /// they were added with. A marking a node inherits, buffered or parsed
    /// from the document, can only be removed from the node that owns it.
    pub fn remove_marking(
        &mut self,
        target: Option<NodeId>,
        marking: &Marking,
        descendants: bool,
    ) -> Result<()> {
        marking.validate()?;

        let Some(node) = target else {
            return self.remove_null(marking);
        };
        if !markable::is_markable(&self.document, node) {
            return Err(MarkingError::unmarkable(node, "not an entity or scalar value"));
        }

        let tracked = self
            .field
            .get(&node)
            .is_some_and(|entries| entries.iter().any(|e| e.marking == *marking));
        if !tracked {
            self.check_buffered_owner(node, marking)?;
        }

        if let Some(entries) = self.field.get_mut(&node) {
            let position = entries
                .iter()
                .position(|e| e.marking == *marking && e.descendants == descendants)
                .ok_or_else(|| MarkingError::not_found(format!("field markings of {node}"), marking))?;
            entries.remove(position);
            if entries.is_empty() {
                self.field.remove(&node);
            }
            markable::detach(&mut self.document, node, marking);
            if descendants {
                for descendant in self.descendants(node) {
                    markable::detach(&mut self.document, descendant, marking);
                }
            }
            debug!("removed field marking {marking} from {node}");
            return Ok(());
        }

        self.remove_embedded(node, marking, descendants)
    }

    /// Removes a global marking from the buffer, or a parsed global record
    /// from the document.
    pub fn remove_global(&mut self, marking: &Marking) -> Result<()> {
        marking.validate()?;
        if let Some(position) = self.global.iter().position(|m| m == marking) {
            self.global.remove(position);
            return Ok(());
        }

        let root = self.document.root();
        let Some(copy) = markable::find(&self.document, root, marking).cloned() else {
            return Err(MarkingError::not_found("global markings", marking));
        };
        self.detach_record(root, &copy, true);
        self.remove_record(&copy);
        debug!("removed embedded global marking {marking}");
        Ok(())
    }

    /// Clears the node's own markings, and its descendants' with
    /// `descendants`. Buffered field markings of cleared nodes are dropped.
    pub fn clear_markings(&mut self, node: NodeId, descendants: bool) -> Result<()> {
        if !markable::is_markable(&self.document, node) {
            return Err(MarkingError::unmarkable(node, "not an entity or scalar value"));
        }
        let mut nodes = vec![node];
        if descendants {
            nodes.extend(self.descendants(node));
        }
        for node in nodes {
            markable::clear(&mut self.document, node);
            self.field.remove(&node);
        }
        Ok(())
    }

    /// Embeds every buffered marking into the document and empties the
    /// buffers.
    ///
    /// Every record is resolved before the document changes: on error the
    /// document and the buffers are left untouched.
    pub fn flush(&mut self) -> Result<&Document> {
        let placements = serializer::plan(
            &self.document,
            self.context.fields(),
            &self.global,
            &self.field,
            &self.null,
        )?;
        debug!("flushing {} records", placements.len());
        serializer::apply(&mut self.document, placements)?;

        self.global.clear();
        self.field.clear();
        self.null.clear();
        Ok(&self.document)
    }

    /// Flushes and serializes the document.
    pub fn to_xml(&mut self) -> Result<String> {
        self.flush()?;
        binding::write(&self.document)
    }

    fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        navigator::walk(&self.document, node).collect()
    }

    fn remove_null(&mut self, marking: &Marking) -> Result<()> {
        if let Some(position) = self.null.iter().position(|m| m == marking) {
            self.null.remove(position);
            return Ok(());
        }
        let embedded = self
            .document
            .embedded_markings()
            .into_iter()
            .find(|(_, m)| !m.is_resolved() && *m == marking)
            .map(|(host, m)| (host, m.clone()));
        match embedded {
            Some((host, record)) => {
                self.remove_from_host(host, &record);
                Ok(())
            }
            None => Err(MarkingError::not_found("null markings", marking)),
        }
    }

    /// Fails when `marking` reaches `node` through a buffered global or a
    /// buffered descendants marking on one of its ancestors.
    fn check_buffered_owner(&self, node: NodeId, marking: &Marking) -> Result<()> {
        if self.global.contains(marking) {
            return Err(MarkingError::removal(
                node,
                marking,
                "the marking is global, use remove_global",
            ));
        }
        let mut ancestor = self.document.parent(node);
        while let Some(current) = ancestor {
            let owns = self.field.get(&current).is_some_and(|entries| {
                entries.iter().any(|e| e.descendants && e.marking == *marking)
            });
            if owns {
                return Err(MarkingError::removal(
                    node,
                    marking,
                    format!("inherited from {current}, cannot remove it from a descendant"),
                ));
            }
            ancestor = self.document.parent(current);
        }
        Ok(())
    }

    /// Removes a marking that was attached from an embedded record.
    fn remove_embedded(&mut self, node: NodeId, marking: &Marking, descendants: bool) -> Result<()> {
        let doc = &self.document;
        let root = doc.root();
        if node == root {
            return Err(MarkingError::removal(
                node,
                marking,
                "the document root only carries global markings, use remove_global",
            ));
        }
        let Some(copy) = markable::find(doc, node, marking).cloned() else {
            return Err(MarkingError::not_found(format!("markings of {node}"), marking));
        };

        if copy.is_resolved() {
            let carries = |n: NodeId| {
                markable::find(doc, n, marking).is_some_and(|m| m.same_record(&copy))
            };
            if carries(root) {
                return Err(MarkingError::removal(
                    node,
                    marking,
                    "the marking is global, use remove_global",
                ));
            }
            let mut ancestor = doc.parent(node);
            while let Some(current) = ancestor {
                if carries(current) {
                    return Err(MarkingError::removal(
                        node,
                        marking,
                        format!("inherited from {current}, cannot remove it from a descendant"),
                    ));
                }
                ancestor = doc.parent(current);
            }
            if !doc.embedded_markings().iter().any(|(_, m)| m.same_record(&copy)) {
                return Err(MarkingError::not_found("embedded records", marking));
            }
        }

        self.detach_record(node, &copy, descendants);
        self.remove_record(&copy);
        debug!("removed embedded marking {marking} from {node}");
        Ok(())
    }

    /// Detaches `record` from `node` and from descendants holding the same
    /// record, or any copy of it with `all_descendants`.
    fn detach_record(&mut self, node: NodeId, record: &Marking, all_descendants: bool) {
        markable::detach(&mut self.document, node, record);
        for descendant in self.descendants(node) {
            let covered = markable::find(&self.document, descendant, record)
                .is_some_and(|m| all_descendants || m.same_record(record));
            if covered {
                markable::detach(&mut self.document, descendant, record);
            }
        }
    }

    /// Drops the embedded record equal to `record`, target included.
    fn remove_record(&mut self, record: &Marking) {
        let host = self
            .document
            .embedded_markings()
            .into_iter()
            .find(|(_, m)| m.same_record(record))
            .map(|(host, _)| host);
        if let Some(host) = host {
            self.remove_from_host(host, record);
        }
    }

    fn remove_from_host(&mut self, host: NodeId, record: &Marking) {
        if let Some(records) = self.document.handling_mut(host) {
            if let Some(position) = records.iter().position(|m| m.same_record(record)) {
                records.remove(position);
            }
        }
    }
}

#[cfg(test)]
#[path = "container_tests.rs"]
mod container_tests;
