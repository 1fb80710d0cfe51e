//! Depth-first traversal of the entity tree.
//!
//! Both walks are iterative: an explicit stack replaces recursion, so
//! arbitrarily deep documents cannot overflow the call stack. List nodes are
//! transparent: their items are visited, the list itself is never yielded.
//! Marking sets live outside the tree and are never visited.

use crate::model::{Document, NodeId, NodeKind};

/// Lazily yields every descendant of `node` (not `node` itself) in pre-order.
pub fn walk(doc: &Document, node: NodeId) -> Walk<'_> {
    let mut walk = Walk {
        doc,
        stack: Vec::new(),
    };
    walk.push_children(node);
    walk
}

pub struct Walk<'a> {
    doc: &'a Document,
    stack: Vec<NodeId>,
}

impl Walk<'_> {
    fn push_children(&mut self, node: NodeId) {
        let doc = self.doc;
        match doc.kind(node) {
            Some(NodeKind::Entity(entity)) => {
                self.stack
                    .extend(entity.field_slots().iter().rev().filter_map(|slot| *slot));
            }
            Some(NodeKind::List(items)) => self.stack.extend(items.iter().rev().copied()),
            _ => {}
        }
    }
}

impl Iterator for Walk<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        while let Some(node) = self.stack.pop() {
            self.push_children(node);
            if !self.doc.is_list(node) {
                return Some(node);
            }
        }
        None
    }
}

/// One value visited by [`walk_with_path`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry<'a> {
    /// Entities from the walk's start down to the value's owner.
    pub ancestors: Vec<NodeId>,
    pub field: &'a str,
    /// Position within a repeated field.
    pub index: Option<usize>,
    pub node: NodeId,
}

impl PathEntry<'_> {
    pub fn owner(&self) -> Option<NodeId> {
        self.ancestors.last().copied()
    }
}

/// Lazily yields `(ancestors, field, value)` for every descendant of `node`,
/// in the same order as [`walk`].
pub fn walk_with_path(doc: &Document, node: NodeId) -> PathWalk<'_> {
    let mut walk = PathWalk {
        doc,
        path: vec![node],
        stack: Vec::new(),
    };
    walk.push_fields(node, 1);
    walk
}

struct Frame<'a> {
    depth: usize,
    field: &'a str,
    index: Option<usize>,
    node: NodeId,
}

pub struct PathWalk<'a> {
    doc: &'a Document,
    path: Vec<NodeId>,
    stack: Vec<Frame<'a>>,
}

impl<'a> PathWalk<'a> {
    fn push_fields(&mut self, owner: NodeId, depth: usize) {
        let doc = self.doc;
        let Some(entity) = doc.entity(owner) else {
            return;
        };
        let defs = doc.typed_fields(owner);
        for (def, slot) in defs.iter().zip(entity.field_slots()).rev() {
            let Some(value) = *slot else {
                continue;
            };
            if doc.is_list(value) {
                for (index, item) in doc.list_items(value).iter().enumerate().rev() {
                    self.stack.push(Frame {
                        depth,
                        field: def.name.as_str(),
                        index: Some(index),
                        node: *item,
                    });
                }
            } else {
                self.stack.push(Frame {
                    depth,
                    field: def.name.as_str(),
                    index: None,
                    node: value,
                });
            }
        }
    }
}

impl<'a> Iterator for PathWalk<'a> {
    type Item = PathEntry<'a>;

    fn next(&mut self) -> Option<PathEntry<'a>> {
        let frame = self.stack.pop()?;
        self.path.truncate(frame.depth);
        let entry = PathEntry {
            ancestors: self.path.clone(),
            field: frame.field,
            index: frame.index,
            node: frame.node,
        };
        if self.doc.is_entity(frame.node) {
            self.path.push(frame.node);
            self.push_fields(frame.node, frame.depth + 1);
        }
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use std::sync::Arc;

    struct Fixture {
        doc: Document,
        indicators: NodeId,
        first: NodeId,
        title: NodeId,
        alt_a: NodeId,
        alt_b: NodeId,
        second: NodeId,
    }

    fn fixture() -> Fixture {
        let mut doc = Document::new(Arc::new(Schema::stix())).unwrap();
        let root = doc.root();
        let indicators = doc.create_entity("Indicators").unwrap();
        doc.set(root, "indicators", indicators).unwrap();

        let first = doc.create_entity("Indicator").unwrap();
        doc.push(indicators, "indicator", first).unwrap();
        let title = doc.set_scalar(first, "title", "Test").unwrap();
        let alt_a = doc.push_scalar(first, "alternative_id", "a").unwrap();
        let alt_b = doc.push_scalar(first, "alternative_id", "b").unwrap();

        let second = doc.create_entity("Indicator").unwrap();
        doc.push(indicators, "indicator", second).unwrap();

        Fixture {
            doc,
            indicators,
            first,
            title,
            alt_a,
            alt_b,
            second,
        }
    }

    #[test]
    fn test_walk_is_preorder_and_skips_lists() {
        let f = fixture();
        let visited: Vec<NodeId> = walk(&f.doc, f.doc.root()).collect();
        assert_eq!(
            visited,
            vec![f.indicators, f.first, f.title, f.alt_a, f.alt_b, f.second]
        );
        assert!(visited.iter().all(|n| !f.doc.is_list(*n)));
    }

    #[test]
    fn test_walk_excludes_start_and_restarts() {
        let f = fixture();
        let first: Vec<NodeId> = walk(&f.doc, f.first).collect();
        assert_eq!(first, vec![f.title, f.alt_a, f.alt_b]);

        let again: Vec<NodeId> = walk(&f.doc, f.first).collect();
        assert_eq!(first, again);
        assert_eq!(walk(&f.doc, f.title).count(), 0);
    }

    #[test]
    fn test_walk_with_path_reports_ancestors() {
        let f = fixture();
        let root = f.doc.root();
        let entries: Vec<PathEntry> = walk_with_path(&f.doc, root).collect();

        let nodes: Vec<NodeId> = entries.iter().map(|e| e.node).collect();
        let plain: Vec<NodeId> = walk(&f.doc, root).collect();
        assert_eq!(nodes, plain);

        let title = entries.iter().find(|e| e.node == f.title).unwrap();
        assert_eq!(title.ancestors, vec![root, f.indicators, f.first]);
        assert_eq!(title.field, "title");
        assert_eq!(title.index, None);
        assert_eq!(title.owner(), Some(f.first));

        let alt_b = entries.iter().find(|e| e.node == f.alt_b).unwrap();
        assert_eq!(alt_b.field, "alternative_id");
        assert_eq!(alt_b.index, Some(1));

        let second = entries.iter().find(|e| e.node == f.second).unwrap();
        assert_eq!(second.ancestors, vec![root, f.indicators]);
        assert_eq!(second.index, Some(1));
    }

    #[test]
    fn test_wide_tree_walk() {
        let mut doc = Document::new(Arc::new(Schema::stix())).unwrap();
        let root = doc.root();
        let indicators = doc.create_entity("Indicators").unwrap();
        doc.set(root, "indicators", indicators).unwrap();
        for _ in 0..10_000 {
            let indicator = doc.create_entity("Indicator").unwrap();
            doc.push(indicators, "indicator", indicator).unwrap();
            doc.set_scalar(indicator, "title", "t").unwrap();
        }
        assert_eq!(walk(&doc, root).count(), 20_001);
        assert_eq!(walk_with_path(&doc, root).count(), 20_001);
    }
}
