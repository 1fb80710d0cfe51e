//! Markable value model.
//!
//! Entities and scalar values can carry a marking set; lists cannot. The set
//! of a node lives in the document's side table and only holds markings
//! attached directly to that node, inherited markings are not included.

use crate::error::{MarkingError, Result};
use crate::marking::Marking;
use crate::model::{Document, NodeId, NodeKind, Scalar};

/// Something that can be handed to a marking operation: a node already in
/// the arena, or a bare value that still needs a node of its own.
#[derive(Debug, Clone, PartialEq)]
pub enum Markable {
    Node(NodeId),
    Value(Scalar),
}

impl From<NodeId> for Markable {
    fn from(node: NodeId) -> Self {
        Markable::Node(node)
    }
}

impl From<Scalar> for Markable {
    fn from(value: Scalar) -> Self {
        Markable::Value(value)
    }
}

pub fn is_markable(doc: &Document, node: NodeId) -> bool {
    if doc.has_marking_set(node) {
        return true;
    }
    matches!(
        doc.kind(node),
        Some(NodeKind::Entity(_)) | Some(NodeKind::Scalar(_))
    )
}

/// Returns the node for `markable`, allocating a detached scalar node for a
/// bare value.
///
/// A freshly allocated node is not part of the tree: the caller must store
/// it in the field it belongs to (see [`Document::set`]). Markings attached
/// to a node that never gets stored are lost, and flushing a store that
/// tracks such a node fails with
/// [`MarkingError::SerializerFieldNotFound`].
pub fn coerce_if_needed(doc: &mut Document, markable: Markable) -> NodeId {
    match markable {
        Markable::Node(node) => node,
        Markable::Value(value) => doc.create_scalar(value),
    }
}

/// Adds `marking` to the node's own set. Adding an equivalent marking twice
/// is a no-op.
pub fn attach(doc: &mut Document, node: NodeId, marking: Marking) -> Result<()> {
    if !is_markable(doc, node) {
        return Err(MarkingError::unmarkable(node, "lists cannot carry markings"));
    }
    let set = doc.attached_mut(node);
    if !set.contains(&marking) {
        set.push(marking);
    }
    Ok(())
}

pub fn attach_all<I>(doc: &mut Document, node: NodeId, markings: I) -> Result<()>
where
    I: IntoIterator<Item = Marking>,
{
    for marking in markings {
        attach(doc, node, marking)?;
    }
    Ok(())
}

pub fn markings(doc: &Document, node: NodeId) -> &[Marking] {
    doc.attached(node)
}

pub fn contains(doc: &Document, node: NodeId, marking: &Marking) -> bool {
    doc.attached(node).contains(marking)
}

/// The attached copy of `marking`, which may carry a resolved target.
pub fn find<'d>(doc: &'d Document, node: NodeId, marking: &Marking) -> Option<&'d Marking> {
    doc.attached(node).iter().find(|m| *m == marking)
}

/// Removes `marking` from the node's own set, returning the removed copy.
pub fn detach(doc: &mut Document, node: NodeId, marking: &Marking) -> Option<Marking> {
    if !doc.has_marking_set(node) {
        return None;
    }
    let set = doc.attached_mut(node);
    let position = set.iter().position(|m| m == marking)?;
    Some(set.remove(position))
}

pub fn detach_all<'m, I>(doc: &mut Document, node: NodeId, markings: I) -> usize
where
    I: IntoIterator<Item = &'m Marking>,
{
    markings
        .into_iter()
        .filter(|marking| detach(doc, node, marking).is_some())
        .count()
}

/// Gives the node's unresolved copy of `record` the record's target.
pub(crate) fn resolve_attached(doc: &mut Document, node: NodeId, record: &Marking) -> bool {
    if !doc.has_marking_set(node) {
        return false;
    }
    match doc
        .attached_mut(node)
        .iter_mut()
        .find(|m| *m == record && !m.is_resolved())
    {
        Some(copy) => {
            copy.controlled_structure = record.controlled_structure.clone();
            true
        }
        None => false,
    }
}

pub fn clear(doc: &mut Document, node: NodeId) {
    if doc.has_marking_set(node) {
        doc.attached_mut(node).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marking::MarkingStructure;
    use crate::schema::Schema;
    use std::sync::Arc;

    fn tlp(color: &str) -> Marking {
        Marking::new().with_structure(MarkingStructure::tlp(color))
    }

    fn doc_with_list() -> (Document, NodeId, NodeId) {
        let mut doc = Document::new(Arc::new(Schema::stix())).unwrap();
        let root = doc.root();
        let indicators = doc.create_entity("Indicators").unwrap();
        doc.set(root, "indicators", indicators).unwrap();
        let indicator = doc.create_entity("Indicator").unwrap();
        doc.push(indicators, "indicator", indicator).unwrap();
        let list = doc.get(indicators, "indicator").unwrap();
        (doc, indicator, list)
    }

    #[test]
    fn test_markability() {
        let (mut doc, indicator, list) = doc_with_list();
        let scalar = doc.create_scalar(1.5);
        assert!(is_markable(&doc, indicator));
        assert!(is_markable(&doc, scalar));
        assert!(!is_markable(&doc, list));
        assert!(!is_markable(&doc, NodeId::from_raw(9_999)));
    }

    #[test]
    fn test_attach_is_idempotent() {
        let (mut doc, indicator, _) = doc_with_list();
        attach(&mut doc, indicator, tlp("RED")).unwrap();
        attach(&mut doc, indicator, tlp("RED")).unwrap();
        attach(&mut doc, indicator, tlp("AMBER")).unwrap();

        assert_eq!(markings(&doc, indicator).len(), 2);
        assert!(contains(&doc, indicator, &tlp("RED")));
    }

    #[test]
    fn test_attach_to_list_fails() {
        let (mut doc, _, list) = doc_with_list();
        assert!(matches!(
            attach(&mut doc, list, tlp("RED")),
            Err(MarkingError::Unmarkable { .. })
        ));
    }

    #[test]
    fn test_coerce_value_creates_detached_node() {
        let (mut doc, indicator, _) = doc_with_list();
        assert_eq!(coerce_if_needed(&mut doc, Markable::Node(indicator)), indicator);

        let node = coerce_if_needed(&mut doc, Scalar::from("Test").into());
        assert_eq!(doc.scalar(node), Some(&Scalar::from("Test")));
        assert!(!doc.is_attached(node));
        assert!(markings(&doc, node).is_empty());
    }

    #[test]
    fn test_detach_and_clear() {
        let (mut doc, indicator, _) = doc_with_list();
        attach_all(&mut doc, indicator, [tlp("RED"), tlp("GREEN")]).unwrap();

        let removed = detach(&mut doc, indicator, &tlp("RED")).unwrap();
        assert_eq!(removed, tlp("RED"));
        assert!(detach(&mut doc, indicator, &tlp("RED")).is_none());

        assert_eq!(detach_all(&mut doc, indicator, [&tlp("GREEN"), &tlp("RED")]), 1);
        assert!(markings(&doc, indicator).is_empty());

        attach(&mut doc, indicator, tlp("WHITE")).unwrap();
        clear(&mut doc, indicator);
        assert!(markings(&doc, indicator).is_empty());
    }

    #[test]
    fn test_resolve_attached_sets_target_once() {
        let (mut doc, indicator, _) = doc_with_list();
        attach(&mut doc, indicator, tlp("RED")).unwrap();

        let record = tlp("RED").with_target("../../../self::node()");
        assert!(resolve_attached(&mut doc, indicator, &record));
        assert_eq!(markings(&doc, indicator)[0].target(), Some("../../../self::node()"));
        assert!(!resolve_attached(&mut doc, indicator, &record));
    }

    #[test]
    fn test_find_returns_attached_copy() {
        let (mut doc, indicator, _) = doc_with_list();
        let resolved = tlp("RED").with_target("../../../self::node()");
        attach(&mut doc, indicator, resolved).unwrap();

        let found = find(&doc, indicator, &tlp("RED")).unwrap();
        assert_eq!(found.target(), Some("../../../self::node()"));
    }
}
