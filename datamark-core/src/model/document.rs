//! Arena-backed entity tree.
//!
//! Every entity, scalar value and list is a node addressed by a [`NodeId`]
//! handle assigned at construction. Nodes keep a link to the entity field
//! that holds them, so a node's location can always be recomputed, and a
//! node taken out of the tree is recognizably detached.

use super::scalar::{NodeId, Scalar};
use crate::error::{MarkingError, Result};
use crate::marking::Marking;
use crate::navigator;
use crate::schema::{EntityType, FieldDef, FieldKind, Schema};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Entity {
    type_index: usize,
    /// One slot per schema field, in schema order.
    fields: Vec<Option<NodeId>>,
    /// Embedded marking records hosted by this entity.
    handling: Vec<Marking>,
}

impl Entity {
    fn new(type_index: usize, field_count: usize) -> Self {
        Self {
            type_index,
            fields: vec![None; field_count],
            handling: Vec::new(),
        }
    }

    pub(crate) fn field_slots(&self) -> &[Option<NodeId>] {
        &self.fields
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Entity(Entity),
    Scalar(Scalar),
    /// Items of a repeated field. Lists never carry markings themselves.
    List(Vec<NodeId>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    Field { owner: NodeId, field: usize },
    Item { list: NodeId },
}

#[derive(Debug, Clone)]
struct Slot {
    kind: NodeKind,
    parent: Option<Link>,
}

/// Position of a node inside its owning entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location<'a> {
    pub owner: NodeId,
    pub field: &'a str,
    /// Zero-based position when the field is repeated.
    pub index: Option<usize>,
    /// Number of values currently held by the field.
    pub count: usize,
}

#[derive(Debug, Clone)]
pub struct Document {
    schema: Arc<Schema>,
    nodes: Vec<Slot>,
    root: NodeId,
    /// Per-node marking sets, kept beside the tree rather than in it.
    markings: HashMap<NodeId, Vec<Marking>>,
}

impl Document {
    /// Creates a document holding an empty root entity.
    pub fn new(schema: Arc<Schema>) -> Result<Self> {
        let type_index = schema.type_index(&schema.root_type).ok_or_else(|| {
            MarkingError::Schema(format!("root type '{}' is not declared", schema.root_type))
        })?;
        let field_count = schema.type_at(type_index).fields.len();

        Ok(Self {
            nodes: vec![Slot {
                kind: NodeKind::Entity(Entity::new(type_index, field_count)),
                parent: None,
            }],
            root: NodeId::from_raw(0),
            markings: HashMap::new(),
            schema,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn schema_arc(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes ever allocated, attached or not.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Allocates a detached entity of the given type.
    pub fn create_entity(&mut self, type_name: &str) -> Result<NodeId> {
        let type_index = self.schema.type_index(type_name).ok_or_else(|| {
            MarkingError::InvalidStructure(format!("unknown entity type '{type_name}'"))
        })?;
        let field_count = self.schema.type_at(type_index).fields.len();
        Ok(self.alloc(NodeKind::Entity(Entity::new(type_index, field_count))))
    }

    /// Allocates a detached scalar node.
    pub fn create_scalar(&mut self, value: impl Into<Scalar>) -> NodeId {
        self.alloc(NodeKind::Scalar(value.into()))
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId::from_raw(self.nodes.len() as u32);
        self.nodes.push(Slot { kind, parent: None });
        id
    }

    pub fn kind(&self, node: NodeId) -> Option<&NodeKind> {
        self.nodes.get(node.index()).map(|slot| &slot.kind)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        node.index() < self.nodes.len()
    }

    pub fn entity(&self, node: NodeId) -> Option<&Entity> {
        match self.kind(node)? {
            NodeKind::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    fn entity_mut(&mut self, node: NodeId) -> Option<&mut Entity> {
        match self.nodes.get_mut(node.index()).map(|slot| &mut slot.kind) {
            Some(NodeKind::Entity(entity)) => Some(entity),
            _ => None,
        }
    }

    pub fn is_entity(&self, node: NodeId) -> bool {
        self.entity(node).is_some()
    }

    pub fn is_list(&self, node: NodeId) -> bool {
        matches!(self.kind(node), Some(NodeKind::List(_)))
    }

    pub fn entity_type(&self, node: NodeId) -> Option<&EntityType> {
        self.entity(node)
            .map(|entity| self.schema.type_at(entity.type_index))
    }

    pub fn type_name(&self, node: NodeId) -> Option<&str> {
        self.entity_type(node).map(|t| t.name.as_str())
    }

    pub fn scalar(&self, node: NodeId) -> Option<&Scalar> {
        match self.kind(node)? {
            NodeKind::Scalar(value) => Some(value),
            _ => None,
        }
    }

    /// Replaces a scalar value in place, keeping the node's identity.
    pub fn replace_value(&mut self, node: NodeId, value: impl Into<Scalar>) -> Result<Scalar> {
        let value = value.into();
        match self.nodes.get_mut(node.index()).map(|slot| &mut slot.kind) {
            Some(NodeKind::Scalar(current)) if current.kind() == value.kind() => {
                Ok(std::mem::replace(current, value))
            }
            Some(NodeKind::Scalar(current)) => Err(MarkingError::InvalidStructure(format!(
                "cannot replace {} value of {node} with {} value",
                current.kind(),
                value.kind()
            ))),
            _ => Err(MarkingError::InvalidStructure(format!(
                "{node} is not a scalar"
            ))),
        }
    }

    /// Items of a list node; empty for any other node.
    pub fn list_items(&self, node: NodeId) -> &[NodeId] {
        match self.kind(node) {
            Some(NodeKind::List(items)) => items,
            _ => &[],
        }
    }

    /// Field descriptors of an entity, in schema order.
    pub fn typed_fields(&self, node: NodeId) -> &[FieldDef] {
        self.entity_type(node)
            .map(|t| t.fields.as_slice())
            .unwrap_or(&[])
    }

    pub fn get(&self, owner: NodeId, field: &str) -> Option<NodeId> {
        let entity = self.entity(owner)?;
        let index = self.schema.type_at(entity.type_index).field_index(field)?;
        entity.fields[index]
    }

    /// Values of a repeated field.
    pub fn items(&self, owner: NodeId, field: &str) -> &[NodeId] {
        match self.get(owner, field) {
            Some(list) => self.list_items(list),
            None => &[],
        }
    }

    pub fn get_scalar(&self, owner: NodeId, field: &str) -> Option<&Scalar> {
        self.get(owner, field).and_then(|node| self.scalar(node))
    }

    pub fn get_text(&self, owner: NodeId, field: &str) -> Option<&str> {
        self.get_scalar(owner, field).and_then(Scalar::as_text)
    }

    /// Stores `child` in a single-valued field, returning the value it
    /// replaced. The replaced value becomes detached.
    pub fn set(&mut self, owner: NodeId, field: &str, child: NodeId) -> Result<Option<NodeId>> {
        let schema = Arc::clone(&self.schema);
        let (index, def) = self.field_def(&schema, owner, field)?;
        if def.is_many() {
            return Err(MarkingError::InvalidStructure(format!(
                "field '{field}' is repeated; use push"
            )));
        }
        self.check_value(def, child)?;
        self.check_detached(owner, child)?;

        let previous = self
            .entity_mut(owner)
            .and_then(|entity| entity.fields[index].replace(child));
        if let Some(previous) = previous {
            self.nodes[previous.index()].parent = None;
        }
        self.nodes[child.index()].parent = Some(Link::Field {
            owner,
            field: index,
        });
        Ok(previous)
    }

    pub fn set_scalar(
        &mut self,
        owner: NodeId,
        field: &str,
        value: impl Into<Scalar>,
    ) -> Result<NodeId> {
        let value = value.into();
        self.check_scalar_field(owner, field, &value)?;
        let node = self.create_scalar(value);
        self.set(owner, field, node)?;
        Ok(node)
    }

    /// Appends `child` to a repeated field.
    pub fn push(&mut self, owner: NodeId, field: &str, child: NodeId) -> Result<()> {
        let schema = Arc::clone(&self.schema);
        let (index, def) = self.field_def(&schema, owner, field)?;
        if !def.is_many() {
            return Err(MarkingError::InvalidStructure(format!(
                "field '{field}' holds a single value; use set"
            )));
        }
        self.check_value(def, child)?;
        self.check_detached(owner, child)?;

        let existing = self.entity(owner).and_then(|entity| entity.fields[index]);
        let list = match existing {
            Some(list) => list,
            None => {
                let list = self.alloc(NodeKind::List(Vec::new()));
                self.nodes[list.index()].parent = Some(Link::Field {
                    owner,
                    field: index,
                });
                if let Some(entity) = self.entity_mut(owner) {
                    entity.fields[index] = Some(list);
                }
                list
            }
        };
        if let NodeKind::List(items) = &mut self.nodes[list.index()].kind {
            items.push(child);
        }
        self.nodes[child.index()].parent = Some(Link::Item { list });
        Ok(())
    }

    pub fn push_scalar(
        &mut self,
        owner: NodeId,
        field: &str,
        value: impl Into<Scalar>,
    ) -> Result<NodeId> {
        let value = value.into();
        self.check_scalar_field(owner, field, &value)?;
        let node = self.create_scalar(value);
        self.push(owner, field, node)?;
        Ok(node)
    }

    /// Detaches and returns the value of a field (the list node for a
    /// repeated field).
    pub fn take(&mut self, owner: NodeId, field: &str) -> Result<Option<NodeId>> {
        let schema = Arc::clone(&self.schema);
        let (index, _) = self.field_def(&schema, owner, field)?;
        let taken = self
            .entity_mut(owner)
            .and_then(|entity| entity.fields[index].take());
        if let Some(node) = taken {
            self.nodes[node.index()].parent = None;
        }
        Ok(taken)
    }

    /// Detaches and returns one item of a repeated field.
    pub fn take_item(&mut self, owner: NodeId, field: &str, index: usize) -> Result<Option<NodeId>> {
        let Some(list) = self.get(owner, field).filter(|n| self.is_list(*n)) else {
            return Ok(None);
        };
        let taken = match &mut self.nodes[list.index()].kind {
            NodeKind::List(items) if index < items.len() => Some(items.remove(index)),
            _ => None,
        };
        if let Some(node) = taken {
            self.nodes[node.index()].parent = None;
        }
        Ok(taken)
    }

    /// Owning entity of a node. List items report the entity that holds the
    /// list.
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        match self.nodes.get(node.index())?.parent? {
            Link::Field { owner, .. } => Some(owner),
            Link::Item { list } => self.parent(list),
        }
    }

    fn parent_node(&self, node: NodeId) -> Option<NodeId> {
        match self.nodes.get(node.index())?.parent? {
            Link::Field { owner, .. } => Some(owner),
            Link::Item { list } => Some(list),
        }
    }

    pub fn location(&self, node: NodeId) -> Option<Location<'_>> {
        let (owner, field, index, count) = match self.nodes.get(node.index())?.parent? {
            Link::Field { owner, field } => (owner, field, None, 1),
            Link::Item { list } => {
                let Link::Field { owner, field } = self.nodes.get(list.index())?.parent? else {
                    return None;
                };
                let items = self.list_items(list);
                let position = items.iter().position(|item| *item == node)?;
                (owner, field, Some(position), items.len())
            }
        };
        let def = self.entity_type(owner)?.fields.get(field)?;
        Some(Location {
            owner,
            field: def.name.as_str(),
            index,
            count,
        })
    }

    /// Whether the node is reachable from the root.
    pub fn is_attached(&self, node: NodeId) -> bool {
        if !self.contains(node) {
            return false;
        }
        let mut current = node;
        while let Some(parent) = self.parent_node(current) {
            current = parent;
        }
        current == self.root
    }

    /// Finds the entity whose `id` field equals `id`.
    pub fn find_by_id(&self, id: &str) -> Result<NodeId> {
        std::iter::once(self.root)
            .chain(navigator::walk(self, self.root))
            .find(|node| self.get_text(*node, "id") == Some(id))
            .ok_or_else(|| MarkingError::IdLookup(id.to_string()))
    }

    /// Embedded marking records hosted by an entity.
    pub fn handling(&self, node: NodeId) -> &[Marking] {
        self.entity(node)
            .map(|entity| entity.handling.as_slice())
            .unwrap_or(&[])
    }

    pub fn handling_mut(&mut self, node: NodeId) -> Option<&mut Vec<Marking>> {
        self.entity_mut(node).map(|entity| &mut entity.handling)
    }

    /// Every embedded record in the tree with the entity hosting it.
    pub fn embedded_markings(&self) -> Vec<(NodeId, &Marking)> {
        std::iter::once(self.root)
            .chain(navigator::walk(self, self.root))
            .flat_map(|node| self.handling(node).iter().map(move |m| (node, m)))
            .collect()
    }

    /// Embedded records that do not target any node.
    pub fn embedded_null_markings(&self) -> Vec<&Marking> {
        self.embedded_markings()
            .into_iter()
            .filter(|(_, marking)| !marking.is_resolved())
            .map(|(_, marking)| marking)
            .collect()
    }

    pub(crate) fn attached(&self, node: NodeId) -> &[Marking] {
        self.markings.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn attached_mut(&mut self, node: NodeId) -> &mut Vec<Marking> {
        self.markings.entry(node).or_default()
    }

    pub(crate) fn has_marking_set(&self, node: NodeId) -> bool {
        self.markings.contains_key(&node)
    }

    fn field_def<'s>(
        &self,
        schema: &'s Schema,
        owner: NodeId,
        field: &str,
    ) -> Result<(usize, &'s FieldDef)> {
        let entity = self.entity(owner).ok_or_else(|| {
            MarkingError::InvalidStructure(format!("{owner} is not an entity"))
        })?;
        let entity_type = schema.type_at(entity.type_index);
        let index = entity_type.field_index(field).ok_or_else(|| {
            MarkingError::InvalidStructure(format!(
                "'{}' has no field '{field}'",
                entity_type.name
            ))
        })?;
        Ok((index, &entity_type.fields[index]))
    }

    fn check_scalar_field(&self, owner: NodeId, field: &str, value: &Scalar) -> Result<()> {
        let schema = Arc::clone(&self.schema);
        let (_, def) = self.field_def(&schema, owner, field)?;
        match &def.kind {
            FieldKind::Scalar(kind) if *kind == value.kind() => Ok(()),
            _ => Err(MarkingError::InvalidStructure(format!(
                "field '{field}' does not accept a {} value",
                value.kind()
            ))),
        }
    }

    fn check_value(&self, def: &FieldDef, child: NodeId) -> Result<()> {
        let accepted = match (&def.kind, self.kind(child)) {
            (FieldKind::Entity(type_name), Some(NodeKind::Entity(_))) => {
                self.type_name(child) == Some(type_name.as_str())
            }
            (FieldKind::Scalar(kind), Some(NodeKind::Scalar(value))) => value.kind() == *kind,
            _ => false,
        };
        if accepted {
            Ok(())
        } else {
            Err(MarkingError::InvalidStructure(format!(
                "{child} cannot be stored in field '{}'",
                def.name
            )))
        }
    }

    fn check_detached(&self, owner: NodeId, child: NodeId) -> Result<()> {
        if child == self.root {
            return Err(MarkingError::InvalidStructure(
                "the root cannot be stored in a field".to_string(),
            ));
        }
        if self.nodes[child.index()].parent.is_some() {
            return Err(MarkingError::InvalidStructure(format!(
                "{child} is already attached; take it first"
            )));
        }
        let mut current = Some(owner);
        while let Some(node) = current {
            if node == child {
                return Err(MarkingError::InvalidStructure(format!(
                    "storing {child} under {owner} would create a cycle"
                )));
            }
            current = self.parent_node(node);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Document {
        Document::new(Arc::new(Schema::stix())).unwrap()
    }

    fn indicator(doc: &mut Document) -> NodeId {
        let root = doc.root();
        let indicators = doc.create_entity("Indicators").unwrap();
        doc.set(root, "indicators", indicators).unwrap();
        let indicator = doc.create_entity("Indicator").unwrap();
        doc.push(indicators, "indicator", indicator).unwrap();
        indicator
    }

    #[test]
    fn test_new_document_has_empty_root() {
        let doc = doc();
        assert_eq!(doc.type_name(doc.root()), Some("STIXPackage"));
        assert!(doc.is_attached(doc.root()));
        assert!(doc.location(doc.root()).is_none());
        assert_eq!(doc.typed_fields(doc.root()).len(), 6);
    }

    #[test]
    fn test_set_and_get_scalar() {
        let mut doc = doc();
        let ind = indicator(&mut doc);
        let title = doc.set_scalar(ind, "title", "Test").unwrap();

        assert_eq!(doc.get(ind, "title"), Some(title));
        assert_eq!(doc.get_text(ind, "title"), Some("Test"));
        assert_eq!(doc.parent(title), Some(ind));
        let location = doc.location(title).unwrap();
        assert_eq!(location.field, "title");
        assert_eq!(location.index, None);
    }

    #[test]
    fn test_equal_values_are_distinct_nodes() {
        let mut doc = doc();
        let ind = indicator(&mut doc);
        let a = doc.push_scalar(ind, "alternative_id", "10.0.0.1").unwrap();
        let b = doc.push_scalar(ind, "alternative_id", "10.0.0.1").unwrap();

        assert_ne!(a, b);
        assert_eq!(doc.items(ind, "alternative_id"), &[a, b]);
        assert_eq!(doc.location(b).unwrap().index, Some(1));
        assert_eq!(doc.location(b).unwrap().count, 2);
        assert_eq!(doc.parent(b), Some(ind));
    }

    #[test]
    fn test_set_rejects_bad_values() {
        let mut doc = doc();
        let ind = indicator(&mut doc);

        assert!(doc.set_scalar(ind, "nope", "x").is_err());
        assert!(doc.set_scalar(ind, "negate", "x").is_err());
        assert!(doc.set_scalar(ind, "alternative_id", "x").is_err());

        let observable = doc.create_entity("Observable").unwrap();
        assert!(doc.set(ind, "description", observable).is_err());
        assert!(doc.push(ind, "title", observable).is_err());
    }

    #[test]
    fn test_set_rejects_attached_values() {
        let mut doc = doc();
        let ind = indicator(&mut doc);
        let root = doc.root();

        let title = doc.set_scalar(ind, "title", "x").unwrap();
        let other = indicator(&mut doc);
        assert!(doc.set(other, "title", title).is_err());
        assert!(doc.set(ind, "title", root).is_err());

        let observable = doc.create_entity("Observable").unwrap();
        let object = doc.create_entity("CyboxObject").unwrap();
        doc.set(observable, "object", object).unwrap();
        let properties = doc.create_entity("ObjectProperties").unwrap();
        doc.set(object, "properties", properties).unwrap();
        assert!(!doc.is_attached(properties));
    }

    #[test]
    fn test_replacing_value_detaches_previous() {
        let mut doc = doc();
        let ind = indicator(&mut doc);
        let first = doc.set_scalar(ind, "title", "one").unwrap();
        let second = doc.create_scalar("two");

        let previous = doc.set(ind, "title", second).unwrap();
        assert_eq!(previous, Some(first));
        assert!(!doc.is_attached(first));
        assert!(doc.is_attached(second));
    }

    #[test]
    fn test_take_detaches_subtree() {
        let mut doc = doc();
        let ind = indicator(&mut doc);
        let title = doc.set_scalar(ind, "title", "x").unwrap();
        let indicators = doc.parent(ind).unwrap();

        let taken = doc.take_item(indicators, "indicator", 0).unwrap();
        assert_eq!(taken, Some(ind));
        assert!(!doc.is_attached(ind));
        assert!(!doc.is_attached(title));
        assert!(doc.take_item(indicators, "indicator", 5).unwrap().is_none());
    }

    #[test]
    fn test_replace_value_keeps_identity() {
        let mut doc = doc();
        let ind = indicator(&mut doc);
        let title = doc.set_scalar(ind, "title", "old").unwrap();

        let old = doc.replace_value(title, "new").unwrap();
        assert_eq!(old.as_text(), Some("old"));
        assert_eq!(doc.get(ind, "title"), Some(title));
        assert_eq!(doc.get_text(ind, "title"), Some("new"));
        assert!(doc.replace_value(title, true).is_err());
    }

    #[test]
    fn test_find_by_id() {
        let mut doc = doc();
        let ind = indicator(&mut doc);
        doc.set_scalar(ind, "id", "example:indicator-1").unwrap();

        assert_eq!(doc.find_by_id("example:indicator-1").unwrap(), ind);
        assert!(matches!(
            doc.find_by_id("example:missing"),
            Err(MarkingError::IdLookup(_))
        ));
    }

    #[test]
    fn test_embedded_markings() {
        use crate::marking::MarkingStructure;

        let mut doc = doc();
        let ind = indicator(&mut doc);
        let root = doc.root();
        let null = Marking::new().with_structure(MarkingStructure::tlp("WHITE"));
        let placed = Marking::new()
            .with_structure(MarkingStructure::tlp("RED"))
            .with_target("../../../self::node()");
        doc.handling_mut(root).unwrap().push(null.clone());
        doc.handling_mut(ind).unwrap().push(placed);

        assert_eq!(doc.embedded_markings().len(), 2);
        assert_eq!(doc.embedded_null_markings(), vec![&null]);
    }
}
