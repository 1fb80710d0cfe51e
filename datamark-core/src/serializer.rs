//! Egress side: turns buffered markings into path-addressed records.
//!
//! Flushing happens in two phases. [`plan`] resolves a target and a host for
//! every buffered marking without touching the document, so a mapping error
//! leaves both the document and the buffers as they were. [`apply`] then
//! stores the records and updates attached copies.

use crate::container::FieldMarking;
use crate::error::{MarkingError, Result};
use crate::fields::FieldMap;
use crate::markable;
use crate::marking::Marking;
use crate::model::{Document, NodeId};
use crate::navigator::{self, PathEntry};
use crate::schema::{FieldKind, HandlingSlot, WireSelector};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Target of a global marking: every node and attribute of the document.
pub const GLOBAL_TARGET: &str = "//node() | //@*";

const SELF_STEP: &str = "self::node()";
const DESCENDANTS_STEP: &str = "descendant-or-self::node()";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Global,
    Field { node: NodeId, descendants: bool },
    Null,
}

/// A resolved record and the entity whose handling will hold it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub host: NodeId,
    pub record: Marking,
    pub scope: Scope,
}

/// Synthesizes controlled structure paths for nodes of one document.
///
/// The ancestry of every attached node is computed once, at construction.
pub struct PathResolver<'a> {
    doc: &'a Document,
    fields: &'a FieldMap,
    ancestry: HashMap<NodeId, PathEntry<'a>>,
}

impl<'a> PathResolver<'a> {
    pub fn new(doc: &'a Document, fields: &'a FieldMap) -> Self {
        let ancestry = navigator::walk_with_path(doc, doc.root())
            .map(|entry| (entry.node, entry))
            .collect();
        Self {
            doc,
            fields,
            ancestry,
        }
    }

    /// Anchor entity and path for a marking on `node`.
    ///
    /// The anchor is the nearest entity, `node` itself included, with a
    /// handling slot. The path starts at the record's controlled structure
    /// element, climbs to the anchor and descends to `node`.
    pub fn resolve(&self, node: NodeId, descendants: bool) -> Result<(NodeId, String)> {
        let doc = self.doc;
        let mut chain = match self.ancestry.get(&node) {
            Some(entry) => entry.ancestors.clone(),
            None if node == doc.root() => Vec::new(),
            None => return Err(MarkingError::SerializerFieldNotFound(node)),
        };
        chain.push(node);

        let (position, slot) = chain
            .iter()
            .enumerate()
            .rev()
            .find_map(|(i, n)| {
                doc.entity_type(*n)
                    .and_then(|t| t.handling.as_ref())
                    .map(|slot| (i, slot))
            })
            .ok_or_else(|| {
                MarkingError::Schema(format!("no entity above {node} can host marking records"))
            })?;

        let mut path = slot.anchor_path().to_string();
        let mut ends_on_element = true;
        for step_node in &chain[position + 1..] {
            let (step, is_element) = self.step(*step_node)?;
            path.push('/');
            path.push_str(&step);
            ends_on_element = is_element;
        }

        if !ends_on_element {
            return Ok((chain[position], path));
        }
        let target = if descendants {
            let base = format!("{path}/{DESCENDANTS_STEP}");
            format!("{base} | {base}/@*")
        } else {
            format!("{path}/{SELF_STEP}")
        };
        Ok((chain[position], target))
    }

    /// Location step selecting `node` from its owner's element.
    fn step(&self, node: NodeId) -> Result<(String, bool)> {
        let entry = self
            .ancestry
            .get(&node)
            .ok_or(MarkingError::SerializerFieldNotFound(node))?;
        let owner = entry
            .owner()
            .ok_or(MarkingError::SerializerFieldNotFound(node))?;
        let type_name = self.doc.type_name(owner).unwrap_or_default();
        let selector = self.fields.lookup(type_name, entry.field).ok_or_else(|| {
            MarkingError::SerializerMapping {
                entity_type: type_name.to_string(),
                field: entry.field.to_string(),
            }
        })?;

        Ok(match selector {
            WireSelector::Element(qname) => {
                let count = self.doc.items(owner, entry.field).len();
                match entry.index {
                    Some(index) if count > 1 => (format!("{qname}[{}]", index + 1), true),
                    _ => (qname.clone(), true),
                }
            }
            WireSelector::Attribute(qname) => (format!("@{qname}"), false),
            WireSelector::Text => ("text()".to_string(), false),
        })
    }
}

/// Resolves every buffered marking. Record order is global, then field
/// markings by node, then null.
pub fn plan(
    doc: &Document,
    fields: &FieldMap,
    global: &[Marking],
    field: &BTreeMap<NodeId, Vec<FieldMarking>>,
    null: &[Marking],
) -> Result<Vec<Placement>> {
    let root = doc.root();
    let mut placements = Vec::with_capacity(global.len() + field.len() + null.len());

    for marking in global {
        placements.push(Placement {
            host: root,
            record: marking.resolved(Some(GLOBAL_TARGET.to_string())),
            scope: Scope::Global,
        });
    }

    let resolver = PathResolver::new(doc, fields);
    for (node, entries) in field {
        for entry in entries {
            let (host, target) = resolver.resolve(*node, entry.descendants)?;
            debug!("{} on {node} anchored at {host}: {target}", entry.marking);
            placements.push(Placement {
                host,
                record: entry.marking.resolved(Some(target)),
                scope: Scope::Field {
                    node: *node,
                    descendants: entry.descendants,
                },
            });
        }
    }

    for marking in null {
        placements.push(Placement {
            host: root,
            record: marking.resolved(None),
            scope: Scope::Null,
        });
    }
    Ok(placements)
}

/// Embeds planned records and brings attached copies in line with them:
/// copies on marked nodes gain their target, and global records become
/// attached to every node.
pub fn apply(doc: &mut Document, placements: Vec<Placement>) -> Result<()> {
    for placement in &placements {
        ensure_header(doc, placement.host)?;
    }

    let root = doc.root();
    for placement in placements {
        match placement.scope {
            Scope::Global => {
                let nodes: Vec<NodeId> = std::iter::once(root)
                    .chain(navigator::walk(doc, root))
                    .collect();
                for node in nodes {
                    if !markable::resolve_attached(doc, node, &placement.record) {
                        markable::attach(doc, node, placement.record.clone())?;
                    }
                }
            }
            Scope::Field { node, descendants } => {
                markable::resolve_attached(doc, node, &placement.record);
                if descendants {
                    let nodes: Vec<NodeId> = navigator::walk(doc, node).collect();
                    for descendant in nodes {
                        markable::resolve_attached(doc, descendant, &placement.record);
                    }
                }
            }
            Scope::Null => {}
        }
        if let Some(records) = doc.handling_mut(placement.host) {
            records.push(placement.record);
        }
    }
    Ok(())
}

/// Creates the header entity of a header slot host when it is missing.
fn ensure_header(doc: &mut Document, host: NodeId) -> Result<()> {
    let Some(HandlingSlot::Header { field, .. }) =
        doc.entity_type(host).and_then(|t| t.handling.clone())
    else {
        return Ok(());
    };
    if doc.get(host, &field).is_some() {
        return Ok(());
    }
    let type_name = match doc.entity_type(host).and_then(|t| t.field(&field)) {
        Some(def) => match &def.kind {
            FieldKind::Entity(type_name) => type_name.clone(),
            FieldKind::Scalar(_) => {
                return Err(MarkingError::Schema(format!(
                    "header field '{field}' does not hold an entity"
                )))
            }
        },
        None => return Err(MarkingError::Schema(format!("unknown header field '{field}'"))),
    };
    let header = doc.create_entity(&type_name)?;
    doc.set(host, &field, header)?;
    debug!("created {type_name} header {header} under {host}");
    Ok(())
}
