//! Ingest pipeline: XML text to a marking container.
//!
//! Parsing runs in three passes over the same [`XmlDocument`]:
//!
//! 1. [`PathMap::build`] evaluates every embedded record's controlled
//!    structure and indexes the wire nodes it selects.
//! 2. [`binding::read`] builds the entity tree and correlates every tree node
//!    with the wire node it was read from.
//! 3. The attach pass walks the tree, looks each node's wire node up in the
//!    index and attaches the covering records to the node.
//!
//! Records without a controlled structure are left in the handling list of
//! their host and surface as null markings.

use crate::binding::{self, Correlation};
use crate::container::MarkingContainer;
use crate::context::MarkingContext;
use crate::error::Result;
use crate::markable;
use crate::model::{Document, NodeId};
use crate::navigator;
use crate::pathmap::PathMap;
use crate::xml::XmlDocument;
use std::path::Path;
use tracing::{debug, info, trace};

/// Reads marked documents for one [`MarkingContext`].
#[derive(Debug, Clone)]
pub struct MarkingParser {
    context: MarkingContext,
}

impl MarkingParser {
    pub fn new(context: MarkingContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &MarkingContext {
        &self.context
    }

    pub fn parse_path<P: AsRef<Path>>(&self, path: P) -> Result<MarkingContainer> {
        let path = path.as_ref();
        info!("parsing {}", path.display());
        let input = std::fs::read_to_string(path)?;
        self.parse_str(&input)
    }

    pub fn parse_str(&self, input: &str) -> Result<MarkingContainer> {
        let xml = XmlDocument::parse(input)?;
        self.parse_xml(&xml)
    }

    /// Parses an already loaded DOM.
    ///
    /// # Errors
    ///
    /// Fails with `Query` if a controlled structure cannot be evaluated, with
    /// `InvalidRoot` if the root element does not match the schema, and with
    /// `InvalidValue` for scalar text that does not parse as its kind.
    pub fn parse_xml(&self, xml: &XmlDocument) -> Result<MarkingContainer> {
        let path_map = PathMap::build(xml, self.context.schema(), self.context.query_options())?;
        let (mut document, correlation) = binding::read(self.context.schema_arc(), xml)?;

        let attached = attach_records(&mut document, &correlation, &path_map)?;
        debug!(
            "{} covered wire nodes, {attached} attached markings, {} records without target",
            path_map.len(),
            path_map.unresolved().len()
        );
        Ok(MarkingContainer::new(document, self.context.clone()))
    }
}

/// Attaches every indexed record to the tree node read from the wire node it
/// covers. Returns the number of attachments.
fn attach_records(
    document: &mut Document,
    correlation: &Correlation,
    path_map: &PathMap,
) -> Result<usize> {
    let root = document.root();
    let nodes: Vec<NodeId> = std::iter::once(root)
        .chain(navigator::walk(document, root))
        .collect();

    let mut attached = 0;
    for node in nodes {
        let Some(wire) = correlation.wire(node) else {
            continue;
        };
        for record in path_map.records_for(wire) {
            let Some((owner, index)) = correlation.record(*record) else {
                continue;
            };
            let Some(marking) = document.handling(owner).get(index).cloned() else {
                continue;
            };
            trace!("{node} marked with {marking} by record at {owner}[{index}]");
            markable::attach(document, node, marking)?;
            attached += 1;
        }
    }
    Ok(attached)
}
