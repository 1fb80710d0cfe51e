//! # datamark
//!
//! A marking overlay engine for tree-structured documents. Handling markings
//! (traffic light labels, free text statements, any opaque payload) are
//! attached to individual nodes, whole subtrees or the entire document, and
//! embedded back into the document as records addressed by path queries, so
//! a reader without the overlay can still tell which markings cover which
//! nodes.
//!
//! ## Features
//!
//! - **Three scopes**: global markings, field markings (optionally covering
//!   every descendant) and null markings that cover nothing
//! - **Inheritance**: a node's effective markings include globals and every
//!   marking applied to an ancestor with descendants
//! - **Path synthesis**: canonical controlled structure paths with positional
//!   predicates for repeated fields
//! - **Ingest**: embedded records are evaluated and reattached on parse, with
//!   identity-aware keys so equal values at different places stay distinct
//! - **Schema as data**: entity types, wire selectors and handling slots are
//!   declared in a [`Schema`], loadable from JSON
//!
//! ## Quick Start
//!
//! ```rust
//! use datamark::{Marking, MarkingContext, MarkingStructure, Result};
//!
//! # fn main() -> Result<()> {
//! let ctx = MarkingContext::stix();
//! let mut store = datamark::new(&ctx)?;
//!
//! // Build a small tree
//! let doc = store.document_mut();
//! let root = doc.root();
//! let indicators = doc.create_entity("Indicators")?;
//! doc.set(root, "indicators", indicators)?;
//! let indicator = doc.create_entity("Indicator")?;
//! doc.push(indicators, "indicator", indicator)?;
//! let title = doc.set_scalar(indicator, "title", "Phishing campaign")?;
//!
//! // Mark the indicator and everything below it
//! let red = Marking::new().with_structure(MarkingStructure::tlp("RED"));
//! store.add_marking(Some(indicator.into()), red.clone(), true)?;
//! assert!(store.is_marked(title, Some(&red), false)?);
//!
//! // Embed the markings and read them back
//! let xml = store.to_xml()?;
//! let parsed = datamark::parse(&xml, &ctx)?;
//! let doc = parsed.document();
//! let indicator = doc.items(doc.get(doc.root(), "indicators").unwrap(), "indicator")[0];
//! let title = doc.get(indicator, "title").unwrap();
//! assert_eq!(parsed.get_markings(title, false, false), vec![red]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! ### Engine
//! - [`container`] - The marking store and its add/remove/query operations
//! - [`parser`] - XML to marking container, reattaching embedded records
//! - [`pathmap`] - Index of wire nodes covered by embedded records
//! - [`serializer`] - Controlled structure synthesis and record placement
//! - [`markable`] - Which nodes can carry markings, and their own sets
//! - [`navigator`] - Depth-first traversal of the entity tree
//!
//! ### Collaborators
//! - [`model`] - Arena entity tree with stable node handles
//! - [`schema`] and [`fields`] - Entity types and the field mapping table
//! - [`xml`] - XML DOM with wire node identities
//! - [`xpath`] - The path query subset used by marking records
//! - [`binding`] - XML to entity tree and back
//! - [`export`] - JSON view of a document

pub mod binding;
pub mod container;
pub mod context;
pub mod error;
pub mod export;
pub mod fields;
pub mod markable;
pub mod marking;
pub mod model;
pub mod navigator;
pub mod parser;
pub mod pathmap;
pub mod schema;
pub mod serializer;
pub mod xml;
pub mod xpath;

pub use container::{FieldMarking, MarkingContainer};
pub use context::MarkingContext;
pub use error::{MarkingError, Result};
pub use fields::FieldMap;
pub use markable::Markable;
pub use marking::{Marking, MarkingStructure};
pub use model::{Document, NodeId, Scalar, ScalarKind};
pub use parser::MarkingParser;
pub use schema::{EntityType, FieldDef, HandlingSlot, RecordFormat, Schema, WireSelector};
pub use xpath::{QueryError, QueryOptions};

use std::path::Path;
use std::sync::Arc;

/// Current version of datamark
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Parses a marked document.
pub fn parse(xml: &str, ctx: &MarkingContext) -> Result<MarkingContainer> {
    MarkingParser::new(ctx.clone()).parse_str(xml)
}

/// Reads and parses a marked document from a file.
pub fn parse_path<P: AsRef<Path>>(path: P, ctx: &MarkingContext) -> Result<MarkingContainer> {
    MarkingParser::new(ctx.clone()).parse_path(path)
}

/// A container around an empty document of the context's schema.
pub fn new(ctx: &MarkingContext) -> Result<MarkingContainer> {
    let document = Document::new(Arc::clone(ctx.schema_arc()))?;
    Ok(MarkingContainer::new(document, ctx.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_container_is_empty() {
        let store = new(&MarkingContext::stix()).unwrap();
        let doc = store.document();
        assert_eq!(doc.type_name(doc.root()), Some("STIXPackage"));
        assert!(store.global_markings().is_empty());
        assert!(doc.embedded_markings().is_empty());
    }

    #[test]
    fn test_parse_rejects_foreign_root() {
        let err = parse("<html/>", &MarkingContext::stix()).unwrap_err();
        assert!(matches!(err, MarkingError::InvalidRoot { .. }));
    }

    #[test]
    fn test_version_info() {
        assert!(!VERSION.is_empty());
    }
}
