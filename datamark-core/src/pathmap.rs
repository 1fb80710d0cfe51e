//! Ingest-side index of embedded marking records.
//!
//! [`PathMap::build`] evaluates the controlled structure of every marking
//! record in a document and indexes each selected wire node. Keys are
//! [`WireNode`]s, so two attributes with equal values on different elements
//! are separate entries.

use crate::error::{MarkingError, Result};
use crate::schema::Schema;
use crate::xml::{ElemId, WireNode, XmlDocument};
use crate::xpath::{evaluate, Expr, QueryOptions, XNode};
use std::collections::HashMap;
use tracing::{debug, trace};

#[derive(Debug, Clone, Default)]
pub struct PathMap {
    index: HashMap<WireNode, Vec<ElemId>>,
    /// Records whose controlled structure is empty or missing.
    unresolved: Vec<ElemId>,
}

impl PathMap {
    /// Indexes every marking record of `xml`.
    ///
    /// Query errors propagate; a document with a malformed controlled
    /// structure is rejected as a whole.
    pub fn build(xml: &XmlDocument, schema: &Schema, options: &QueryOptions) -> Result<Self> {
        let (record_ns, record_local) = resolve(schema, &schema.records.record)?;
        let (target_ns, target_local) = resolve(schema, &schema.records.target)?;

        let mut map = PathMap::default();
        for record in xml.elements_named(record_ns, record_local) {
            let target = xml
                .child_elements(record)
                .find(|child| xml.element(*child).is(target_ns, target_local));
            let Some((target, path)) = target
                .map(|t| (t, xml.text(t)))
                .filter(|(_, path)| !path.trim().is_empty())
            else {
                map.unresolved.push(record);
                continue;
            };

            let expr = Expr::parse(path.trim(), options)?;
            let namespaces = xml.in_scope_namespaces(target);
            let selected = evaluate(&expr, xml, XNode::Element(target), &namespaces, options)?;
            debug!("record {:?} selects {} nodes with '{}'", record, selected.len(), path.trim());

            for node in selected.into_iter().filter_map(XNode::wire) {
                trace!("{node:?} covered by record {record:?}");
                let records = map.index.entry(node).or_default();
                if !records.contains(&record) {
                    records.push(record);
                }
            }
        }
        Ok(map)
    }

    /// Records covering `node`, in document order.
    pub fn records_for(&self, node: WireNode) -> &[ElemId] {
        self.index.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn unresolved(&self) -> &[ElemId] {
        &self.unresolved
    }

    /// Number of covered wire nodes.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

fn resolve<'s>(schema: &'s Schema, qname: &'s str) -> Result<(Option<&'s str>, &'s str)> {
    schema
        .resolve(qname)
        .ok_or_else(|| MarkingError::Schema(format!("undeclared namespace prefix in '{qname}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xpath::QueryError;

    fn wrap(body: &str) -> String {
        format!(
            r#"<stix:STIX_Package xmlns:stix="http://stix.mitre.org/stix-1" xmlns:indicator="http://stix.mitre.org/Indicator-2" xmlns:cybox="http://cybox.mitre.org/cybox-2" xmlns:marking="http://data-marking.mitre.org/Marking-1">{body}</stix:STIX_Package>"#
        )
    }

    fn build(xml: &XmlDocument) -> Result<PathMap> {
        PathMap::build(xml, &Schema::stix(), &QueryOptions::default())
    }

    #[test]
    fn test_equal_attribute_values_are_distinct_keys() {
        let xml = XmlDocument::parse(&wrap(
            r#"<stix:Indicators>
                 <stix:Indicator id="same"/>
                 <stix:Indicator id="same">
                   <indicator:Handling>
                     <marking:Marking>
                       <marking:Controlled_Structure>../../../@id</marking:Controlled_Structure>
                     </marking:Marking>
                   </indicator:Handling>
                 </stix:Indicator>
               </stix:Indicators>"#,
        ))
        .unwrap();
        let map = build(&xml).unwrap();
        let indicators: Vec<ElemId> = xml
            .elements_named(Some("http://stix.mitre.org/stix-1"), "Indicator")
            .collect();

        assert_eq!(map.len(), 1);
        assert!(map.records_for(WireNode::Attribute(indicators[0], 0)).is_empty());
        assert_eq!(map.records_for(WireNode::Attribute(indicators[1], 0)).len(), 1);
    }

    #[test]
    fn test_unresolved_records() {
        let xml = XmlDocument::parse(&wrap(
            r#"<stix:STIX_Header><stix:Handling>
                 <marking:Marking/>
                 <marking:Marking><marking:Controlled_Structure>  </marking:Controlled_Structure></marking:Marking>
               </stix:Handling></stix:STIX_Header>"#,
        ))
        .unwrap();
        let map = build(&xml).unwrap();
        assert_eq!(map.unresolved().len(), 2);
        assert!(map.is_empty());
    }

    #[test]
    fn test_global_record_covers_every_node() {
        let xml = XmlDocument::parse(&wrap(
            r#"<stix:STIX_Header><stix:Handling><marking:Marking>
                 <marking:Controlled_Structure>//node() | //@*</marking:Controlled_Structure>
               </marking:Marking></stix:Handling></stix:STIX_Header>"#,
        ))
        .unwrap();
        let map = build(&xml).unwrap();
        for id in xml.ids() {
            assert_eq!(map.records_for(WireNode::Element(id)).len(), 1);
        }
    }

    #[test]
    fn test_malformed_path_propagates() {
        let xml = XmlDocument::parse(&wrap(
            r#"<stix:STIX_Header><stix:Handling><marking:Marking>
                 <marking:Controlled_Structure>//bogus:Thing</marking:Controlled_Structure>
               </marking:Marking></stix:Handling></stix:STIX_Header>"#,
        ))
        .unwrap();
        let err = build(&xml).unwrap_err();
        assert!(matches!(
            err,
            MarkingError::Query(QueryError::UnknownPrefix(ref p)) if p == "bogus"
        ));
    }
}
