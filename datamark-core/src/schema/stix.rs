use super::{EntityType, FieldDef, HandlingSlot, RecordFormat, Schema, MARKING_NS, XSI_NS};
use crate::model::ScalarKind::{Bool, DateTime, Text};
use std::collections::BTreeMap;

const NAMESPACES: &[(&str, &str)] = &[
    ("stix", "http://stix.mitre.org/stix-1"),
    ("stixCommon", "http://stix.mitre.org/common-1"),
    ("indicator", "http://stix.mitre.org/Indicator-2"),
    ("report", "http://stix.mitre.org/Report-1"),
    ("cybox", "http://cybox.mitre.org/cybox-2"),
    ("AddressObj", "http://cybox.mitre.org/objects#AddressObject-2"),
    ("marking", MARKING_NS),
    ("tlpMarking", "http://data-marking.mitre.org/extensions/MarkingStructure#TLP-1"),
    ("simpleMarking", "http://data-marking.mitre.org/extensions/MarkingStructure#Simple-1"),
    ("xsi", XSI_NS),
    ("example", "http://example.com"),
];

pub(super) fn schema() -> Schema {
    let namespaces = NAMESPACES
        .iter()
        .map(|(prefix, uri)| (prefix.to_string(), uri.to_string()))
        .collect::<BTreeMap<_, _>>();

    let types = vec![
        EntityType::new("STIXPackage")
            .with_field(FieldDef::attribute("id", "id", Text))
            .with_field(FieldDef::attribute("version", "version", Text))
            .with_field(FieldDef::attribute("timestamp", "timestamp", DateTime))
            .with_field(FieldDef::child("stix_header", "stix:STIX_Header", "STIXHeader"))
            .with_field(FieldDef::child("indicators", "stix:Indicators", "Indicators"))
            .with_field(FieldDef::child("reports", "stix:Reports", "Reports"))
            .with_handling(HandlingSlot::header("stix_header", "stix:Handling")),
        EntityType::new("STIXHeader")
            .with_field(FieldDef::element("title", "stix:Title", Text))
            .with_field(FieldDef::child("description", "stix:Description", "StructuredText"))
            .with_field(FieldDef::element("package_intent", "stix:Package_Intent", Text).many()),
        EntityType::new("StructuredText")
            .with_field(FieldDef::attribute("structuring_format", "structuring_format", Text))
            .with_field(FieldDef::text("value", Text)),
        EntityType::new("Indicators")
            .with_field(FieldDef::child("indicator", "stix:Indicator", "Indicator").many()),
        EntityType::new("Indicator")
            .with_field(FieldDef::attribute("id", "id", Text))
            .with_field(FieldDef::attribute("idref", "idref", Text))
            .with_field(FieldDef::attribute("timestamp", "timestamp", DateTime))
            .with_field(FieldDef::attribute("negate", "negate", Bool))
            .with_field(FieldDef::attribute("xsi_type", "xsi:type", Text).unmapped())
            .with_field(FieldDef::element("title", "indicator:Title", Text))
            .with_field(FieldDef::element("alternative_id", "indicator:Alternative_ID", Text).many())
            .with_field(FieldDef::child("description", "indicator:Description", "StructuredText"))
            .with_field(FieldDef::child("observable", "indicator:Observable", "Observable"))
            .with_handling(HandlingSlot::direct("indicator:Handling")),
        EntityType::new("Observable")
            .with_field(FieldDef::attribute("id", "id", Text))
            .with_field(FieldDef::attribute("idref", "idref", Text))
            .with_field(FieldDef::element("title", "cybox:Title", Text))
            .with_field(FieldDef::child("object", "cybox:Object", "CyboxObject")),
        EntityType::new("CyboxObject")
            .with_field(FieldDef::attribute("id", "id", Text))
            .with_field(FieldDef::child("properties", "cybox:Properties", "ObjectProperties")),
        EntityType::new("ObjectProperties")
            .with_field(FieldDef::attribute("xsi_type", "xsi:type", Text).unmapped())
            .with_field(FieldDef::attribute("category", "category", Text))
            .with_field(FieldDef::attribute("is_source", "is_source", Bool))
            .with_field(FieldDef::element("address_value", "AddressObj:Address_Value", Text)),
        EntityType::new("Reports")
            .with_field(FieldDef::child("report", "stix:Report", "Report").many()),
        EntityType::new("Report")
            .with_field(FieldDef::attribute("id", "id", Text))
            .with_field(FieldDef::attribute("timestamp", "timestamp", DateTime))
            .with_field(FieldDef::attribute("version", "version", Text))
            .with_field(FieldDef::child("header", "report:Header", "ReportHeader"))
            .with_handling(HandlingSlot::header("header", "report:Handling")),
        EntityType::new("ReportHeader")
            .with_field(FieldDef::element("title", "report:Title", Text))
            .with_field(FieldDef::child("description", "report:Description", "StructuredText")),
    ];

    Schema {
        namespaces,
        root_type: "STIXPackage".to_string(),
        root_element: "stix:STIX_Package".to_string(),
        types,
        records: RecordFormat::default(),
    }
}
