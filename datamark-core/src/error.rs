use crate::marking::Marking;
use crate::model::{NodeId, ScalarKind};
use crate::xpath::QueryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarkingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Node {node} is not markable: {reason}")]
    Unmarkable { node: NodeId, reason: String },

    #[error("Unknown marking: {0}")]
    UnknownMarking(String),

    #[error("{scope} already carries marking {marking}")]
    DuplicateMarking { scope: String, marking: Box<Marking> },

    #[error("Marking {marking} not found in {scope}")]
    MarkingNotFound { scope: String, marking: Box<Marking> },

    #[error("Cannot remove marking {marking} from node {node}: {reason}")]
    MarkingRemoval {
        node: NodeId,
        marking: Box<Marking>,
        reason: String,
    },

    #[error("Marking already has a controlled structure: {0}")]
    MarkingPathNotEmpty(String),

    #[error("No wire selector for field '{field}' of '{entity_type}'")]
    SerializerMapping { entity_type: String, field: String },

    #[error("Node {0} is not reachable from the document root")]
    SerializerFieldNotFound(NodeId),

    #[error("No entity with id '{0}'")]
    IdLookup(String),

    #[error("Invalid root element: expected {expected}, found {found}")]
    InvalidRoot { expected: String, found: String },

    #[error("Invalid document structure: {0}")]
    InvalidStructure(String),

    #[error("Invalid {kind} value: '{text}'")]
    InvalidValue { kind: ScalarKind, text: String },

    #[error("Invalid schema: {0}")]
    Schema(String),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MarkingError>;

impl MarkingError {
    pub(crate) fn duplicate(scope: impl Into<String>, marking: &Marking) -> Self {
        MarkingError::DuplicateMarking {
            scope: scope.into(),
            marking: Box::new(marking.clone()),
        }
    }

    pub(crate) fn not_found(scope: impl Into<String>, marking: &Marking) -> Self {
        MarkingError::MarkingNotFound {
            scope: scope.into(),
            marking: Box::new(marking.clone()),
        }
    }

    pub(crate) fn removal(node: NodeId, marking: &Marking, reason: impl Into<String>) -> Self {
        MarkingError::MarkingRemoval {
            node,
            marking: Box::new(marking.clone()),
            reason: reason.into(),
        }
    }

    pub(crate) fn unmarkable(node: NodeId, reason: impl Into<String>) -> Self {
        MarkingError::Unmarkable {
            node,
            reason: reason.into(),
        }
    }
}

impl From<quick_xml::Error> for MarkingError {
    fn from(err: quick_xml::Error) -> Self {
        MarkingError::Xml(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for MarkingError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        MarkingError::Xml(err.to_string())
    }
}
