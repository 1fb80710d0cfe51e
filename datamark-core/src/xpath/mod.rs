//! Path queries over an [`XmlDocument`](crate::xml::XmlDocument).
//!
//! Supports the XPath 1.0 subset that marking records use:
//!
//! - absolute (`/`, `//`) and relative location paths, `.` and `..`
//! - axes `child`, `attribute` (`@`), `self`, `parent`, `descendant`,
//!   `descendant-or-self`, `ancestor`, `ancestor-or-self`
//! - node tests: qualified names, `*`, `prefix:*`, `node()`, `text()`
//! - predicates: `[n]`, `[@name]`, `[@name='value']`
//! - union (`|`)

mod eval;
mod lexer;
mod parser;

pub use eval::{evaluate, XNode};
pub use lexer::{Lexer, Token};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("Unexpected token at position {position}: expected {expected}, found {found}")]
    UnexpectedToken {
        position: usize,
        expected: String,
        found: String,
    },

    #[error("Unknown namespace prefix '{0}'")]
    UnknownPrefix(String),

    #[error("Unknown axis '{0}'")]
    UnknownAxis(String),

    #[error("Unsupported function '{0}()'")]
    UnsupportedFunction(String),

    #[error("Path has more than {limit} steps")]
    TooManySteps { limit: usize },

    #[error("Empty query")]
    Empty,
}

pub type QueryResult<T> = std::result::Result<T, QueryError>;

/// Evaluator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// Upper bound on location steps in one expression, `//` counting as one.
    pub max_steps: usize,
    /// Fail on prefixes with no namespace binding instead of matching nothing.
    pub strict_prefixes: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            max_steps: 256,
            strict_prefixes: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Attribute,
    SelfAxis,
    Parent,
    Descendant,
    DescendantOrSelf,
    Ancestor,
    AncestorOrSelf,
}

impl Axis {
    pub fn from_name(name: &str) -> Option<Axis> {
        let axis = match name {
            "child" => Axis::Child,
            "attribute" => Axis::Attribute,
            "self" => Axis::SelfAxis,
            "parent" => Axis::Parent,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            _ => return None,
        };
        Some(axis)
    }

    pub fn is_reverse(&self) -> bool {
        matches!(self, Axis::Parent | Axis::Ancestor | Axis::AncestorOrSelf)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    /// `prefix:local` or `local`.
    Name {
        prefix: Option<String>,
        local: String,
    },
    /// `*` or `prefix:*`.
    Wildcard { prefix: Option<String> },
    Node,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// 1-based proximity position.
    Position(usize),
    HasAttribute {
        prefix: Option<String>,
        local: String,
    },
    AttributeEquals {
        prefix: Option<String>,
        local: String,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Predicate>,
}

impl Step {
    pub(crate) fn new(axis: Axis, test: NodeTest) -> Self {
        Self {
            axis,
            test,
            predicates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationPath {
    pub absolute: bool,
    pub steps: Vec<Step>,
}

/// A parsed query: the union of one or more location paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    pub paths: Vec<LocationPath>,
}

impl Expr {
    pub fn parse(source: &str, options: &QueryOptions) -> QueryResult<Expr> {
        parser::Parser::new(source, options).parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QueryError::Syntax {
            position: 4,
            message: "unterminated literal".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Syntax error at position 4: unterminated literal"
        );
        assert_eq!(
            QueryError::UnsupportedFunction("count".to_string()).to_string(),
            "Unsupported function 'count()'"
        );
    }

    #[test]
    fn test_axis_names() {
        assert_eq!(Axis::from_name("descendant-or-self"), Some(Axis::DescendantOrSelf));
        assert_eq!(Axis::from_name("following"), None);
        assert!(Axis::Ancestor.is_reverse());
        assert!(!Axis::Child.is_reverse());
    }
}
