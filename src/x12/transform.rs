//! XML transform collaborator seam
//!
//! Producing X12 from domain XML is the job of an external transform
//! (historically XSLT). The parser only needs the seam: apply the
//! transform, then parse the X12 text it produced. Implementations are
//! swappable - an XSLT engine, a hand-written emitter, or a test stub.

use std::fmt;

/// Errors raised by an XML transform.
#[derive(Debug, Clone)]
pub enum TransformError {
    /// The transform could not be applied to the given input.
    Failed(String),
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformError::Failed(msg) => write!(f, "XML transform failed: {}", msg),
        }
    }
}

impl std::error::Error for TransformError {}

/// An XML-to-XML (or XML-to-text) transformation step.
pub trait XmlTransform: Send + Sync {
    fn apply(&self, xml: &str) -> Result<String, TransformError>;
}

/// The identity transform: input passes through unchanged. Useful when the
/// caller already holds X12 text in an XML envelope's place.
#[derive(Debug, Clone, Default)]
pub struct IdentityTransform;

impl XmlTransform for IdentityTransform {
    fn apply(&self, xml: &str) -> Result<String, TransformError> {
        Ok(xml.to_string())
    }
}
