//! Error taxonomy for structural parsing
//!
//! Structural errors accumulate during a parse and surface together as one
//! aggregate error at end of stream; a fatal header or I/O failure halts
//! the parse immediately. Lenient mode downgrades some kinds to warnings
//! (see [`crate::x12::warnings`]) instead of recording them here.

use std::fmt;
use std::io;

/// Context tying a diagnostic to the offending segment inside its
/// transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionContext {
    /// Transaction set identifier code (ST01).
    pub transaction_code: String,
    /// Transaction set control number (ST02).
    pub control_number: String,
    /// 1-based index of the segment within the transaction.
    pub segment_index: usize,
    /// The segment string as read from the wire.
    pub segment: String,
    /// Loop ids walked past while searching for a container, innermost
    /// first. Hierarchical loops render as `loopId[hlId]`.
    pub breadcrumbs: Vec<String>,
}

impl fmt::Display for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "transaction {} (control number {}), segment {} '{}'",
            self.transaction_code, self.control_number, self.segment_index, self.segment
        )?;
        if !self.breadcrumbs.is_empty() {
            write!(f, ", searched loops: {}", self.breadcrumbs.join(" -> "))?;
        }
        Ok(())
    }
}

/// One recorded structural anomaly. The parse continues after recording;
/// the full list surfaces at end of stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuralError {
    /// A trailer (`IEA`/`GE`/`SE`) arrived with no matching opener.
    MismatchSegment { segment_id: String, segment: String },
    /// A segment arrived before the opener it requires (`GS` before `ISA`,
    /// detail before `ST`).
    MissingPrecedingSegment {
        segment_id: String,
        expected: String,
        segment: String,
    },
    /// An `ST` arrived with no open functional group.
    MissingGsSegment { segment: String },
    /// An `HL` whose level code no ancestor container accepts.
    InvalidHLoopSpecification { hl_id: String, level_code: String },
    /// Strict mode: HL02 referenced an id not seen in this transaction.
    MissingParentId { hl_id: String, parent_id: String },
    /// Duplicate HL01 within one transaction. Never downgraded.
    HLoopIdExists { hl_id: String },
    /// Strict mode: no container in the ancestry accepted the segment.
    SegmentCannotBeIdentified(TransactionContext),
}

impl fmt::Display for StructuralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralError::MismatchSegment { segment_id, segment } => {
                write!(f, "Trailer segment {} has no matching opener: '{}'", segment_id, segment)
            }
            StructuralError::MissingPrecedingSegment {
                segment_id,
                expected,
                segment,
            } => write!(
                f,
                "Segment {} requires a preceding {} segment: '{}'",
                segment_id, expected, segment
            ),
            StructuralError::MissingGsSegment { segment } => {
                write!(f, "ST segment with no open functional group: '{}'", segment)
            }
            StructuralError::InvalidHLoopSpecification { hl_id, level_code } => write!(
                f,
                "HL loop {} with level code {} is not allowed by any open container",
                hl_id, level_code
            ),
            StructuralError::MissingParentId { hl_id, parent_id } => write!(
                f,
                "HL loop {} references parent id {} which does not exist",
                hl_id, parent_id
            ),
            StructuralError::HLoopIdExists { hl_id } => {
                write!(f, "HL loop id {} already exists in this transaction", hl_id)
            }
            StructuralError::SegmentCannotBeIdentified(context) => {
                write!(f, "Segment cannot be identified: {}", context)
            }
        }
    }
}

impl std::error::Error for StructuralError {}

/// Failure of a whole parse.
#[derive(Debug)]
pub enum X12ParseError {
    /// ISA missing or truncated. Fatal; nothing was parsed.
    MalformedHeader(String),
    /// The underlying stream failed mid-parse.
    Io(io::Error),
    /// One or more structural errors were recorded, in encounter order.
    /// The partial trees are discarded.
    Structural(Vec<StructuralError>),
    /// The XML collaborator failed before parsing began.
    Transform(crate::x12::transform::TransformError),
}

impl fmt::Display for X12ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            X12ParseError::MalformedHeader(msg) => write!(f, "Malformed ISA header: {}", msg),
            X12ParseError::Io(err) => write!(f, "I/O error: {}", err),
            X12ParseError::Structural(errors) => {
                writeln!(f, "Parse failed with {} structural error(s):", errors.len())?;
                for err in errors {
                    writeln!(f, "  - {}", err)?;
                }
                Ok(())
            }
            X12ParseError::Transform(err) => write!(f, "Transform failed: {}", err),
        }
    }
}

impl std::error::Error for X12ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            X12ParseError::Io(err) => Some(err),
            X12ParseError::Transform(err) => Some(err),
            _ => None,
        }
    }
}

impl X12ParseError {
    /// The recorded structural errors, if this is an aggregate failure.
    pub fn structural_errors(&self) -> &[StructuralError] {
        match self {
            X12ParseError::Structural(errors) => errors,
            _ => &[],
        }
    }
}
