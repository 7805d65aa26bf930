//! X12 parsing and serialization
//!
//! Module layout follows the data flow:
//!
//! 1. [`segment`] - delimiter and segment value types
//! 2. [`reader`] - byte stream to framed segment strings
//! 3. [`specification`] - the declarative model the parser consults
//! 4. [`tree`] - the container tree produced by a parse
//! 5. [`parser`] - the structural parser and loop-resolution engine
//! 6. [`formats`] - tree back to wire form
//! 7. [`unbundle`] - splitting an interchange along transaction or loop
//!    boundaries
//!
//! [`errors`], [`warnings`], and [`transform`] carry the diagnostic surface
//! and the XML-transform collaborator seam.

pub mod errors;
pub mod formats;
pub mod parser;
pub mod reader;
pub mod segment;
pub mod specification;
pub mod transform;
pub mod tree;
pub mod unbundle;
pub mod warnings;

pub use errors::{StructuralError, X12ParseError};
pub use parser::{ParserOptions, X12Parser};
pub use reader::X12StreamReader;
pub use segment::{Delimiters, Segment};
pub use specification::{SpecificationFinder, TransactionSpecification};
pub use tree::{Interchange, NodeId, NodeKind};
pub use warnings::SegmentWarning;
