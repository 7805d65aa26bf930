//! # x12-fmt
//!
//! A streaming parser and serializer for ANSI X12 EDI interchanges.
//!
//! The pipeline mirrors the wire format: a framing reader discovers the
//! interchange delimiters from the 106-byte ISA header and yields segment
//! strings; the structural parser dispatches on segment ids to rebuild the
//! envelope -> functional group -> transaction nesting; detail segments are
//! placed into loops by consulting a declarative transaction specification.
//! The resulting container tree serializes back to wire form with the
//! delimiters it was read with.
//!
//! ```
//! use x12_fmt::{ParserOptions, X12Parser};
//!
//! let input = "ISA*00*          *00*          *ZZ*SENDER         *ZZ*RECEIVER       \
//! *040101*1200*U*00401*000000001*0*P*:~GS*HC*SENDER*RECEIVER*20040101*1200*1*X*004010X098A1~\
//! ST*837*0001~BHT*0019*00*0123*20040101*1200*CH~SE*3*0001~GE*1*1~IEA*1*000000001~";
//!
//! let mut parser = X12Parser::new(ParserOptions::default());
//! let interchanges = parser.parse_multiple_str(input).unwrap();
//! assert_eq!(interchanges.len(), 1);
//! assert_eq!(interchanges[0].serialize(), input);
//! ```

pub mod x12;

pub use x12::errors::{StructuralError, X12ParseError};
pub use x12::parser::{ParserOptions, X12Parser};
pub use x12::reader::X12StreamReader;
pub use x12::segment::{Delimiters, Segment};
pub use x12::specification::{
    CompositeSpecificationFinder, EmbeddedSpecificationFinder, FileSpecificationFinder,
    SpecificationFinder, TransactionSpecification,
};
pub use x12::transform::{TransformError, XmlTransform};
pub use x12::tree::{Interchange, NodeId, NodeKind};
pub use x12::warnings::SegmentWarning;
