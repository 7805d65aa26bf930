//! Warning events for lenient parsing
//!
//! In lenient mode the parser downgrades recoverable anomalies to warning
//! events instead of recording errors. The handler is a plain callback
//! injected at parser construction, invoked synchronously on the parsing
//! thread before parsing continues. Handlers must not retain references
//! into the partial tree and must not re-enter the parser.

use std::fmt;

/// One warning raised during a lenient parse.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentWarning {
    /// ISA13 of the interchange being parsed.
    pub interchange_control_number: String,
    /// GS06 of the open functional group, empty if none.
    pub group_control_number: String,
    /// ST02 of the open transaction, empty if none.
    pub transaction_control_number: String,
    /// 1-based index of the segment within its transaction.
    pub segment_index: usize,
    pub segment_id: String,
    /// The segment string as read from the wire.
    pub segment: String,
    pub message: String,
    /// False when the anomaly means the file would fail a strict parse.
    pub file_is_valid: bool,
}

impl fmt::Display for SegmentWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}/{}/{}] segment {} ({}): {}",
            self.interchange_control_number,
            self.group_control_number,
            self.transaction_control_number,
            self.segment_index,
            self.segment_id,
            self.message
        )
    }
}

/// Warning subscriber. Single subscriber per parser.
pub type WarningHandler = Box<dyn FnMut(&SegmentWarning) + Send>;
