//! Structural parser and loop-resolution engine
//!
//! [`X12Parser`] walks the framed segment stream and rebuilds the
//! envelope -> functional group -> transaction nesting. Framing segments
//! (ISA/IEA, GS/GE, ST/SE, TA1) dispatch directly; `HL` segments run the
//! hierarchical placement algorithm; everything else runs detail
//! placement, which searches upward from the open container for the
//! deepest container whose specification accepts the segment, entering a
//! new loop when the segment is a loop starter.
//!
//! X12 loop boundaries are implicit - a segment that belongs to a sibling
//! or outer loop closes the current one. The upward walk discovers those
//! implicit closes while preserving the ability to descend via loop entry,
//! and the loop ids walked past become breadcrumbs in diagnostics.
//!
//! Structural errors accumulate; a non-empty list at end of stream fails
//! the parse as one aggregate error. In lenient mode misidentified
//! segments are force-attached to the container that was open before the
//! walk, and a warning event fires instead.

use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use crate::x12::errors::{StructuralError, TransactionContext, X12ParseError};
use crate::x12::reader::{ReaderError, X12StreamReader};
use crate::x12::segment::{Delimiters, Segment};
use crate::x12::specification::{EmbeddedSpecificationFinder, SpecificationFinder};
use crate::x12::transform::XmlTransform;
use crate::x12::tree::{Interchange, NodeId, NodeKind};
use crate::x12::warnings::{SegmentWarning, WarningHandler};

/// Parser behavior knobs.
#[derive(Debug, Clone)]
pub struct ParserOptions {
    /// Strict mode records structural errors for anomalies; lenient mode
    /// downgrades the recoverable ones to warnings and keeps the segment.
    pub strict: bool,
    /// Bytes silently skipped between and inside segments, typically CR
    /// and LF.
    pub ignored_chars: Vec<u8>,
}

impl Default for ParserOptions {
    fn default() -> Self {
        ParserOptions {
            strict: true,
            ignored_chars: Vec::new(),
        }
    }
}

impl ParserOptions {
    /// Lenient options with CR/LF skipped, the common tolerant setup.
    pub fn lenient() -> Self {
        ParserOptions {
            strict: false,
            ignored_chars: vec![b'\r', b'\n'],
        }
    }
}

/// The structural parser. One instance may run many parses; each parse
/// owns its reader and tree exclusively.
pub struct X12Parser {
    options: ParserOptions,
    finder: Arc<dyn SpecificationFinder>,
    warning_handler: Option<WarningHandler>,
}

impl X12Parser {
    /// Parser over the embedded specification catalog.
    pub fn new(options: ParserOptions) -> Self {
        X12Parser::with_finder(options, Arc::new(EmbeddedSpecificationFinder))
    }

    pub fn with_finder(options: ParserOptions, finder: Arc<dyn SpecificationFinder>) -> Self {
        X12Parser {
            options,
            finder,
            warning_handler: None,
        }
    }

    /// Register the warning subscriber. Handlers run synchronously on the
    /// parsing thread and must not re-enter the parser.
    pub fn on_warning<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&SegmentWarning) + Send + 'static,
    {
        self.warning_handler = Some(Box::new(handler));
        self
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// Parse every interchange in the stream. An empty stream yields an
    /// empty list; a non-`ISA` prefix fails immediately; structural
    /// anomalies accumulate and fail the parse together at end of stream.
    pub fn parse_multiple<R: Read>(&mut self, input: R) -> Result<Vec<Interchange>, X12ParseError> {
        let mut reader = match X12StreamReader::new(input, &self.options.ignored_chars) {
            Ok(reader) => reader,
            Err(ReaderError::EmptyStream) => return Ok(Vec::new()),
            Err(ReaderError::MalformedHeader(msg)) => {
                return Err(X12ParseError::MalformedHeader(msg))
            }
            Err(ReaderError::Io(err)) => return Err(X12ParseError::Io(err)),
        };

        let mut run = ParseRun::new(
            self.finder.as_ref(),
            self.options.strict,
            self.warning_handler.as_mut(),
        );

        let mut text = reader.current_isa_segment().to_string();
        while !text.is_empty() {
            run.dispatch(reader.delimiters(), text);
            text = match reader.read_next_segment() {
                Ok(next) => next,
                Err(ReaderError::MalformedHeader(msg)) => {
                    return Err(X12ParseError::MalformedHeader(msg))
                }
                Err(ReaderError::Io(err)) => return Err(X12ParseError::Io(err)),
                Err(ReaderError::EmptyStream) => String::new(),
            };
        }

        if run.errors.is_empty() {
            Ok(run.interchanges)
        } else {
            Err(X12ParseError::Structural(run.errors))
        }
    }

    /// Convenience over the bytes of a string.
    pub fn parse_multiple_str(&mut self, text: &str) -> Result<Vec<Interchange>, X12ParseError> {
        self.parse_multiple(text.as_bytes())
    }

    /// Apply the XML collaborator transform, then parse the X12 text it
    /// produced.
    pub fn transform_to_x12(
        &mut self,
        xml: &str,
        transform: &dyn XmlTransform,
    ) -> Result<Vec<Interchange>, X12ParseError> {
        let x12 = transform.apply(xml).map_err(X12ParseError::Transform)?;
        self.parse_multiple_str(&x12)
    }
}

/// Mutable state of one parse.
struct ParseRun<'a> {
    finder: &'a dyn SpecificationFinder,
    strict: bool,
    handler: Option<&'a mut WarningHandler>,
    interchanges: Vec<Interchange>,
    errors: Vec<StructuralError>,
    /// True between ISA and its IEA.
    open_interchange: bool,
    group: Option<NodeId>,
    transaction: Option<NodeId>,
    /// The open insertion point; `Some` whenever an interchange is open.
    container: Option<NodeId>,
    /// HL01 -> node, scoped to the current transaction.
    hloops: HashMap<String, NodeId>,
    /// 1-based, reset at each ST.
    segment_index: usize,
    interchange_control_number: String,
    group_control_number: String,
    transaction_control_number: String,
    transaction_code: String,
}

impl<'a> ParseRun<'a> {
    fn new(
        finder: &'a dyn SpecificationFinder,
        strict: bool,
        handler: Option<&'a mut WarningHandler>,
    ) -> Self {
        ParseRun {
            finder,
            strict,
            handler,
            interchanges: Vec::new(),
            errors: Vec::new(),
            open_interchange: false,
            group: None,
            transaction: None,
            container: None,
            hloops: HashMap::new(),
            segment_index: 0,
            interchange_control_number: String::new(),
            group_control_number: String::new(),
            transaction_control_number: String::new(),
            transaction_code: String::new(),
        }
    }

    fn dispatch(&mut self, delimiters: Delimiters, text: String) {
        let segment = Segment::new(text, &delimiters);
        let id = segment.id().to_string();
        if self.transaction.is_some() {
            self.segment_index += 1;
        }
        match id.as_str() {
            "ISA" => self.start_interchange(delimiters, segment),
            "IEA" => self.close_interchange(segment),
            "GS" => self.start_function_group(segment),
            "GE" => self.close_function_group(segment),
            "ST" => self.start_transaction(segment),
            "SE" => self.close_transaction(segment),
            "TA1" => self.attach_ta1(segment),
            "HL" => self.place_hierarchical_loop(segment),
            _ => self.place_detail(segment),
        }
    }

    fn start_interchange(&mut self, delimiters: Delimiters, isa: Segment) {
        self.interchange_control_number = isa.element(13).to_string();
        let tree = Interchange::new(delimiters, isa);
        let root = tree.root();
        self.interchanges.push(tree);
        self.open_interchange = true;
        self.group = None;
        self.transaction = None;
        self.container = Some(root);
        self.hloops.clear();
        self.group_control_number.clear();
        self.transaction_control_number.clear();
        self.transaction_code.clear();
    }

    fn close_interchange(&mut self, segment: Segment) {
        if !self.open_interchange {
            self.errors.push(StructuralError::MismatchSegment {
                segment_id: "IEA".to_string(),
                segment: segment.value().to_string(),
            });
            return;
        }
        if let Some(tree) = self.interchanges.last_mut() {
            let root = tree.root();
            tree.set_trailer(root, segment);
        }
        self.open_interchange = false;
        self.group = None;
        self.transaction = None;
        self.container = None;
    }

    fn start_function_group(&mut self, gs: Segment) {
        if !self.open_interchange {
            self.errors.push(StructuralError::MissingPrecedingSegment {
                segment_id: "GS".to_string(),
                expected: "ISA".to_string(),
                segment: gs.value().to_string(),
            });
            return;
        }
        self.group_control_number = gs.element(6).to_string();
        if let Some(tree) = self.interchanges.last_mut() {
            let group = tree.add_function_group(gs);
            self.group = Some(group);
            self.container = Some(group);
        }
    }

    fn close_function_group(&mut self, segment: Segment) {
        let group = match self.group {
            Some(group) => group,
            None => {
                self.errors.push(StructuralError::MismatchSegment {
                    segment_id: "GE".to_string(),
                    segment: segment.value().to_string(),
                });
                return;
            }
        };
        if let Some(tree) = self.interchanges.last_mut() {
            tree.set_trailer(group, segment);
            self.container = Some(tree.root());
        }
        self.group = None;
        self.transaction = None;
    }

    fn start_transaction(&mut self, st: Segment) {
        let group = match self.group {
            Some(group) => group,
            None => {
                self.errors.push(StructuralError::MissingGsSegment {
                    segment: st.value().to_string(),
                });
                return;
            }
        };
        self.transaction_code = st.element(1).to_string();
        self.transaction_control_number = st.element(2).to_string();

        let (functional_group, version) = match self.interchanges.last() {
            Some(tree) => match tree.header_segment(group) {
                Some(gs) => (gs.element(1).to_string(), gs.element(8).to_string()),
                None => (String::new(), String::new()),
            },
            None => (String::new(), String::new()),
        };
        let spec =
            self.finder
                .find_transaction_spec(&functional_group, &version, &self.transaction_code);

        if let Some(tree) = self.interchanges.last_mut() {
            let txn = tree.add_transaction(group, st, spec);
            self.transaction = Some(txn);
            self.container = Some(txn);
        }
        self.segment_index = 1;
        self.hloops.clear();
    }

    fn close_transaction(&mut self, segment: Segment) {
        let txn = match self.transaction {
            Some(txn) => txn,
            None => {
                self.errors.push(StructuralError::MismatchSegment {
                    segment_id: "SE".to_string(),
                    segment: segment.value().to_string(),
                });
                return;
            }
        };
        if let Some(tree) = self.interchanges.last_mut() {
            tree.set_trailer(txn, segment);
            self.container = Some(self.group.unwrap_or(tree.root()));
        }
        self.transaction = None;
        self.hloops.clear();
    }

    fn attach_ta1(&mut self, segment: Segment) {
        if !self.open_interchange {
            self.errors.push(StructuralError::MissingPrecedingSegment {
                segment_id: "TA1".to_string(),
                expected: "ISA".to_string(),
                segment: segment.value().to_string(),
            });
            return;
        }
        if let Some(tree) = self.interchanges.last_mut() {
            let root = tree.root();
            // the interchange always lists TA1 as a direct child
            let _ = tree.add_segment(root, segment, false);
        }
    }

    /// HL placement: ascend to a container accepting the level code, then
    /// attach under the explicit parent (HL02) when it exists, or at the
    /// nearest container hosting hierarchical specs otherwise.
    fn place_hierarchical_loop(&mut self, segment: Segment) {
        if self.transaction.is_none() {
            self.errors.push(StructuralError::MissingPrecedingSegment {
                segment_id: "HL".to_string(),
                expected: "ST".to_string(),
                segment: segment.value().to_string(),
            });
            return;
        }
        let hl_id = segment.element(1).to_string();
        let parent_id = segment.element(2).to_string();
        let level_code = segment.element(3).to_string();

        // Step 1: ascend until a hierarchical container accepts the level.
        let anchor = {
            let tree = match self.interchanges.last() {
                Some(tree) => tree,
                None => return,
            };
            let mut node = match self.container {
                Some(node) => node,
                None => tree.root(),
            };
            loop {
                if tree.is_hierarchical_container(node)
                    && tree.allows_hierarchical_loop(node, &level_code)
                {
                    break Some(node);
                }
                match tree.parent(node) {
                    Some(parent) => node = parent,
                    None => break None,
                }
            }
        };
        let anchor = match anchor {
            Some(anchor) => anchor,
            None => {
                self.errors.push(StructuralError::InvalidHLoopSpecification {
                    hl_id,
                    level_code,
                });
                return;
            }
        };

        // Step 2: explicit parent reference.
        let mut attach = None;
        if !parent_id.is_empty() {
            match self.hloops.get(&parent_id) {
                Some(&parent_node) => attach = Some(parent_node),
                None if self.strict => {
                    self.errors.push(StructuralError::MissingParentId {
                        hl_id,
                        parent_id,
                    });
                    return;
                }
                None => {
                    let message = format!(
                        "HL {} references parent id {} which was not seen; attaching at the nearest hierarchical container",
                        hl_id, parent_id
                    );
                    self.emit_warning("HL", segment.value(), message);
                }
            }
        }
        // Step 3: the anchor already hosts hierarchical specs for this
        // level, so it is the default parent.
        let attach = attach.unwrap_or(anchor);

        let spec = {
            let tree = match self.interchanges.last() {
                Some(tree) => tree,
                None => return,
            };
            tree.find_hierarchical_spec(attach, &level_code)
                .or_else(|| tree.find_hierarchical_spec(anchor, &level_code))
        };
        let spec = match spec {
            Some(spec) => spec,
            None => {
                self.errors.push(StructuralError::InvalidHLoopSpecification {
                    hl_id,
                    level_code,
                });
                return;
            }
        };

        // Step 4: duplicate HL01 is rejected without touching the tree.
        if self.hloops.contains_key(&hl_id) {
            self.errors
                .push(StructuralError::HLoopIdExists { hl_id });
            return;
        }

        if let Some(tree) = self.interchanges.last_mut() {
            let node = tree.add_hierarchical_loop(attach, segment, spec);
            self.hloops.insert(hl_id, node);
            self.container = Some(node);
        }
    }

    /// Detail placement: walk upward from the open container trying direct
    /// attachment, then loop entry, at each level. Reaching the
    /// transaction without a placement is the failure case.
    fn place_detail(&mut self, segment: Segment) {
        if !self.open_interchange {
            self.errors.push(StructuralError::MissingPrecedingSegment {
                segment_id: segment.id().to_string(),
                expected: "ISA".to_string(),
                segment: segment.value().to_string(),
            });
            return;
        }
        let original = match (self.transaction, self.container) {
            (Some(_), Some(container)) => container,
            _ => {
                self.errors.push(StructuralError::MissingPrecedingSegment {
                    segment_id: segment.id().to_string(),
                    expected: "ST".to_string(),
                    segment: segment.value().to_string(),
                });
                return;
            }
        };

        let mut breadcrumbs: Vec<String> = Vec::new();
        let mut node = original;
        let mut segment = segment;
        loop {
            let is_loop_end = segment.id() == "LE";
            let tree = match self.interchanges.last_mut() {
                Some(tree) => tree,
                None => return,
            };

            // (a) direct attachment at this level
            segment = match tree.add_segment(node, segment, false) {
                Ok(()) => {
                    // LE closes the loop it was attached to
                    self.container = Some(if is_loop_end {
                        tree.parent(node).unwrap_or(node)
                    } else {
                        node
                    });
                    return;
                }
                Err(rejected) => rejected,
            };

            // (b) loop entry at this level
            if tree.is_loop_container(node) {
                segment = match tree.add_loop(node, segment) {
                    Ok(new_loop) => {
                        self.container = Some(new_loop);
                        return;
                    }
                    Err(rejected) => rejected,
                };
            }

            // (c) every intermediate loop exhausted
            if matches!(tree.kind(node), NodeKind::Transaction { .. }) {
                if self.strict {
                    self.errors.push(StructuralError::SegmentCannotBeIdentified(
                        TransactionContext {
                            transaction_code: self.transaction_code.clone(),
                            control_number: self.transaction_control_number.clone(),
                            segment_index: self.segment_index,
                            segment: segment.value().to_string(),
                            breadcrumbs,
                        },
                    ));
                } else {
                    let segment_id = segment.id().to_string();
                    let segment_value = segment.value().to_string();
                    let last_loop = breadcrumbs.first().cloned().unwrap_or_default();
                    let _ = tree.add_segment(original, segment, true);
                    self.container = Some(original);
                    let message = if breadcrumbs.is_empty() {
                        format!("Segment {} could not be identified; attached to the transaction", segment_id)
                    } else {
                        format!(
                            "Segment {} could not be identified; attached to loop {} (searched {})",
                            segment_id,
                            last_loop,
                            breadcrumbs.join(" -> ")
                        )
                    };
                    self.emit_warning(&segment_id, &segment_value, message);
                }
                return;
            }

            // (d) remember the loop we walked past and ascend
            breadcrumbs.push(tree.breadcrumb(node));
            match tree.parent(node) {
                Some(parent) => node = parent,
                None => {
                    self.errors.push(StructuralError::MissingPrecedingSegment {
                        segment_id: segment.id().to_string(),
                        expected: "ST".to_string(),
                        segment: segment.value().to_string(),
                    });
                    return;
                }
            }
        }
    }

    fn emit_warning(&mut self, segment_id: &str, segment: &str, message: String) {
        if let Some(handler) = self.handler.as_mut() {
            let warning = SegmentWarning {
                interchange_control_number: self.interchange_control_number.clone(),
                group_control_number: self.group_control_number.clone(),
                transaction_control_number: self.transaction_control_number.clone(),
                segment_index: self.segment_index,
                segment_id: segment_id.to_string(),
                segment: segment.to_string(),
                message,
                file_is_valid: false,
            };
            (handler)(&warning);
        }
    }
}
