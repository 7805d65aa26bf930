//! Serialization of container trees back to wire form
//!
//! Serialization is the reverse of framing: walk the tree in document
//! order and emit each retained segment string followed by the
//! interchange's own segment terminator. For canonical well-formed input
//! the output is byte-for-byte identical to what was read.
//!
//! [`to_tree_string`] renders the container structure for diagnostics.

use crate::x12::segment::Segment;
use crate::x12::tree::{ChildItem, Interchange, NodeId, NodeKind};

/// Emit the interchange with the delimiters it was read with. Trailers
/// never recorded (unclosed structures from a lenient parse) are omitted.
pub fn serialize_interchange(interchange: &Interchange) -> String {
    let terminator = interchange.delimiters().segment_terminator as char;
    let segments = interchange.segments_in_order();
    let mut out = String::with_capacity(
        segments.iter().map(|s| s.value().len() + 1).sum::<usize>(),
    );
    for segment in segments {
        out.push_str(segment.value());
        out.push(terminator);
    }
    out
}

/// Emit an arbitrary segment sequence with a terminator. Unbundling uses
/// this to synthesize envelope text before reparsing.
pub fn serialize_segments<'a>(
    segments: impl IntoIterator<Item = &'a Segment>,
    terminator: u8,
) -> String {
    let terminator = terminator as char;
    let mut out = String::new();
    for segment in segments {
        out.push_str(segment.value());
        out.push(terminator);
    }
    out
}

/// Indented rendering of the container structure, one line per container
/// or segment. Intended for diagnostics and test output, not round-trips.
pub fn to_tree_string(interchange: &Interchange) -> String {
    let mut out = String::new();
    render_node(interchange, interchange.root(), 0, &mut out);
    out
}

fn render_node(tree: &Interchange, node: NodeId, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    let label = match tree.kind(node) {
        NodeKind::Interchange { isa, .. } => format!("Interchange {}", isa.element(13)),
        NodeKind::FunctionGroup { gs, .. } => format!("FunctionGroup {}", gs.element(6)),
        NodeKind::Transaction { st, .. } => {
            format!("Transaction {} {}", st.element(1), st.element(2))
        }
        NodeKind::Loop { spec } => format!("Loop {}", spec.loop_id),
        NodeKind::HierarchicalLoop { spec, id, level_code, .. } => {
            format!("HLoop {} id={} level={}", spec.loop_id, id, level_code)
        }
    };
    out.push_str(&format!("{}{}\n", indent, label));
    for child in tree.children(node) {
        match child {
            ChildItem::Segment(s) => out.push_str(&format!("{}  {}\n", indent, s.id())),
            ChildItem::Node(n) => render_node(tree, *n, depth + 1, out),
        }
    }
}
