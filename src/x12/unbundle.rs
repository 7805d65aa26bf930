//! Unbundling: splitting an interchange along transaction or loop
//! boundaries
//!
//! Both operations synthesize wire text from the source tree (reusing its
//! envelope segments) and round-trip it through the parser, so every
//! output satisfies the same invariants as a freshly parsed interchange.

use crate::x12::errors::X12ParseError;
use crate::x12::formats;
use crate::x12::parser::X12Parser;
use crate::x12::segment::Segment;
use crate::x12::tree::{ChildItem, Interchange, NodeId, NodeKind};

impl X12Parser {
    /// One output interchange per transaction, each wrapped in copies of
    /// the original ISA/GS/GE/IEA framing. Output order is document order.
    pub fn unbundle_by_transaction(
        &mut self,
        interchange: &Interchange,
    ) -> Result<Vec<Interchange>, X12ParseError> {
        let terminator = interchange.delimiters().segment_terminator;
        let mut outputs = Vec::new();
        for group in interchange.function_groups() {
            for txn in interchange.transactions(group) {
                let mut segments: Vec<&Segment> = vec![interchange.isa_segment()];
                if let Some(gs) = interchange.header_segment(group) {
                    segments.push(gs);
                }
                segments.extend(interchange.segments_from(txn));
                if let NodeKind::FunctionGroup { ge: Some(ge), .. } = interchange.kind(group) {
                    segments.push(ge);
                }
                if let Some(iea) = interchange.iea_segment() {
                    segments.push(iea);
                }
                let text = formats::serialize_segments(segments, terminator);
                outputs.extend(self.parse_multiple_str(&text)?);
            }
        }
        Ok(outputs)
    }

    /// One output interchange per maximal hierarchical subtree whose loop
    /// specification id equals `loop_id`. Each output transaction carries
    /// the ST header and the transaction's leading non-hierarchical detail
    /// as upstream context, then the subtree's segments in document order.
    /// Ancestor HL segments are not carried; the subtree root's parent
    /// reference (HL02) is cleared so the output reparses cleanly.
    pub fn unbundle_by_loop(
        &mut self,
        interchange: &Interchange,
        loop_id: &str,
    ) -> Result<Vec<Interchange>, X12ParseError> {
        let terminator = interchange.delimiters().segment_terminator;
        let mut outputs = Vec::new();
        for group in interchange.function_groups() {
            for txn in interchange.transactions(group) {
                let context = leading_context(interchange, txn);
                let mut subtree_roots = Vec::new();
                collect_matching_subtrees(interchange, txn, loop_id, &mut subtree_roots);

                for root in subtree_roots {
                    let mut subtree: Vec<Segment> = interchange
                        .segments_from(root)
                        .into_iter()
                        .cloned()
                        .collect();
                    if let Some(first) = subtree.first_mut() {
                        if first.id() == "HL" {
                            first.set_element(2, "");
                        }
                    }

                    let mut segments: Vec<Segment> = vec![interchange.isa_segment().clone()];
                    if let Some(gs) = interchange.header_segment(group) {
                        segments.push(gs.clone());
                    }
                    segments.extend(context.iter().cloned());
                    segments.extend(subtree);
                    if let NodeKind::Transaction { se: Some(se), .. } = interchange.kind(txn) {
                        segments.push(se.clone());
                    }
                    if let NodeKind::FunctionGroup { ge: Some(ge), .. } = interchange.kind(group) {
                        segments.push(ge.clone());
                    }
                    if let Some(iea) = interchange.iea_segment() {
                        segments.push(iea.clone());
                    }

                    let text = formats::serialize_segments(segments.iter(), terminator);
                    outputs.extend(self.parse_multiple_str(&text)?);
                }
            }
        }
        Ok(outputs)
    }
}

/// The ST header plus everything in the transaction's child list before
/// the first hierarchical loop: direct segments and whole plain-loop
/// subtrees (submitter/receiver name loops and the like).
fn leading_context(interchange: &Interchange, txn: NodeId) -> Vec<Segment> {
    let mut context = Vec::new();
    if let Some(st) = interchange.header_segment(txn) {
        context.push(st.clone());
    }
    for child in interchange.children(txn) {
        match child {
            ChildItem::Segment(segment) => context.push(segment.clone()),
            ChildItem::Node(node) => match interchange.kind(*node) {
                NodeKind::HierarchicalLoop { .. } => break,
                _ => context.extend(interchange.segments_from(*node).into_iter().cloned()),
            },
        }
    }
    context
}

/// Maximal matching subtrees in document order: a matching node is taken
/// whole, without descending into it.
fn collect_matching_subtrees(
    interchange: &Interchange,
    node: NodeId,
    loop_id: &str,
    out: &mut Vec<NodeId>,
) {
    for child in interchange.children(node) {
        if let ChildItem::Node(child_node) = child {
            let is_match = match interchange.kind(*child_node) {
                NodeKind::HierarchicalLoop { spec, .. } => spec.loop_id == loop_id,
                _ => false,
            };
            if is_match {
                out.push(*child_node);
            } else {
                collect_matching_subtrees(interchange, *child_node, loop_id, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x12::parser::ParserOptions;

    const ISA: &str = "ISA*00*          *00*          *ZZ*SENDER         *ZZ*RECEIVER       \
*040101*1200*U*00401*000000905*0*P*:~";
    const GS: &str = "GS*HC*SENDER*RECEIVER*20040101*1200*612200041*X*004010X098A1~";

    fn two_subscriber_input() -> String {
        format!(
            "{}{}ST*837*0001~BHT*0019*00*0123*20040101*1200*CH~\
NM1*41*2*PREMIER BILLING*****46*TGJ23~NM1*40*2*KEY INSURANCE*****46*66783JJT~\
HL*1**20*1~NM1*85*2*PROVIDER~\
HL*2*1*22*0~SBR*P*18*******CI~NM1*IL*1*DOE*JANE****MI*111~\
CLM*CLAIM1*500***11::1*Y*A*Y*Y*C~\
HL*3*1*22*0~SBR*P*18*******CI~NM1*IL*1*DOE*JOHN****MI*222~\
CLM*CLAIM2*300***11::1*Y*A*Y*Y*C~\
SE*14*0001~GE*1*612200041~IEA*1*000000905~",
            ISA, GS
        )
    }

    #[test]
    fn test_unbundle_by_transaction_wraps_each_st() {
        let mut parser = X12Parser::new(ParserOptions::default());
        let text = format!(
            "{}{}ST*837*0001~BHT*0019*00*A*20040101*1200*CH~SE*3*0001~\
ST*837*0002~BHT*0019*00*B*20040101*1200*CH~SE*3*0002~GE*2*612200041~IEA*1*000000905~",
            ISA, GS
        );
        let source = parser.parse_multiple_str(&text).unwrap().remove(0);
        let outputs = parser.unbundle_by_transaction(&source).unwrap();
        assert_eq!(outputs.len(), 2);
        for (output, control) in outputs.iter().zip(["0001", "0002"]) {
            let groups = output.function_groups();
            assert_eq!(groups.len(), 1);
            let txns = output.transactions(groups[0]);
            assert_eq!(txns.len(), 1);
            let st = output.header_segment(txns[0]).unwrap();
            assert_eq!(st.element(2), control);
        }
    }

    #[test]
    fn test_unbundle_by_loop_splits_subscribers() {
        let mut parser = X12Parser::new(ParserOptions::default());
        let source = parser
            .parse_multiple_str(&two_subscriber_input())
            .unwrap()
            .remove(0);
        let outputs = parser.unbundle_by_loop(&source, "2000B").unwrap();
        assert_eq!(outputs.len(), 2);

        for (output, claim) in outputs.iter().zip(["CLAIM1", "CLAIM2"]) {
            let serialized = output.serialize();
            assert!(serialized.contains(claim));
            // ancestor HL (billing provider, level 20) is not carried
            assert!(!serialized.contains("HL*1**20"));
            // upstream context is carried
            assert!(serialized.contains("BHT*0019"));
            assert!(serialized.contains("NM1*41*2*PREMIER BILLING"));
        }
        // each claim appears in exactly one output
        assert!(!outputs[0].serialize().contains("CLAIM2"));
        assert!(!outputs[1].serialize().contains("CLAIM1"));
    }

    #[test]
    fn test_unbundle_by_loop_clears_parent_reference() {
        let mut parser = X12Parser::new(ParserOptions::default());
        let source = parser
            .parse_multiple_str(&two_subscriber_input())
            .unwrap()
            .remove(0);
        let outputs = parser.unbundle_by_loop(&source, "2000B").unwrap();
        // HL*2*1*22 became HL*2**22 so the output parses with no dangling
        // parent even in strict mode
        assert!(outputs[0].serialize().contains("HL*2**22"));
    }

    #[test]
    fn test_unbundle_by_loop_without_matches_is_empty() {
        let mut parser = X12Parser::new(ParserOptions::default());
        let source = parser
            .parse_multiple_str(&two_subscriber_input())
            .unwrap()
            .remove(0);
        let outputs = parser.unbundle_by_loop(&source, "2000C").unwrap();
        assert!(outputs.is_empty());
    }
}
