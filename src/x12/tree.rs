//! Container tree for parsed interchanges
//!
//! One [`Interchange`] owns an arena of nodes; [`NodeId`] indices give
//! every node an upward parent reference without reference cycles. Child
//! lists interleave attached segments and child nodes in input order, so
//! serialization reproduces the wire exactly.
//!
//! The capability surface the parser dispatches on - loop container,
//! hierarchical loop container - is expressed as methods over the tagged
//! [`NodeKind`] variant rather than a class hierarchy: Transaction, Loop,
//! and HierarchicalLoop may host child loops; Transaction and
//! HierarchicalLoop may host `HL` children, filtered by level code.

use std::sync::Arc;

use crate::x12::formats;
use crate::x12::segment::{Delimiters, Segment};
use crate::x12::specification::{
    HierarchicalLoopSpecification, LoopSpecification, TransactionSpecification,
};

/// Index into an interchange's node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// The interchange root is always node 0.
const ROOT: NodeId = NodeId(0);

/// An ordered child: either a segment attached directly to this container
/// or a nested container.
#[derive(Debug, Clone)]
pub enum ChildItem {
    Segment(Segment),
    Node(NodeId),
}

#[derive(Debug, Clone)]
struct NodeData {
    parent: Option<NodeId>,
    children: Vec<ChildItem>,
    kind: NodeKind,
}

/// Container variants of the tree.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Root. Holds the ISA header and, once closed, the IEA trailer.
    /// `TA1` segments attach as direct children.
    Interchange { isa: Segment, iea: Option<Segment> },
    /// GS/GE pair.
    FunctionGroup { gs: Segment, ge: Option<Segment> },
    /// ST/SE pair. `spec` is `None` when the finder had no specification
    /// for the transaction set; such a transaction accepts any direct
    /// segment and opens no loops.
    Transaction {
        st: Segment,
        se: Option<Segment>,
        spec: Option<Arc<TransactionSpecification>>,
    },
    /// A named loop; its starting segment is the first child.
    Loop { spec: Arc<LoopSpecification> },
    /// An `HL` loop with its explicit identifier triple.
    HierarchicalLoop {
        spec: Arc<HierarchicalLoopSpecification>,
        id: String,
        parent_id: String,
        level_code: String,
    },
}

/// One parsed ISA/IEA envelope, owning its node arena.
#[derive(Debug, Clone)]
pub struct Interchange {
    delimiters: Delimiters,
    nodes: Vec<NodeData>,
}

impl Interchange {
    pub fn new(delimiters: Delimiters, isa: Segment) -> Self {
        Interchange {
            delimiters,
            nodes: vec![NodeData {
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Interchange { isa, iea: None },
            }],
        }
    }

    /// The delimiters this interchange was read with; serialization uses
    /// the same bytes.
    pub fn delimiters(&self) -> Delimiters {
        self.delimiters
    }

    pub fn root(&self) -> NodeId {
        ROOT
    }

    pub fn kind(&self, node: NodeId) -> &NodeKind {
        &self.nodes[node.index()].kind
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.index()].parent
    }

    pub fn children(&self, node: NodeId) -> &[ChildItem] {
        &self.nodes[node.index()].children
    }

    /// ISA13.
    pub fn interchange_control_number(&self) -> &str {
        match self.kind(ROOT) {
            NodeKind::Interchange { isa, .. } => isa.element(13),
            _ => "",
        }
    }

    pub fn isa_segment(&self) -> &Segment {
        match self.kind(ROOT) {
            NodeKind::Interchange { isa, .. } => isa,
            _ => unreachable!("root is always an interchange"),
        }
    }

    pub fn iea_segment(&self) -> Option<&Segment> {
        match self.kind(ROOT) {
            NodeKind::Interchange { iea, .. } => iea.as_ref(),
            _ => None,
        }
    }

    /// Function group nodes in document order.
    pub fn function_groups(&self) -> Vec<NodeId> {
        self.child_nodes_of_kind(ROOT, |kind| matches!(kind, NodeKind::FunctionGroup { .. }))
    }

    /// Transaction nodes of a group, in document order.
    pub fn transactions(&self, group: NodeId) -> Vec<NodeId> {
        self.child_nodes_of_kind(group, |kind| matches!(kind, NodeKind::Transaction { .. }))
    }

    fn child_nodes_of_kind(&self, node: NodeId, pred: impl Fn(&NodeKind) -> bool) -> Vec<NodeId> {
        self.children(node)
            .iter()
            .filter_map(|child| match child {
                ChildItem::Node(id) if pred(self.kind(*id)) => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// The segment that opened this container: ISA, GS, ST, or the
    /// starting segment of a loop.
    pub fn header_segment(&self, node: NodeId) -> Option<&Segment> {
        match self.kind(node) {
            NodeKind::Interchange { isa, .. } => Some(isa),
            NodeKind::FunctionGroup { gs, .. } => Some(gs),
            NodeKind::Transaction { st, .. } => Some(st),
            NodeKind::Loop { .. } | NodeKind::HierarchicalLoop { .. } => {
                self.children(node).iter().find_map(|child| match child {
                    ChildItem::Segment(s) => Some(s),
                    ChildItem::Node(_) => None,
                })
            }
        }
    }

    /// Loop id for diagnostics: `2300` for a plain loop, `2000B[2]` for a
    /// hierarchical loop with HL01 = 2.
    pub fn breadcrumb(&self, node: NodeId) -> String {
        match self.kind(node) {
            NodeKind::Loop { spec } => spec.loop_id.clone(),
            NodeKind::HierarchicalLoop { spec, id, .. } => format!("{}[{}]", spec.loop_id, id),
            NodeKind::Transaction { st, .. } => st.element(1).to_string(),
            NodeKind::FunctionGroup { .. } => "GS".to_string(),
            NodeKind::Interchange { .. } => "ISA".to_string(),
        }
    }

    // ------------------------------------------------------------------
    // Construction (used by the parser)
    // ------------------------------------------------------------------

    fn push_node(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NodeData {
            parent: Some(parent),
            children: Vec::new(),
            kind,
        });
        self.nodes[parent.index()].children.push(ChildItem::Node(id));
        id
    }

    pub fn add_function_group(&mut self, gs: Segment) -> NodeId {
        self.push_node(ROOT, NodeKind::FunctionGroup { gs, ge: None })
    }

    pub fn add_transaction(
        &mut self,
        group: NodeId,
        st: Segment,
        spec: Option<Arc<TransactionSpecification>>,
    ) -> NodeId {
        self.push_node(group, NodeKind::Transaction { st, se: None, spec })
    }

    /// Attach `segment` as a direct child if this container's specification
    /// lists it (`force` bypasses the check). On refusal the segment is
    /// handed back untouched and the container is not mutated.
    pub fn add_segment(
        &mut self,
        node: NodeId,
        segment: Segment,
        force: bool,
    ) -> Result<(), Segment> {
        if !force && !self.allows_direct_segment(node, segment.id()) {
            return Err(segment);
        }
        self.nodes[node.index()]
            .children
            .push(ChildItem::Segment(segment));
        Ok(())
    }

    fn allows_direct_segment(&self, node: NodeId, segment_id: &str) -> bool {
        match self.kind(node) {
            NodeKind::Interchange { .. } => segment_id == "TA1",
            NodeKind::FunctionGroup { .. } => false,
            NodeKind::Transaction { spec, .. } => spec
                .as_ref()
                .map(|s| s.allows_segment(segment_id))
                .unwrap_or(true),
            NodeKind::Loop { spec } => spec.allows_segment(segment_id),
            NodeKind::HierarchicalLoop { spec, .. } => spec.allows_segment(segment_id),
        }
    }

    /// If `segment` starts a child loop of this container per its
    /// specification, construct the loop with `segment` as its first
    /// segment and return its id. Otherwise the segment is handed back.
    pub fn add_loop(&mut self, node: NodeId, segment: Segment) -> Result<NodeId, Segment> {
        let spec = match self.find_child_loop_spec(node, &segment) {
            Some(spec) => spec,
            None => return Err(segment),
        };
        let loop_node = self.push_node(node, NodeKind::Loop { spec });
        self.nodes[loop_node.index()]
            .children
            .push(ChildItem::Segment(segment));
        Ok(loop_node)
    }

    fn find_child_loop_spec(
        &self,
        node: NodeId,
        segment: &Segment,
    ) -> Option<Arc<LoopSpecification>> {
        match self.kind(node) {
            NodeKind::Transaction { spec, .. } => {
                spec.as_ref().and_then(|s| s.find_loop(segment)).cloned()
            }
            NodeKind::Loop { spec } => spec.find_loop(segment).cloned(),
            NodeKind::HierarchicalLoop { spec, .. } => spec.find_loop(segment).cloned(),
            _ => None,
        }
    }

    /// Construct a hierarchical loop under `parent` with `segment` as its
    /// `HL` segment. The caller resolves the level specification first.
    pub fn add_hierarchical_loop(
        &mut self,
        parent: NodeId,
        segment: Segment,
        spec: Arc<HierarchicalLoopSpecification>,
    ) -> NodeId {
        let kind = NodeKind::HierarchicalLoop {
            spec,
            id: segment.element(1).to_string(),
            parent_id: segment.element(2).to_string(),
            level_code: segment.element(3).to_string(),
        };
        let node = self.push_node(parent, kind);
        self.nodes[node.index()]
            .children
            .push(ChildItem::Segment(segment));
        node
    }

    // ------------------------------------------------------------------
    // Capabilities
    // ------------------------------------------------------------------

    /// Containers that may host child loops.
    pub fn is_loop_container(&self, node: NodeId) -> bool {
        matches!(
            self.kind(node),
            NodeKind::Transaction { .. } | NodeKind::Loop { .. } | NodeKind::HierarchicalLoop { .. }
        )
    }

    /// Containers that may host `HL` children.
    pub fn is_hierarchical_container(&self, node: NodeId) -> bool {
        matches!(
            self.kind(node),
            NodeKind::Transaction { .. } | NodeKind::HierarchicalLoop { .. }
        )
    }

    pub fn allows_hierarchical_loop(&self, node: NodeId, level_code: &str) -> bool {
        self.find_hierarchical_spec(node, level_code).is_some()
    }

    pub fn has_hierarchical_specs(&self, node: NodeId) -> bool {
        match self.kind(node) {
            NodeKind::Transaction { spec, .. } => spec
                .as_ref()
                .map(|s| s.has_hierarchical_specs())
                .unwrap_or(false),
            NodeKind::HierarchicalLoop { spec, .. } => spec.has_hierarchical_specs(),
            _ => false,
        }
    }

    /// The level specification this container would give an `HL` child.
    /// Direct child levels win; descendant levels are still found so that
    /// re-rooted subtrees (unbundling) place under the transaction.
    pub fn find_hierarchical_spec(
        &self,
        node: NodeId,
        level_code: &str,
    ) -> Option<Arc<HierarchicalLoopSpecification>> {
        match self.kind(node) {
            NodeKind::Transaction { spec, .. } => spec
                .as_ref()
                .and_then(|s| s.find_hierarchical_recursive(level_code))
                .cloned(),
            NodeKind::HierarchicalLoop { spec, .. } => {
                spec.find_hierarchical_recursive(level_code).cloned()
            }
            _ => None,
        }
    }

    /// Record the closing trailer (IEA/GE/SE) of a framing container.
    pub fn set_trailer(&mut self, node: NodeId, segment: Segment) {
        match &mut self.nodes[node.index()].kind {
            NodeKind::Interchange { iea, .. } => *iea = Some(segment),
            NodeKind::FunctionGroup { ge, .. } => *ge = Some(segment),
            NodeKind::Transaction { se, .. } => *se = Some(segment),
            // loops have no trailer; they close implicitly
            NodeKind::Loop { .. } | NodeKind::HierarchicalLoop { .. } => {}
        }
    }

    // ------------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------------

    /// Every segment of the interchange in document order: header, child
    /// segments and subtrees as read, then the trailer if recorded.
    pub fn segments_in_order(&self) -> Vec<&Segment> {
        self.segments_from(ROOT)
    }

    /// Document-order segments of one subtree.
    pub fn segments_from(&self, node: NodeId) -> Vec<&Segment> {
        let mut out = Vec::new();
        self.collect_segments(node, &mut out);
        out
    }

    fn collect_segments<'a>(&'a self, node: NodeId, out: &mut Vec<&'a Segment>) {
        match self.kind(node) {
            NodeKind::Interchange { isa, .. } => out.push(isa),
            NodeKind::FunctionGroup { gs, .. } => out.push(gs),
            NodeKind::Transaction { st, .. } => out.push(st),
            // a loop's starting segment lives in its child list
            NodeKind::Loop { .. } | NodeKind::HierarchicalLoop { .. } => {}
        }
        for child in self.children(node) {
            match child {
                ChildItem::Segment(s) => out.push(s),
                ChildItem::Node(n) => self.collect_segments(*n, out),
            }
        }
        match self.kind(node) {
            NodeKind::Interchange { iea: Some(iea), .. } => out.push(iea),
            NodeKind::FunctionGroup { ge: Some(ge), .. } => out.push(ge),
            NodeKind::Transaction { se: Some(se), .. } => out.push(se),
            _ => {}
        }
    }

    /// Serialize to wire form with this interchange's own delimiters.
    pub fn serialize(&self) -> String {
        formats::serialize_interchange(self)
    }
}
