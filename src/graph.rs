//! Backbone traits shared by every graph layer.
//!
//! Any graph that the constraint checker or the evaluator walks exposes its nodes through
//! `InnerGraph`, and every node exposes its edges and its embedded sub-graphs through `Node`.
use std::fmt::Debug;
use std::hash::Hash;

/// Node within a graph. Carries op kind and its interface to links.
pub trait Node<LinkIdT: Clone + Eq + Hash + Debug> {
    type OpKind: Debug;
    type SubGraph;

    fn op_kind(&self) -> Self::OpKind;
    /// Incoming link handles in input index order.
    fn inputs(&self) -> Box<dyn Iterator<Item = LinkIdT> + '_>;
    /// Outgoing link handles in output index order.
    fn outputs(&self) -> Box<dyn Iterator<Item = LinkIdT> + '_>;
    /// Graphs embedded in this node (function bodies, branches), keyed by attribute name.
    fn sub_graphs(&self) -> Vec<(&'static str, &Self::SubGraph)> {
        vec![]
    }
}

/// The inner structure of a graph: nodes and links, plus IO interface.
pub trait InnerGraph {
    type NodeId: Clone + Eq + Hash + Debug;
    type LinkId: Clone + Eq + Hash + Debug;
    type AnyNode: Node<Self::LinkId>;

    /// Deterministic iteration over nodes.
    fn nodes(&self) -> Box<dyn Iterator<Item = Self::NodeId> + '_>;
    fn get_node(&self, id: &Self::NodeId) -> Option<&Self::AnyNode>;

    /// Positional parameters and results.
    fn input_links(&self) -> Box<dyn Iterator<Item = Self::LinkId> + '_>;
    fn output_links(&self) -> Box<dyn Iterator<Item = Self::LinkId> + '_>;
}
