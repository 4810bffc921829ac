use crate::computation_graph::ops::OpKind;
use crate::computation_graph::{ComputationGraph, GraphBody, NodePath};
use crate::device::DeviceSpec;
use crate::execution_mode::{ExecutionModeContext, ReducePlacementPolicy};
use crate::graph::{InnerGraph, Node};

/// A computation contains an operation that cannot run under the active execution mode.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ConstraintViolation {
    pub op_kind: OpKind,
    pub node_paths: Vec<NodePath>,
    pub message: String,
}

struct ReduceNode {
    path: NodePath,
    device: Option<DeviceSpec>,
}

fn collect_reduce_nodes(body: &GraphBody, scope: &NodePath, found: &mut Vec<ReduceNode>) {
    for node_id in body.nodes() {
        let Some(node) = body.get_node(&node_id) else {
            continue;
        };
        let path = scope.join(&node.name);
        if node.op_kind() == OpKind::ReduceDataset {
            found.push(ReduceNode {
                path: path.clone(),
                device: node.device,
            });
        }
        for (attribute, sub_graph) in node.sub_graphs() {
            collect_reduce_nodes(sub_graph, &path.join(attribute), found);
        }
    }
}

/// Every dataset reduce node in the graph, including those nested in function bodies,
/// in a deterministic order.
pub fn find_dataset_reduce_nodes(graph: &ComputationGraph) -> Vec<NodePath> {
    let mut found = Vec::new();
    collect_reduce_nodes(graph.root(), &NodePath::root(), &mut found);
    found.into_iter().map(|x| x.path).collect()
}

/// Rejects computations containing a dataset reduce when the session runs in
/// multi-device mode. Single-device sessions accept every graph.
pub fn check(
    graph: &ComputationGraph,
    context: &ExecutionModeContext,
) -> Result<(), ConstraintViolation> {
    if !context.is_multi_device() {
        return Ok(());
    }
    let mut found = Vec::new();
    collect_reduce_nodes(graph.root(), &NodePath::root(), &mut found);

    let offending: Vec<NodePath> = found
        .into_iter()
        .filter(|x| match context.reduce_policy() {
            ReducePlacementPolicy::Strict => true,
            ReducePlacementPolicy::AllowPinnedNodes => !x
                .device
                .is_some_and(|device| context.topology().contains(&device)),
        })
        .map(|x| x.path)
        .collect();
    log::debug!(
        "Checked graph \"{}\": {} offending dataset reduce node(s)",
        graph.root().name(),
        offending.len()
    );
    if offending.is_empty() {
        return Ok(());
    }

    let locations = offending
        .iter()
        .map(|x| x.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Err(ConstraintViolation {
        op_kind: OpKind::ReduceDataset,
        message: format!(
            "Detected dataset reduce op in multi-device simulation ({locations}). \
             {} is incompatible with multi-device execution because its result \
             depends on the order in which elements are folded.",
            OpKind::ReduceDataset
        ),
        node_paths: offending,
    })
}
