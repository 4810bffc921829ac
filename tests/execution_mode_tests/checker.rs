use crate::execution_mode_tests::{
    map_graph, reduce_graph, reduce_in_call_graph, reduce_in_if_graph, reduce_in_map_graph,
    reduce_in_while_graph,
};
use replica_executor::computation_graph::ops::OpKind;
use replica_executor::{
    ComputationGraph, ExecutionModeContext, ReducePlacementPolicy, check, find_dataset_reduce_nodes,
};
use std::sync::Arc;

fn decode(graph: &replica_executor::proto::GraphProto) -> ComputationGraph {
    ComputationGraph::from_proto(graph).unwrap()
}

pub fn test_map_passes(context: &Arc<ExecutionModeContext>) {
    let graph = decode(&map_graph(None));
    assert!(find_dataset_reduce_nodes(&graph).is_empty());
    check(&graph, context).unwrap();
}

pub fn test_reduce_rejected_in_multi_device(context: &Arc<ExecutionModeContext>) {
    let graph = decode(&reduce_graph(None));
    let result = check(&graph, context);
    if context.is_multi_device() {
        let violation = result.unwrap_err();
        assert_eq!(violation.op_kind, OpKind::ReduceDataset);
        assert_eq!(violation.node_paths.len(), 1);
        let message = violation.to_string();
        assert!(message.contains("reduce"), "{message}");
        assert!(message.contains("multi-device"), "{message}");
    } else {
        result.unwrap();
    }
}

pub fn test_annotated_reduce_still_rejected(context: &Arc<ExecutionModeContext>) {
    let graph = decode(&reduce_graph(Some("/device:GPU:0")));
    let node = graph
        .root()
        .get_nodes()
        .values()
        .find(|x| x.name.starts_with("ReduceDataset"))
        .unwrap();
    assert!(node.device.is_some());
    assert_eq!(check(&graph, context).is_err(), context.is_multi_device());
}

pub fn test_allow_pinned_nodes_policy(context: &Arc<ExecutionModeContext>) {
    let relaxed = context
        .as_ref()
        .clone()
        .with_reduce_policy(ReducePlacementPolicy::AllowPinnedNodes);
    check(&decode(&reduce_graph(Some("GPU:0"))), &relaxed).unwrap();
    // An annotation naming a device outside the topology does not exempt the node.
    assert_eq!(
        check(&decode(&reduce_graph(Some("GPU:9"))), &relaxed).is_err(),
        context.is_multi_device()
    );
    assert_eq!(
        check(&decode(&reduce_graph(None)), &relaxed).is_err(),
        context.is_multi_device()
    );
}

pub fn test_nested_reduce_found(context: &Arc<ExecutionModeContext>) {
    let cases = [
        (reduce_in_map_graph(), "MapDataset_4/f/ReduceDataset_4"),
        (reduce_in_if_graph(), "If_1/then_branch/ReduceDataset_5"),
        (reduce_in_while_graph(), "While_1/body/ReduceDataset_5"),
        (reduce_in_call_graph(), "Call_0/f/ReduceDataset_5"),
    ];
    for (proto, expected_path) in cases {
        let graph = decode(&proto);
        let paths = find_dataset_reduce_nodes(&graph);
        assert_eq!(paths.len(), 1, "{}", proto.name);
        assert_eq!(paths[0].to_string(), expected_path);
        assert_eq!(paths[0].depth(), 3);

        match check(&graph, context) {
            Ok(()) => assert!(!context.is_multi_device(), "{}", proto.name),
            Err(violation) => {
                assert!(context.is_multi_device());
                assert_eq!(violation.node_paths, paths);
            }
        }
    }
}

pub fn test_every_reduce_reported(context: &Arc<ExecutionModeContext>) {
    use replica_executor::computation_graph::builder::GraphBuilder;

    let mut builder = GraphBuilder::new("two_sums");
    let dataset = builder.range_to(4);
    let zero = builder.constant_i64(0);
    let first = builder.reduce(&dataset, &zero, &[], crate::execution_mode_tests::add_function("f"));
    let second = builder.reduce(&dataset, &first, &[], crate::execution_mode_tests::add_function("f"));
    let graph = decode(&builder.output(&second).build());

    assert_eq!(find_dataset_reduce_nodes(&graph).len(), 2);
    if let Err(violation) = check(&graph, context) {
        assert_eq!(violation.node_paths.len(), 2);
        assert!(violation.message.contains("ReduceDataset_5"));
        assert!(violation.message.contains("ReduceDataset_6"));
    } else {
        assert!(!context.is_multi_device());
    }
}
