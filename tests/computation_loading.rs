use replica_executor::computation::LoadError;
use replica_executor::computation_graph::builder::GraphBuilder;
use replica_executor::computation_graph::{ComputationGraph, GraphDecodingError};
use replica_executor::execution_mode::ConfigError;
use replica_executor::{
    ComputationDef, ExecutionModeConfig, ExecutionModeContext, FunctionWrapperBuilder,
    ReducePlacementPolicy, Value, ValueType,
};
use std::io::Write;
use std::sync::Arc;

fn sum_def() -> ComputationDef {
    let mut builder = GraphBuilder::new("sum");
    let dataset = builder.range_to(10);
    let zero = builder.constant_i64(0);
    let add = GraphBuilder::function("add", &["a", "b"], |b, params| {
        vec![b.add(&params[0], &params[1])]
    });
    let total = builder.with_device("/device:GPU:0", |b| b.reduce(&dataset, &zero, &[], add));
    ComputationDef::new("sum", builder.output(&total).build()).with_result_type(ValueType::I64)
}

#[test]
fn test_proto_file_round_trip() {
    let def = sum_def();
    let mut file = tempfile::Builder::new().suffix(".pb").tempfile().unwrap();
    file.write_all(&def.to_proto_bytes()).unwrap();

    let loaded = ComputationDef::from_file(file.path()).unwrap();
    assert_eq!(loaded, def);
    let callable = FunctionWrapperBuilder::new(Arc::new(ExecutionModeContext::single_device()))
        .build(&loaded, false, None, None)
        .unwrap();
    assert_eq!(callable.call(None).unwrap(), Value::I64(45));
}

#[test]
fn test_json_file_preserves_annotations() {
    let def = sum_def();
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    file.write_all(def.to_json().unwrap().as_bytes()).unwrap();

    let loaded = ComputationDef::from_file(file.path()).unwrap();
    let graph = loaded.extract_graph().unwrap();
    let annotated: Vec<_> = graph
        .root()
        .get_nodes()
        .values()
        .filter_map(|x| x.device)
        .collect();
    assert_eq!(annotated.len(), 1);
    assert_eq!(annotated[0].to_string(), "/device:GPU:0");
}

#[test]
fn test_unknown_extension() {
    let file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
    assert!(matches!(
        ComputationDef::from_file(file.path()),
        Err(LoadError::UnknownFormat(_))
    ));
}

#[test]
fn test_garbage_bytes() {
    assert!(matches!(
        ComputationDef::from_proto_bytes(&[0xff, 0xff, 0xff]),
        Err(GraphDecodingError::ProtobufDecodeError(_))
    ));
}

#[test]
fn test_structural_errors() {
    let mut builder = GraphBuilder::new("dangling");
    let a = builder.constant_i64(1);
    builder.add(&a, "missing");
    let graph = builder.build();
    assert!(matches!(
        ComputationGraph::from_proto(&graph),
        Err(GraphDecodingError::UnknownValueName(_, name)) if name == "missing"
    ));

    let mut builder = GraphBuilder::new("bad_device");
    builder.with_device("/device:TPU:0", |b| b.constant_i64(1));
    assert!(matches!(
        ComputationGraph::from_proto(&builder.build()),
        Err(GraphDecodingError::InvalidDeviceAnnotation(..))
    ));

    let mut builder = GraphBuilder::new("bad_signature");
    let dataset = builder.range_to(3);
    let unary = GraphBuilder::function("f", &["x"], |b, params| vec![b.identity(&params[0])]);
    let zero = builder.constant_i64(0);
    builder.reduce(&dataset, &zero, &[], unary);
    assert!(matches!(
        ComputationGraph::from_proto(&builder.build()),
        Err(GraphDecodingError::FunctionSignatureMismatch(..))
    ));
}

#[test]
fn test_config_file() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    file.write_all(br#"{"physical_gpus": [[128, 128]], "reduce_policy": "strict"}"#)
        .unwrap();
    let config = ExecutionModeConfig::from_json_file(file.path()).unwrap();
    assert_eq!(config.reduce_policy, ReducePlacementPolicy::Strict);

    let context = Arc::new(ExecutionModeContext::from_config(&config).unwrap());
    assert!(context.is_multi_device());
    // The node annotation does not exempt the reduce; pinning the whole call does.
    let wrapper = FunctionWrapperBuilder::new(context);
    assert!(wrapper.build(&sum_def(), false, None, None).is_err());
    assert!(wrapper.build(&sum_def(), true, None, None).is_ok());
}

#[test]
fn test_bad_config_file() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    file.write_all(br#"{"physical_gpus": [[]]}"#).unwrap();
    let config = ExecutionModeConfig::from_json_file(file.path()).unwrap();
    assert!(matches!(
        ExecutionModeContext::from_config(&config),
        Err(ConfigError::DeviceError(_))
    ));
}
