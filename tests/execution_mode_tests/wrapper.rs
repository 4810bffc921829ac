use crate::execution_mode_tests::{
    accumulation_loop_graph, map_graph, reduce_graph, reduce_in_call_graph, reduce_in_if_graph,
    reduce_in_map_graph, reduce_in_while_graph,
};
use replica_executor::computation_graph::NodePath;
use replica_executor::computation_graph::builder::GraphBuilder;
use replica_executor::observer::{ExecutionObserver, ValuePath};
use replica_executor::{
    BuildError, CallError, ComputationDef, DeviceBinding, DeviceSpec, ExecutionModeContext,
    FunctionWrapperBuilder, Value, ValueType,
};
use std::sync::Arc;
use std::time::Instant;

#[derive(Default)]
struct RecordingObserver {
    nodes: Vec<(NodePath, DeviceSpec)>,
    values: Vec<ValuePath>,
}

impl ExecutionObserver for RecordingObserver {
    fn on_node_executed(
        &mut self,
        node_path: &NodePath,
        device: &DeviceSpec,
        start_instant: Instant,
        end_instant: Instant,
    ) {
        assert!(end_instant >= start_instant);
        self.nodes.push((node_path.clone(), *device));
    }

    fn on_value_assigned(&mut self, value_path: &ValuePath, _value: &Value) {
        self.values.push(value_path.clone());
    }
}

fn dataset_elements(value: &Value) -> Vec<i64> {
    value
        .as_dataset()
        .unwrap()
        .elements()
        .iter()
        .map(|x| x.as_i64().unwrap())
        .collect()
}

pub fn test_accumulation_loop_unpinned(context: &Arc<ExecutionModeContext>) {
    let def = ComputationDef::new("accumulate", accumulation_loop_graph());
    let callable = FunctionWrapperBuilder::new(context.clone())
        .build(&def, false, None, None)
        .unwrap();
    assert_eq!(*callable.binding(), DeviceBinding::Unconstrained);
    assert_eq!(callable.call(None).unwrap(), Value::I64(45));
}

pub fn test_reduce_with_explicit_device(context: &Arc<ExecutionModeContext>) {
    let def = ComputationDef::new("sum", reduce_graph(None));
    let callable = FunctionWrapperBuilder::new(context.clone())
        .build(&def, false, None, Some(DeviceSpec::gpu(0)))
        .unwrap();
    assert_eq!(*callable.binding(), DeviceBinding::Device(DeviceSpec::gpu(0)));
    assert_eq!(callable.call(None).unwrap(), Value::I64(45));
}

pub fn test_reduce_pinned_to_cpu(context: &Arc<ExecutionModeContext>) {
    let def = ComputationDef::new("sum", reduce_graph(None));
    let callable = FunctionWrapperBuilder::new(context.clone())
        .build(&def, true, None, None)
        .unwrap();
    assert_eq!(*callable.binding(), DeviceBinding::Cpu);

    let mut observer = RecordingObserver::default();
    assert_eq!(
        callable.call_with_observer(None, &mut observer).unwrap(),
        Value::I64(45)
    );
    assert!(!observer.nodes.is_empty());
    assert!(observer.nodes.iter().all(|(_, device)| device.is_cpu()));
}

pub fn test_unpinned_reduce(context: &Arc<ExecutionModeContext>) {
    let def = ComputationDef::new("sum", reduce_graph(None));
    let result = FunctionWrapperBuilder::new(context.clone()).build(&def, false, None, None);
    if context.is_multi_device() {
        assert!(matches!(result, Err(BuildError::ConstraintViolation(_))));
    } else {
        assert_eq!(result.unwrap().call(None).unwrap(), Value::I64(45));
    }
}

pub fn test_annotated_reduce_unpinned(context: &Arc<ExecutionModeContext>) {
    let def = ComputationDef::new("sum", reduce_graph(Some("/device:GPU:0")));
    let result = FunctionWrapperBuilder::new(context.clone()).build(&def, false, None, None);
    assert_eq!(
        matches!(result, Err(BuildError::ConstraintViolation(_))),
        context.is_multi_device()
    );
}

pub fn test_nested_reduce_pinned(context: &Arc<ExecutionModeContext>) {
    let builder = FunctionWrapperBuilder::new(context.clone());
    for graph in [
        reduce_in_if_graph(),
        reduce_in_while_graph(),
        reduce_in_call_graph(),
    ] {
        let def = ComputationDef::new(&graph.name.clone(), graph);
        let unpinned = builder.build(&def, false, None, None);
        assert_eq!(unpinned.is_err(), context.is_multi_device(), "{}", def.name);

        let callable = builder.build(&def, true, None, None).unwrap();
        assert_eq!(callable.call(None).unwrap(), Value::I64(45), "{}", def.name);
    }

    let def = ComputationDef::new("reduce_in_map", reduce_in_map_graph());
    let callable = builder.build(&def, true, None, None).unwrap();
    assert_eq!(dataset_elements(&callable.call(None).unwrap()), vec![6, 7, 8]);
}

pub fn test_invalid_device_reference(context: &Arc<ExecutionModeContext>) {
    let def = ComputationDef::new("map", map_graph(None));
    let result =
        FunctionWrapperBuilder::new(context.clone()).build(&def, false, None, Some(DeviceSpec::gpu(7)));
    assert!(matches!(
        result,
        Err(BuildError::InvalidDeviceReference(device, _)) if device == DeviceSpec::gpu(7)
    ));
}

pub fn test_malformed_definition(context: &Arc<ExecutionModeContext>) {
    let builder = FunctionWrapperBuilder::new(context.clone());
    let missing = ComputationDef {
        name: "empty".to_string(),
        ..Default::default()
    };
    assert!(matches!(
        builder.build(&missing, false, None, None),
        Err(BuildError::MalformedComputationDefinition(_))
    ));

    // Malformed graphs are reported before any constraint check.
    let mut graph = reduce_graph(None);
    graph.node[0].op_type = "NoSuchOp".to_string();
    let def = ComputationDef::new("broken", graph);
    assert!(matches!(
        builder.build(&def, false, None, None),
        Err(BuildError::MalformedComputationDefinition(_))
    ));
}

pub fn test_map_placement_and_result(context: &Arc<ExecutionModeContext>) {
    let def = ComputationDef::new("map", map_graph(None));
    let callable = FunctionWrapperBuilder::new(context.clone())
        .build(&def, false, None, None)
        .unwrap();
    let mut observer = RecordingObserver::default();
    let result = callable.call_with_observer(None, &mut observer).unwrap();
    assert_eq!(dataset_elements(&result), (1..=10).collect::<Vec<_>>());

    let default_device = context.topology().default_device();
    assert!(observer.nodes.iter().all(|(_, device)| *device == default_device));
    // Ten invocations of the two-node function body, plus five root nodes.
    let nested = observer
        .nodes
        .iter()
        .filter(|(path, _)| path.segments().get(1).is_some_and(|x| x == "f"))
        .count();
    assert_eq!(nested, 20);
    assert_eq!(observer.nodes.len(), 25);
    assert!(observer.values.iter().any(|x| x.to_string() == "MapDataset_4/f/x"));
}

pub fn test_annotated_node_placement(context: &Arc<ExecutionModeContext>) {
    let def = ComputationDef::new("map", map_graph(Some("/device:GPU:1")));
    let callable = FunctionWrapperBuilder::new(context.clone())
        .build(&def, false, None, None)
        .unwrap();
    let mut observer = RecordingObserver::default();
    callable.call_with_observer(None, &mut observer).unwrap();

    let expected = if context.topology().contains(&DeviceSpec::gpu(1)) {
        DeviceSpec::gpu(1)
    } else {
        context.topology().default_device()
    };
    for (path, device) in &observer.nodes {
        if path.segments()[0].starts_with("MapDataset") {
            assert_eq!(*device, expected, "{path}");
        }
    }
}

pub fn test_parameterized_call(context: &Arc<ExecutionModeContext>) {
    let mut builder = GraphBuilder::new("double");
    let x = builder.input("x");
    let doubled = builder.add(&x, &x);
    let def = ComputationDef::new("double", builder.output(&doubled).build())
        .with_parameter_type(ValueType::I64)
        .with_result_type(ValueType::I64);

    let wrapper = FunctionWrapperBuilder::new(context.clone());
    assert!(matches!(
        wrapper.build(&def, false, Some(ValueType::Bool), None),
        Err(BuildError::ParameterTypeMismatch { .. })
    ));

    let callable = wrapper.build(&def, false, Some(ValueType::I64), None).unwrap();
    assert_eq!(callable.parameter_type(), Some(&ValueType::I64));
    assert_eq!(callable.call(Some(Value::I64(21))).unwrap(), Value::I64(42));
    assert!(matches!(callable.call(None), Err(CallError::ArgumentCount(1, 0))));
    assert!(matches!(
        callable.call(Some(Value::Bool(true))),
        Err(CallError::ArgumentType(_))
    ));
}

pub fn test_concurrent_calls(context: &Arc<ExecutionModeContext>) {
    let def = ComputationDef::new("accumulate", accumulation_loop_graph());
    let callable = FunctionWrapperBuilder::new(context.clone())
        .build(&def, false, None, None)
        .unwrap();
    let callable = &callable;
    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| s.spawn(move || callable.call(None).unwrap()))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), Value::I64(45));
        }
    });
}

pub fn test_explicit_device_overrides_annotations(context: &Arc<ExecutionModeContext>) {
    let def = ComputationDef::new("sum", reduce_graph(Some("/device:GPU:1")));
    let callable = FunctionWrapperBuilder::new(context.clone())
        .build(&def, false, None, Some(DeviceSpec::gpu(0)))
        .unwrap();

    let mut observer = RecordingObserver::default();
    assert_eq!(
        callable.call_with_observer(None, &mut observer).unwrap(),
        Value::I64(45)
    );
    assert!(!observer.nodes.is_empty());
    for (path, device) in &observer.nodes {
        assert_eq!(*device, DeviceSpec::gpu(0), "{path}");
    }
}

pub fn test_parameter_count_checked(context: &Arc<ExecutionModeContext>) {
    let wrapper = FunctionWrapperBuilder::new(context.clone());

    let mut builder = GraphBuilder::new("constant");
    let one = builder.constant_i64(1);
    let def = ComputationDef::new("constant", builder.output(&one).build());
    assert!(matches!(
        wrapper.build(&def, false, Some(ValueType::I64), None),
        Err(BuildError::ParameterCountMismatch { inputs: 0, .. })
    ));
    assert_eq!(
        wrapper.build(&def, false, None, None).unwrap().call(None).unwrap(),
        Value::I64(1)
    );

    let mut builder = GraphBuilder::new("double");
    let x = builder.input("x");
    let doubled = builder.add(&x, &x);
    let def = ComputationDef::new("double", builder.output(&doubled).build());
    assert!(matches!(
        wrapper.build(&def, false, None, None),
        Err(BuildError::ParameterCountMismatch {
            inputs: 1,
            parameter_type: None
        })
    ));
    let callable = wrapper.build(&def, false, Some(ValueType::I64), None).unwrap();
    assert_eq!(callable.call(Some(Value::I64(4))).unwrap(), Value::I64(8));
}
