//! In-process interpreter for computation graphs.
//!
//! Each graph scope is executed by picking, among the nodes whose inputs are all
//! available, the one that frees the most values. Intermediate values are dropped as soon
//! as their last consumer has run. Functional operations re-enter the interpreter through
//! [`EvalContext::call_function`].
use crate::computation_graph::ops::{EvalError, Operation};
use crate::computation_graph::{ComputationGraph, GraphBody, NodePath, ValueId};
use crate::device::{DeviceSpec, DeviceTopology};
use crate::graph::{InnerGraph, Node};
use crate::observer::{ExecutionObserver, ValuePath};
use crate::value::Value;
use crate::wrapper::DeviceBinding;
use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

/// Resolves the device each node runs on for one wrapped computation.
#[derive(Clone, Debug, PartialEq)]
pub struct Placement {
    binding: DeviceBinding,
    topology: DeviceTopology,
}

impl Placement {
    pub fn new(binding: DeviceBinding, topology: DeviceTopology) -> Self {
        Self { binding, topology }
    }

    pub fn binding(&self) -> &DeviceBinding {
        &self.binding
    }

    pub fn device_for(
        &self,
        annotation: Option<&DeviceSpec>,
        inherited: Option<&DeviceSpec>,
    ) -> DeviceSpec {
        // A whole-computation binding wins over node annotations.
        match &self.binding {
            DeviceBinding::Cpu => return DeviceSpec::cpu(),
            DeviceBinding::Device(device) => return *device,
            DeviceBinding::Unconstrained => {}
        }
        if let Some(annotation) = annotation {
            if self.topology.contains(annotation) {
                return *annotation;
            }
            log::warn!("Ignoring device annotation {annotation}: not present in topology");
        }
        match inherited {
            Some(inherited) => *inherited,
            None => self.topology.default_device(),
        }
    }
}

/// Per-invocation evaluation state threaded through every operation.
pub struct EvalContext<'a> {
    placement: &'a Placement,
    observer: &'a mut dyn ExecutionObserver,
    scope: NodePath,
    node_path: NodePath,
    node_device: DeviceSpec,
    inherited_device: Option<DeviceSpec>,
}

impl<'a> EvalContext<'a> {
    pub fn new(placement: &'a Placement, observer: &'a mut dyn ExecutionObserver) -> Self {
        let node_device = placement.device_for(None, None);
        Self {
            placement,
            observer,
            scope: NodePath::root(),
            node_path: NodePath::root(),
            node_device,
            inherited_device: None,
        }
    }

    /// Device of the node currently being evaluated.
    pub fn node_device(&self) -> DeviceSpec {
        self.node_device
    }

    pub fn node_path(&self) -> &NodePath {
        &self.node_path
    }

    /// Runs a function body embedded in the current node. Nodes inside it are reported
    /// under `<node path>/<attribute>` and inherit the node's device.
    pub fn call_function(
        &mut self,
        attribute: &str,
        body: &GraphBody,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, EvalError> {
        let saved_scope = std::mem::replace(&mut self.scope, self.node_path.join(attribute));
        let saved_node_path = self.node_path.clone();
        let saved_node_device = self.node_device;
        let saved_inherited = self.inherited_device.replace(self.node_device);

        let result = run_body(self, body, args);

        self.scope = saved_scope;
        self.node_path = saved_node_path;
        self.node_device = saved_node_device;
        self.inherited_device = saved_inherited;
        result
    }
}

pub fn evaluate(
    graph: &ComputationGraph,
    placement: &Placement,
    observer: &mut dyn ExecutionObserver,
    args: Vec<Value>,
) -> Result<Vec<Value>, EvalError> {
    let mut ctx = EvalContext::new(placement, observer);
    run_body(&mut ctx, graph.root(), args)
}

fn value_path(ctx: &EvalContext, body: &GraphBody, value_id: ValueId) -> ValuePath {
    ValuePath {
        scope: ctx.scope.clone(),
        name: body.get_value_name(value_id).unwrap_or_default().to_string(),
    }
}

pub(crate) fn run_body(
    ctx: &mut EvalContext,
    body: &GraphBody,
    args: Vec<Value>,
) -> Result<Vec<Value>, EvalError> {
    if args.len() != body.num_inputs() {
        return Err(EvalError::FunctionArity(body.num_inputs(), args.len()));
    }
    let nodes = body.get_nodes();

    let mut value_uses_left: HashMap<ValueId, usize> = HashMap::new();
    for id in body.output_links() {
        *value_uses_left.entry(id).or_insert(0) += 1;
    }
    for node in nodes.values() {
        for id in node.inputs() {
            *value_uses_left.entry(id).or_insert(0) += 1;
        }
    }

    let mut active_values: HashMap<ValueId, Value> = HashMap::new();
    for (id, value) in body.input_links().zip(args) {
        let path = value_path(ctx, body, id);
        ctx.observer.on_value_assigned(&path, &value);
        active_values.insert(id, value);
    }

    let mut values_just_created: Vec<ValueId> = vec![];
    let mut remaining_nodes: BTreeSet<_> = nodes.keys().copied().collect();
    loop {
        // Pick the next node to run
        let mut best_node = None;
        let mut best_score = None;
        for node_id in &remaining_nodes {
            let Some(node) = nodes.get(node_id) else {
                continue;
            };
            let inputs = node.op.get_inputs();
            let mut n_dropped = 0;
            let mut fast_reused = 0;
            let mut are_inputs_present = true;
            for input in &inputs {
                if values_just_created.contains(input) {
                    fast_reused += 1;
                }
                if value_uses_left.get(input).is_some_and(|x| *x <= 1) {
                    n_dropped += 1;
                }
                if !active_values.contains_key(input) {
                    are_inputs_present = false;
                }
            }
            if are_inputs_present {
                let score = n_dropped + inputs.len() + fast_reused * 4;
                if best_score.is_none_or(|best| score > best) {
                    best_score = Some(score);
                    best_node = Some(*node_id);
                }
            }
        }

        let Some(node_id) = best_node else {
            // No options, must exit
            break;
        };
        remaining_nodes.remove(&node_id);
        let Some(node) = nodes.get(&node_id) else {
            continue;
        };

        let mut input_values = HashMap::new();
        for value_id in node.op.get_inputs() {
            let value = active_values
                .get(&value_id)
                .cloned()
                .ok_or(EvalError::MissingInputValue(value_id))?;
            input_values.insert(value_id, value);
            let entry = value_uses_left.entry(value_id).or_insert(0);
            if *entry > 0 {
                *entry -= 1;
            }
            if *entry == 0 {
                active_values.remove(&value_id);
            }
        }

        ctx.node_path = ctx.scope.join(&node.name);
        ctx.node_device = ctx
            .placement
            .device_for(node.device.as_ref(), ctx.inherited_device.as_ref());
        let node_path = ctx.node_path.clone();
        let node_device = ctx.node_device;
        log::trace!("Executing {} on {}", node_path, node_device);

        let start_instant = Instant::now();
        let outputs = node
            .op
            .eval(ctx, &input_values)
            .map_err(|x| EvalError::InNode(node_path.to_string(), Box::new(x)))?;
        let end_instant = Instant::now();
        ctx.observer
            .on_node_executed(&node_path, &node_device, start_instant, end_instant);

        let mut new_values = vec![];
        for (value_id, value) in outputs {
            let path = value_path(ctx, body, value_id);
            ctx.observer.on_value_assigned(&path, &value);
            if value_uses_left.get(&value_id).is_some_and(|x| *x > 0) {
                active_values.insert(value_id, value);
                new_values.push(value_id);
            }
        }
        values_just_created = new_values;
    }

    let mut results = Vec::with_capacity(body.num_outputs());
    for id in body.output_links() {
        match active_values.get(&id) {
            Some(value) => results.push(value.clone()),
            None => {
                return Err(EvalError::Unschedulable(
                    body.name().to_string(),
                    remaining_nodes.len(),
                ));
            }
        }
    }
    Ok(results)
}
