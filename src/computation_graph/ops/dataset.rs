use crate::computation_graph::ops::{
    EvalError, OpKind, Operation, OperationEvalRet, expect_arity, input_value,
};
use crate::computation_graph::{GraphBody, GraphDecodingError, ValueId, require_function};
use crate::eval::EvalContext;
use crate::proto::NodeProto;
use crate::value::{DatasetValue, Value, ValueError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn split_captures(
    name: &str,
    inputs: &[ValueId],
    outputs: &[ValueId],
    leading: usize,
) -> Result<Vec<ValueId>, GraphDecodingError> {
    if inputs.len() < leading {
        return Err(GraphDecodingError::WrongInputCount(
            name.to_string(),
            leading,
            inputs.len(),
        ));
    }
    expect_arity(name, inputs, outputs, inputs.len(), 1)?;
    Ok(inputs[leading..].to_vec())
}

fn collect_args(
    leading: Vec<Value>,
    captures: &[ValueId],
    inputs: &HashMap<ValueId, Value>,
) -> Result<Vec<Value>, EvalError> {
    let mut args = leading;
    for id in captures {
        args.push(input_value(inputs, *id)?.clone());
    }
    Ok(args)
}

fn single_result(mut results: Vec<Value>) -> Result<Value, EvalError> {
    if results.len() != 1 {
        return Err(EvalError::FunctionArity(1, results.len()));
    }
    Ok(results.remove(0))
}

/// Source dataset yielding `start, start + step, ...` up to `stop` (exclusive).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatasetRangeOperation {
    start: ValueId,
    stop: ValueId,
    step: ValueId,
    output: ValueId,
}

impl DatasetRangeOperation {
    pub(crate) fn from_proto(
        name: &str,
        inputs: &[ValueId],
        outputs: &[ValueId],
    ) -> Result<Self, GraphDecodingError> {
        expect_arity(name, inputs, outputs, 3, 1)?;
        Ok(Self {
            start: inputs[0],
            stop: inputs[1],
            step: inputs[2],
            output: outputs[0],
        })
    }
}

impl Operation for DatasetRangeOperation {
    fn get_op_kind(&self) -> OpKind {
        OpKind::RangeDataset
    }

    fn get_inputs(&self) -> Vec<ValueId> {
        vec![self.start, self.stop, self.step]
    }

    fn get_outputs(&self) -> Vec<ValueId> {
        vec![self.output]
    }

    fn eval(&self, _ctx: &mut EvalContext, inputs: &HashMap<ValueId, Value>) -> OperationEvalRet {
        let start = input_value(inputs, self.start)?.as_i64()?;
        let stop = input_value(inputs, self.stop)?.as_i64()?;
        let step = input_value(inputs, self.step)?.as_i64()?;
        Ok(HashMap::from([(self.output, Value::range(start, stop, step)?)]))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatasetFromValuesOperation {
    inputs: Vec<ValueId>,
    output: ValueId,
}

impl DatasetFromValuesOperation {
    pub(crate) fn from_proto(
        name: &str,
        inputs: Vec<ValueId>,
        outputs: &[ValueId],
    ) -> Result<Self, GraphDecodingError> {
        if inputs.is_empty() {
            return Err(GraphDecodingError::WrongInputCount(name.to_string(), 1, 0));
        }
        expect_arity(name, &inputs, outputs, inputs.len(), 1)?;
        Ok(Self {
            inputs,
            output: outputs[0],
        })
    }
}

impl Operation for DatasetFromValuesOperation {
    fn get_op_kind(&self) -> OpKind {
        OpKind::DatasetFromValues
    }

    fn get_inputs(&self) -> Vec<ValueId> {
        self.inputs.clone()
    }

    fn get_outputs(&self) -> Vec<ValueId> {
        vec![self.output]
    }

    fn eval(&self, _ctx: &mut EvalContext, inputs: &HashMap<ValueId, Value>) -> OperationEvalRet {
        let elements = self
            .inputs
            .iter()
            .map(|x| input_value(inputs, *x).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        let element_type = elements
            .first()
            .map(|x| x.value_type())
            .ok_or(ValueError::EmptyDataset)?;
        let dataset = DatasetValue::new(element_type, elements)?;
        Ok(HashMap::from([(self.output, Value::Dataset(dataset))]))
    }
}

/// Applies `f(element, captures...)` to every element.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatasetMapOperation {
    dataset: ValueId,
    captures: Vec<ValueId>,
    output: ValueId,
    function: GraphBody,
}

impl DatasetMapOperation {
    pub(crate) fn from_proto(
        node: &NodeProto,
        name: &str,
        inputs: &[ValueId],
        outputs: &[ValueId],
    ) -> Result<Self, GraphDecodingError> {
        let captures = split_captures(name, inputs, outputs, 1)?;
        let function = require_function(node, name, "f", 1 + captures.len(), 1)?;
        Ok(Self {
            dataset: inputs[0],
            captures,
            output: outputs[0],
            function,
        })
    }
}

impl Operation for DatasetMapOperation {
    fn get_op_kind(&self) -> OpKind {
        OpKind::MapDataset
    }

    fn get_inputs(&self) -> Vec<ValueId> {
        let mut inputs = vec![self.dataset];
        inputs.extend(&self.captures);
        inputs
    }

    fn get_outputs(&self) -> Vec<ValueId> {
        vec![self.output]
    }

    fn get_sub_graphs(&self) -> Vec<(&'static str, &GraphBody)> {
        vec![("f", &self.function)]
    }

    fn eval(&self, ctx: &mut EvalContext, inputs: &HashMap<ValueId, Value>) -> OperationEvalRet {
        let dataset = input_value(inputs, self.dataset)?.as_dataset()?;
        let mut mapped = Vec::with_capacity(dataset.len());
        for element in dataset.elements() {
            let args = collect_args(vec![element.clone()], &self.captures, inputs)?;
            mapped.push(single_result(ctx.call_function("f", &self.function, args)?)?);
        }
        // An empty input keeps its element type.
        let element_type = mapped
            .first()
            .map(|x| x.value_type())
            .unwrap_or_else(|| dataset.element_type().clone());
        let result = DatasetValue::new(element_type, mapped)?;
        Ok(HashMap::from([(self.output, Value::Dataset(result))]))
    }
}

/// Keeps the elements for which `predicate(element, captures...)` is true.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatasetFilterOperation {
    dataset: ValueId,
    captures: Vec<ValueId>,
    output: ValueId,
    predicate: GraphBody,
}

impl DatasetFilterOperation {
    pub(crate) fn from_proto(
        node: &NodeProto,
        name: &str,
        inputs: &[ValueId],
        outputs: &[ValueId],
    ) -> Result<Self, GraphDecodingError> {
        let captures = split_captures(name, inputs, outputs, 1)?;
        let predicate = require_function(node, name, "predicate", 1 + captures.len(), 1)?;
        Ok(Self {
            dataset: inputs[0],
            captures,
            output: outputs[0],
            predicate,
        })
    }
}

impl Operation for DatasetFilterOperation {
    fn get_op_kind(&self) -> OpKind {
        OpKind::FilterDataset
    }

    fn get_inputs(&self) -> Vec<ValueId> {
        let mut inputs = vec![self.dataset];
        inputs.extend(&self.captures);
        inputs
    }

    fn get_outputs(&self) -> Vec<ValueId> {
        vec![self.output]
    }

    fn get_sub_graphs(&self) -> Vec<(&'static str, &GraphBody)> {
        vec![("predicate", &self.predicate)]
    }

    fn eval(&self, ctx: &mut EvalContext, inputs: &HashMap<ValueId, Value>) -> OperationEvalRet {
        let dataset = input_value(inputs, self.dataset)?.as_dataset()?;
        let mut kept = Vec::new();
        for element in dataset.elements() {
            let args = collect_args(vec![element.clone()], &self.captures, inputs)?;
            let keep = single_result(ctx.call_function("predicate", &self.predicate, args)?)?;
            if keep.as_bool()? {
                kept.push(element.clone());
            }
        }
        let result = DatasetValue::new(dataset.element_type().clone(), kept)?;
        Ok(HashMap::from([(self.output, Value::Dataset(result))]))
    }
}

/// Folds the dataset with `state = f(state, element, captures...)`, starting from the
/// initial state. Stateful and order dependent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatasetReduceOperation {
    dataset: ValueId,
    initial_state: ValueId,
    captures: Vec<ValueId>,
    output: ValueId,
    function: GraphBody,
}

impl DatasetReduceOperation {
    pub(crate) fn from_proto(
        node: &NodeProto,
        name: &str,
        inputs: &[ValueId],
        outputs: &[ValueId],
    ) -> Result<Self, GraphDecodingError> {
        let captures = split_captures(name, inputs, outputs, 2)?;
        let function = require_function(node, name, "f", 2 + captures.len(), 1)?;
        Ok(Self {
            dataset: inputs[0],
            initial_state: inputs[1],
            captures,
            output: outputs[0],
            function,
        })
    }
}

impl Operation for DatasetReduceOperation {
    fn get_op_kind(&self) -> OpKind {
        OpKind::ReduceDataset
    }

    fn get_inputs(&self) -> Vec<ValueId> {
        let mut inputs = vec![self.dataset, self.initial_state];
        inputs.extend(&self.captures);
        inputs
    }

    fn get_outputs(&self) -> Vec<ValueId> {
        vec![self.output]
    }

    fn get_sub_graphs(&self) -> Vec<(&'static str, &GraphBody)> {
        vec![("f", &self.function)]
    }

    fn eval(&self, ctx: &mut EvalContext, inputs: &HashMap<ValueId, Value>) -> OperationEvalRet {
        let dataset = input_value(inputs, self.dataset)?.as_dataset()?;
        let mut state = input_value(inputs, self.initial_state)?.clone();
        let state_type = state.value_type();
        for element in dataset.elements() {
            let args = collect_args(vec![state, element.clone()], &self.captures, inputs)?;
            state = single_result(ctx.call_function("f", &self.function, args)?)?;
            state.check_type(&state_type)?;
        }
        Ok(HashMap::from([(self.output, state)]))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatasetCardinalityOperation {
    dataset: ValueId,
    output: ValueId,
}

impl DatasetCardinalityOperation {
    pub(crate) fn from_proto(
        name: &str,
        inputs: &[ValueId],
        outputs: &[ValueId],
    ) -> Result<Self, GraphDecodingError> {
        expect_arity(name, inputs, outputs, 1, 1)?;
        Ok(Self {
            dataset: inputs[0],
            output: outputs[0],
        })
    }
}

impl Operation for DatasetCardinalityOperation {
    fn get_op_kind(&self) -> OpKind {
        OpKind::DatasetCardinality
    }

    fn get_inputs(&self) -> Vec<ValueId> {
        vec![self.dataset]
    }

    fn get_outputs(&self) -> Vec<ValueId> {
        vec![self.output]
    }

    fn eval(&self, _ctx: &mut EvalContext, inputs: &HashMap<ValueId, Value>) -> OperationEvalRet {
        let dataset = input_value(inputs, self.dataset)?.as_dataset()?;
        Ok(HashMap::from([(self.output, Value::I64(dataset.len() as i64))]))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatasetElementAtOperation {
    dataset: ValueId,
    index: ValueId,
    output: ValueId,
}

impl DatasetElementAtOperation {
    pub(crate) fn from_proto(
        name: &str,
        inputs: &[ValueId],
        outputs: &[ValueId],
    ) -> Result<Self, GraphDecodingError> {
        expect_arity(name, inputs, outputs, 2, 1)?;
        Ok(Self {
            dataset: inputs[0],
            index: inputs[1],
            output: outputs[0],
        })
    }
}

impl Operation for DatasetElementAtOperation {
    fn get_op_kind(&self) -> OpKind {
        OpKind::DatasetElementAt
    }

    fn get_inputs(&self) -> Vec<ValueId> {
        vec![self.dataset, self.index]
    }

    fn get_outputs(&self) -> Vec<ValueId> {
        vec![self.output]
    }

    fn eval(&self, _ctx: &mut EvalContext, inputs: &HashMap<ValueId, Value>) -> OperationEvalRet {
        let dataset = input_value(inputs, self.dataset)?.as_dataset()?;
        let index = input_value(inputs, self.index)?.as_i64()?;
        Ok(HashMap::from([(self.output, dataset.get(index)?.clone())]))
    }
}
