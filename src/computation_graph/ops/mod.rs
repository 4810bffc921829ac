mod basic;
mod control_flow;
mod dataset;

pub use basic::{
    BinaryOperation, ConstantOperation, IdentityOperation, MakeTupleOperation, TupleGetOperation,
    WhichBinaryOperation,
};
pub use control_flow::{CallOperation, IfOperation, WhileOperation};
pub use dataset::{
    DatasetCardinalityOperation, DatasetElementAtOperation, DatasetFilterOperation,
    DatasetFromValuesOperation, DatasetMapOperation, DatasetRangeOperation,
    DatasetReduceOperation,
};

use crate::computation_graph::{GraphBody, GraphDecodingError, ValueId};
use crate::eval::EvalContext;
use crate::proto::NodeProto;
use crate::value::{Value, ValueError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error(transparent)]
    ValueError(#[from] ValueError),
    #[error("Missing input value {0}")]
    MissingInputValue(ValueId),
    #[error("Function expects {0} arguments, got {1}")]
    FunctionArity(usize, usize),
    #[error("Graph \"{0}\" stalled with {1} nodes left unscheduled")]
    Unschedulable(String, usize),
    #[error("While loop exceeded its maximum of {0} iterations")]
    IterationLimit(i64),
    #[error("Error in node {0}: {1}")]
    InNode(String, Box<EvalError>),
}

/// Operation type tags as they appear on the wire.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::VariantNames,
)]
pub enum OpKind {
    Const,
    Identity,
    Add,
    Sub,
    Mul,
    Div,
    Less,
    Equal,
    MakeTuple,
    TupleGet,
    RangeDataset,
    DatasetFromValues,
    MapDataset,
    FilterDataset,
    ReduceDataset,
    DatasetCardinality,
    DatasetElementAt,
    If,
    While,
    Call,
}

pub type OperationEvalRet = Result<HashMap<ValueId, Value>, EvalError>;

pub trait Operation {
    fn get_op_kind(&self) -> OpKind;
    fn get_inputs(&self) -> Vec<ValueId>;
    fn get_outputs(&self) -> Vec<ValueId>;
    fn get_sub_graphs(&self) -> Vec<(&'static str, &GraphBody)> {
        vec![]
    }
    fn eval(&self, ctx: &mut EvalContext, inputs: &HashMap<ValueId, Value>) -> OperationEvalRet;
}

#[derive(Clone, Debug, strum_macros::VariantNames, Serialize, Deserialize)]
pub enum AnyOperation {
    Constant(ConstantOperation),
    Identity(IdentityOperation),
    Binary(BinaryOperation),
    MakeTuple(MakeTupleOperation),
    TupleGet(TupleGetOperation),
    DatasetRange(DatasetRangeOperation),
    DatasetFromValues(DatasetFromValuesOperation),
    DatasetMap(DatasetMapOperation),
    DatasetFilter(DatasetFilterOperation),
    DatasetReduce(DatasetReduceOperation),
    DatasetCardinality(DatasetCardinalityOperation),
    DatasetElementAt(DatasetElementAtOperation),
    If(IfOperation),
    While(WhileOperation),
    Call(CallOperation),
}

impl AnyOperation {
    pub(crate) fn from_proto(
        node: &NodeProto,
        name: &str,
        inputs: Vec<ValueId>,
        outputs: Vec<ValueId>,
    ) -> Result<Self, GraphDecodingError> {
        let kind = OpKind::from_str(&node.op_type)
            .map_err(|_| GraphDecodingError::UnknownOperator(node.op_type.clone()))?;
        Ok(match kind {
            OpKind::Const => {
                AnyOperation::Constant(ConstantOperation::from_proto(node, name, &inputs, &outputs)?)
            }
            OpKind::Identity => {
                AnyOperation::Identity(IdentityOperation::from_proto(name, &inputs, &outputs)?)
            }
            OpKind::Add => AnyOperation::Binary(BinaryOperation::from_proto(
                WhichBinaryOperation::Add,
                name,
                &inputs,
                &outputs,
            )?),
            OpKind::Sub => AnyOperation::Binary(BinaryOperation::from_proto(
                WhichBinaryOperation::Sub,
                name,
                &inputs,
                &outputs,
            )?),
            OpKind::Mul => AnyOperation::Binary(BinaryOperation::from_proto(
                WhichBinaryOperation::Mul,
                name,
                &inputs,
                &outputs,
            )?),
            OpKind::Div => AnyOperation::Binary(BinaryOperation::from_proto(
                WhichBinaryOperation::Div,
                name,
                &inputs,
                &outputs,
            )?),
            OpKind::Less => AnyOperation::Binary(BinaryOperation::from_proto(
                WhichBinaryOperation::Less,
                name,
                &inputs,
                &outputs,
            )?),
            OpKind::Equal => AnyOperation::Binary(BinaryOperation::from_proto(
                WhichBinaryOperation::Equal,
                name,
                &inputs,
                &outputs,
            )?),
            OpKind::MakeTuple => {
                AnyOperation::MakeTuple(MakeTupleOperation::from_proto(name, inputs, &outputs)?)
            }
            OpKind::TupleGet => {
                AnyOperation::TupleGet(TupleGetOperation::from_proto(node, name, &inputs, &outputs)?)
            }
            OpKind::RangeDataset => {
                AnyOperation::DatasetRange(DatasetRangeOperation::from_proto(name, &inputs, &outputs)?)
            }
            OpKind::DatasetFromValues => AnyOperation::DatasetFromValues(
                DatasetFromValuesOperation::from_proto(name, inputs, &outputs)?,
            ),
            OpKind::MapDataset => {
                AnyOperation::DatasetMap(DatasetMapOperation::from_proto(node, name, &inputs, &outputs)?)
            }
            OpKind::FilterDataset => AnyOperation::DatasetFilter(
                DatasetFilterOperation::from_proto(node, name, &inputs, &outputs)?,
            ),
            OpKind::ReduceDataset => AnyOperation::DatasetReduce(
                DatasetReduceOperation::from_proto(node, name, &inputs, &outputs)?,
            ),
            OpKind::DatasetCardinality => AnyOperation::DatasetCardinality(
                DatasetCardinalityOperation::from_proto(name, &inputs, &outputs)?,
            ),
            OpKind::DatasetElementAt => AnyOperation::DatasetElementAt(
                DatasetElementAtOperation::from_proto(name, &inputs, &outputs)?,
            ),
            OpKind::If => AnyOperation::If(IfOperation::from_proto(node, name, &inputs, outputs)?),
            OpKind::While => {
                AnyOperation::While(WhileOperation::from_proto(node, name, inputs, outputs)?)
            }
            OpKind::Call => AnyOperation::Call(CallOperation::from_proto(node, name, inputs, outputs)?),
        })
    }
}

pub(crate) fn expect_arity(
    name: &str,
    inputs: &[ValueId],
    outputs: &[ValueId],
    num_inputs: usize,
    num_outputs: usize,
) -> Result<(), GraphDecodingError> {
    if inputs.len() != num_inputs {
        return Err(GraphDecodingError::WrongInputCount(
            name.to_string(),
            num_inputs,
            inputs.len(),
        ));
    }
    if outputs.len() != num_outputs {
        return Err(GraphDecodingError::WrongOutputCount(
            name.to_string(),
            num_outputs,
            outputs.len(),
        ));
    }
    Ok(())
}

pub(crate) fn input_value(
    inputs: &HashMap<ValueId, Value>,
    id: ValueId,
) -> Result<&Value, EvalError> {
    inputs.get(&id).ok_or(EvalError::MissingInputValue(id))
}

macro_rules! delegate {
    ($name:ident($($arg:ident: $ty:ty),*) -> $ret:ty) => {
        fn $name(&self, $($arg: $ty),*) -> $ret {
            match self {
                AnyOperation::Constant(x) => x.$name($($arg),*),
                AnyOperation::Identity(x) => x.$name($($arg),*),
                AnyOperation::Binary(x) => x.$name($($arg),*),
                AnyOperation::MakeTuple(x) => x.$name($($arg),*),
                AnyOperation::TupleGet(x) => x.$name($($arg),*),
                AnyOperation::DatasetRange(x) => x.$name($($arg),*),
                AnyOperation::DatasetFromValues(x) => x.$name($($arg),*),
                AnyOperation::DatasetMap(x) => x.$name($($arg),*),
                AnyOperation::DatasetFilter(x) => x.$name($($arg),*),
                AnyOperation::DatasetReduce(x) => x.$name($($arg),*),
                AnyOperation::DatasetCardinality(x) => x.$name($($arg),*),
                AnyOperation::DatasetElementAt(x) => x.$name($($arg),*),
                AnyOperation::If(x) => x.$name($($arg),*),
                AnyOperation::While(x) => x.$name($($arg),*),
                AnyOperation::Call(x) => x.$name($($arg),*),
            }
        }
    }
}

impl Operation for AnyOperation {
    delegate!(get_op_kind() -> OpKind);
    delegate!(get_inputs() -> Vec<ValueId>);
    delegate!(get_outputs() -> Vec<ValueId>);
    delegate!(get_sub_graphs() -> Vec<(&'static str, &GraphBody)>);
    delegate!(eval(ctx: &mut EvalContext, inputs: &HashMap<ValueId, Value>) -> OperationEvalRet);
}
