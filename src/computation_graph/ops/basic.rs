use crate::computation_graph::ops::{
    EvalError, OpKind, Operation, OperationEvalRet, expect_arity, input_value,
};
use crate::computation_graph::{GraphDecodingError, ValueId, query_attribute_int};
use crate::eval::EvalContext;
use crate::proto::{AttributeType, NodeProto};
use crate::value::{Value, ValueError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConstantOperation {
    output: ValueId,
    value: Value,
}

impl ConstantOperation {
    pub(crate) fn from_proto(
        node: &NodeProto,
        name: &str,
        inputs: &[ValueId],
        outputs: &[ValueId],
    ) -> Result<Self, GraphDecodingError> {
        expect_arity(name, inputs, outputs, 0, 1)?;
        let attr = node
            .attribute
            .iter()
            .find(|x| x.name == "value")
            .ok_or_else(|| GraphDecodingError::MissingAttribute(name.to_string(), "value".to_string()))?;
        let value = match AttributeType::try_from(attr.r#type) {
            Ok(AttributeType::Int) => Value::I64(attr.i),
            Ok(AttributeType::Float) => Value::F64(attr.f),
            Ok(AttributeType::Bool) => Value::Bool(attr.i != 0),
            _ => {
                return Err(GraphDecodingError::MissingAttribute(
                    name.to_string(),
                    "value".to_string(),
                ));
            }
        };
        Ok(Self {
            output: outputs[0],
            value,
        })
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl Operation for ConstantOperation {
    fn get_op_kind(&self) -> OpKind {
        OpKind::Const
    }

    fn get_inputs(&self) -> Vec<ValueId> {
        vec![]
    }

    fn get_outputs(&self) -> Vec<ValueId> {
        vec![self.output]
    }

    fn eval(&self, _ctx: &mut EvalContext, _inputs: &HashMap<ValueId, Value>) -> OperationEvalRet {
        Ok(HashMap::from([(self.output, self.value.clone())]))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdentityOperation {
    input: ValueId,
    output: ValueId,
}

impl IdentityOperation {
    pub(crate) fn from_proto(
        name: &str,
        inputs: &[ValueId],
        outputs: &[ValueId],
    ) -> Result<Self, GraphDecodingError> {
        expect_arity(name, inputs, outputs, 1, 1)?;
        Ok(Self {
            input: inputs[0],
            output: outputs[0],
        })
    }
}

impl Operation for IdentityOperation {
    fn get_op_kind(&self) -> OpKind {
        OpKind::Identity
    }

    fn get_inputs(&self) -> Vec<ValueId> {
        vec![self.input]
    }

    fn get_outputs(&self) -> Vec<ValueId> {
        vec![self.output]
    }

    fn eval(&self, _ctx: &mut EvalContext, inputs: &HashMap<ValueId, Value>) -> OperationEvalRet {
        let value = input_value(inputs, self.input)?.clone();
        Ok(HashMap::from([(self.output, value)]))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WhichBinaryOperation {
    Add,
    Sub,
    Mul,
    Div,
    Less,
    Equal,
}

impl WhichBinaryOperation {
    pub fn apply(&self, a: &Value, b: &Value) -> Result<Value, ValueError> {
        let unsupported = || {
            ValueError::UnsupportedOperands(self.name(), a.value_type(), b.value_type())
        };
        Ok(match (self, a, b) {
            (WhichBinaryOperation::Add, Value::I64(x), Value::I64(y)) => {
                Value::I64(x.checked_add(*y).ok_or(ValueError::Overflow("Add"))?)
            }
            (WhichBinaryOperation::Sub, Value::I64(x), Value::I64(y)) => {
                Value::I64(x.checked_sub(*y).ok_or(ValueError::Overflow("Sub"))?)
            }
            (WhichBinaryOperation::Mul, Value::I64(x), Value::I64(y)) => {
                Value::I64(x.checked_mul(*y).ok_or(ValueError::Overflow("Mul"))?)
            }
            (WhichBinaryOperation::Div, Value::I64(_), Value::I64(0)) => {
                return Err(ValueError::DivisionByZero);
            }
            (WhichBinaryOperation::Div, Value::I64(x), Value::I64(y)) => {
                Value::I64(x.checked_div(*y).ok_or(ValueError::Overflow("Div"))?)
            }
            (WhichBinaryOperation::Add, Value::F64(x), Value::F64(y)) => Value::F64(x + y),
            (WhichBinaryOperation::Sub, Value::F64(x), Value::F64(y)) => Value::F64(x - y),
            (WhichBinaryOperation::Mul, Value::F64(x), Value::F64(y)) => Value::F64(x * y),
            (WhichBinaryOperation::Div, Value::F64(x), Value::F64(y)) => Value::F64(x / y),
            (WhichBinaryOperation::Less, Value::I64(x), Value::I64(y)) => Value::Bool(x < y),
            (WhichBinaryOperation::Less, Value::F64(x), Value::F64(y)) => Value::Bool(x < y),
            (WhichBinaryOperation::Equal, x, y) if x.value_type() == y.value_type() => {
                Value::Bool(x == y)
            }
            _ => return Err(unsupported()),
        })
    }

    fn name(&self) -> &'static str {
        match self {
            WhichBinaryOperation::Add => "Add",
            WhichBinaryOperation::Sub => "Sub",
            WhichBinaryOperation::Mul => "Mul",
            WhichBinaryOperation::Div => "Div",
            WhichBinaryOperation::Less => "Less",
            WhichBinaryOperation::Equal => "Equal",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BinaryOperation {
    a: ValueId,
    b: ValueId,
    output: ValueId,
    which: WhichBinaryOperation,
}

impl BinaryOperation {
    pub(crate) fn from_proto(
        which: WhichBinaryOperation,
        name: &str,
        inputs: &[ValueId],
        outputs: &[ValueId],
    ) -> Result<Self, GraphDecodingError> {
        expect_arity(name, inputs, outputs, 2, 1)?;
        Ok(Self {
            a: inputs[0],
            b: inputs[1],
            output: outputs[0],
            which,
        })
    }
}

impl Operation for BinaryOperation {
    fn get_op_kind(&self) -> OpKind {
        match self.which {
            WhichBinaryOperation::Add => OpKind::Add,
            WhichBinaryOperation::Sub => OpKind::Sub,
            WhichBinaryOperation::Mul => OpKind::Mul,
            WhichBinaryOperation::Div => OpKind::Div,
            WhichBinaryOperation::Less => OpKind::Less,
            WhichBinaryOperation::Equal => OpKind::Equal,
        }
    }

    fn get_inputs(&self) -> Vec<ValueId> {
        vec![self.a, self.b]
    }

    fn get_outputs(&self) -> Vec<ValueId> {
        vec![self.output]
    }

    fn eval(&self, _ctx: &mut EvalContext, inputs: &HashMap<ValueId, Value>) -> OperationEvalRet {
        let a = input_value(inputs, self.a)?;
        let b = input_value(inputs, self.b)?;
        Ok(HashMap::from([(self.output, self.which.apply(a, b)?)]))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MakeTupleOperation {
    inputs: Vec<ValueId>,
    output: ValueId,
}

impl MakeTupleOperation {
    pub(crate) fn from_proto(
        name: &str,
        inputs: Vec<ValueId>,
        outputs: &[ValueId],
    ) -> Result<Self, GraphDecodingError> {
        expect_arity(name, &inputs, outputs, inputs.len(), 1)?;
        Ok(Self {
            inputs,
            output: outputs[0],
        })
    }
}

impl Operation for MakeTupleOperation {
    fn get_op_kind(&self) -> OpKind {
        OpKind::MakeTuple
    }

    fn get_inputs(&self) -> Vec<ValueId> {
        self.inputs.clone()
    }

    fn get_outputs(&self) -> Vec<ValueId> {
        vec![self.output]
    }

    fn eval(&self, _ctx: &mut EvalContext, inputs: &HashMap<ValueId, Value>) -> OperationEvalRet {
        let values = self
            .inputs
            .iter()
            .map(|x| input_value(inputs, *x).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(HashMap::from([(self.output, Value::Tuple(values))]))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TupleGetOperation {
    input: ValueId,
    index: usize,
    output: ValueId,
}

impl TupleGetOperation {
    pub(crate) fn from_proto(
        node: &NodeProto,
        name: &str,
        inputs: &[ValueId],
        outputs: &[ValueId],
    ) -> Result<Self, GraphDecodingError> {
        expect_arity(name, inputs, outputs, 1, 1)?;
        let index = query_attribute_int(&node.attribute, "index")
            .and_then(|x| usize::try_from(x).ok())
            .ok_or_else(|| GraphDecodingError::MissingAttribute(name.to_string(), "index".to_string()))?;
        Ok(Self {
            input: inputs[0],
            index,
            output: outputs[0],
        })
    }
}

impl Operation for TupleGetOperation {
    fn get_op_kind(&self) -> OpKind {
        OpKind::TupleGet
    }

    fn get_inputs(&self) -> Vec<ValueId> {
        vec![self.input]
    }

    fn get_outputs(&self) -> Vec<ValueId> {
        vec![self.output]
    }

    fn eval(&self, _ctx: &mut EvalContext, inputs: &HashMap<ValueId, Value>) -> OperationEvalRet {
        let tuple = input_value(inputs, self.input)?.as_tuple()?;
        let value = tuple
            .get(self.index)
            .cloned()
            .ok_or(ValueError::IndexOutOfRange(self.index as i64, tuple.len()))
            .map_err(EvalError::from)?;
        Ok(HashMap::from([(self.output, value)]))
    }
}
