use crate::computation_graph::ops::{
    EvalError, OpKind, Operation, OperationEvalRet, expect_arity, input_value,
};
use crate::computation_graph::{
    GraphBody, GraphDecodingError, ValueId, query_attribute_int, require_function,
};
use crate::eval::EvalContext;
use crate::proto::NodeProto;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn gather(ids: &[ValueId], inputs: &HashMap<ValueId, Value>) -> Result<Vec<Value>, EvalError> {
    ids.iter()
        .map(|x| input_value(inputs, *x).cloned())
        .collect()
}

fn bind_outputs(outputs: &[ValueId], results: Vec<Value>) -> OperationEvalRet {
    if results.len() != outputs.len() {
        return Err(EvalError::FunctionArity(outputs.len(), results.len()));
    }
    Ok(outputs.iter().copied().zip(results).collect())
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IfOperation {
    condition: ValueId,
    args: Vec<ValueId>,
    outputs: Vec<ValueId>,
    then_branch: GraphBody,
    else_branch: GraphBody,
}

impl IfOperation {
    pub(crate) fn from_proto(
        node: &NodeProto,
        name: &str,
        inputs: &[ValueId],
        outputs: Vec<ValueId>,
    ) -> Result<Self, GraphDecodingError> {
        let Some((condition, args)) = inputs.split_first() else {
            return Err(GraphDecodingError::WrongInputCount(name.to_string(), 1, 0));
        };
        let then_branch = require_function(node, name, "then_branch", args.len(), outputs.len())?;
        let else_branch = require_function(node, name, "else_branch", args.len(), outputs.len())?;
        Ok(Self {
            condition: *condition,
            args: args.to_vec(),
            outputs,
            then_branch,
            else_branch,
        })
    }
}

impl Operation for IfOperation {
    fn get_op_kind(&self) -> OpKind {
        OpKind::If
    }

    fn get_inputs(&self) -> Vec<ValueId> {
        let mut inputs = vec![self.condition];
        inputs.extend(&self.args);
        inputs
    }

    fn get_outputs(&self) -> Vec<ValueId> {
        self.outputs.clone()
    }

    fn get_sub_graphs(&self) -> Vec<(&'static str, &GraphBody)> {
        vec![
            ("then_branch", &self.then_branch),
            ("else_branch", &self.else_branch),
        ]
    }

    fn eval(&self, ctx: &mut EvalContext, inputs: &HashMap<ValueId, Value>) -> OperationEvalRet {
        let condition = input_value(inputs, self.condition)?.as_bool()?;
        let args = gather(&self.args, inputs)?;
        let results = if condition {
            ctx.call_function("then_branch", &self.then_branch, args)?
        } else {
            ctx.call_function("else_branch", &self.else_branch, args)?
        };
        bind_outputs(&self.outputs, results)
    }
}

/// `while cond(vars) { vars = body(vars) }`, returning the final loop variables.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WhileOperation {
    loop_vars: Vec<ValueId>,
    outputs: Vec<ValueId>,
    cond: GraphBody,
    body: GraphBody,
    maximum_iterations: Option<i64>,
}

impl WhileOperation {
    pub(crate) fn from_proto(
        node: &NodeProto,
        name: &str,
        inputs: Vec<ValueId>,
        outputs: Vec<ValueId>,
    ) -> Result<Self, GraphDecodingError> {
        expect_arity(name, &inputs, &outputs, inputs.len(), inputs.len())?;
        let cond = require_function(node, name, "cond", inputs.len(), 1)?;
        let body = require_function(node, name, "body", inputs.len(), inputs.len())?;
        let maximum_iterations = query_attribute_int(&node.attribute, "maximum_iterations");
        Ok(Self {
            loop_vars: inputs,
            outputs,
            cond,
            body,
            maximum_iterations,
        })
    }
}

impl Operation for WhileOperation {
    fn get_op_kind(&self) -> OpKind {
        OpKind::While
    }

    fn get_inputs(&self) -> Vec<ValueId> {
        self.loop_vars.clone()
    }

    fn get_outputs(&self) -> Vec<ValueId> {
        self.outputs.clone()
    }

    fn get_sub_graphs(&self) -> Vec<(&'static str, &GraphBody)> {
        vec![("cond", &self.cond), ("body", &self.body)]
    }

    fn eval(&self, ctx: &mut EvalContext, inputs: &HashMap<ValueId, Value>) -> OperationEvalRet {
        let mut vars = gather(&self.loop_vars, inputs)?;
        let var_types: Vec<_> = vars.iter().map(|x| x.value_type()).collect();
        let mut iterations = 0i64;
        loop {
            let mut keep_going = ctx.call_function("cond", &self.cond, vars.clone())?;
            let keep_going = keep_going
                .pop()
                .ok_or(EvalError::FunctionArity(1, 0))?
                .as_bool()?;
            if !keep_going {
                break;
            }
            if let Some(limit) = self.maximum_iterations {
                if iterations >= limit {
                    return Err(EvalError::IterationLimit(limit));
                }
            }
            vars = ctx.call_function("body", &self.body, vars)?;
            for (var, var_type) in vars.iter().zip(&var_types) {
                var.check_type(var_type)?;
            }
            iterations += 1;
        }
        log::trace!("While loop finished after {iterations} iterations");
        bind_outputs(&self.outputs, vars)
    }
}

/// Invokes an embedded function with the node's inputs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CallOperation {
    args: Vec<ValueId>,
    outputs: Vec<ValueId>,
    function: GraphBody,
}

impl CallOperation {
    pub(crate) fn from_proto(
        node: &NodeProto,
        name: &str,
        inputs: Vec<ValueId>,
        outputs: Vec<ValueId>,
    ) -> Result<Self, GraphDecodingError> {
        let function = require_function(node, name, "f", inputs.len(), outputs.len())?;
        Ok(Self {
            args: inputs,
            outputs,
            function,
        })
    }
}

impl Operation for CallOperation {
    fn get_op_kind(&self) -> OpKind {
        OpKind::Call
    }

    fn get_inputs(&self) -> Vec<ValueId> {
        self.args.clone()
    }

    fn get_outputs(&self) -> Vec<ValueId> {
        self.outputs.clone()
    }

    fn get_sub_graphs(&self) -> Vec<(&'static str, &GraphBody)> {
        vec![("f", &self.function)]
    }

    fn eval(&self, ctx: &mut EvalContext, inputs: &HashMap<ValueId, Value>) -> OperationEvalRet {
        let args = gather(&self.args, inputs)?;
        let results = ctx.call_function("f", &self.function, args)?;
        bind_outputs(&self.outputs, results)
    }
}
