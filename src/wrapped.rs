use crate::computation_graph::ComputationGraph;
use crate::computation_graph::ops::EvalError;
use crate::eval::{self, Placement};
use crate::observer::ExecutionObserver;
use crate::value::{Value, ValueError, ValueType};
use crate::wrapper::DeviceBinding;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("Computation takes {0} argument(s), got {1}")]
    ArgumentCount(usize, usize),
    #[error("Argument does not match the parameter type: {0}")]
    ArgumentType(#[source] ValueError),
    #[error("Result does not match the declared result type: {0}")]
    ResultType(#[source] ValueError),
    #[error(transparent)]
    EvalError(#[from] EvalError),
}

/// A validated computation bound to its placement. Cheap to clone and safe to call from
/// several threads at once; every call owns its own evaluation state.
#[derive(Clone, Debug)]
pub struct WrappedCallable {
    name: String,
    graph: Arc<ComputationGraph>,
    placement: Arc<Placement>,
    parameter_type: Option<ValueType>,
    result_type: Option<ValueType>,
}

impl WrappedCallable {
    pub(crate) fn new(
        name: String,
        graph: Arc<ComputationGraph>,
        placement: Placement,
        parameter_type: Option<ValueType>,
        result_type: Option<ValueType>,
    ) -> Self {
        Self {
            name,
            graph,
            placement: Arc::new(placement),
            parameter_type,
            result_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn graph(&self) -> &ComputationGraph {
        &self.graph
    }

    pub fn binding(&self) -> &DeviceBinding {
        self.placement.binding()
    }

    pub fn parameter_type(&self) -> Option<&ValueType> {
        self.parameter_type.as_ref()
    }

    pub fn result_type(&self) -> Option<&ValueType> {
        self.result_type.as_ref()
    }

    pub fn call(&self, arg: Option<Value>) -> Result<Value, CallError> {
        self.call_with_observer(arg, &mut ())
    }

    pub fn call_with_observer<T: ExecutionObserver>(
        &self,
        arg: Option<Value>,
        observer: &mut T,
    ) -> Result<Value, CallError> {
        let expected = self.graph.root().num_inputs();
        let args: Vec<Value> = arg.into_iter().collect();
        if args.len() != expected {
            return Err(CallError::ArgumentCount(expected, args.len()));
        }
        if let (Some(arg), Some(parameter_type)) = (args.first(), &self.parameter_type) {
            arg.check_type(parameter_type)
                .map_err(CallError::ArgumentType)?;
        }

        let mut results = eval::evaluate(&self.graph, &self.placement, observer, args)?;
        let result = if results.len() == 1 {
            results.remove(0)
        } else {
            Value::Tuple(results)
        };
        if let Some(result_type) = &self.result_type {
            result
                .check_type(result_type)
                .map_err(CallError::ResultType)?;
        }
        log::debug!("Call to \"{}\" returned {}", self.name, result);
        Ok(result)
    }
}
