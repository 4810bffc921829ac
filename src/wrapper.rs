use crate::checker::{self, ConstraintViolation};
use crate::computation::ComputationDef;
use crate::computation_graph::GraphDecodingError;
use crate::device::{DeviceError, DeviceSpec};
use crate::eval::Placement;
use crate::execution_mode::ExecutionModeContext;
use crate::value::ValueType;
use crate::wrapped::WrappedCallable;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Whole-computation placement chosen when a computation is wrapped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceBinding {
    Cpu,
    Device(DeviceSpec),
    Unconstrained,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    ConstraintViolation(#[from] ConstraintViolation),
    #[error("Invalid device reference {0}: {1}")]
    InvalidDeviceReference(DeviceSpec, #[source] DeviceError),
    #[error("Malformed computation definition: {0}")]
    MalformedComputationDefinition(#[from] GraphDecodingError),
    #[error("Requested parameter type {requested} does not match declared type {declared}")]
    ParameterTypeMismatch {
        requested: ValueType,
        declared: ValueType,
    },
    #[error("Computation takes {inputs} parameter(s), but was wrapped with parameter type {parameter_type:?}")]
    ParameterCountMismatch {
        inputs: usize,
        parameter_type: Option<ValueType>,
    },
}

/// Turns serialized computations into callables, validating them against the
/// session's execution mode first.
#[derive(Clone, Debug)]
pub struct FunctionWrapperBuilder {
    context: Arc<ExecutionModeContext>,
}

impl FunctionWrapperBuilder {
    pub fn new(context: Arc<ExecutionModeContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &ExecutionModeContext {
        &self.context
    }

    /// Either returns a callable for a graph that passed validation, or fails without
    /// producing anything. Pinning the whole computation (to the CPU or to `device`) puts
    /// exactly one device in play, so the constraint check then runs single-device.
    pub fn build(
        &self,
        def: &ComputationDef,
        must_pin_to_cpu: bool,
        param_type: Option<ValueType>,
        device: Option<DeviceSpec>,
    ) -> Result<WrappedCallable, BuildError> {
        let graph = def.extract_graph()?;
        if graph.root().num_inputs() > 1 {
            return Err(GraphDecodingError::TooManyParameters(graph.root().num_inputs()).into());
        }
        log::debug!("Extracted graph for computation \"{}\"", def.name);

        let pinned_device = if must_pin_to_cpu {
            Some(DeviceSpec::cpu())
        } else {
            device
        };
        match pinned_device {
            Some(pinned) => checker::check(&graph, &self.context.pinned_to(pinned))?,
            None => checker::check(&graph, &self.context)?,
        }
        log::debug!("Computation \"{}\" passed constraint validation", def.name);

        let binding = if must_pin_to_cpu {
            DeviceBinding::Cpu
        } else if let Some(device) = device {
            self.context
                .topology()
                .resolve(&device)
                .map_err(|e| BuildError::InvalidDeviceReference(device, e))?;
            DeviceBinding::Device(device)
        } else {
            DeviceBinding::Unconstrained
        };

        let parameter_type = match (param_type, &def.parameter_type) {
            (Some(requested), Some(declared)) if requested != *declared => {
                return Err(BuildError::ParameterTypeMismatch {
                    requested,
                    declared: declared.clone(),
                });
            }
            (Some(requested), _) => Some(requested),
            (None, declared) => declared.clone(),
        };
        let inputs = graph.root().num_inputs();
        if parameter_type.is_some() != (inputs == 1) {
            return Err(BuildError::ParameterCountMismatch {
                inputs,
                parameter_type,
            });
        }

        log::info!(
            "Wrapped computation \"{}\" with binding {:?}",
            def.name,
            binding
        );
        Ok(WrappedCallable::new(
            def.name.clone(),
            Arc::new(graph),
            Placement::new(binding, self.context.topology().clone()),
            parameter_type,
            def.result_type.clone(),
        ))
    }
}
