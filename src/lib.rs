pub mod checker;
pub mod computation;
pub mod computation_graph;
pub mod device;
pub mod eval;
pub mod execution_mode;
pub mod graph;
pub mod observer;
pub mod proto;
pub mod value;
pub mod wrapped;
pub mod wrapper;

pub use checker::{ConstraintViolation, check, find_dataset_reduce_nodes};
pub use computation::ComputationDef;
pub use computation_graph::ComputationGraph;
pub use device::{DeviceSpec, DeviceTopology};
pub use execution_mode::{ExecutionModeConfig, ExecutionModeContext, ReducePlacementPolicy};
pub use value::{Value, ValueType};
pub use wrapped::{CallError, WrappedCallable};
pub use wrapper::{BuildError, DeviceBinding, FunctionWrapperBuilder};
