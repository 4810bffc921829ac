use crate::computation_graph::NodePath;
use crate::device::DeviceSpec;
use crate::value::Value;
use std::fmt;
use std::time::Instant;

/// A named value inside a (possibly nested) graph scope.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ValuePath {
    pub scope: NodePath,
    pub name: String,
}

impl fmt::Display for ValuePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scope.depth() == 0 {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.scope, self.name)
        }
    }
}

pub trait ExecutionObserver {
    fn on_node_executed(
        &mut self,
        node_path: &NodePath,
        device: &DeviceSpec,
        start_instant: Instant,
        end_instant: Instant,
    );
    fn on_value_assigned(&mut self, value_path: &ValuePath, value: &Value);
}

impl ExecutionObserver for () {
    fn on_node_executed(
        &mut self,
        _node_path: &NodePath,
        _device: &DeviceSpec,
        _start_instant: Instant,
        _end_instant: Instant,
    ) {
    }
    fn on_value_assigned(&mut self, _value_path: &ValuePath, _value: &Value) {}
}
