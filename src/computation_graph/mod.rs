pub mod builder;
pub mod ops;

use crate::device::{DeviceError, DeviceSpec};
use crate::graph::{InnerGraph, Node};
use crate::proto::{self, AttributeType, GraphProto, NodeProto, TypeKind, TypeProto};
use crate::value::ValueType;
use ops::{AnyOperation, OpKind, Operation};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum GraphDecodingError {
    #[error("Missing field \"{0}\"")]
    MissingField(&'static str),
    #[error("Unknown operator type \"{0}\"")]
    UnknownOperator(String),
    #[error("Unknown value name \"{1}\" referenced by node {0}")]
    UnknownValueName(String, String),
    #[error("Value name \"{0}\" is defined more than once")]
    DuplicateValueName(String),
    #[error("Node name \"{0}\" is used more than once")]
    DuplicateNodeName(String),
    #[error("Operator {0} expects {1} inputs, got {2}")]
    WrongInputCount(String, usize, usize),
    #[error("Operator {0} expects {1} outputs, got {2}")]
    WrongOutputCount(String, usize, usize),
    #[error("Missing expected attribute \"{1}\" for op {0}")]
    MissingAttribute(String, String),
    #[error("Function \"{1}\" of op {0} expects {2} parameters and {3} results")]
    FunctionSignatureMismatch(String, String, usize, usize),
    #[error("Unsupported type proto kind {0}")]
    UnsupportedType(i32),
    #[error("Invalid device annotation on node {0}: {1}")]
    InvalidDeviceAnnotation(String, DeviceError),
    #[error("A computation takes at most one parameter, graph declares {0}")]
    TooManyParameters(usize),
    #[error("Protobuf decoding error")]
    ProtobufDecodeError(#[from] anyhow::Error),
}

pub type ValueId = usize;
pub type NodeId = usize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
enum ValueKind {
    Parameter,
    Intermediate,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueInfo {
    name: String,
    kind: ValueKind,
}

impl ValueInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_parameter(&self) -> bool {
        self.kind == ValueKind::Parameter
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GraphNode {
    pub name: String,
    /// Placement requested by the node itself.
    pub device: Option<DeviceSpec>,
    pub op: AnyOperation,
}

impl Node<ValueId> for GraphNode {
    type OpKind = OpKind;
    type SubGraph = GraphBody;

    fn op_kind(&self) -> OpKind {
        self.op.get_op_kind()
    }

    fn inputs(&self) -> Box<dyn Iterator<Item = ValueId> + '_> {
        Box::new(self.op.get_inputs().into_iter())
    }

    fn outputs(&self) -> Box<dyn Iterator<Item = ValueId> + '_> {
        Box::new(self.op.get_outputs().into_iter())
    }

    fn sub_graphs(&self) -> Vec<(&'static str, &GraphBody)> {
        self.op.get_sub_graphs()
    }
}

/// One scope of a computation: the root graph, or a function body embedded in a node.
/// Value ids are local to the body.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GraphBody {
    name: String,
    values: HashMap<ValueId, ValueInfo>,
    nodes: BTreeMap<NodeId, GraphNode>,
    ordered_inputs: Vec<ValueId>,
    ordered_outputs: Vec<ValueId>,
}

impl GraphBody {
    pub fn from_proto(graph: &GraphProto) -> Result<Self, GraphDecodingError> {
        let mut body = Self {
            name: graph.name.clone(),
            values: HashMap::new(),
            nodes: BTreeMap::new(),
            ordered_inputs: Vec::new(),
            ordered_outputs: Vec::new(),
        };
        let mut values_by_name: HashMap<String, ValueId> = HashMap::new();

        for name in &graph.input {
            let id = body.define_value(&mut values_by_name, name, ValueKind::Parameter)?;
            body.ordered_inputs.push(id);
        }
        // Outputs are registered before any node is decoded so that node order in the
        // proto does not matter.
        let mut node_outputs = Vec::with_capacity(graph.node.len());
        for node in &graph.node {
            let mut outputs = Vec::with_capacity(node.output.len());
            for name in &node.output {
                outputs.push(body.define_value(&mut values_by_name, name, ValueKind::Intermediate)?);
            }
            node_outputs.push(outputs);
        }

        let mut node_names = HashMap::new();
        for (node_id, (node, outputs)) in graph.node.iter().zip(node_outputs).enumerate() {
            let name = if node.name.is_empty() {
                format!("{}_{}", node.op_type, node_id)
            } else {
                node.name.clone()
            };
            if node_names.insert(name.clone(), node_id).is_some() {
                return Err(GraphDecodingError::DuplicateNodeName(name));
            }
            let inputs = node
                .input
                .iter()
                .map(|x| {
                    values_by_name
                        .get(x)
                        .copied()
                        .ok_or_else(|| GraphDecodingError::UnknownValueName(name.clone(), x.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let device = if node.device.is_empty() {
                None
            } else {
                Some(
                    node.device
                        .parse::<DeviceSpec>()
                        .map_err(|e| GraphDecodingError::InvalidDeviceAnnotation(name.clone(), e))?,
                )
            };
            let op = AnyOperation::from_proto(node, &name, inputs, outputs)?;
            body.nodes.insert(node_id, GraphNode { name, device, op });
        }

        for name in &graph.output {
            let id = values_by_name.get(name).copied().ok_or_else(|| {
                GraphDecodingError::UnknownValueName(graph.name.clone(), name.clone())
            })?;
            body.ordered_outputs.push(id);
        }
        Ok(body)
    }

    fn define_value(
        &mut self,
        values_by_name: &mut HashMap<String, ValueId>,
        name: &str,
        kind: ValueKind,
    ) -> Result<ValueId, GraphDecodingError> {
        if values_by_name.contains_key(name) {
            return Err(GraphDecodingError::DuplicateValueName(name.to_string()));
        }
        let id = self.values.len();
        self.values.insert(
            id,
            ValueInfo {
                name: name.to_string(),
                kind,
            },
        );
        values_by_name.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_nodes(&self) -> &BTreeMap<NodeId, GraphNode> {
        &self.nodes
    }

    pub fn get_value_info(&self, value_id: ValueId) -> Option<&ValueInfo> {
        self.values.get(&value_id)
    }

    pub fn get_value_name(&self, value_id: ValueId) -> Option<&str> {
        self.values.get(&value_id).map(|x| x.name.as_str())
    }

    pub fn num_inputs(&self) -> usize {
        self.ordered_inputs.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.ordered_outputs.len()
    }

    /// Node count including every embedded sub-graph.
    pub fn total_node_count(&self) -> usize {
        self.nodes
            .values()
            .map(|node| {
                1 + node
                    .sub_graphs()
                    .iter()
                    .map(|(_, body)| body.total_node_count())
                    .sum::<usize>()
            })
            .sum()
    }
}

impl InnerGraph for GraphBody {
    type NodeId = NodeId;
    type LinkId = ValueId;
    type AnyNode = GraphNode;

    fn nodes(&self) -> Box<dyn Iterator<Item = NodeId> + '_> {
        Box::new(self.nodes.keys().copied())
    }

    fn get_node(&self, id: &NodeId) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    fn input_links(&self) -> Box<dyn Iterator<Item = ValueId> + '_> {
        Box::new(self.ordered_inputs.iter().copied())
    }

    fn output_links(&self) -> Box<dyn Iterator<Item = ValueId> + '_> {
        Box::new(self.ordered_outputs.iter().copied())
    }
}

/// A decoded, immutable computation graph.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComputationGraph {
    root: GraphBody,
}

impl ComputationGraph {
    pub fn from_proto(graph: &GraphProto) -> Result<Self, GraphDecodingError> {
        Ok(Self {
            root: GraphBody::from_proto(graph)?,
        })
    }

    pub fn root(&self) -> &GraphBody {
        &self.root
    }
}

/// Location of a node, possibly nested inside function bodies: `map_1/f/reduce_0`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodePath(Vec<String>);

impl NodePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn join(&self, segment: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

pub(crate) fn query_attribute_int(attributes: &[proto::AttributeProto], name: &str) -> Option<i64> {
    attributes
        .iter()
        .find(|attr| attr.name == name && attr.r#type == AttributeType::Int as i32)
        .map(|attr| attr.i)
}

pub(crate) fn query_attribute_graph<'a>(
    attributes: &'a [proto::AttributeProto],
    name: &str,
) -> Option<&'a GraphProto> {
    attributes
        .iter()
        .find(|attr| attr.name == name && attr.r#type == AttributeType::Graph as i32)
        .and_then(|attr| attr.g.as_ref())
}

pub(crate) fn require_function(
    node: &NodeProto,
    op_name: &str,
    attribute: &str,
    num_inputs: usize,
    num_outputs: usize,
) -> Result<GraphBody, GraphDecodingError> {
    let graph = query_attribute_graph(&node.attribute, attribute).ok_or_else(|| {
        GraphDecodingError::MissingAttribute(op_name.to_string(), attribute.to_string())
    })?;
    let body = GraphBody::from_proto(graph)?;
    if body.num_inputs() != num_inputs || body.num_outputs() != num_outputs {
        return Err(GraphDecodingError::FunctionSignatureMismatch(
            op_name.to_string(),
            attribute.to_string(),
            num_inputs,
            num_outputs,
        ));
    }
    Ok(body)
}

impl TryFrom<&TypeProto> for ValueType {
    type Error = GraphDecodingError;

    fn try_from(value: &TypeProto) -> Result<Self, Self::Error> {
        let kind = TypeKind::try_from(value.kind)
            .map_err(|_| GraphDecodingError::UnsupportedType(value.kind))?;
        Ok(match kind {
            TypeKind::Int64 => ValueType::I64,
            TypeKind::Float64 => ValueType::F64,
            TypeKind::Bool => ValueType::Bool,
            TypeKind::Dataset => {
                let [element] = value.element.as_slice() else {
                    return Err(GraphDecodingError::MissingField("type.dataset.element"));
                };
                ValueType::Dataset(Box::new(ValueType::try_from(element)?))
            }
            TypeKind::Tuple => ValueType::Tuple(
                value
                    .element
                    .iter()
                    .map(ValueType::try_from)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            TypeKind::Unspecified => return Err(GraphDecodingError::UnsupportedType(value.kind)),
        })
    }
}

impl From<&ValueType> for TypeProto {
    fn from(value: &ValueType) -> Self {
        let (kind, element) = match value {
            ValueType::I64 => (TypeKind::Int64, vec![]),
            ValueType::F64 => (TypeKind::Float64, vec![]),
            ValueType::Bool => (TypeKind::Bool, vec![]),
            ValueType::Dataset(element) => (TypeKind::Dataset, vec![TypeProto::from(element.as_ref())]),
            ValueType::Tuple(elements) => {
                (TypeKind::Tuple, elements.iter().map(TypeProto::from).collect())
            }
        };
        TypeProto {
            kind: kind as i32,
            element,
        }
    }
}
