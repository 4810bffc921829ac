//! Protobuf wire format for serialized computations.
//!
//! The layout follows ONNX conventions: nodes name their input and output values, and
//! functional operations carry their bodies as graph-valued attributes. The same
//! messages double as the JSON form of a computation.

use serde::{Deserialize, Serialize};

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputationDefProto {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "2")]
    pub graph: Option<GraphProto>,
    #[prost(message, optional, tag = "3")]
    pub parameter_type: Option<TypeProto>,
    #[prost(message, optional, tag = "4")]
    pub result_type: Option<TypeProto>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphProto {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, repeated, tag = "2")]
    pub node: Vec<NodeProto>,
    /// Names of the graph parameters, in positional order.
    #[prost(string, repeated, tag = "3")]
    pub input: Vec<String>,
    #[prost(string, repeated, tag = "4")]
    pub output: Vec<String>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeProto {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub op_type: String,
    #[prost(string, repeated, tag = "3")]
    pub input: Vec<String>,
    #[prost(string, repeated, tag = "4")]
    pub output: Vec<String>,
    /// Requested placement; empty when the node carries no annotation.
    #[prost(string, tag = "5")]
    pub device: String,
    #[prost(message, repeated, tag = "6")]
    pub attribute: Vec<AttributeProto>,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration, Serialize, Deserialize,
)]
#[repr(i32)]
pub enum AttributeType {
    Undefined = 0,
    Int = 1,
    Float = 2,
    String = 3,
    Graph = 4,
    Bool = 5,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeProto {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(enumeration = "AttributeType", tag = "2")]
    pub r#type: i32,
    #[prost(int64, tag = "3")]
    pub i: i64,
    #[prost(double, tag = "4")]
    pub f: f64,
    #[prost(string, tag = "5")]
    pub s: String,
    #[prost(message, optional, tag = "6")]
    pub g: Option<GraphProto>,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration, Serialize, Deserialize,
)]
#[repr(i32)]
pub enum TypeKind {
    Unspecified = 0,
    Int64 = 1,
    Float64 = 2,
    Bool = 3,
    Dataset = 4,
    Tuple = 5,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct TypeProto {
    #[prost(enumeration = "TypeKind", tag = "1")]
    pub kind: i32,
    /// Element type of a dataset (exactly one entry) or the members of a tuple.
    #[prost(message, repeated, tag = "2")]
    pub element: Vec<TypeProto>,
}

impl AttributeProto {
    pub fn int(name: &str, value: i64) -> Self {
        Self {
            name: name.to_string(),
            r#type: AttributeType::Int as i32,
            i: value,
            ..Default::default()
        }
    }

    pub fn float(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            r#type: AttributeType::Float as i32,
            f: value,
            ..Default::default()
        }
    }

    pub fn bool(name: &str, value: bool) -> Self {
        Self {
            name: name.to_string(),
            r#type: AttributeType::Bool as i32,
            i: value as i64,
            ..Default::default()
        }
    }

    pub fn graph(name: &str, value: GraphProto) -> Self {
        Self {
            name: name.to_string(),
            r#type: AttributeType::Graph as i32,
            g: Some(value),
            ..Default::default()
        }
    }
}
