use crate::computation_graph::{ComputationGraph, GraphDecodingError};
use crate::proto::{ComputationDefProto, GraphProto, TypeProto};
use crate::value::ValueType;
use prost::Message;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    SerdeJSONError(#[from] serde_json::Error),
    #[error(transparent)]
    GraphDecodingError(#[from] GraphDecodingError),
    #[error("Unrecognized computation file format: {0}")]
    UnknownFormat(PathBuf),
}

/// A serialized computation plus the type metadata it was declared with.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ComputationDef {
    pub name: String,
    #[serde(default)]
    pub graph: Option<GraphProto>,
    #[serde(default)]
    pub parameter_type: Option<ValueType>,
    #[serde(default)]
    pub result_type: Option<ValueType>,
}

impl ComputationDef {
    pub fn new(name: &str, graph: GraphProto) -> Self {
        Self {
            name: name.to_string(),
            graph: Some(graph),
            parameter_type: None,
            result_type: None,
        }
    }

    pub fn with_parameter_type(mut self, parameter_type: ValueType) -> Self {
        self.parameter_type = Some(parameter_type);
        self
    }

    pub fn with_result_type(mut self, result_type: ValueType) -> Self {
        self.result_type = Some(result_type);
        self
    }

    pub fn from_proto_bytes(bytes: &[u8]) -> Result<Self, GraphDecodingError> {
        let proto = ComputationDefProto::decode(bytes).map_err(anyhow::Error::from)?;
        Ok(Self {
            name: proto.name,
            graph: proto.graph,
            parameter_type: proto
                .parameter_type
                .as_ref()
                .map(ValueType::try_from)
                .transpose()?,
            result_type: proto
                .result_type
                .as_ref()
                .map(ValueType::try_from)
                .transpose()?,
        })
    }

    pub fn to_proto_bytes(&self) -> Vec<u8> {
        ComputationDefProto {
            name: self.name.clone(),
            graph: self.graph.clone(),
            parameter_type: self.parameter_type.as_ref().map(TypeProto::from),
            result_type: self.result_type.as_ref().map(TypeProto::from),
        }
        .encode_to_vec()
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Loads a `.pb` (protobuf) or `.json` definition.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let def = match path.extension().and_then(|x| x.to_str()) {
            Some("pb") => Self::from_proto_bytes(&std::fs::read(path)?)?,
            Some("json") => Self::from_json(&std::fs::read_to_string(path)?)?,
            _ => return Err(LoadError::UnknownFormat(path.to_path_buf())),
        };
        log::debug!("Loaded computation \"{}\" from {}", def.name, path.display());
        Ok(def)
    }

    /// Decodes the embedded graph. Fails if it is absent or structurally invalid.
    pub fn extract_graph(&self) -> Result<ComputationGraph, GraphDecodingError> {
        let graph = self
            .graph
            .as_ref()
            .ok_or(GraphDecodingError::MissingField("graph"))?;
        ComputationGraph::from_proto(graph)
    }
}
