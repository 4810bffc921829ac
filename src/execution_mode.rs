use crate::device::{DeviceError, DeviceSpec, DeviceTopology};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

pub const LOGICAL_GPUS_ENV: &str = "REPLICA_EXECUTOR_LOGICAL_GPUS";
pub const REDUCE_POLICY_ENV: &str = "REPLICA_EXECUTOR_REDUCE_POLICY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    SerdeJSONError(#[from] serde_json::Error),
    #[error(transparent)]
    DeviceError(#[from] DeviceError),
    #[error("Invalid value \"{1}\" for {0}")]
    InvalidValue(&'static str, String),
}

/// How the constraint checker treats a dataset reduce node that carries its own device annotation.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ReducePlacementPolicy {
    /// The annotation is ignored; any reduce under multi-device mode is rejected.
    #[default]
    Strict,
    /// A reduce node annotated with one logical device is accepted.
    AllowPinnedNodes,
}

/// Serializable description of the device layout an execution session starts from.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionModeConfig {
    /// Memory limits (MB) of the logical partitions of each physical GPU.
    pub physical_gpus: Vec<Vec<u64>>,
    pub reduce_policy: ReducePlacementPolicy,
}

impl ExecutionModeConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Reads `REPLICA_EXECUTOR_LOGICAL_GPUS` (comma separated memory limits of the
    /// partitions of one physical GPU, e.g. `128,128`) and `REPLICA_EXECUTOR_REDUCE_POLICY`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(value) = std::env::var(LOGICAL_GPUS_ENV) {
            let limits = value
                .split(',')
                .map(str::trim)
                .filter(|x| !x.is_empty())
                .map(|x| {
                    x.parse::<u64>()
                        .map_err(|_| ConfigError::InvalidValue(LOGICAL_GPUS_ENV, value.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            if !limits.is_empty() {
                config.physical_gpus.push(limits);
            }
        }
        if let Ok(value) = std::env::var(REDUCE_POLICY_ENV) {
            config.reduce_policy = ReducePlacementPolicy::from_str(value.trim())
                .map_err(|_| ConfigError::InvalidValue(REDUCE_POLICY_ENV, value.clone()))?;
        }
        Ok(config)
    }

    pub fn topology(&self) -> Result<DeviceTopology, ConfigError> {
        let mut topology = DeviceTopology::cpu_only();
        for (physical, limits) in self.physical_gpus.iter().enumerate() {
            topology.partition_physical_gpu(physical as u32, limits)?;
        }
        Ok(topology)
    }
}

/// Read-only description of the active session: its device topology and whether a
/// computation is replicated across more than one logical device.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionModeContext {
    topology: DeviceTopology,
    multi_device: bool,
    reduce_policy: ReducePlacementPolicy,
}

impl ExecutionModeContext {
    pub fn new(topology: DeviceTopology) -> Self {
        let multi_device = topology.logical_gpus().count() > 1;
        log::info!(
            "Execution mode: {} logical GPU(s), multi-device = {}",
            topology.logical_gpus().count(),
            multi_device
        );
        Self {
            topology,
            multi_device,
            reduce_policy: ReducePlacementPolicy::default(),
        }
    }

    pub fn single_device() -> Self {
        Self::new(DeviceTopology::cpu_only())
    }

    pub fn from_config(config: &ExecutionModeConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.topology()?).with_reduce_policy(config.reduce_policy))
    }

    pub fn with_reduce_policy(mut self, reduce_policy: ReducePlacementPolicy) -> Self {
        self.reduce_policy = reduce_policy;
        self
    }

    pub fn topology(&self) -> &DeviceTopology {
        &self.topology
    }

    pub fn is_multi_device(&self) -> bool {
        self.multi_device
    }

    pub fn reduce_policy(&self) -> ReducePlacementPolicy {
        self.reduce_policy
    }

    /// The same session narrowed to `device` (plus the host CPU), used when a whole
    /// computation is pinned to one device at wrap time.
    pub fn pinned_to(&self, device: DeviceSpec) -> Self {
        let topology = self.topology.restricted_to(&device);
        let multi_device = topology.logical_gpus().count() > 1;
        log::debug!("Scoping execution mode to single device {device}");
        Self {
            topology,
            multi_device,
            reduce_policy: self.reduce_policy,
        }
    }
}
