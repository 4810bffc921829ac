use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Unable to parse device name \"{0}\"")]
    UnparsableDeviceName(String),
    #[error("Unknown device type \"{0}\"")]
    UnknownDeviceKind(String),
    #[error("Device {0} is not present in the current topology")]
    NoSuchDevice(DeviceSpec),
    #[error("Physical GPU {0} is already partitioned")]
    AlreadyPartitioned(u32),
    #[error("A physical GPU needs at least one logical partition")]
    EmptyPartition,
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
pub enum DeviceKind {
    #[strum(serialize = "CPU", ascii_case_insensitive)]
    Cpu,
    #[strum(serialize = "GPU", ascii_case_insensitive)]
    Gpu,
}

/// Name of a single logical device, e.g. `/device:GPU:1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub kind: DeviceKind,
    pub index: u32,
}

impl DeviceSpec {
    pub const fn cpu() -> Self {
        Self {
            kind: DeviceKind::Cpu,
            index: 0,
        }
    }

    pub const fn gpu(index: u32) -> Self {
        Self {
            kind: DeviceKind::Gpu,
            index,
        }
    }

    pub fn is_cpu(&self) -> bool {
        self.kind == DeviceKind::Cpu
    }
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/device:{}:{}", self.kind, self.index)
    }
}

impl FromStr for DeviceSpec {
    type Err = DeviceError;

    /// Accepts `GPU:0`, `/device:GPU:0`, `/gpu:0` and job-qualified names such as
    /// `/job:localhost/replica:0/task:0/device:GPU:0`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unparsable = || DeviceError::UnparsableDeviceName(s.to_string());
        let trimmed = s.trim();
        let last = trimmed
            .rsplit('/')
            .find(|x| !x.is_empty())
            .ok_or_else(unparsable)?;
        let last = last.strip_prefix("device:").unwrap_or(last);
        let (kind, index) = last.rsplit_once(':').ok_or_else(unparsable)?;
        let kind = DeviceKind::from_str(kind)
            .map_err(|_| DeviceError::UnknownDeviceKind(kind.to_string()))?;
        let index = index.parse::<u32>().map_err(|_| unparsable())?;
        Ok(Self { kind, index })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogicalDevice {
    pub spec: DeviceSpec,
    /// Physical accelerator this logical device is carved out of.
    pub physical_index: Option<u32>,
    pub memory_limit_mb: Option<u64>,
}

/// Enumeration of the logical devices visible to an execution session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceTopology {
    devices: Vec<LogicalDevice>,
}

impl Default for DeviceTopology {
    fn default() -> Self {
        Self::cpu_only()
    }
}

impl DeviceTopology {
    pub fn cpu_only() -> Self {
        Self {
            devices: vec![LogicalDevice {
                spec: DeviceSpec::cpu(),
                physical_index: None,
                memory_limit_mb: None,
            }],
        }
    }

    /// One logical GPU per physical GPU, without memory limits.
    pub fn with_physical_gpus(count: u32) -> Self {
        let mut topology = Self::cpu_only();
        for physical in 0..count {
            let index = topology.logical_gpus().count() as u32;
            topology.devices.push(LogicalDevice {
                spec: DeviceSpec::gpu(index),
                physical_index: Some(physical),
                memory_limit_mb: None,
            });
        }
        topology
    }

    /// Splits physical GPU `physical` into one logical GPU per entry of `memory_limits_mb`.
    /// Logical GPU indices are assigned in order after any already present.
    pub fn partition_physical_gpu(
        &mut self,
        physical: u32,
        memory_limits_mb: &[u64],
    ) -> Result<(), DeviceError> {
        if memory_limits_mb.is_empty() {
            return Err(DeviceError::EmptyPartition);
        }
        if self
            .devices
            .iter()
            .any(|x| x.physical_index == Some(physical))
        {
            return Err(DeviceError::AlreadyPartitioned(physical));
        }
        for limit in memory_limits_mb {
            let index = self.logical_gpus().count() as u32;
            self.devices.push(LogicalDevice {
                spec: DeviceSpec::gpu(index),
                physical_index: Some(physical),
                memory_limit_mb: Some(*limit),
            });
        }
        log::debug!(
            "Partitioned physical GPU {} into {} logical devices",
            physical,
            memory_limits_mb.len()
        );
        Ok(())
    }

    pub fn devices(&self) -> &[LogicalDevice] {
        &self.devices
    }

    pub fn logical_gpus(&self) -> impl Iterator<Item = &LogicalDevice> {
        self.devices.iter().filter(|x| x.spec.kind == DeviceKind::Gpu)
    }

    pub fn resolve(&self, spec: &DeviceSpec) -> Result<&LogicalDevice, DeviceError> {
        self.devices
            .iter()
            .find(|x| x.spec == *spec)
            .ok_or(DeviceError::NoSuchDevice(*spec))
    }

    /// The host CPU and `spec` only, if present.
    pub fn restricted_to(&self, spec: &DeviceSpec) -> Self {
        Self {
            devices: self
                .devices
                .iter()
                .filter(|x| x.spec.is_cpu() || x.spec == *spec)
                .cloned()
                .collect(),
        }
    }

    pub fn contains(&self, spec: &DeviceSpec) -> bool {
        self.resolve(spec).is_ok()
    }

    /// Framework-default placement: the first logical GPU, else the CPU.
    pub fn default_device(&self) -> DeviceSpec {
        self.logical_gpus()
            .next()
            .map(|x| x.spec)
            .unwrap_or(DeviceSpec::cpu())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_device_name_forms() {
        let expected = DeviceSpec::gpu(1);
        for name in [
            "GPU:1",
            "gpu:1",
            "/device:GPU:1",
            "/gpu:1",
            "/job:localhost/replica:0/task:0/device:GPU:1",
        ] {
            assert_eq!(name.parse::<DeviceSpec>().unwrap(), expected, "{name}");
        }
        assert_eq!("/device:CPU:0".parse::<DeviceSpec>().unwrap(), DeviceSpec::cpu());
    }

    #[test]
    fn rejects_bad_device_names() {
        assert!(matches!(
            "TPU:0".parse::<DeviceSpec>(),
            Err(DeviceError::UnknownDeviceKind(_))
        ));
        assert!(matches!(
            "/device:GPU".parse::<DeviceSpec>(),
            Err(DeviceError::UnknownDeviceKind(_)) | Err(DeviceError::UnparsableDeviceName(_))
        ));
        assert!(matches!(
            "GPU:x".parse::<DeviceSpec>(),
            Err(DeviceError::UnparsableDeviceName(_))
        ));
    }

    #[test]
    fn display_round_trips_through_parse() {
        let spec = DeviceSpec::gpu(3);
        assert_eq!(spec.to_string(), "/device:GPU:3");
        assert_eq!(spec.to_string().parse::<DeviceSpec>().unwrap(), spec);
    }

    #[test]
    fn partitions_one_physical_gpu() {
        let mut topology = DeviceTopology::cpu_only();
        topology.partition_physical_gpu(0, &[128, 128]).unwrap();
        let gpus: Vec<_> = topology.logical_gpus().map(|x| x.spec).collect();
        assert_eq!(gpus, vec![DeviceSpec::gpu(0), DeviceSpec::gpu(1)]);
        assert_eq!(topology.default_device(), DeviceSpec::gpu(0));
        assert!(matches!(
            topology.partition_physical_gpu(0, &[64]),
            Err(DeviceError::AlreadyPartitioned(0))
        ));
        assert!(matches!(
            topology.resolve(&DeviceSpec::gpu(2)),
            Err(DeviceError::NoSuchDevice(_))
        ));
    }
}
