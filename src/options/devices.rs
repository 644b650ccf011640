use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema,
)]
#[schemars(title = "Devices", inline)]
#[serde(default)]
/// Adapter selection for the wgpu backend.
pub struct DeviceOptions {
    /// Use at most this many adapters (0 = every adapter found).
    #[schemars(title = "Max Devices", range(min = 0, max = 8))]
    pub max_devices: usize,
    /// Accept software/CPU adapters.
    #[schemars(title = "Allow Software")]
    pub allow_software: bool,
}
