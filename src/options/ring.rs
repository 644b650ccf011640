use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[schemars(title = "Ring", inline)]
#[serde(default)]
/// Ring shape. Fixed for the lifetime of an [`InteropRing`](crate::ring::InteropRing).
pub struct RingOptions {
    /// Number of surface slots in the ring.
    #[schemars(title = "Slot Count", range(min = 1, max = 8))]
    pub slot_count: usize,
    /// Split each surface into column partitions, one per device.
    #[schemars(title = "Multi-GPU")]
    pub multi_gpu: bool,
}

impl Default for RingOptions {
    fn default() -> Self {
        Self {
            slot_count: 2,
            multi_gpu: false,
        }
    }
}
