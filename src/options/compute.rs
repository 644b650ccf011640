use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::pipeline::MapAccess;

#[derive(
    Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema,
)]
#[schemars(title = "Compute", inline)]
#[serde(default)]
/// Compute-side registration flags.
pub struct ComputeOptions {
    /// Access granted to compute while a slot is mapped.
    #[schemars(title = "Map Access")]
    pub access: MapAccess,
}
