use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[schemars(title = "Present", inline)]
#[serde(default)]
/// Clear and blit parameters.
pub struct PresentOptions {
    /// Linear RGBA used by `clear`.
    #[schemars(title = "Clear Color")]
    pub clear_color: [f32; 4],
    /// Blit with row 0 of the surface at the bottom of the screen.
    #[schemars(title = "Flip Vertical")]
    pub flip_vertical: bool,
}

impl Default for PresentOptions {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 0.0],
            flip_vertical: true,
        }
    }
}
