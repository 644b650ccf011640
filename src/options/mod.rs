//! Interop ring configuration with TOML preset support.
//!
//! Ring shape, presentation, compute access flags and adapter selection are
//! consolidated here. Options serialize to/from TOML; every section uses
//! `#[serde(default)]` so a file only needs the keys it overrides.

mod compute;
mod devices;
mod present;
mod ring;

use std::path::Path;

pub use compute::ComputeOptions;
pub use devices::DeviceOptions;
pub use present::PresentOptions;
pub use ring::RingOptions;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::InteropError;

/// Top-level options container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default, JsonSchema)]
#[serde(default)]
pub struct InteropOptions {
    /// Ring shape.
    pub ring: RingOptions,
    /// Clear and blit parameters.
    pub present: PresentOptions,
    /// Compute registration flags.
    pub compute: ComputeOptions,
    /// Adapter selection (wgpu backend only).
    pub devices: DeviceOptions,
}

impl InteropOptions {
    /// Generate JSON Schema describing the options.
    #[must_use]
    pub fn json_schema() -> schemars::Schema {
        schemars::schema_for!(InteropOptions)
    }

    /// Load options from a TOML file. Missing fields use defaults.
    pub fn load(path: &Path) -> Result<Self, InteropError> {
        let content = std::fs::read_to_string(path).map_err(InteropError::Io)?;
        Self::from_toml(&content)
    }

    /// Parse options from a TOML string. Missing fields use defaults.
    pub fn from_toml(content: &str) -> Result<Self, InteropError> {
        toml::from_str(content)
            .map_err(|e| InteropError::OptionsParse(e.to_string()))
    }

    /// Save options to a TOML file (pretty-printed).
    pub fn save(&self, path: &Path) -> Result<(), InteropError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| InteropError::OptionsParse(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(InteropError::Io)?;
        }
        std::fs::write(path, content).map_err(InteropError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::MapAccess;

    #[test]
    fn default_round_trips_through_toml() {
        let opts = InteropOptions::default();
        let toml_str = toml::to_string_pretty(&opts).unwrap();
        let parsed: InteropOptions = toml::from_str(&toml_str).unwrap();
        assert_eq!(opts, parsed);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml_str = r"
[ring]
slot_count = 3

[compute]
access = 'read_write'
";
        let opts = InteropOptions::from_toml(toml_str).unwrap();
        assert_eq!(opts.ring.slot_count, 3);
        assert!(!opts.ring.multi_gpu);
        assert_eq!(opts.compute.access, MapAccess::ReadWrite);
        assert!(opts.present.flip_vertical);
        assert_eq!(opts.present.clear_color, [0.0; 4]);
        assert_eq!(opts.devices.max_devices, 0);
    }

    #[test]
    fn bad_toml_is_an_options_error() {
        let err = InteropOptions::from_toml("[ring]\nslot_count = 'two'")
            .unwrap_err();
        assert!(matches!(err, InteropError::OptionsParse(_)));
    }

    #[test]
    fn save_then_load() {
        let dir = std::env::temp_dir()
            .join(format!("interop-ring-options-{}", std::process::id()));
        let path = dir.join("preset.toml");
        let mut opts = InteropOptions::default();
        opts.ring.multi_gpu = true;
        opts.present.clear_color = [0.25, 0.5, 0.75, 1.0];
        opts.save(&path).unwrap();
        assert_eq!(InteropOptions::load(&path).unwrap(), opts);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn schema_has_expected_properties() {
        let schema_value =
            serde_json::to_value(InteropOptions::json_schema()).unwrap();
        let props = schema_value["properties"].as_object().unwrap();
        for section in ["ring", "present", "compute", "devices"] {
            assert!(props.contains_key(section), "missing {section}");
        }
        let ring = &props["ring"]["properties"];
        assert!(ring.get("slot_count").is_some());
        assert!(ring.get("multi_gpu").is_some());
    }
}
