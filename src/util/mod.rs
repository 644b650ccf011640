//! Shared utilities.

/// Frame pacing and FPS reporting.
pub mod frame_timing;
