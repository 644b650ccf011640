// -- Lint policy ---------------------------------------------------------
// This is the single source of truth for crate-wide lints.

// Broad lint groups
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
// Documentation
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::bare_urls)]
// No panicking in library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
// No debug/print artifacts
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
// Import hygiene
#![deny(clippy::wildcard_imports)]
// Complexity limits (thresholds in clippy.toml)
#![deny(clippy::cognitive_complexity)]
#![deny(clippy::too_many_lines)]
#![deny(clippy::excessive_nesting)]
// Function signature hygiene
#![deny(clippy::too_many_arguments)]
#![deny(clippy::fn_params_excessive_bools)]
// Clone / pass-by-value hygiene
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::implicit_clone)]
// String hygiene
#![deny(clippy::inefficient_to_string)]
#![deny(clippy::redundant_closure_for_method_calls)]
#![deny(clippy::manual_string_new)]
#![deny(clippy::str_to_string)]
// Cargo lints (warn, not deny since cargo lints can be noisy)
#![warn(clippy::cargo)]
#![allow(clippy::cargo_common_metadata)]
// Unused / redundant code
#![deny(unused_results)]
#![deny(unused_qualifications)]
// Cast hygiene
#![deny(trivial_casts)]
#![deny(trivial_numeric_casts)]

//! A ring of GPU surfaces shared between a compute pipeline and a display
//! pipeline.
//!
//! Compute kernels write pixels straight into the memory the display
//! pipeline presents, with no host copy. The ring hands each surface back
//! and forth with an explicit per-slot state machine, and can split every
//! surface into column partitions computed on different GPUs.
//!
//! # Key entry points
//!
//! - [`ring::InteropRing`] - the surface ring and its frame protocol
//! - [`pipeline::DisplayPipeline`] / [`pipeline::ComputePipeline`] - the
//!   collaborator seams the ring drives
//! - [`pipeline::host::HostGpu`] - in-memory backend with resource accounting
//! - [`gpu`] - the wgpu backend
//! - [`options::InteropOptions`] - TOML configuration
//!
//! # Frame protocol
//!
//! `map` → compute writes through `array_get` → `unmap` → `swap` → `blit`.
//! A slot is owned by exactly one pipeline at a time; every out-of-order
//! call is rejected with a typed error instead of reaching the GPU.

pub mod error;
pub mod gpu;
pub mod options;
pub mod partition;
pub mod pipeline;
pub mod ring;
pub mod util;
#[cfg(feature = "viewer")]
pub mod viewer;

pub use error::InteropError;
pub use ring::InteropRing;
#[cfg(feature = "viewer")]
pub use viewer::{Viewer, ViewerBuilder};
