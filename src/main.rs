//! Demo binary: opens a window and runs the interop ring.
//!
//! Usage: `interop-ring [options.toml]`

use std::path::Path;

use interop_ring::{options::InteropOptions, Viewer};

fn main() {
    env_logger::init();

    let options = match std::env::args().nth(1) {
        Some(path) => match InteropOptions::load(Path::new(&path)) {
            Ok(options) => {
                log::info!("loaded options from {path}");
                options
            }
            Err(e) => {
                log::error!("{e}");
                std::process::exit(1);
            }
        },
        None => InteropOptions::default(),
    };

    if let Err(e) = Viewer::builder().with_options(options).build().run() {
        log::error!("{e}");
        std::process::exit(1);
    }
}
