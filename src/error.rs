//! Crate-level error types.

use std::fmt;

use crate::gpu::GpuContextError;
use crate::ring::{
    ConfigError, MapError, PresentError, ResizeError, SwapError, UnmapError,
};

/// Errors produced by the interop-ring crate.
#[derive(Debug)]
pub enum InteropError {
    /// Invalid ring configuration.
    Config(ConfigError),
    /// Surface reallocation failure.
    Resize(ResizeError),
    /// `map` / `array_get` failure.
    Map(MapError),
    /// `unmap` failure.
    Unmap(UnmapError),
    /// `swap` protocol violation.
    Swap(SwapError),
    /// `clear` / `blit` failure.
    Present(PresentError),
    /// GPU adapter/device initialization failure.
    Gpu(GpuContextError),
    /// Generic I/O failure.
    Io(std::io::Error),
    /// TOML options parsing/serialization failure.
    OptionsParse(String),
    /// Viewer event-loop failure.
    Viewer(String),
}

impl fmt::Display for InteropError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "configuration error: {e}"),
            Self::Resize(e) => write!(f, "resize error: {e}"),
            Self::Map(e) => write!(f, "map error: {e}"),
            Self::Unmap(e) => write!(f, "unmap error: {e}"),
            Self::Swap(e) => write!(f, "swap error: {e}"),
            Self::Present(e) => write!(f, "present error: {e}"),
            Self::Gpu(e) => write!(f, "GPU error: {e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::OptionsParse(msg) => {
                write!(f, "options parse error: {msg}")
            }
            Self::Viewer(msg) => write!(f, "viewer error: {msg}"),
        }
    }
}

impl std::error::Error for InteropError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Resize(e) => Some(e),
            Self::Map(e) => Some(e),
            Self::Unmap(e) => Some(e),
            Self::Swap(e) => Some(e),
            Self::Present(e) => Some(e),
            Self::Gpu(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::OptionsParse(_) | Self::Viewer(_) => None,
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for InteropError {
                fn from(e: $ty) -> Self {
                    Self::$variant(e)
                }
            }
        )*
    };
}

impl_from! {
    ConfigError => Config,
    ResizeError => Resize,
    MapError => Map,
    UnmapError => Unmap,
    SwapError => Swap,
    PresentError => Present,
    GpuContextError => Gpu,
    std::io::Error => Io,
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;
    use crate::partition::PartitionError;

    #[test]
    fn ring_errors_convert_and_chain() {
        let err: InteropError = SwapError::SlotMapped { slot: 1 }.into();
        assert_eq!(
            err.to_string(),
            "swap error: cannot swap away from mapped slot 1"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn partition_errors_arrive_through_resize() {
        let err: InteropError =
            ResizeError::from(PartitionError::NoDevices).into();
        assert!(matches!(err, InteropError::Resize(ResizeError::Partition(_))));
        let root = err.source().and_then(Error::source);
        assert_eq!(
            root.and_then(|e| e.downcast_ref::<PartitionError>()),
            Some(&PartitionError::NoDevices)
        );
    }

    #[test]
    fn options_errors_have_no_source() {
        let err = InteropError::OptionsParse("bad key".to_owned());
        assert!(err.source().is_none());
        assert!(err.to_string().contains("bad key"));
    }
}
