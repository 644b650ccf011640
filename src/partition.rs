//! Horizontal column partitioning of a surface across devices.
//!
//! In multi-GPU mode every ring slot is split into one contiguous column
//! range per device. Partitions are laid out left to right in device order,
//! every device gets `width / devices` columns and the last device also takes
//! the remainder.

use std::fmt;

/// A contiguous column range `[x, x + width)` of the full surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Partition {
    /// First column covered by this partition.
    pub x: u32,
    /// Number of columns covered.
    pub width: u32,
}

impl Partition {
    /// The partition covering an entire surface of the given width.
    #[must_use]
    pub fn full(width: u32) -> Self {
        Self { x: 0, width }
    }

    /// One past the last column covered.
    #[must_use]
    pub fn end(&self) -> u32 {
        self.x + self.width
    }
}

/// A width/device-count combination that has no valid contiguous split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionError {
    /// No devices to partition across.
    NoDevices,
    /// Fewer pixel columns than devices; some device would get nothing.
    TooManyDevices {
        /// Surface width in pixels.
        width: u32,
        /// Number of participating devices.
        devices: usize,
    },
}

impl fmt::Display for PartitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDevices => write!(f, "no devices to partition across"),
            Self::TooManyDevices { width, devices } => write!(
                f,
                "cannot split {width} columns across {devices} devices"
            ),
        }
    }
}

impl std::error::Error for PartitionError {}

/// Split `width` columns into `devices` contiguous, non-overlapping
/// partitions covering `[0, width)`.
///
/// # Errors
///
/// Returns [`PartitionError`] if `devices` is zero or exceeds `width`.
pub fn split_columns(
    width: u32,
    devices: usize,
) -> Result<Vec<Partition>, PartitionError> {
    if devices == 0 {
        return Err(PartitionError::NoDevices);
    }
    let count = u32::try_from(devices)
        .ok()
        .filter(|&d| d <= width)
        .ok_or(PartitionError::TooManyDevices { width, devices })?;

    let base = width / count;
    let remainder = width % count;

    Ok((0..count)
        .map(|i| Partition {
            x: i * base,
            width: if i + 1 == count { base + remainder } else { base },
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_exact_cover(parts: &[Partition], width: u32) {
        let mut next = 0;
        for p in parts {
            assert_eq!(p.x, next, "gap or overlap at column {next}");
            assert!(p.width > 0);
            next = p.end();
        }
        assert_eq!(next, width);
    }

    #[test]
    fn single_device_covers_everything() {
        let parts = split_columns(800, 1).unwrap();
        assert_eq!(parts, vec![Partition::full(800)]);
    }

    #[test]
    fn even_split() {
        let parts = split_columns(1920, 3).unwrap();
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.width == 640));
        assert_exact_cover(&parts, 1920);
    }

    #[test]
    fn remainder_goes_to_last_device() {
        let parts = split_columns(1001, 4).unwrap();
        assert_eq!(
            parts.iter().map(|p| p.width).collect::<Vec<_>>(),
            vec![250, 250, 250, 251]
        );
        assert_exact_cover(&parts, 1001);
    }

    #[test]
    fn representative_cases_cover_exactly() {
        for (w, d) in [(1, 1), (7, 7), (8, 3), (1366, 5), (3840, 2)] {
            let parts = split_columns(w, d).unwrap();
            assert_eq!(parts.len(), d);
            assert_exact_cover(&parts, w);
        }
    }

    #[test]
    fn rejects_degenerate_splits() {
        assert_eq!(split_columns(100, 0), Err(PartitionError::NoDevices));
        assert_eq!(
            split_columns(3, 4),
            Err(PartitionError::TooManyDevices {
                width: 3,
                devices: 4
            })
        );
        assert!(split_columns(0, 1).is_err());
    }
}
