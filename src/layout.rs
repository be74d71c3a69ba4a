//! Global ordinals, ownership ranges, and the per-element row layout

use crate::buffer::DeviceBuffer;
use crate::error::{Error, Result};
use crate::runtime::Runtime;

/// Signed index wide enough for global row/column counts across all ranks
pub type GlobalOrdinal = i64;

/// Inclusive interval of global row (or column) indices owned by one rank
///
/// A row `r` is owned by this rank iff `lower <= r <= upper`. The bounds are
/// immutable once assigned to an assembler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RowRange {
    lower: GlobalOrdinal,
    upper: GlobalOrdinal,
}

impl RowRange {
    /// Create an inclusive `[lower, upper]` range
    pub fn new(lower: GlobalOrdinal, upper: GlobalOrdinal) -> Result<Self> {
        if lower < 0 || lower > upper {
            return Err(Error::InvalidRange {
                what: "ownership",
                lower,
                upper,
            });
        }
        Ok(Self { lower, upper })
    }

    /// Lower bound (inclusive)
    pub fn lower(&self) -> GlobalOrdinal {
        self.lower
    }

    /// Upper bound (inclusive)
    pub fn upper(&self) -> GlobalOrdinal {
        self.upper
    }

    /// Number of indices in the range
    pub fn len(&self) -> usize {
        (self.upper - self.lower + 1) as usize
    }

    /// Always false: a range holds at least one index by construction
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Ownership test
    #[inline]
    pub fn contains(&self, index: GlobalOrdinal) -> bool {
        self.lower <= index && index <= self.upper
    }
}

/// Device-resident description of the raw per-element row layout
///
/// The mesh/physics layer flattens element contributions into parallel
/// arrays. `row_indices[s]` is the global row fed by segment `s`, and
/// `row_start[s]..row_start[s + 1]` is the span of raw contributions
/// belonging to that segment inside the column/value arrays handed to
/// `assemble()`. The same layout is reused for every assembly call.
pub struct RowLayout<R: Runtime> {
    num_segments: usize,
    total: usize,
    row_indices: DeviceBuffer<GlobalOrdinal, R>,
    row_start: DeviceBuffer<GlobalOrdinal, R>,
}

impl<R: Runtime> RowLayout<R> {
    /// Validate a host-side layout and upload it to the device
    ///
    /// `row_start` must hold `row_indices.len() + 1` offsets, starting at 0
    /// and non-decreasing; its last entry is the total raw contribution
    /// count.
    pub fn from_host(
        row_indices: &[GlobalOrdinal],
        row_start: &[GlobalOrdinal],
        device: &R::Device,
    ) -> Result<Self> {
        if row_start.len() != row_indices.len() + 1 {
            return Err(Error::InvalidLayout {
                reason: format!(
                    "row_start holds {} offsets for {} segments (want {})",
                    row_start.len(),
                    row_indices.len(),
                    row_indices.len() + 1
                ),
            });
        }
        if row_start.first() != Some(&0) {
            return Err(Error::InvalidLayout {
                reason: "row_start must begin at 0".to_string(),
            });
        }
        for (s, w) in row_start.windows(2).enumerate() {
            if w[1] < w[0] {
                return Err(Error::InvalidLayout {
                    reason: format!("row_start decreases at segment {s}: {} -> {}", w[0], w[1]),
                });
            }
        }

        let total = *row_start.last().unwrap_or(&0) as usize;
        Ok(Self {
            num_segments: row_indices.len(),
            total,
            row_indices: DeviceBuffer::from_slice(row_indices, device),
            row_start: DeviceBuffer::from_slice(row_start, device),
        })
    }

    /// Number of layout segments (distinct per-element row slots)
    pub fn num_segments(&self) -> usize {
        self.num_segments
    }

    /// Total raw contributions described by the layout
    pub fn total_contributions(&self) -> usize {
        self.total
    }

    /// Device array of per-segment global row indices
    pub fn row_indices(&self) -> &DeviceBuffer<GlobalOrdinal, R> {
        &self.row_indices
    }

    /// Device array of per-segment start offsets (`num_segments + 1` entries)
    pub fn row_start(&self) -> &DeviceBuffer<GlobalOrdinal, R> {
        &self.row_start
    }

    /// Bytes of device memory held by the layout arrays
    pub fn size_bytes(&self) -> usize {
        self.row_indices.size_bytes() + self.row_start.size_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::cpu::CpuRuntime;
    use crate::runtime::Runtime;

    #[test]
    fn row_range_ownership() {
        let range = RowRange::new(4, 9).unwrap();
        assert_eq!(range.len(), 6);
        assert!(range.contains(4));
        assert!(range.contains(9));
        assert!(!range.contains(3));
        assert!(!range.contains(10));
    }

    #[test]
    fn row_range_rejects_inverted_bounds() {
        assert!(RowRange::new(5, 4).is_err());
        assert!(RowRange::new(-1, 4).is_err());
    }

    #[test]
    fn layout_upload_and_validation() {
        let device = CpuRuntime::default_device();

        let layout =
            RowLayout::<CpuRuntime>::from_host(&[0, 1, 0], &[0, 2, 5, 7], &device).unwrap();
        assert_eq!(layout.num_segments(), 3);
        assert_eq!(layout.total_contributions(), 7);

        // offset array too short
        assert!(RowLayout::<CpuRuntime>::from_host(&[0, 1], &[0, 2], &device).is_err());
        // does not start at zero
        assert!(RowLayout::<CpuRuntime>::from_host(&[0], &[1, 2], &device).is_err());
        // decreasing offsets
        assert!(RowLayout::<CpuRuntime>::from_host(&[0, 1], &[0, 3, 2], &device).is_err());
    }
}
