//! Tunable constants for the growth and rehash policies.
//!
//! Mirrors the teacher crate's pattern of a zero-argument "happy path"
//! constructor (`Default`) alongside an explicit `with_config` entry point
//! for callers that want to retune memory/latency tradeoffs.

/// Growth policy knobs for [`crate::sds::Sds`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdsConfig {
    /// Below this requested size, `make_room_for` doubles. At or above it,
    /// growth is additive (`need + prealloc_threshold`).
    pub prealloc_threshold: usize,
}

impl Default for SdsConfig {
    fn default() -> Self {
        Self {
            prealloc_threshold: 1024 * 1024,
        }
    }
}

/// Sizing and rehash policy knobs for [`crate::dict::Dict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictConfig {
    /// Table grows when `used >= size` and `used / size > force_ratio`,
    /// even with incremental resize disabled.
    pub force_ratio: usize,
    /// Initial (and minimum) table size; always a power of two.
    pub initial_size: usize,
    /// `rehash_step(n)` visits at most `rehash_empty_visit_factor * n`
    /// empty buckets before giving up for this call.
    pub rehash_empty_visit_factor: usize,
    /// Number of buckets migrated per slice inside `rehash_millis`.
    pub rehash_ms_batch: usize,
}

impl Default for DictConfig {
    fn default() -> Self {
        Self {
            force_ratio: 5,
            initial_size: 4,
            rehash_empty_visit_factor: 10,
            rehash_ms_batch: 100,
        }
    }
}
