// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::path::PathBuf;

/// Compaction tuning knobs
///
/// All values are read-only for the duration of one policy invocation,
/// so snapshots of this struct can be shared freely between threads.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Segment budget for one cumulative compaction
    ///
    /// The cumulative scan stops once the accumulated effective segment
    /// count reaches this value. Also bounds the size-tiered and
    /// primary-key input walks.
    pub max_cumulative_compaction_num_singleton_deltas: u64,

    /// Maximum number of rowsets taken by one base compaction
    pub max_base_compaction_num_singleton_deltas: u64,

    /// Minimum effective segment count before a compaction is worthwhile
    pub min_cumulative_compaction_num_singleton_deltas: u64,

    /// Smallest size bucket of the size-tiered strategy, in bytes
    pub size_tiered_min_level_size: i64,

    /// Growth factor between adjacent size-tiered buckets
    pub size_tiered_level_multiple: i64,

    /// Number of size-tiered buckets
    pub size_tiered_level_num: u32,

    /// Hard per-tablet version ceiling
    ///
    /// Approaching this ceiling doubles level scores; heavy delete
    /// pressure relative to it forces base compaction.
    pub tablet_max_versions: u64,

    /// Use the size-tiered strategy for non-primary-key tablets
    pub enable_size_tiered_compaction_strategy: bool,

    /// Allow compacting only a segment prefix of a single oversized rowset
    pub enable_partial_segments: bool,

    /// Read cost multiplier for rowsets that carry a delete-vector file
    pub update_compaction_delvec_file_io_amp_ratio: u64,

    /// Column count above which vertical compaction splits column groups
    pub vertical_compaction_max_columns_per_group: u32,

    /// Local storage root directories
    ///
    /// The row source mask used by vertical compaction needs a local
    /// scratch root; without one the algorithm chooser falls back to
    /// horizontal compaction.
    pub store_paths: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_cumulative_compaction_num_singleton_deltas: 1_000,
            max_base_compaction_num_singleton_deltas: 100,
            min_cumulative_compaction_num_singleton_deltas: 5,
            size_tiered_min_level_size: 128 * 1_024,
            size_tiered_level_multiple: 5,
            size_tiered_level_num: 7,
            tablet_max_versions: 1_000,
            enable_size_tiered_compaction_strategy: true,
            enable_partial_segments: false,
            update_compaction_delvec_file_io_amp_ratio: 2,
            vertical_compaction_max_columns_per_group: 5,
            store_paths: Vec::new(),
        }
    }
}

impl Config {
    /// Sets the segment budget for one cumulative compaction.
    #[must_use]
    pub fn with_max_cumulative_num_singleton_deltas(mut self, n: u64) -> Self {
        self.max_cumulative_compaction_num_singleton_deltas = n;
        self
    }

    /// Sets the rowset budget for one base compaction.
    #[must_use]
    pub fn with_max_base_num_singleton_deltas(mut self, n: u64) -> Self {
        self.max_base_compaction_num_singleton_deltas = n;
        self
    }

    /// Sets the minimum worthwhile effective segment count.
    #[must_use]
    pub fn with_min_cumulative_num_singleton_deltas(mut self, n: u64) -> Self {
        self.min_cumulative_compaction_num_singleton_deltas = n;
        self
    }

    /// Sets the smallest size-tiered bucket in bytes.
    #[must_use]
    pub fn with_size_tiered_min_level_size(mut self, bytes: i64) -> Self {
        self.size_tiered_min_level_size = bytes;
        self
    }

    /// Sets the growth factor between size-tiered buckets.
    #[must_use]
    pub fn with_size_tiered_level_multiple(mut self, multiple: i64) -> Self {
        self.size_tiered_level_multiple = multiple;
        self
    }

    /// Sets the number of size-tiered buckets.
    #[must_use]
    pub fn with_size_tiered_level_num(mut self, levels: u32) -> Self {
        self.size_tiered_level_num = levels;
        self
    }

    /// Sets the per-tablet version ceiling.
    #[must_use]
    pub fn with_tablet_max_versions(mut self, versions: u64) -> Self {
        self.tablet_max_versions = versions;
        self
    }

    /// Toggles the size-tiered strategy for non-primary-key tablets.
    #[must_use]
    pub fn with_size_tiered_compaction_strategy(mut self, enabled: bool) -> Self {
        self.enable_size_tiered_compaction_strategy = enabled;
        self
    }

    /// Toggles partial-segment compaction of oversized rowsets.
    #[must_use]
    pub fn with_partial_segments(mut self, enabled: bool) -> Self {
        self.enable_partial_segments = enabled;
        self
    }

    /// Sets the delete-vector read amplification ratio.
    #[must_use]
    pub fn with_delvec_file_io_amp_ratio(mut self, ratio: u64) -> Self {
        self.update_compaction_delvec_file_io_amp_ratio = ratio;
        self
    }

    /// Sets the column count threshold for vertical compaction.
    #[must_use]
    pub fn with_vertical_max_columns_per_group(mut self, columns: u32) -> Self {
        self.vertical_compaction_max_columns_per_group = columns;
        self
    }

    /// Sets the local storage root directories.
    #[must_use]
    pub fn with_store_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.store_paths = paths;
        self
    }

    /// Size ceiling of the largest bucket.
    ///
    /// `min_level_size * level_multiple ^ level_num`
    pub(crate) fn max_level_size(&self) -> i64 {
        self.size_tiered_min_level_size * self.size_tiered_level_multiple.pow(self.size_tiered_level_num)
    }

    /// Effective segment count below which a size-tiered level is left alone.
    pub(crate) fn min_compaction_segment_num(&self) -> u64 {
        let level_multiple = u64::try_from(self.size_tiered_level_multiple).unwrap_or(0);

        self.min_cumulative_compaction_num_singleton_deltas
            .min(level_multiple)
            .max(2)
    }
}
