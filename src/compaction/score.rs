// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{primary_key::PrimaryKeyPolicy, size_tiered::SizeTieredPolicy};
use crate::{
    config::Config,
    metadata::{KeysType, RowsetMetadata, TabletMetadata},
    Result,
};

/// Base compaction score: the number of base-region rowsets.
#[must_use]
pub fn base_compaction_score(metadata: &TabletMetadata) -> f64 {
    f64::from(metadata.cumulative_point)
}

/// Cumulative compaction score: effective segments past the cumulative point.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn cumulative_compaction_score(metadata: &TabletMetadata) -> f64 {
    if metadata.rowsets.is_empty() {
        return 0.0;
    }

    let segment_num_score = metadata
        .rowsets
        .iter()
        .skip(metadata.cumulative_point as usize)
        .map(RowsetMetadata::effective_segments)
        .sum::<u64>();

    log::trace!(
        "Tablet: {}, cumulative compaction score: {segment_num_score}",
        metadata.tablet_id
    );

    segment_num_score as f64
}

/// Size-tiered compaction score: segment count of the top-priority level.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn size_tiered_compaction_score(metadata: &TabletMetadata, config: &Config) -> f64 {
    SizeTieredPolicy::pick_max_level(metadata, config, false)
        .map_or(0.0, |level| level.segment_num as f64)
}

fn primary_compaction_score_by_policy(metadata: &TabletMetadata, config: &Config) -> Result<u64> {
    let delvec_amp_ratio = if metadata.is_real_time_strategy() {
        1
    } else {
        config.update_compaction_delvec_file_io_amp_ratio
    };

    let (pick_rowset_indexes, has_delvecs) =
        PrimaryKeyPolicy::pick_rowset_indexes(metadata, config)?;

    let mut segment_num_score: u64 = 0;

    for (index, has_delvec) in pick_rowset_indexes.iter().zip(has_delvecs) {
        let Some(rowset) = metadata.rowsets.get(*index as usize) else {
            continue;
        };

        let mut current_score = rowset.effective_segments();

        // a delete-vector file is applied on every read of the rowset
        if has_delvec {
            current_score *= delvec_amp_ratio;
        }

        segment_num_score += current_score;
    }

    let sst_num_score = u64::from(metadata.sstable_meta.sstable_count);

    Ok(segment_num_score.max(sst_num_score))
}

/// Primary-key compaction score.
///
/// Best effort: a failing pick is logged and reported as 0 so a
/// misbehaving tablet cannot stall the scheduler.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn primary_compaction_score(metadata: &TabletMetadata, config: &Config) -> f64 {
    match primary_compaction_score_by_policy(metadata, config) {
        Ok(score) => score as f64,
        Err(e) => {
            log::error!(
                "Primary compaction score failed, tablet: {}: {e}",
                metadata.tablet_id
            );
            0.0
        }
    }
}

/// Aggregate compaction score used by the scheduler to rank tablets.
#[must_use]
pub fn compaction_score(metadata: &TabletMetadata, config: &Config) -> f64 {
    if metadata.keys_type() == KeysType::PrimaryKeys {
        return primary_compaction_score(metadata, config);
    }

    if config.enable_size_tiered_compaction_strategy {
        return size_tiered_compaction_score(metadata, config);
    }

    base_compaction_score(metadata).max(cumulative_compaction_score(metadata))
}
