// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)


use super::{log_picked_rowsets, CompactionPolicy, CompactionType};
use crate::{
    config::Config,
    metadata::{KeysType, TabletMetadata},
    Rowset, TabletManager,
};
use std::{cmp::Ordering, collections::BTreeSet, sync::Arc};

/// A contiguous group of rowsets that fell into the same size bucket
#[derive(Clone, Debug, PartialEq)]
pub struct SizeTieredLevel {
    /// Rowset positions, ascending and contiguous
    pub rowsets: Vec<usize>,

    /// Effective segment count of the level
    pub segment_num: u64,

    /// Representative size bucket in bytes
    pub level_size: i64,

    /// Sum of the member rowsets' data sizes
    pub total_size: i64,

    /// Execution priority, higher runs first
    pub score: f64,
}

impl SizeTieredLevel {
    fn rank(&self) -> LevelRank {
        LevelRank {
            score: self.score,
            first_rowset: self.rowsets.first().copied().unwrap_or_default(),
        }
    }
}

/// Priority-set key: levels order by score (descending), ties broken by
/// the larger first-rowset position.
#[derive(Copy, Clone, Debug)]
struct LevelRank {
    score: f64,
    first_rowset: usize,
}

impl Ord for LevelRank {
    fn cmp(&self, other: &Self) -> Ordering {
        // scores are finite by construction, so total_cmp is numeric order
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| other.first_rowset.cmp(&self.first_rowset))
    }
}

impl PartialOrd for LevelRank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for LevelRank {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for LevelRank {}

#[allow(clippy::cast_precision_loss)]
fn cal_compaction_score(
    segment_num: u64,
    level_size: i64,
    total_size: i64,
    max_level_size: i64,
    keys_type: KeysType,
    reached_max_version: bool,
    config: &Config,
) -> f64 {
    let level_multiple = config.size_tiered_level_multiple;

    // base score is the segment count
    let mut score = segment_num as f64;

    let data_bonus = if keys_type == KeysType::DupKeys {
        // duplicate keys only suffer write amplification, so the strategy
        // can be more aggressive about folding small levels
        ((total_size - level_size) as f64 / level_size as f64) * 2.0
    } else {
        // agg/unique keys also pay read amplification, segment count
        // carries more weight
        (segment_num as f64 - 1.0) * 2.0 + (total_size - level_size) as f64 / level_size as f64
    };

    // normalized, at most triple the level multiple
    score += data_bonus.min(level_multiple as f64 * 3.0);

    // the smaller the level, the cheaper the merge, the higher the priority
    let mut level_bonus: i64 = 0;
    let mut v = level_size;
    while v < max_level_size && level_bonus <= 7 {
        v = v.saturating_mul(level_multiple);
        level_bonus += 1;
    }
    score += level_bonus as f64;

    // about to exceed the version ceiling, drain versions faster
    if reached_max_version {
        score *= 2.0;
    }

    score
}

/// Bucketed-by-size selection policy
///
/// Groups adjacent rowsets into levels by size, scores every level and
/// compacts the highest-scoring one. Small fresh ingestions are folded
/// together long before they are merged into the large base level, which
/// bounds write amplification.
pub struct SizeTieredPolicy {
    tablet_mgr: Arc<dyn TabletManager>,
    metadata: Arc<TabletMetadata>,
    config: Arc<Config>,
    force_base_compaction: bool,
}

impl SizeTieredPolicy {
    pub(crate) fn new(
        tablet_mgr: Arc<dyn TabletManager>,
        metadata: Arc<TabletMetadata>,
        config: Arc<Config>,
        force_base_compaction: bool,
    ) -> Self {
        Self {
            tablet_mgr,
            metadata,
            config,
            force_base_compaction,
        }
    }

    /// Builds the levels of a snapshot and returns the top-priority one,
    /// or `None` when there is nothing worth compacting.
    #[must_use]
    pub fn pick_max_level(
        metadata: &TabletMetadata,
        config: &Config,
        force_base_compaction: bool,
    ) -> Option<SizeTieredLevel> {
        let max_level_size = config.max_level_size();
        let rowsets = &metadata.rowsets;

        if rowsets.is_empty() {
            return None;
        }
        if let [only] = rowsets.as_slice() {
            if !only.overlapped {
                return None;
            }
        }

        // too many delete versions incur read overhead on every query
        let num_delete_rowsets = rowsets.iter().filter(|r| r.has_delete_predicate).count();
        let force_base_compaction = force_base_compaction
            || num_delete_rowsets as u64 >= config.tablet_max_versions / 10;

        let reached_max_version = rowsets.len() as u64 > config.tablet_max_versions / 10 * 9;

        log::trace!(
            "Pick compaction max level. tablet: {}, force base compaction: {force_base_compaction}, reached max version: {reached_max_version}",
            metadata.tablet_id,
        );

        let keys_type = metadata.keys_type();
        let level_multiple = config.size_tiered_level_multiple;
        let min_compaction_segment_num = config.min_compaction_segment_num();

        let mut order_levels: Vec<SizeTieredLevel> = Vec::new();
        let mut priority_levels: BTreeSet<LevelRank> = BTreeSet::new();

        let mut transient_rowsets: Vec<usize> = Vec::new();
        let mut segment_num: u64 = 0;
        let mut level_size: i64 = -1;
        let mut total_size: i64 = 0;

        let finalize = |rowsets: Vec<usize>, segment_num: u64, level_size: i64, total_size: i64| {
            let score = cal_compaction_score(
                segment_num,
                level_size,
                total_size,
                max_level_size,
                keys_type,
                reached_max_version,
                config,
            );
            SizeTieredLevel {
                rowsets,
                segment_num,
                level_size,
                total_size,
                score,
            }
        };

        for (i, rowset) in rowsets.iter().enumerate() {
            let rowset_size = rowset.size_for_level();
            if level_size == -1 {
                level_size = rowset_size.min(max_level_size);
                total_size = 0;
            }

            if rowset.has_delete_predicate {
                // base compaction can handle a delete version when either
                // the accumulating group already starts at the tablet head
                // or the delete itself is the head
                let head_group = transient_rowsets.first() == Some(&0) || i == 0;

                if !head_group {
                    // fold prior levels back in while they are too small to
                    // stand alone (or anchor the head) and stay adjacent
                    while let Some(upper) = order_levels.pop() {
                        let absorbable = upper.segment_num < min_compaction_segment_num
                            || upper.rowsets.first() == Some(&0);
                        let adjacent = match (transient_rowsets.first(), upper.rowsets.last()) {
                            (Some(&front), Some(&back)) => front == back + 1,
                            _ => false,
                        };

                        if !(absorbable && adjacent) {
                            order_levels.push(upper);
                            break;
                        }

                        priority_levels.remove(&upper.rank());

                        let SizeTieredLevel {
                            rowsets: mut merged,
                            segment_num: upper_segment_num,
                            level_size: upper_level_size,
                            total_size: upper_total_size,
                            ..
                        } = upper;

                        merged.append(&mut transient_rowsets);
                        transient_rowsets = merged;
                        level_size = level_size.max(upper_level_size);
                        segment_num += upper_segment_num;
                        total_size += upper_total_size;
                    }

                    // the merge may have produced a group clear of the head
                    if transient_rowsets.first().is_some_and(|&front| front != 0) {
                        let level = finalize(
                            std::mem::take(&mut transient_rowsets),
                            segment_num,
                            level_size,
                            total_size,
                        );
                        priority_levels.insert(level.rank());
                        order_levels.push(level);
                    }

                    if transient_rowsets.first().is_none_or(|&front| front != 0) {
                        segment_num = 0;
                        transient_rowsets.clear();
                        level_size = -1;
                        continue;
                    }
                }
            } else if (!force_base_compaction
                || transient_rowsets.first().is_some_and(|&front| front != 0))
                && level_size > config.size_tiered_min_level_size
                && rowset_size < level_size
                && level_size / rowset_size > level_multiple - 1
            {
                // size dropped below the bucket, close it and open a new one
                if !transient_rowsets.is_empty() {
                    let level = finalize(
                        std::mem::take(&mut transient_rowsets),
                        segment_num,
                        level_size,
                        total_size,
                    );
                    priority_levels.insert(level.rank());
                    order_levels.push(level);
                }
                segment_num = 0;
                level_size = rowset_size.min(max_level_size);
                total_size = 0;
            }

            segment_num += rowset.effective_segments();
            total_size += rowset_size;
            transient_rowsets.push(i);
        }

        if !transient_rowsets.is_empty() {
            let level = finalize(transient_rowsets, segment_num, level_size, total_size);
            priority_levels.insert(level.rank());
            order_levels.push(level);
        }

        let best = priority_levels.first()?;
        let pos = order_levels
            .iter()
            .position(|level| level.rowsets.first() == Some(&best.first_rowset))?;

        Some(order_levels.swap_remove(pos))
    }
}

impl CompactionPolicy for SizeTieredPolicy {
    fn pick_rowsets(&self) -> crate::Result<Vec<Rowset>> {
        self.metadata.validate()?;

        let Some(selected_level) =
            Self::pick_max_level(&self.metadata, &self.config, self.force_base_compaction)
        else {
            return Ok(Vec::new());
        };

        let min_compaction_segment_num = if self.force_base_compaction {
            2
        } else {
            // a floor keeps compaction from firing on every tiny ingestion,
            // without inheriting oversized user settings meant for the
            // classic strategy
            self.config.min_compaction_segment_num()
        };

        let mut input_rowsets = Vec::new();

        if selected_level.segment_num >= min_compaction_segment_num {
            let partial_compaction = self.config.enable_partial_segments;
            let max_segments = self.config.max_cumulative_compaction_num_singleton_deltas;
            let mut segment_num_score: u64 = 0;

            for &i in &selected_level.rowsets {
                let Some(rowset) = self.metadata.rowsets.get(i) else {
                    return Err(crate::Error::MetadataUnavailable(
                        "level refers to a rowset beyond the snapshot",
                    ));
                };

                let cur_segment_score = rowset.effective_segments();
                let uncompacted_segments =
                    cur_segment_score.saturating_sub(u64::from(rowset.next_compaction_offset));

                if partial_compaction && uncompacted_segments > max_segments {
                    // compacting a segment prefix of several rowsets at once
                    // would interleave their key spaces, so the limit applies
                    // to a single rowset, alone
                    input_rowsets.clear();
                    input_rowsets.push(Rowset::new(
                        self.tablet_mgr.clone(),
                        self.metadata.clone(),
                        i,
                        *rowset,
                        max_segments,
                    ));
                    break;
                }

                segment_num_score += cur_segment_score;
                input_rowsets.push(Rowset::new(
                    self.tablet_mgr.clone(),
                    self.metadata.clone(),
                    i,
                    *rowset,
                    0,
                ));

                if segment_num_score >= max_segments {
                    break;
                }
            }
        }

        let compaction_type = if selected_level.rowsets.first() == Some(&0) {
            CompactionType::Base
        } else {
            CompactionType::Cumulative
        };

        log_picked_rowsets(&self.metadata, compaction_type, &input_rowsets);

        log::trace!(
            "Picked level stats. tablet: {}, level rowsets size: {}, level segment num: {}, level size: {}, level total size: {}, level score: {}",
            self.metadata.tablet_id,
            selected_level.rowsets.len(),
            selected_level.segment_num,
            selected_level.level_size,
            selected_level.total_size,
            selected_level.score,
        );

        Ok(input_rowsets)
    }
}
