// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{
    log_picked_rowsets,
    score::{base_compaction_score, cumulative_compaction_score},
    CompactionPolicy, CompactionType,
};
use crate::{config::Config, metadata::TabletMetadata, Rowset, TabletManager};
use std::sync::Arc;

/// Classic two-region selection policy
///
/// The tablet is split at the cumulative point: rowsets below it were
/// already base-compacted, rowsets above it are incremental ingestions.
/// One call picks either a cumulative group or a base group, whichever
/// region currently scores higher.
pub struct BaseAndCumulativePolicy {
    tablet_mgr: Arc<dyn TabletManager>,
    metadata: Arc<TabletMetadata>,
    config: Arc<Config>,
    force_base_compaction: bool,
}

impl BaseAndCumulativePolicy {
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

    fn rowset_handle(&self, index: usize, compaction_segment_limit: u64) -> Option<Rowset> {
        let meta = self.metadata.rowsets.get(index)?;

        Some(Rowset::new(
            self.tablet_mgr.clone(),
            self.metadata.clone(),
            index,
            *meta,
            compaction_segment_limit,
        ))
    }

    fn pick_cumulative_rowsets(&self) -> Vec<Rowset> {
        let mut input_rowsets = Vec::new();
        let mut segment_num_score: u64 = 0;

        let cumulative_point = self.metadata.cumulative_point as usize;

        for (i, rowset) in self
            .metadata
            .rowsets
            .iter()
            .enumerate()
            .skip(cumulative_point)
        {
            if rowset.has_delete_predicate {
                if input_rowsets.is_empty() {
                    // leading delete, defer it to a base compaction
                    debug_assert!(segment_num_score == 0);
                    continue;
                }

                // a delete closes the group; it must not be reordered
                // across the data rowsets that follow it
                break;
            }

            input_rowsets.extend(self.rowset_handle(i, 0));

            segment_num_score += rowset.effective_segments();

            if segment_num_score >= self.config.max_cumulative_compaction_num_singleton_deltas {
                break;
            }
        }

        log_picked_rowsets(&self.metadata, CompactionType::Cumulative, &input_rowsets);

        input_rowsets
    }

    fn pick_base_rowsets(&self) -> Vec<Rowset> {
        let mut input_rowsets = Vec::new();
        let mut segment_num_score: u64 = 0;

        for i in 0..self.metadata.cumulative_point as usize {
            input_rowsets.extend(self.rowset_handle(i, 0));

            segment_num_score += 1;

            if segment_num_score >= self.config.max_base_compaction_num_singleton_deltas {
                break;
            }
        }

        log_picked_rowsets(&self.metadata, CompactionType::Base, &input_rowsets);

        input_rowsets
    }
}

impl CompactionPolicy for BaseAndCumulativePolicy {
    fn pick_rowsets(&self) -> crate::Result<Vec<Rowset>> {
        self.metadata.validate()?;

        let cumulative_score = cumulative_compaction_score(&self.metadata);
        let base_score = base_compaction_score(&self.metadata);

        if base_score > cumulative_score || self.force_base_compaction {
            Ok(self.pick_base_rowsets())
        } else {
            Ok(self.pick_cumulative_rowsets())
        }
    }
}
