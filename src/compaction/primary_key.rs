// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{log_picked_rowsets, CompactionPolicy, CompactionType};
use crate::{config::Config, metadata::TabletMetadata, Result, Rowset, TabletManager};
use std::sync::Arc;

/// Delete-vector aware selection policy for primary-key tablets
///
/// Primary-key tablets record deletions in out-of-band delete-vector
/// files that are applied on every read, so a rowset with a delete
/// vector costs more to scan than its segment count suggests. The walk
/// weighs that amplification when filling its segment budget.
pub struct PrimaryKeyPolicy {
    tablet_mgr: Arc<dyn TabletManager>,
    metadata: Arc<TabletMetadata>,
    config: Arc<Config>,
}

impl PrimaryKeyPolicy {
    pub(crate) fn new(
        tablet_mgr: Arc<dyn TabletManager>,
        metadata: Arc<TabletMetadata>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            tablet_mgr,
            metadata,
            config,
        }
    }

    /// Picks the positions of the input rowsets together with a parallel
    /// list flagging which of them carry a delete-vector file.
    ///
    /// # Errors
    ///
    /// Returns an error when the snapshot is inconsistent.
    pub fn pick_rowset_indexes(
        metadata: &TabletMetadata,
        config: &Config,
    ) -> Result<(Vec<u32>, Vec<bool>)> {
        metadata.validate()?;

        let rowsets = &metadata.rowsets;

        if rowsets.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }
        if let [only] = rowsets.as_slice() {
            if !only.overlapped && !metadata.rowset_has_delvec(only.id) {
                return Ok((Vec::new(), Vec::new()));
            }
        }

        let delvec_amp_ratio = if metadata.is_real_time_strategy() {
            1
        } else {
            config.update_compaction_delvec_file_io_amp_ratio
        };
        let max_segments = config.max_cumulative_compaction_num_singleton_deltas;

        let mut pick_rowset_indexes = Vec::new();
        let mut has_delvecs = Vec::new();
        let mut segment_num_score: u64 = 0;

        for (i, rowset) in rowsets.iter().enumerate() {
            if rowset.has_delete_predicate {
                if pick_rowset_indexes.is_empty() {
                    continue;
                }
                break;
            }

            let has_delvec = metadata.rowset_has_delvec(rowset.id);

            let mut current_score = rowset.effective_segments();
            if has_delvec {
                current_score *= delvec_amp_ratio;
            }

            pick_rowset_indexes.push(i as u32);
            has_delvecs.push(has_delvec);

            segment_num_score += current_score;
            if segment_num_score >= max_segments {
                break;
            }
        }

        Ok((pick_rowset_indexes, has_delvecs))
    }
}

impl CompactionPolicy for PrimaryKeyPolicy {
    fn pick_rowsets(&self) -> Result<Vec<Rowset>> {
        let (pick_rowset_indexes, _) = Self::pick_rowset_indexes(&self.metadata, &self.config)?;

        let mut input_rowsets = Vec::with_capacity(pick_rowset_indexes.len());

        for i in pick_rowset_indexes {
            let index = i as usize;

            let Some(meta) = self.metadata.rowsets.get(index) else {
                return Err(crate::Error::MetadataUnavailable(
                    "picked index beyond the snapshot",
                ));
            };

            input_rowsets.push(Rowset::new(
                self.tablet_mgr.clone(),
                self.metadata.clone(),
                index,
                *meta,
                0,
            ));
        }

        log_picked_rowsets(&self.metadata, CompactionType::Cumulative, &input_rowsets);

        Ok(input_rowsets)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::PrimaryKeyPolicy;
    use crate::{
        compaction::CompactionPolicy,
        metadata::{KeysType, RowsetMetadata, TabletMetadata, TabletSchema},
        Config, HashSet, TabletManager,
    };
    use std::sync::Arc;
    use test_log::test;

    struct NullManager;

    impl TabletManager for NullManager {
        fn read_iterator_num(
            &self,
            metadata: &TabletMetadata,
            rowset_index: usize,
        ) -> crate::Result<u64> {
            Ok(metadata
                .rowsets
                .get(rowset_index)
                .map_or(0, RowsetMetadata::effective_segments))
        }
    }

    fn rowset(id: u32, segments: u32, overlapped: bool) -> RowsetMetadata {
        RowsetMetadata {
            id,
            data_size: 1_024,
            segments,
            overlapped,
            has_delete_predicate: false,
            next_compaction_offset: 0,
        }
    }

    fn tablet(rowsets: Vec<RowsetMetadata>, delvec_ids: &[u32]) -> Arc<TabletMetadata> {
        let mut delvec_rowsets = HashSet::default();
        delvec_rowsets.extend(delvec_ids.iter().copied());

        Arc::new(TabletMetadata {
            tablet_id: 1,
            version: 10,
            cumulative_point: 0,
            rowsets,
            schema: TabletSchema {
                keys_type: KeysType::PrimaryKeys,
                column_count: 3,
            },
            compaction_strategy: None,
            sstable_meta: Default::default(),
            delvec_rowsets,
        })
    }

    #[test]
    fn empty_tablet_picks_nothing() {
        let metadata = tablet(Vec::new(), &[]);

        let (indexes, has_delvecs) =
            PrimaryKeyPolicy::pick_rowset_indexes(&metadata, &Config::default())
                .expect("pick should succeed");

        assert!(indexes.is_empty());
        assert!(has_delvecs.is_empty());
    }

    #[test]
    fn single_compact_rowset_is_not_worthwhile() {
        let metadata = tablet(vec![rowset(7, 1, false)], &[]);

        let (indexes, _) = PrimaryKeyPolicy::pick_rowset_indexes(&metadata, &Config::default())
            .expect("pick should succeed");

        assert!(indexes.is_empty());
    }

    #[test]
    fn single_rowset_with_a_delvec_is_worthwhile() {
        let metadata = tablet(vec![rowset(7, 1, false)], &[7]);

        let (indexes, has_delvecs) =
            PrimaryKeyPolicy::pick_rowset_indexes(&metadata, &Config::default())
                .expect("pick should succeed");

        assert_eq!(vec![0], indexes);
        assert_eq!(vec![true], has_delvecs);
    }

    #[test]
    fn amplified_cost_fills_the_budget_sooner() {
        let config = Config::default()
            .with_max_cumulative_num_singleton_deltas(10)
            .with_delvec_file_io_amp_ratio(3);

        // 3 + 3 * 3 reaches the budget at the second rowset
        let metadata = tablet(
            vec![
                rowset(1, 3, true),
                rowset(2, 3, true),
                rowset(3, 3, true),
            ],
            &[2],
        );

        let (indexes, has_delvecs) = PrimaryKeyPolicy::pick_rowset_indexes(&metadata, &config)
            .expect("pick should succeed");

        assert_eq!(vec![0, 1], indexes);
        assert_eq!(vec![false, true], has_delvecs);
    }

    #[test]
    fn without_delvecs_the_budget_admits_more_rowsets() {
        let config = Config::default()
            .with_max_cumulative_num_singleton_deltas(10)
            .with_delvec_file_io_amp_ratio(3);

        let metadata = tablet(
            vec![
                rowset(1, 3, true),
                rowset(2, 3, true),
                rowset(3, 3, true),
            ],
            &[],
        );

        let (indexes, _) = PrimaryKeyPolicy::pick_rowset_indexes(&metadata, &config)
            .expect("pick should succeed");

        assert_eq!(vec![0, 1, 2], indexes);
    }

    #[test]
    fn handles_are_built_for_every_picked_index() {
        let metadata = tablet(vec![rowset(1, 2, true), rowset(2, 4, true)], &[1]);

        let policy = PrimaryKeyPolicy::new(
            Arc::new(NullManager),
            metadata,
            Arc::new(Config::default()),
        );

        let input = policy.pick_rowsets().expect("pick should succeed");

        assert_eq!(vec![0, 1], input.iter().map(crate::Rowset::index).collect::<Vec<_>>());
        assert!(input.iter().all(|r| r.compaction_segment_limit() == 0));
    }

    #[test]
    fn picking_twice_is_deterministic() {
        let metadata = tablet(
            vec![rowset(1, 2, true), rowset(2, 4, true), rowset(3, 1, false)],
            &[2],
        );
        let config = Config::default();

        assert_eq!(
            PrimaryKeyPolicy::pick_rowset_indexes(&metadata, &config).expect("pick"),
            PrimaryKeyPolicy::pick_rowset_indexes(&metadata, &config).expect("pick"),
        );
    }
}
