// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use lake_compaction::{
    choose_compaction_algorithm, compaction_score, create_policy, CompactionAlgorithm,
    CompactionPolicy, Config, HashSet, KeysType, RowsetMetadata, SizeTieredPolicy, TabletManager,
    TabletMetadata, TabletSchema,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;
use test_log::test;

struct SegmentCountManager;

impl TabletManager for SegmentCountManager {
    fn read_iterator_num(
        &self,
        metadata: &TabletMetadata,
        rowset_index: usize,
    ) -> lake_compaction::Result<u64> {
        Ok(metadata
            .rowsets
            .get(rowset_index)
            .map_or(0, RowsetMetadata::effective_segments))
    }
}

fn random_metadata(rng: &mut StdRng) -> TabletMetadata {
    let keys_type = match rng.random_range(0..4) {
        0 => KeysType::DupKeys,
        1 => KeysType::UniqueKeys,
        2 => KeysType::AggKeys,
        _ => KeysType::PrimaryKeys,
    };
    let is_primary = keys_type == KeysType::PrimaryKeys;

    let num_rowsets = rng.random_range(0..=12);

    let mut rowsets = Vec::with_capacity(num_rowsets);
    let mut delvec_rowsets = HashSet::default();

    for i in 0..num_rowsets {
        let id = u32::try_from(i).unwrap() + 1;

        // primary-key tablets use delete vectors instead of delete predicates
        let has_delete_predicate = !is_primary && rng.random_bool(0.2);

        if is_primary && rng.random_bool(0.3) {
            delvec_rowsets.insert(id);
        }

        rowsets.push(RowsetMetadata {
            id,
            data_size: rng.random_range(0..100_000),
            segments: rng.random_range(0..=6),
            overlapped: rng.random_bool(0.5),
            has_delete_predicate,
            next_compaction_offset: rng.random_range(0..=2),
        });
    }

    let cumulative_point = if is_primary {
        0
    } else {
        u32::try_from(rng.random_range(0..=num_rowsets)).unwrap()
    };

    TabletMetadata {
        tablet_id: rng.random_range(1..1_000),
        version: rng.random_range(1..1_000),
        cumulative_point,
        rowsets,
        schema: TabletSchema {
            keys_type,
            column_count: rng.random_range(1..200),
        },
        compaction_strategy: None,
        sstable_meta: Default::default(),
        delvec_rowsets,
    }
}

fn random_config(rng: &mut StdRng) -> Config {
    Config::default()
        .with_size_tiered_compaction_strategy(rng.random_bool(0.5))
        .with_partial_segments(rng.random_bool(0.3))
        .with_size_tiered_min_level_size(rng.random_range(1..10_000))
        .with_size_tiered_level_multiple(rng.random_range(2..=6))
        .with_max_cumulative_num_singleton_deltas(rng.random_range(2..50))
        .with_max_base_num_singleton_deltas(rng.random_range(2..20))
        .with_min_cumulative_num_singleton_deltas(rng.random_range(1..8))
        .with_tablet_max_versions(rng.random_range(10..2_000))
}

#[test]
fn picked_rowsets_uphold_the_policy_invariants() {
    let mut rng = StdRng::seed_from_u64(0xC0FF_EE00);

    for _ in 0..2_000 {
        let metadata = Arc::new(random_metadata(&mut rng));
        let config = Arc::new(random_config(&mut rng));
        let force_base = rng.random_bool(0.25);

        let score = compaction_score(&metadata, &config);
        assert!(score >= 0.0, "scores are never negative");
        assert!(score.is_finite());
        if metadata.rowsets.is_empty() {
            assert_eq!(0.0, score, "an empty tablet scores zero");
        }

        let policy = create_policy(
            Arc::new(SegmentCountManager),
            metadata.clone(),
            config.clone(),
            force_base,
        );

        let input = policy.pick_rowsets().expect("valid snapshots never fail");
        let indexes = input.iter().map(|r| r.index()).collect::<Vec<_>>();

        // strictly increasing, contiguous run
        for pair in indexes.windows(2) {
            assert_eq!(pair[0] + 1, pair[1], "picked indexes must be contiguous");
        }

        // a delete predicate may only lead a group, unless the group is
        // anchored at the tablet head
        for (position, rowset) in input.iter().enumerate() {
            if position > 0 && rowset.metadata().has_delete_predicate {
                assert_eq!(
                    Some(&0),
                    indexes.first(),
                    "a trailing delete requires a head-anchored group"
                );
            }
        }

        // at most one partially compacted rowset, and then it is alone
        let partial_count = input
            .iter()
            .filter(|r| r.compaction_segment_limit() > 0)
            .count();
        assert!(partial_count <= 1);
        if partial_count == 1 {
            assert_eq!(1, input.len(), "a limited rowset is the only input");
        }

        // forcing base always lands on the tablet head; a partial-segment
        // selection is the one exception, it narrows to a single oversized
        // rowset wherever that rowset sits
        let is_partial = input
            .first()
            .is_some_and(|r| r.compaction_segment_limit() > 0);
        let is_primary = metadata.keys_type() == KeysType::PrimaryKeys;
        if force_base && !is_primary && metadata.cumulative_point > 0 && !indexes.is_empty() && !is_partial {
            assert_eq!(Some(&0), indexes.first());
        }

        // the size-tiered floor: a non-empty pick comes from a level with
        // enough segments
        if !is_primary && config.enable_size_tiered_compaction_strategy && !indexes.is_empty() {
            let level = SizeTieredPolicy::pick_max_level(&metadata, &config, force_base)
                .expect("a non-empty pick implies a level");

            let expected_min = if force_base {
                2
            } else {
                config
                    .min_cumulative_compaction_num_singleton_deltas
                    .min(u64::try_from(config.size_tiered_level_multiple).unwrap())
                    .max(2)
            };
            assert!(level.segment_num >= expected_min);
        }

        // same snapshot, same answer
        let replay = policy.pick_rowsets().expect("valid snapshots never fail");
        assert_eq!(
            indexes,
            replay.iter().map(|r| r.index()).collect::<Vec<_>>(),
        );

        // without a storage root, a non-empty selection merges horizontally
        let algorithm = choose_compaction_algorithm(&config, &input)
            .expect("iterator counts are available");
        if input.is_empty() {
            assert_eq!(CompactionAlgorithm::CloudNativeIndex, algorithm);
        } else {
            assert_eq!(CompactionAlgorithm::Horizontal, algorithm);
        }
    }
}

#[test]
fn empty_tablet_end_to_end() {
    let metadata = Arc::new(TabletMetadata {
        tablet_id: 1,
        version: 1,
        cumulative_point: 0,
        rowsets: Vec::new(),
        schema: TabletSchema {
            keys_type: KeysType::DupKeys,
            column_count: 3,
        },
        compaction_strategy: None,
        sstable_meta: Default::default(),
        delvec_rowsets: Default::default(),
    });
    let config = Arc::new(Config::default());

    assert_eq!(0.0, compaction_score(&metadata, &config));

    let policy = create_policy(
        Arc::new(SegmentCountManager),
        metadata,
        config.clone(),
        false,
    );
    let input = policy.pick_rowsets().expect("empty pick is not an error");
    assert!(input.is_empty());

    assert_eq!(
        CompactionAlgorithm::CloudNativeIndex,
        choose_compaction_algorithm(&config, &input).expect("choice should succeed"),
    );
}
