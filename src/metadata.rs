// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{Error, HashSet, Result};

/// Key model of a tablet schema
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum KeysType {
    /// Duplicate keys, append-only
    DupKeys,

    /// Unique keys, last write wins
    UniqueKeys,

    /// Aggregate keys, values merged on read
    AggKeys,

    /// Primary keys, delete-vector based updates
    PrimaryKeys,
}

/// Server-assigned compaction strategy tag
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CompactionStrategyKind {
    /// Default strategy, no special treatment
    Default,

    /// Real-time ingestion, delete-vector amplification is disabled
    RealTime,
}

/// Primary-key tablet SSTable bookkeeping
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SstableMeta {
    /// Number of SSTables attached to the tablet
    pub sstable_count: u32,
}

/// Schema facts the compaction policy cares about
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TabletSchema {
    /// Key model
    pub keys_type: KeysType,

    /// Number of columns, drives the merge algorithm choice
    pub column_count: u32,
}

/// Per-rowset facts used by policy decisions
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RowsetMetadata {
    /// Position-stable rowset identifier
    pub id: u32,

    /// Data size in bytes
    pub data_size: i64,

    /// Number of segments inside the rowset
    pub segments: u32,

    /// Whether the segments have overlapping key ranges
    ///
    /// Overlapped segments each need their own read iterator; a
    /// non-overlapped rowset reads as a single sorted run.
    pub overlapped: bool,

    /// Whether the rowset encodes a delete predicate instead of data
    pub has_delete_predicate: bool,

    /// Number of already-compacted segments (partial-compaction bookmark)
    pub next_compaction_offset: u32,
}

impl RowsetMetadata {
    /// Effective segment count for scoring.
    #[must_use]
    pub fn effective_segments(&self) -> u64 {
        if self.overlapped {
            u64::from(self.segments)
        } else {
            1
        }
    }

    /// Data size clamped for bucketing; empty rowsets count as one byte.
    pub(crate) fn size_for_level(&self) -> i64 {
        self.data_size.max(1)
    }
}

/// Read-only snapshot of a tablet's metadata
///
/// One snapshot is shared (via [`std::sync::Arc`]) between every policy
/// invocation and every rowset handle produced from it; nothing in this
/// crate mutates it, so any number of tablets can be scored concurrently.
#[derive(Clone, Debug)]
pub struct TabletMetadata {
    /// Tablet identifier
    pub tablet_id: u64,

    /// Published metadata version
    pub version: u64,

    /// Index separating base-compacted rowsets `[0, cumulative_point)`
    /// from incrementally ingested ones
    pub cumulative_point: u32,

    /// Rowsets in ingestion order
    pub rowsets: Vec<RowsetMetadata>,

    /// Schema facts
    pub schema: TabletSchema,

    /// Optional strategy tag assigned by the server
    pub compaction_strategy: Option<CompactionStrategyKind>,

    /// SSTable bookkeeping (primary-key tablets only)
    pub sstable_meta: SstableMeta,

    /// Ids of rowsets that have an associated delete-vector file
    pub delvec_rowsets: HashSet<u32>,
}

impl TabletMetadata {
    /// Key model of the tablet.
    #[must_use]
    pub fn keys_type(&self) -> KeysType {
        self.schema.keys_type
    }

    /// Number of rowsets in the snapshot.
    #[must_use]
    pub fn num_rowsets(&self) -> usize {
        self.rowsets.len()
    }

    /// Whether the given rowset has an associated delete-vector file.
    #[must_use]
    pub fn rowset_has_delvec(&self, rowset_id: u32) -> bool {
        self.delvec_rowsets.contains(&rowset_id)
    }

    /// Whether the server tagged this tablet for real-time compaction.
    #[must_use]
    pub fn is_real_time_strategy(&self) -> bool {
        self.compaction_strategy == Some(CompactionStrategyKind::RealTime)
    }

    /// Checks snapshot consistency before a policy relies on it.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.cumulative_point as usize > self.rowsets.len() {
            return Err(Error::MetadataUnavailable(
                "cumulative point beyond rowset list",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{KeysType, RowsetMetadata, TabletMetadata, TabletSchema};
    use test_log::test;

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

    #[test]
    fn effective_segments_overlap() {
        assert_eq!(3, rowset(1, 3, true).effective_segments());
        assert_eq!(1, rowset(1, 3, false).effective_segments());
    }

    #[test]
    fn size_for_level_clamps_empty() {
        let mut r = rowset(1, 1, false);
        r.data_size = 0;
        assert_eq!(1, r.size_for_level());

        r.data_size = 4_096;
        assert_eq!(4_096, r.size_for_level());
    }

    #[test]
    fn validate_rejects_wild_cumulative_point() {
        let metadata = TabletMetadata {
            tablet_id: 1,
            version: 2,
            cumulative_point: 5,
            rowsets: vec![rowset(1, 1, false)],
            schema: TabletSchema {
                keys_type: KeysType::DupKeys,
                column_count: 3,
            },
            compaction_strategy: None,
            sstable_meta: Default::default(),
            delvec_rowsets: Default::default(),
        };

        assert!(metadata.validate().is_err());
    }
}
