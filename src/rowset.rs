// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    metadata::{RowsetMetadata, TabletMetadata},
    Result, TabletManager,
};
use std::sync::Arc;

/// Handle to one rowset of a tablet snapshot
///
/// Produced by a selection policy and consumed by compaction execution.
/// The handle shares ownership of the metadata snapshot, so it stays
/// valid for as long as execution holds on to it.
#[derive(Clone)]
pub struct Rowset {
    tablet_mgr: Arc<dyn TabletManager>,
    tablet_metadata: Arc<TabletMetadata>,
    index: usize,
    meta: RowsetMetadata,
    compaction_segment_limit: u64,
}

impl Rowset {
    pub(crate) fn new(
        tablet_mgr: Arc<dyn TabletManager>,
        tablet_metadata: Arc<TabletMetadata>,
        index: usize,
        meta: RowsetMetadata,
        compaction_segment_limit: u64,
    ) -> Self {
        Self {
            tablet_mgr,
            tablet_metadata,
            index,
            meta,
            compaction_segment_limit,
        }
    }

    /// Position-stable rowset identifier.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.meta.id
    }

    /// Position of the rowset inside the tablet's rowset list.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Per-rowset facts.
    #[must_use]
    pub fn metadata(&self) -> &RowsetMetadata {
        &self.meta
    }

    /// Snapshot the handle was created from.
    #[must_use]
    pub fn tablet_metadata(&self) -> &TabletMetadata {
        &self.tablet_metadata
    }

    /// Segment budget for partial compaction; 0 means the full rowset.
    ///
    /// At most one rowset per selection carries a non-zero limit, and it
    /// is then the only rowset of that selection.
    #[must_use]
    pub fn compaction_segment_limit(&self) -> u64 {
        self.compaction_segment_limit
    }

    /// Number of read iterators needed to scan this rowset.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::Error::RowsetIntrospection`] from the tablet
    /// manager.
    pub fn read_iterator_num(&self) -> Result<u64> {
        self.tablet_mgr
            .read_iterator_num(&self.tablet_metadata, self.index)
    }
}

impl std::fmt::Debug for Rowset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rowset")
            .field("tablet_id", &self.tablet_metadata.tablet_id)
            .field("id", &self.meta.id)
            .field("index", &self.index)
            .field("compaction_segment_limit", &self.compaction_segment_limit)
            .finish()
    }
}
