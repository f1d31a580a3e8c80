// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Contains compaction selection policies

mod algorithm;
mod base_cumulative;
mod primary_key;
mod score;
mod size_tiered;

pub use algorithm::{choose_compaction_algorithm, CompactionAlgorithm};
pub use base_cumulative::BaseAndCumulativePolicy;
pub use primary_key::PrimaryKeyPolicy;
pub use score::{
    base_compaction_score, compaction_score, cumulative_compaction_score,
    primary_compaction_score, size_tiered_compaction_score,
};
pub use size_tiered::{SizeTieredLevel, SizeTieredPolicy};

use crate::{
    config::Config,
    metadata::{KeysType, TabletMetadata},
    Rowset, TabletManager,
};
use enum_dispatch::enum_dispatch;
use std::sync::Arc;

/// Which region of the tablet a compaction rewrites
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CompactionType {
    /// Rewrites the already-compacted head of the tablet
    Base,

    /// Folds incrementally ingested rowsets into larger ones
    Cumulative,
}

impl std::fmt::Display for CompactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Base => write!(f, "BASE_COMPACTION"),
            Self::Cumulative => write!(f, "CUMULATIVE_COMPACTION"),
        }
    }
}

/// Trait for a compaction selection policy
///
/// The policy holds a read-only tablet snapshot and decides which
/// contiguous run of rowsets to merge next. An empty selection means
/// "nothing worthwhile", never an error.
#[enum_dispatch]
pub trait CompactionPolicy {
    /// Picks the input rowsets of the next compaction.
    ///
    /// Returned indices are strictly increasing and contiguous; a
    /// delete-predicate rowset only ever leads a group, unless the group
    /// starts at the tablet head.
    ///
    /// # Errors
    ///
    /// Returns an error only for unreadable or inconsistent metadata.
    fn pick_rowsets(&self) -> crate::Result<Vec<Rowset>>;
}

/// Selection policy variant constructed by [`create_policy`]
#[enum_dispatch(CompactionPolicy)]
pub enum AnyPolicy {
    /// Classic two-region policy, see [`BaseAndCumulativePolicy`]
    BaseAndCumulative(BaseAndCumulativePolicy),

    /// Bucketed-by-size policy, see [`SizeTieredPolicy`]
    SizeTiered(SizeTieredPolicy),

    /// Delete-vector aware policy, see [`PrimaryKeyPolicy`]
    PrimaryKey(PrimaryKeyPolicy),
}

/// Constructs the selection policy for a tablet snapshot.
///
/// Primary-key tablets always get the primary-key policy; everything else
/// uses size-tiered selection when enabled, or the classic
/// base-and-cumulative split otherwise.
#[must_use]
pub fn create_policy(
    tablet_mgr: Arc<dyn TabletManager>,
    metadata: Arc<TabletMetadata>,
    config: Arc<Config>,
    force_base_compaction: bool,
) -> AnyPolicy {
    if metadata.keys_type() == KeysType::PrimaryKeys {
        AnyPolicy::PrimaryKey(PrimaryKeyPolicy::new(tablet_mgr, metadata, config))
    } else if config.enable_size_tiered_compaction_strategy {
        AnyPolicy::SizeTiered(SizeTieredPolicy::new(
            tablet_mgr,
            metadata,
            config,
            force_base_compaction,
        ))
    } else {
        AnyPolicy::BaseAndCumulative(BaseAndCumulativePolicy::new(
            tablet_mgr,
            metadata,
            config,
            force_base_compaction,
        ))
    }
}

/// Trace diagnostics for a finished pick. Scheduler operators rely on
/// this format, so treat it as part of the interface.
pub(crate) fn log_picked_rowsets(
    metadata: &TabletMetadata,
    compaction_type: CompactionType,
    input_rowsets: &[Rowset],
) {
    if !log::log_enabled!(log::Level::Trace) {
        return;
    }

    let mut rowset_ids = Vec::with_capacity(metadata.rowsets.len());
    let mut delete_rowset_ids = Vec::new();

    for rowset in &metadata.rowsets {
        rowset_ids.push(rowset.id);

        if rowset.has_delete_predicate {
            delete_rowset_ids.push(rowset.id);
        }
    }

    let input_rowset_ids = input_rowsets.iter().map(Rowset::id).collect::<Vec<_>>();

    log::trace!(
        "Picked compaction input rowsets. tablet: {}, type: {compaction_type}, version: {}, cumulative point: {}, input rowsets size: {}, input rowsets: {input_rowset_ids:?}, rowsets: {rowset_ids:?}, delete rowsets: {delete_rowset_ids:?}",
        metadata.tablet_id,
        metadata.version,
        metadata.cumulative_point,
        input_rowset_ids.len(),
    );
}
