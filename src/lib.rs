// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Compaction policy core for lake tablet storage.
//!
//! ##### NOTE
//!
//! > This crate only decides *what* to compact, not *how*: it scores a
//! > tablet for the scheduler, picks the next contiguous run of rowsets
//! > to merge, and chooses a merge algorithm. Reading, merging and
//! > writing rowsets is the job of the execution layer.
//!
//! ##### About
//!
//! A tablet accumulates rowsets with every ingestion. Left alone, the
//! growing list degrades reads and eventually hits the hard per-tablet
//! version ceiling, so a background scheduler keeps folding rowsets into
//! larger ones. This crate is the pure decision kernel of that loop:
//! every operation is a side-effect-free function over an immutable
//! metadata snapshot, so any number of tablets can be scored and picked
//! concurrently without synchronization.
//!
//! Three selection strategies are provided, chosen by the tablet's key
//! type and configuration: the classic base/cumulative split, a
//! size-tiered strategy with bounded write amplification, and a
//! delete-vector aware strategy for primary-key tablets.
//!
//! # Example usage
//!
//! ```
//! use lake_compaction::{
//!     compaction_score, create_policy, CompactionPolicy, Config, KeysType, RowsetMetadata,
//!     TabletManager, TabletMetadata, TabletSchema,
//! };
//! use std::sync::Arc;
//!
//! struct Manager;
//!
//! impl TabletManager for Manager {
//!     fn read_iterator_num(
//!         &self,
//!         metadata: &TabletMetadata,
//!         rowset_index: usize,
//!     ) -> lake_compaction::Result<u64> {
//!         Ok(metadata
//!             .rowsets
//!             .get(rowset_index)
//!             .map_or(0, RowsetMetadata::effective_segments))
//!     }
//! }
//!
//! let metadata = Arc::new(TabletMetadata {
//!     tablet_id: 4711,
//!     version: 12,
//!     cumulative_point: 0,
//!     rowsets: vec![
//!         RowsetMetadata {
//!             id: 1,
//!             data_size: 1 << 20,
//!             segments: 5,
//!             overlapped: true,
//!             has_delete_predicate: false,
//!             next_compaction_offset: 0,
//!         },
//!         RowsetMetadata {
//!             id: 2,
//!             data_size: 1 << 20,
//!             segments: 1,
//!             overlapped: false,
//!             has_delete_predicate: false,
//!             next_compaction_offset: 0,
//!         },
//!     ],
//!     schema: TabletSchema {
//!         keys_type: KeysType::DupKeys,
//!         column_count: 4,
//!     },
//!     compaction_strategy: None,
//!     sstable_meta: Default::default(),
//!     delvec_rowsets: Default::default(),
//! });
//! let config = Arc::new(Config::default());
//!
//! // rank the tablet for the scheduler
//! assert!(compaction_score(&metadata, &config) > 0.0);
//!
//! // then pick the input of the next compaction
//! let policy = create_policy(Arc::new(Manager), metadata, config, false);
//! let input = policy.pick_rowsets()?;
//! assert_eq!(2, input.len());
//! #
//! # Ok::<(), lake_compaction::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::indexing_slicing)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]
#![allow(clippy::option_if_let_else)]

pub mod compaction;
mod config;
mod error;
mod metadata;
mod rowset;
mod tablet_manager;

/// [`std::collections::HashSet`] with a faster hasher
pub type HashSet<T> = std::collections::HashSet<T, rustc_hash::FxBuildHasher>;

pub use {
    compaction::{
        base_compaction_score, choose_compaction_algorithm, compaction_score, create_policy,
        cumulative_compaction_score, primary_compaction_score, size_tiered_compaction_score,
        AnyPolicy, BaseAndCumulativePolicy, CompactionAlgorithm, CompactionPolicy, CompactionType,
        PrimaryKeyPolicy, SizeTieredLevel, SizeTieredPolicy,
    },
    config::Config,
    error::{Error, Result},
    metadata::{
        CompactionStrategyKind, KeysType, RowsetMetadata, SstableMeta, TabletMetadata,
        TabletSchema,
    },
    rowset::Rowset,
    tablet_manager::TabletManager,
};
