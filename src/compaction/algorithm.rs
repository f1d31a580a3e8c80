// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{config::Config, Result, Rowset};

/// Merge algorithm applied to the selected rowsets
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CompactionAlgorithm {
    /// Row-wise heap merge over all columns at once
    Horizontal,

    /// Column-group-wise merge driven by a row source mask
    Vertical,

    /// No rowset input, the cloud-native index is rebuilt instead
    CloudNativeIndex,
}

impl std::fmt::Display for CompactionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Horizontal => write!(f, "HORIZONTAL_COMPACTION"),
            Self::Vertical => write!(f, "VERTICAL_COMPACTION"),
            Self::CloudNativeIndex => write!(f, "CLOUD_NATIVE_INDEX_COMPACTION"),
        }
    }
}

fn algorithm_for(num_columns: u32, max_columns_per_group: u32, source_num: u64) -> CompactionAlgorithm {
    if num_columns <= max_columns_per_group {
        return CompactionAlgorithm::Horizontal;
    }

    // a single source never builds a heap merge iterator, so there is no
    // row source mask to drive a vertical merge
    if source_num <= 1 {
        return CompactionAlgorithm::Horizontal;
    }

    CompactionAlgorithm::Vertical
}

/// Chooses the merge algorithm for a finished selection.
///
/// # Errors
///
/// Propagates [`crate::Error::RowsetIntrospection`] when a rowset cannot
/// report its read iterator count.
pub fn choose_compaction_algorithm(
    config: &Config,
    rowsets: &[Rowset],
) -> Result<CompactionAlgorithm> {
    // no rowsets means this compaction only rebuilds the cloud-native index
    let Some(first) = rowsets.first() else {
        return Ok(CompactionAlgorithm::CloudNativeIndex);
    };

    // the row source mask buffer lives in a local scratch file; without a
    // storage root there is nowhere to put it
    if config.store_paths.is_empty() {
        return Ok(CompactionAlgorithm::Horizontal);
    }

    let mut total_iterator_num: u64 = 0;
    for rowset in rowsets {
        total_iterator_num += rowset.read_iterator_num()?;
    }

    let num_columns = first.tablet_metadata().schema.column_count;

    Ok(algorithm_for(
        num_columns,
        config.vertical_compaction_max_columns_per_group,
        total_iterator_num,
    ))
}
