// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Represents errors that can occur while scoring a tablet or picking
/// compaction input rowsets
#[derive(Debug)]
pub enum Error {
    /// Tablet metadata snapshot is missing or inconsistent
    MetadataUnavailable(&'static str),

    /// A rowset could not report its read iterator count
    RowsetIntrospection {
        /// Rowset that failed introspection
        rowset_id: u32,

        /// Failure description from the tablet manager
        reason: String,
    },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CompactionPolicyError: {self:?}")
    }
}

impl std::error::Error for Error {}

/// Compaction policy result
pub type Result<T> = std::result::Result<T, Error>;
