// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Engine error types.
//!
//! Fatal conditions abort the whole draw and carry the offending
//! segment/part context. Advisory conditions (unknown replacement names,
//! unmatched cut loops, disallowed solid-operation strings) are logged via
//! `tracing::warn!` and skipped, never surfaced here.

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort a draw pass
#[derive(Error, Debug)]
pub enum Error {
    /// The template prototype does not expose exactly one −X and one +X
    /// gable face, so segment fitting has no meaning.
    #[error("Malformed prototype in template '{template}': {detail}")]
    MalformedPrototype { template: String, detail: String },

    #[error("No template '{id}' in the catalog")]
    MissingTemplate { id: String },

    #[error("Invalid spread on part '{part}' (segment {segment}): {detail}")]
    InvalidSpread {
        part: String,
        segment: usize,
        detail: String,
    },

    #[error("Path needs at least 2 points, got {points}")]
    PathTooShort { points: usize },

    #[error("Template '{template}' has no part named '{part}'")]
    UnknownPart { template: String, part: String },

    #[error("Kernel error: {0}")]
    Kernel(#[from] townrow_kernel::Error),
}
