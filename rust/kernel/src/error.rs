// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Result type for kernel operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur inside the geometry kernel
#[derive(Error, Debug)]
pub enum Error {
    #[error("Triangulation failed: {0}")]
    Triangulation(String),

    #[error("Invalid face: {0}")]
    InvalidFace(String),

    #[error("Unknown scene node")]
    UnknownNode,
}
