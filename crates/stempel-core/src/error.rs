// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Stempel.
//
// Protocol-level failures never show up here: they are answered with an IPP
// status code inside a well-formed response.  These variants cover the
// failures around the protocol -- sockets, configuration, document streams.

use thiserror::Error;

/// Top-level error type for all Stempel operations.
#[derive(Debug, Error)]
pub enum StempelError {
    // -- Transport --
    #[error("print server error: {0}")]
    PrintServer(String),

    #[error("malformed IPP message: {0}")]
    Decode(String),

    // -- Document ingestion --
    #[error("document decompression failed: {0}")]
    Decompression(String),

    #[error("document stream failed: {0}")]
    Ingest(String),

    // -- Setup --
    #[error("configuration error: {0}")]
    Config(String),

    #[error("service advertisement failed: {0}")]
    Advertise(String),

    // -- Wrapped --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, StempelError>;
