// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::path::PathBuf;

/// Errors surfaced by the batched file sink.
///
/// Formatting has no error kind: any string content is representable.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The target file or one of its parent directories could not be
    /// created. Fatal to the caller of `open`; the sink never retries.
    #[error("failed to create log file {path:?}: {source}")]
    Create { path: PathBuf, source: io::Error },

    /// A disk error interrupted a drain. Undrained lines stay queued and are
    /// retried on the next flush trigger.
    #[error("failed to flush queued log lines: {0}")]
    Flush(#[from] io::Error),
}
