// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helpers for the collaborator that owns the sink's lifecycle.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Copies the previous run's log file to a `.prev` sibling
/// (`console.log` becomes `console.prev.log`), overwriting any older backup,
/// and returns the backup path. No-op when `path` does not exist.
///
/// Meant to be called by the component that opens the sink, before
/// [`FileSink::open`](crate::FileSink::open) truncates the file. The sink
/// itself never rotates anything.
pub fn preserve_previous(path: impl AsRef<Path>) -> io::Result<Option<PathBuf>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }

    let backup = previous_path(path);
    fs::copy(path, &backup)?;
    Ok(Some(backup))
}

fn previous_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match path.extension() {
        Some(ext) => path.with_file_name(format!("{stem}.prev.{}", ext.to_string_lossy())),
        None => path.with_file_name(format!("{stem}.prev")),
    }
}
