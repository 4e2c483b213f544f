//! Reading and writing JSON documents.
//!
//! Used by configuration glue to load settings from disk.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Decodes a JSON document from a string.
///
/// # Errors
///
/// Returns [`Error::Json`] if the document is malformed or does not match `T`.
pub fn from_json_str<T: DeserializeOwned>(input: &str) -> Result<T> {
    Ok(serde_json::from_str(input)?)
}

/// Decodes the JSON file at `path`.
///
/// # Errors
///
/// Returns [`Error::Json`] if the file cannot be opened or its contents do not decode into `T`.
pub fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    debug!(path = %path.display(), "reading JSON document");

    let file = File::open(path)
        .map_err(|err| Error::Json(format!("failed to open {}: {err}", path.display())))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|err| Error::Json(format!("failed to decode {}: {err}", path.display())))
}

/// Encodes `value` as JSON and writes it to `path`.
///
/// An existing file is truncated so the previous contents are fully replaced.
///
/// # Errors
///
/// Returns [`Error::Json`] if the value cannot be encoded or the file cannot be written.
pub fn write_json_file<T: Serialize + ?Sized>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let path = path.as_ref();
    debug!(path = %path.display(), "writing JSON document");

    let io_error =
        |err: std::io::Error| Error::Json(format!("failed to write {}: {err}", path.display()));

    let mut writer = BufWriter::new(File::create(path).map_err(io_error)?);
    serde_json::to_writer(&mut writer, value)?;
    writer.flush().map_err(io_error)
}
