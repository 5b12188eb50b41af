//! MessagePack persistence for value tables.
//!
//! Tables are written to a sibling temporary file and renamed into place, so a
//! reader never observes a partially written table.

use std::{
    ffi::OsString,
    fs::{self, File},
    io::{BufReader, BufWriter, ErrorKind, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{ACTION_COUNT, Error, Result, q_table::ValueTable};

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct SavedTableRef<'a> {
    version: u32,
    states: usize,
    actions: usize,
    values: &'a [f64],
}

#[derive(Deserialize)]
struct SavedTable {
    version: u32,
    states: usize,
    actions: usize,
    values: Vec<f64>,
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(path.file_name().unwrap_or_default());
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_envelope(tmp: &Path, envelope: &SavedTableRef<'_>) -> Result<()> {
    let file = File::create(tmp).map_err(|source| Error::Io {
        operation: format!("create file {}", tmp.display()),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    rmp_serde::encode::write(&mut writer, envelope).map_err(|e| Error::Serialization {
        operation: "serialize value table to MessagePack".to_string(),
        message: e.to_string(),
    })?;
    writer.flush().map_err(|source| Error::Io {
        operation: format!("flush {}", tmp.display()),
        source,
    })
}

/// Writes the table atomically to `path`. On failure the temporary file is
/// removed and any existing table at `path` is left as it was.
pub fn save_table<P: AsRef<Path>>(table: &ValueTable, path: P) -> Result<()> {
    let path = path.as_ref();
    let tmp = temp_path(path);

    let envelope = SavedTableRef {
        version: FORMAT_VERSION,
        states: table.states(),
        actions: table.actions(),
        values: table.values(),
    };

    let written = write_envelope(&tmp, &envelope).and_then(|()| {
        fs::rename(&tmp, path).map_err(|source| Error::Io {
            operation: format!("move {} into place", path.display()),
            source,
        })
    });
    if let Err(err) = written {
        match fs::remove_file(&tmp) {
            Err(cleanup) if cleanup.kind() != ErrorKind::NotFound => {
                tracing::warn!(path = %tmp.display(), error = %cleanup, "could not remove temporary table file");
            }
            _ => {}
        }
        return Err(err);
    }

    tracing::info!(path = %path.display(), states = table.states(), "saved value table");
    Ok(())
}

/// Reads a table and checks it against the expected state count.
///
/// A mismatched shape is reported as `Error::TableShapeMismatch`; the table is
/// never truncated or padded to fit.
pub fn load_table<P: AsRef<Path>>(path: P, expected_states: usize) -> Result<ValueTable> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| {
        if source.kind() == ErrorKind::NotFound {
            Error::TableNotFound {
                path: path.to_path_buf(),
            }
        } else {
            Error::Io {
                operation: format!("open file {}", path.display()),
                source,
            }
        }
    })?;

    let saved: SavedTable =
        rmp_serde::decode::from_read(BufReader::new(file)).map_err(|e| Error::Serialization {
            operation: format!("deserialize value table from {}", path.display()),
            message: e.to_string(),
        })?;

    if saved.version != FORMAT_VERSION {
        return Err(Error::UnsupportedVersion {
            found: saved.version,
            expected: FORMAT_VERSION,
        });
    }
    if saved.states != expected_states || saved.actions != ACTION_COUNT {
        return Err(Error::TableShapeMismatch {
            expected_states,
            expected_actions: ACTION_COUNT,
            states: saved.states,
            actions: saved.actions,
        });
    }

    let table = ValueTable::from_values(saved.states, saved.actions, saved.values)?;
    tracing::info!(path = %path.display(), states = table.states(), "loaded value table");
    Ok(table)
}
