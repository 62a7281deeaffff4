//! Whole-file JSON state persistence shared by catalog, ledger and time series.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StateError;

/// Read and decode `path`, returning `None` when the file does not exist.
pub(crate) fn read_json_opt<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StateError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StateError::io(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StateError::Malformed {
            path: path.to_path_buf(),
            source,
        })
}

/// Encode `value` and atomically replace `path` with it.
///
/// The bytes go to `<path>.tmp` first and are renamed over the target, so
/// readers observe either the old or the new content.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StateError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StateError::io(parent, e))?;
    }

    let tmp = path.with_extension("json.tmp");
    let result = (|| {
        let file = File::create(&tmp).map_err(|e| StateError::io(&tmp, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, value).map_err(|source| StateError::Encode {
            path: path.to_path_buf(),
            source,
        })?;
        writer.flush().map_err(|e| StateError::io(&tmp, e))?;
        writer
            .get_ref()
            .sync_data()
            .map_err(|e| StateError::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| StateError::io(path, e))
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}
