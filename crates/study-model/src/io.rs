use std::fs;
use std::io::Write;
use std::path::Path;

use study_core::StudyError;

/// Writes `bytes` to `path` through a temporary sibling and a rename, so
/// readers never observe a partially written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StudyError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| StudyError::storage("io_mkdir", parent, err))?;
    }
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("tmpfile");
    let tmp = path.with_file_name(format!(
        ".{}.tmp.{}.{:?}",
        name,
        std::process::id(),
        std::thread::current().id()
    ));
    let mut file = fs::File::create(&tmp).map_err(|err| StudyError::storage("io_create", &tmp, err))?;
    file.write_all(bytes)
        .and_then(|_| file.sync_all())
        .map_err(|err| StudyError::storage("io_write", &tmp, err))?;
    fs::rename(&tmp, path).map_err(|err| StudyError::storage("io_rename", path, err))
}

/// Reads a whole file, mapping failures to storage errors.
pub fn read_file(path: &Path) -> Result<Vec<u8>, StudyError> {
    fs::read(path).map_err(|err| StudyError::storage("io_read", path, err))
}
