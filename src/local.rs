//! Local filesystem access through `cap-std` ambient authority.

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};

/// Splits `path` into its parent directory (`.` when there is none) and
/// final component.
pub(crate) fn split_path(path: &Utf8Path) -> (&Utf8Path, &str) {
    let file_name = path.file_name().unwrap_or_else(|| path.as_str());
    let dir_path = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    (dir_path, file_name)
}

/// Returns `true` when `path` names an existing regular file.
pub(crate) fn is_file(path: &Utf8Path) -> bool {
    let (dir_path, file_name) = split_path(path);
    Dir::open_ambient_dir(dir_path, ambient_authority())
        .map(|dir| dir.is_file(file_name))
        .unwrap_or(false)
}

/// Reads `path` to a string. Returns `Ok(None)` when the file or its parent
/// directory does not exist.
pub(crate) fn read_optional(path: &Utf8Path) -> std::io::Result<Option<String>> {
    let (dir_path, file_name) = split_path(path);
    let dir = match Dir::open_ambient_dir(dir_path, ambient_authority()) {
        Ok(dir) => dir,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    match dir.read_to_string(file_name) {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}
