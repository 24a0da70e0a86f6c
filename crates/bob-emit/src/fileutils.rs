use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Writes `content` to `path` only when it differs from what is already
/// there. Downstream make/ninja dependency checking is mtime driven, so a
/// no-op write must leave the file untouched.
///
/// Real writes go through a temporary file in the same directory followed by
/// a rename, so a concurrent reader sees either the old or the new content.
pub fn write_if_changed(path: &Path, content: &str) -> Result<()> {
    if let Ok(existing) = fs::read(path)
        && existing == content.as_bytes()
    {
        return Ok(());
    }

    let dir = path
        .parent()
        .ok_or_else(|| Error::msg(format!("{} has no parent directory", path.display())))?;
    fs::create_dir_all(dir)
        .map_err(|e| Error::msg(format!("failed to create dir {}: {e}", dir.display())))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::msg(format!("{} has no file name", path.display())))?;
    let tmp = dir.join(format!(".{file_name}.tmp"));
    fs::write(&tmp, content)
        .map_err(|e| Error::msg(format!("failed to write {}: {e}", tmp.display())))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        Error::msg(format!("failed to rename into {}: {e}", path.display()))
    })?;
    Ok(())
}
