use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{bail, Context, Result};

use crate::time_utils::current_unix_timestamp_ms;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Writes bytes to a sibling temp file, syncs it, then renames it over `path`.
///
/// An interrupted write leaves at most a hidden `.tmp-` sibling behind, never a
/// truncated file at `path`.
pub fn write_bytes_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("destination path cannot be empty");
    }
    if path.is_dir() {
        bail!("destination path '{}' is a directory", path.display());
    }

    let parent_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent_dir)
        .with_context(|| format!("failed to create {}", parent_dir.display()))?;

    let temp_name = format!(
        ".{}.tmp-{}-{}-{}",
        path.file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("record"),
        std::process::id(),
        current_unix_timestamp_ms(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    );
    let temp_path = parent_dir.join(temp_name);

    let written = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .and_then(|mut file| {
            file.write_all(content)?;
            file.sync_all()
        });
    if let Err(error) = written {
        let _ = std::fs::remove_file(&temp_path);
        return Err(error)
            .with_context(|| format!("failed to write temporary file {}", temp_path.display()));
    }

    if let Err(error) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(error).with_context(|| {
            format!(
                "failed to rename temporary file {} to {}",
                temp_path.display(),
                path.display()
            )
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::write_bytes_atomic;

    #[test]
    fn functional_write_bytes_atomic_creates_parent_and_leaves_no_temp_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("record.json");
        write_bytes_atomic(&path, b"{\"ok\":true}").expect("write");

        assert_eq!(std::fs::read(&path).expect("read"), b"{\"ok\":true}");
        let entries = std::fs::read_dir(path.parent().expect("parent"))
            .expect("read dir")
            .map(|entry| entry.expect("entry").file_name())
            .collect::<Vec<_>>();
        assert_eq!(entries.len(), 1, "unexpected entries: {entries:?}");
    }

    #[test]
    fn unit_write_bytes_atomic_preserves_non_utf8_bytes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("raw.bin");
        let payload = [0x89_u8, b'P', b'N', b'G', 0x00, 0xff];
        write_bytes_atomic(&path, &payload).expect("write");
        assert_eq!(std::fs::read(&path).expect("read"), payload);
    }

    #[test]
    fn regression_write_bytes_atomic_rejects_directory_destination() {
        let temp = tempfile::tempdir().expect("tempdir");
        let error = write_bytes_atomic(temp.path(), b"x").expect_err("directory should fail");
        assert!(error.to_string().contains("is a directory"));
    }

    #[test]
    fn regression_write_bytes_atomic_rejects_empty_destination() {
        let error =
            write_bytes_atomic(std::path::Path::new(""), b"x").expect_err("empty path should fail");
        assert!(error.to_string().contains("cannot be empty"));
    }
}
