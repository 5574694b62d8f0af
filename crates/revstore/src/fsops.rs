//! Filesystem primitives used by the store.
//!
//! Copies go through a hidden temp file in the destination directory followed
//! by a rename, so readers never observe a half-written payload.

use std::ffi::{OsStr, OsString};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

const COPY_BUF_SIZE: usize = 64 * 1024;

/// Which side of a copy failed.
#[derive(Debug)]
pub(crate) enum CopyError {
    Read(io::Error),
    Write(io::Error),
}

/// Create `path` and any missing ancestors with `mode`.
///
/// Every directory actually created is pushed onto `created`, outermost
/// first, even when a later step fails.
pub(crate) fn create_dir_tree(path: &Path, mode: u32, created: &mut Vec<PathBuf>) -> io::Result<()> {
    let mut missing = Vec::new();
    let mut cursor = Some(path);
    while let Some(dir) = cursor {
        match fs::metadata(dir) {
            Ok(meta) if meta.is_dir() => break,
            Ok(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} exists and is not a directory", dir.display()),
                ))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => missing.push(dir),
            Err(e) => return Err(e),
        }
        cursor = dir.parent().filter(|p| !p.as_os_str().is_empty());
    }

    for dir in missing.into_iter().rev() {
        match dir_builder(mode).create(dir) {
            Ok(()) => created.push(dir.to_path_buf()),
            // Lost a race with a concurrent add for the same shard.
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(unix)]
fn dir_builder(mode: u32) -> fs::DirBuilder {
    use std::os::unix::fs::DirBuilderExt;
    let mut builder = fs::DirBuilder::new();
    builder.mode(mode);
    builder
}

#[cfg(not(unix))]
fn dir_builder(_mode: u32) -> fs::DirBuilder {
    fs::DirBuilder::new()
}

/// Regular, non-hidden files directly inside `dir`, sorted by name.
pub(crate) fn list_payloads(dir: &Path) -> io::Result<Vec<OsString>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if is_hidden(&name) {
            continue;
        }
        names.push(name);
    }
    names.sort();
    Ok(names)
}

pub(crate) fn is_hidden(name: &OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// Copy `src` to `dest_dir/name` via a hidden temp file and rename.
///
/// Returns the number of bytes copied.
pub(crate) fn copy_atomic(src: &Path, dest_dir: &Path, name: &OsStr) -> Result<u64, CopyError> {
    let mut reader = File::open(src).map_err(CopyError::Read)?;

    let target = dest_dir.join(name);
    let temp_path = dest_dir.join(format!(
        ".{}.{}.{:?}.tmp",
        name.to_string_lossy(),
        std::process::id(),
        std::thread::current().id()
    ));

    let result = write_temp(&mut reader, &temp_path)
        .and_then(|n| fs::rename(&temp_path, &target).map(|_| n).map_err(CopyError::Write));

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn write_temp(reader: &mut File, temp_path: &Path) -> Result<u64, CopyError> {
    let mut writer = File::create(temp_path).map_err(CopyError::Write)?;
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CopyError::Read(e)),
        };
        writer.write_all(&buf[..n]).map_err(CopyError::Write)?;
        total += n as u64;
    }
    writer.sync_all().map_err(CopyError::Write)?;
    Ok(total)
}
