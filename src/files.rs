//! Ambient filesystem helpers built on `cap-std` UTF-8 directories.
//!
//! Every helper splits a path into its parent directory and file name, opens
//! the parent with ambient authority, and performs the operation relative to
//! it. Writes go through a temporary sibling and a rename so readers never
//! observe a half-written file.

use std::io;

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use uuid::Uuid;

fn split(path: &Utf8Path) -> io::Result<(&Utf8Path, &str)> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let file_name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("path has no file name: {path}"),
        )
    })?;
    Ok((parent, file_name))
}

/// Reads a UTF-8 file into memory.
///
/// # Errors
///
/// Returns the underlying I/O error when the parent directory cannot be
/// opened or the file cannot be read.
pub fn read_utf8(path: &Utf8Path) -> io::Result<String> {
    let (parent, file_name) = split(path)?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority())?;
    dir.read_to_string(file_name)
}

/// Creates parent directories as needed and atomically replaces `path` with
/// `contents`.
///
/// # Errors
///
/// Returns the underlying I/O error when directories cannot be created or
/// the write or rename fails.
pub fn write_atomic(path: &Utf8Path, contents: &str) -> io::Result<()> {
    let (parent, file_name) = split(path)?;
    Dir::create_ambient_dir_all(parent, ambient_authority())?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority())?;

    let staging = format!(".{file_name}.{}.tmp", Uuid::new_v4().simple());
    dir.write(&staging, contents)?;
    if let Err(err) = dir.rename(&staging, &dir, file_name) {
        dir.remove_file(&staging).ok();
        return Err(err);
    }
    Ok(())
}

/// Creates `path` and any missing ancestors.
///
/// # Errors
///
/// Returns the underlying I/O error when creation fails.
pub fn ensure_dir(path: &Utf8Path) -> io::Result<()> {
    Dir::create_ambient_dir_all(path, ambient_authority())
}

/// Removes a file, returning `false` when it was already absent.
///
/// # Errors
///
/// Returns the underlying I/O error for anything other than a missing file
/// or missing parent directory.
pub fn remove_file_if_exists(path: &Utf8Path) -> io::Result<bool> {
    let (parent, file_name) = split(path)?;
    let dir = match Dir::open_ambient_dir(parent, ambient_authority()) {
        Ok(dir) => dir,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    match dir.remove_file(file_name) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn temp_root() -> (TempDir, Utf8PathBuf) {
        let tmp = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf8 tempdir");
        (tmp, root)
    }

    #[test]
    fn write_atomic_creates_parents_and_replaces_content() {
        let (_tmp, root) = temp_root();
        let path = root.join("nested").join("results.json");

        write_atomic(&path, "first").expect("first write");
        write_atomic(&path, "second").expect("second write");

        assert_eq!(read_utf8(&path).expect("read back"), "second");
        let leftovers = std::fs::read_dir(root.join("nested"))
            .expect("list dir")
            .count();
        assert_eq!(leftovers, 1, "staging files should not remain");
    }

    #[test]
    fn remove_file_if_exists_tolerates_missing_files() {
        let (_tmp, root) = temp_root();
        let path = root.join("id_ed25519");
        write_atomic(&path, "key").expect("write key");

        assert!(remove_file_if_exists(&path).expect("first removal"));
        assert!(!remove_file_if_exists(&path).expect("second removal"));
        assert!(!remove_file_if_exists(&root.join("missing").join("key")).expect("missing dir"));
    }
}
