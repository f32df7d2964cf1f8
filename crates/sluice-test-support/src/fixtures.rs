//! Temp-root fixtures and file seeding helpers.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Create a scratch root directory for one test.
///
/// # Panics
///
/// Panics when the temp directory cannot be created; tests cannot proceed
/// without one.
#[must_use]
pub fn temp_root() -> TempDir {
    tempfile::Builder::new()
        .prefix("sluice-test-")
        .tempdir()
        .expect("temp root")
}

/// Seed a file under `root`, creating intermediate directories.
///
/// Returns the absolute path of the seeded file.
///
/// # Panics
///
/// Panics when the file cannot be written; the fixture is a precondition of
/// the test.
pub fn write_file(root: &Path, relative: &str, contents: &[u8]) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("fixture parent directory");
    }
    fs::write(&path, contents).expect("fixture file");
    path
}

/// List the relative paths of all regular files under `root`, sorted.
///
/// # Panics
///
/// Panics when a directory cannot be listed.
#[must_use]
pub fn list_files(root: &Path) -> Vec<String> {
    fn walk(base: &Path, dir: &Path, out: &mut Vec<String>) {
        for entry in fs::read_dir(dir).expect("list fixture directory") {
            let entry = entry.expect("fixture entry");
            let path = entry.path();
            if path.is_dir() {
                walk(base, &path, out);
            } else {
                let relative = path.strip_prefix(base).expect("fixture prefix");
                out.push(relative.to_string_lossy().into_owned());
            }
        }
    }
    let mut out = Vec::new();
    walk(root, root, &mut out);
    out.sort();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeding_and_listing_round_trip() {
        let root = temp_root();
        write_file(root.path(), "a.txt", b"one");
        write_file(root.path(), "sub/b.txt", b"two");
        assert_eq!(list_files(root.path()), vec!["a.txt", "sub/b.txt"]);
    }
}
