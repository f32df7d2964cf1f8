//! Primitive file operations shared by the consumer and producer sides.
//!
//! All operations are synchronous `std::fs` calls; orchestration above them
//! decides what runs on which task. Paths handed in are absolute.

use std::borrow::Cow;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use sha2::{Digest, Sha256, Sha512};
use sluice_config::{ChecksumAlgorithm, CollisionPolicy, EndpointSettings};
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

use crate::error::{FsOpsError, FsOpsResult};

/// Content handed to [`FileOperations::store_file`].
#[derive(Debug, Clone, Copy)]
pub enum Body<'a> {
    /// In-memory bytes.
    Bytes(&'a [u8]),
    /// A local work file whose content (or handle) becomes the target.
    File(&'a Path),
}

/// Platform file operations configured by one endpoint.
#[derive(Clone)]
pub struct FileOperations {
    settings: Arc<EndpointSettings>,
    encoding: Option<&'static encoding_rs::Encoding>,
}

impl FileOperations {
    /// Build operations over validated endpoint settings.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Encoding`] when the configured charset label is
    /// unknown.
    pub fn new(settings: Arc<EndpointSettings>) -> FsOpsResult<Self> {
        let encoding = match settings.charset.as_deref() {
            Some(label) => Some(
                encoding_rs::Encoding::for_label(label.as_bytes()).ok_or_else(|| {
                    FsOpsError::Encoding {
                        charset: label.to_string(),
                    }
                })?,
            ),
            None => None,
        };
        Ok(Self { settings, encoding })
    }

    /// The endpoint settings these operations were built from.
    #[must_use]
    pub fn settings(&self) -> &EndpointSettings {
        &self.settings
    }

    /// Whether a path exists.
    #[must_use]
    pub fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    /// Delete a file.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Io`] when the file cannot be removed.
    pub fn delete_file(&self, path: &Path) -> FsOpsResult<()> {
        fs::remove_file(path).map_err(|source| FsOpsError::io("delete_file", path, source))
    }

    /// Rename a file, falling back to copy-then-delete when the rename fails
    /// (for example across filesystems).
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Io`] when both the rename and the fallback fail.
    pub fn rename_file(&self, from: &Path, to: &Path) -> FsOpsResult<()> {
        match fs::rename(from, to) {
            Ok(()) => Ok(()),
            Err(rename_err) => {
                debug!(
                    from = %from.display(),
                    to = %to.display(),
                    error = %rename_err,
                    "rename failed, copying instead"
                );
                self.copy_file(from, to)?;
                fs::remove_file(from)
                    .map_err(|source| FsOpsError::io("rename_file.cleanup", from, source))
            }
        }
    }

    fn copy_file(&self, from: &Path, to: &Path) -> FsOpsResult<u64> {
        let source =
            File::open(from).map_err(|source| FsOpsError::io("copy_file.open", from, source))?;
        let target =
            File::create(to).map_err(|source| FsOpsError::io("copy_file.create", to, source))?;
        let mut reader = BufReader::with_capacity(self.settings.buffer_size, source);
        let mut writer = BufWriter::with_capacity(self.settings.buffer_size, target);
        let written = io::copy(&mut reader, &mut writer)
            .map_err(|source| FsOpsError::io("copy_file.copy", to, source))?;
        writer
            .flush()
            .map_err(|source| FsOpsError::io("copy_file.flush", to, source))?;
        Ok(written)
    }

    /// Create a directory tree one segment at a time, applying the configured
    /// directory permissions to each created segment. Existing segments are a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Io`] when a segment cannot be created.
    pub fn build_directory(&self, directory: &Path) -> FsOpsResult<()> {
        let mut current = PathBuf::new();
        for component in directory.components() {
            current.push(component);
            if matches!(component, Component::Normal(_)) && !current.exists() {
                fs::create_dir(&current)
                    .map_err(|source| FsOpsError::io("build_directory", &current, source))?;
                if let Some(mode) = self.settings.chmod_directory {
                    self.apply_chmod(&current, mode)?;
                }
            }
        }
        Ok(())
    }

    /// Read the full content of a file.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Io`] when the file cannot be read.
    pub fn retrieve_file(&self, path: &Path) -> FsOpsResult<Vec<u8>> {
        let file =
            File::open(path).map_err(|source| FsOpsError::io("retrieve_file.open", path, source))?;
        let mut reader = BufReader::with_capacity(self.settings.buffer_size, file);
        let mut body = Vec::new();
        reader
            .read_to_end(&mut body)
            .map_err(|source| FsOpsError::io("retrieve_file.read", path, source))?;
        Ok(body)
    }

    /// Store content at `target`, honouring the collision policy when the
    /// target already exists. Returns the number of bytes written (zero for
    /// an ignored collision or an empty body).
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::TargetExists`] under [`CollisionPolicy::Fail`],
    /// [`FsOpsError::NullBody`] when the body is absent and empty files are
    /// not permitted, and [`FsOpsError::Io`] for write failures.
    pub fn store_file(
        &self,
        target: &Path,
        body: Option<Body<'_>>,
        last_modified: Option<SystemTime>,
    ) -> FsOpsResult<u64> {
        let exists = self.exists(target);
        if exists {
            match self.settings.file_exist {
                CollisionPolicy::Ignore => {
                    trace!(target = %target.display(), "target exists, ignoring write");
                    return Ok(0);
                }
                CollisionPolicy::Fail => {
                    return Err(FsOpsError::TargetExists {
                        path: target.to_path_buf(),
                    });
                }
                CollisionPolicy::Move => {
                    self.move_existing(target)?;
                }
                CollisionPolicy::Override | CollisionPolicy::Append | CollisionPolicy::TryRename => {}
            }
        }

        let append = exists && self.settings.file_exist == CollisionPolicy::Append;
        let written = self.write_body(target, body, append)?;

        if self.settings.keep_last_modified {
            if let Some(modified) = last_modified {
                if let Err(error) = self.change_last_modified(target, modified) {
                    warn!(
                        target = %target.display(),
                        error = %error,
                        "could not restore last-modified timestamp"
                    );
                }
            }
        }
        if let Some(mode) = self.settings.chmod {
            self.apply_chmod(target, mode)?;
        }
        Ok(written)
    }

    pub(crate) fn write_body(
        &self,
        target: &Path,
        body: Option<Body<'_>>,
        append: bool,
    ) -> FsOpsResult<u64> {
        match body {
            None => {
                if !self.settings.allow_null_body {
                    return Err(FsOpsError::NullBody {
                        path: target.to_path_buf(),
                    });
                }
                trace!(target = %target.display(), "writing empty file");
                open_for_write(target, append)
                    .map_err(|source| FsOpsError::io("store_file.create_empty", target, source))?;
                Ok(0)
            }
            Some(Body::File(work)) if self.encoding.is_none() && !append => {
                // Optimised path: adopt the staged work file wholesale.
                let length = fs::metadata(work).map(|metadata| metadata.len()).ok();
                self.rename_file(work, target)?;
                Ok(length.unwrap_or_default())
            }
            Some(Body::File(work)) => {
                let bytes = fs::read(work)
                    .map_err(|source| FsOpsError::io("store_file.read_work", work, source))?;
                self.write_bytes(target, &bytes, append)
            }
            Some(Body::Bytes(bytes)) => self.write_bytes(target, bytes, append),
        }
    }

    fn write_bytes(&self, target: &Path, bytes: &[u8], append: bool) -> FsOpsResult<u64> {
        let payload: Cow<'_, [u8]> = match self.encoding {
            Some(encoding) => {
                let text = std::str::from_utf8(bytes).map_err(|_| FsOpsError::Encoding {
                    charset: encoding.name().to_string(),
                })?;
                let (encoded, _, had_errors) = encoding.encode(text);
                if had_errors {
                    return Err(FsOpsError::Encoding {
                        charset: encoding.name().to_string(),
                    });
                }
                Cow::Owned(encoded.into_owned())
            }
            None => Cow::Borrowed(bytes),
        };

        let file = open_for_write(target, append)
            .map_err(|source| FsOpsError::io("store_file.open", target, source))?;
        let mut writer = BufWriter::with_capacity(self.settings.buffer_size, file);
        writer
            .write_all(&payload)
            .map_err(|source| FsOpsError::io("store_file.write", target, source))?;
        writer
            .flush()
            .map_err(|source| FsOpsError::io("store_file.flush", target, source))?;
        Ok(payload.len() as u64)
    }

    /// Relocate an existing target out of the way, resolving the configured
    /// move-existing pattern and creating any missing destination
    /// directories. Returns the destination the file was moved to.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::MoveExistingTargetExists`] when the destination
    /// is occupied and eager deletion is disabled, and [`FsOpsError::Io`]
    /// for rename failures.
    pub fn move_existing(&self, target: &Path) -> FsOpsResult<PathBuf> {
        let Some(pattern) = self.settings.move_existing.as_ref() else {
            return Err(FsOpsError::MissingState {
                field: "move_existing",
            });
        };
        let relative = target
            .strip_prefix(&self.settings.directory)
            .unwrap_or(target);
        let resolved = pattern.resolve_name(&relative.to_string_lossy());
        let destination = if Path::new(&resolved).is_absolute() {
            PathBuf::from(&resolved)
        } else {
            self.settings.directory.join(&resolved)
        };

        if let Some(parent) = destination.parent() {
            self.build_directory(parent)?;
        }
        if self.exists(&destination) {
            if self.settings.eager_delete_target_file {
                self.delete_file(&destination)?;
            } else {
                return Err(FsOpsError::MoveExistingTargetExists {
                    source_path: target.to_path_buf(),
                    target_path: destination,
                });
            }
        }
        debug!(
            from = %target.display(),
            to = %destination.display(),
            "moving existing target out of the way"
        );
        self.rename_file(target, &destination)?;
        Ok(destination)
    }

    /// Emit the companion done file for `target`, when configured.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Io`] when the marker cannot be written.
    pub fn write_done_file(&self, target: &Path) -> FsOpsResult<Option<PathBuf>> {
        let Some(pattern) = self.settings.done_file_name.as_ref() else {
            return Ok(None);
        };
        let name_only = target
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let done_name = pattern.resolve(&name_only);
        let done_path = target
            .parent()
            .map_or_else(|| PathBuf::from(&done_name), |parent| parent.join(&done_name));
        fs::write(&done_path, b"")
            .map_err(|source| FsOpsError::io("write_done_file", &done_path, source))?;
        Ok(Some(done_path))
    }

    /// Emit the checksum sidecar for `target`, when configured. The sidecar
    /// is named `<target>.<algorithm>` and holds the lowercase hex digest.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Io`] when the target cannot be read or the
    /// sidecar cannot be written.
    pub fn write_checksum_file(&self, target: &Path) -> FsOpsResult<Option<PathBuf>> {
        let Some(algorithm) = self.settings.checksum_file_algorithm else {
            return Ok(None);
        };
        let bytes = self.retrieve_file(target)?;
        let digest = match algorithm {
            ChecksumAlgorithm::Sha256 => hex_digest(Sha256::digest(&bytes).as_slice()),
            ChecksumAlgorithm::Sha512 => hex_digest(Sha512::digest(&bytes).as_slice()),
        };
        let mut sidecar = target.as_os_str().to_owned();
        sidecar.push(".");
        sidecar.push(algorithm.extension());
        let sidecar = PathBuf::from(sidecar);
        fs::write(&sidecar, digest)
            .map_err(|source| FsOpsError::io("write_checksum_file", &sidecar, source))?;
        Ok(Some(sidecar))
    }

    /// Restore a file's last-modified timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Io`] when the timestamp cannot be applied.
    pub fn change_last_modified(&self, path: &Path, modified: SystemTime) -> FsOpsResult<()> {
        let file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|source| FsOpsError::io("change_last_modified.open", path, source))?;
        file.set_modified(modified)
            .map_err(|source| FsOpsError::io("change_last_modified.set", path, source))
    }

    /// Apply POSIX permission bits. A no-op on platforms without them.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Io`] when the permissions cannot be applied.
    #[cfg(unix)]
    pub fn apply_chmod(&self, path: &Path, mode: u32) -> FsOpsResult<()> {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(|source| FsOpsError::io("apply_chmod", path, source))
    }

    /// Apply POSIX permission bits. A no-op on platforms without them.
    ///
    /// # Errors
    ///
    /// Never fails on this platform.
    #[cfg(not(unix))]
    pub fn apply_chmod(&self, _path: &Path, _mode: u32) -> FsOpsResult<()> {
        Ok(())
    }

    /// Delete every file under `root` whose name ends with `suffix`.
    /// Used to purge orphaned lock markers at startup. Returns the number of
    /// files removed.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Walkdir`] when the sweep cannot list an entry.
    pub fn remove_matching(
        &self,
        root: &Path,
        recursive: bool,
        suffix: &str,
    ) -> FsOpsResult<usize> {
        if !root.is_dir() {
            return Ok(0);
        }
        let walker = if recursive {
            WalkDir::new(root)
        } else {
            WalkDir::new(root).max_depth(1)
        };
        let mut removed = 0;
        for entry in walker {
            let entry = entry.map_err(|source| FsOpsError::walkdir("remove_matching", root, source))?;
            if entry.file_type().is_file()
                && entry.file_name().to_string_lossy().ends_with(suffix)
            {
                match fs::remove_file(entry.path()) {
                    Ok(()) => removed += 1,
                    Err(error) => warn!(
                        path = %entry.path().display(),
                        error = %error,
                        "could not remove orphaned marker"
                    ),
                }
            }
        }
        Ok(removed)
    }
}

fn open_for_write(target: &Path, append: bool) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true);
    if append {
        options.append(true);
    } else {
        options.write(true).truncate(true);
    }
    options.open(target)
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Resolve `.` and `..` segments without touching the filesystem.
///
/// A `..` that would climb above the first component is preserved, so jail
/// checks performed on the result still detect the escape.
#[must_use]
pub fn compact_path(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out.iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_config::EndpointSettings;
    use tempfile::TempDir;

    fn operations(settings: EndpointSettings) -> (TempDir, FileOperations) {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut settings = settings;
        settings.directory = dir.path().to_path_buf();
        let settings = settings.validated().expect("valid settings");
        let operations = FileOperations::new(Arc::new(settings)).expect("operations");
        (dir, operations)
    }

    fn default_operations() -> (TempDir, FileOperations) {
        operations(EndpointSettings::new("placeholder"))
    }

    #[test]
    fn store_writes_and_reports_length() {
        let (dir, ops) = default_operations();
        let target = dir.path().join("out.txt");
        let written = ops
            .store_file(&target, Some(Body::Bytes(b"hello")), None)
            .expect("store");
        assert_eq!(written, 5);
        assert_eq!(fs::read(&target).expect("read"), b"hello");
    }

    #[test]
    fn override_truncates_and_rewrites() {
        let (dir, ops) = default_operations();
        let target = dir.path().join("out.txt");
        fs::write(&target, b"previous-content").expect("seed");
        ops.store_file(&target, Some(Body::Bytes(b"new")), None)
            .expect("store");
        assert_eq!(fs::read(&target).expect("read"), b"new");
    }

    #[test]
    fn append_preserves_prior_bytes() {
        let mut settings = EndpointSettings::new("placeholder");
        settings.file_exist = CollisionPolicy::Append;
        let (dir, ops) = operations(settings);
        let target = dir.path().join("b.txt");
        fs::write(&target, b"old").expect("seed");
        ops.store_file(&target, Some(Body::Bytes(b"new")), None)
            .expect("store");
        assert_eq!(fs::read(&target).expect("read"), b"oldnew");
    }

    #[test]
    fn fail_policy_raises_without_touching_target() {
        let mut settings = EndpointSettings::new("placeholder");
        settings.file_exist = CollisionPolicy::Fail;
        let (dir, ops) = operations(settings);
        let target = dir.path().join("c.txt");
        fs::write(&target, b"keep").expect("seed");
        let err = ops
            .store_file(&target, Some(Body::Bytes(b"new")), None)
            .unwrap_err();
        assert!(matches!(err, FsOpsError::TargetExists { .. }));
        assert_eq!(fs::read(&target).expect("read"), b"keep");
    }

    #[test]
    fn ignore_policy_leaves_target_and_reports_success() {
        let mut settings = EndpointSettings::new("placeholder");
        settings.file_exist = CollisionPolicy::Ignore;
        let (dir, ops) = operations(settings);
        let target = dir.path().join("d.txt");
        fs::write(&target, b"keep").expect("seed");
        let written = ops
            .store_file(&target, Some(Body::Bytes(b"new")), None)
            .expect("ignored");
        assert_eq!(written, 0);
        assert_eq!(fs::read(&target).expect("read"), b"keep");
    }

    #[test]
    fn move_policy_relocates_prior_file() {
        let mut settings = EndpointSettings::new("placeholder");
        settings.file_exist = CollisionPolicy::Move;
        settings.move_existing =
            Some(sluice_core::NamePattern::parse("${file:name}.old").expect("pattern"));
        let (dir, ops) = operations(settings);
        let target = dir.path().join("e.txt");
        fs::write(&target, b"prior").expect("seed");
        ops.store_file(&target, Some(Body::Bytes(b"new")), None)
            .expect("store");
        assert_eq!(fs::read(&target).expect("read"), b"new");
        assert_eq!(fs::read(dir.path().join("e.txt.old")).expect("read"), b"prior");
    }

    #[test]
    fn move_policy_without_eager_delete_fails_on_occupied_destination() {
        let mut settings = EndpointSettings::new("placeholder");
        settings.file_exist = CollisionPolicy::Move;
        settings.eager_delete_target_file = false;
        settings.move_existing =
            Some(sluice_core::NamePattern::parse("${file:name}.old").expect("pattern"));
        let (dir, ops) = operations(settings);
        let target = dir.path().join("f.txt");
        fs::write(&target, b"prior").expect("seed");
        fs::write(dir.path().join("f.txt.old"), b"occupied").expect("seed");
        let err = ops
            .store_file(&target, Some(Body::Bytes(b"new")), None)
            .unwrap_err();
        assert!(matches!(err, FsOpsError::MoveExistingTargetExists { .. }));
    }

    #[test]
    fn null_body_rejected_unless_allowed() {
        let (dir, ops) = default_operations();
        let target = dir.path().join("empty.txt");
        assert!(matches!(
            ops.store_file(&target, None, None),
            Err(FsOpsError::NullBody { .. })
        ));

        let mut settings = EndpointSettings::new("placeholder");
        settings.allow_null_body = true;
        let (dir, ops) = operations(settings);
        let target = dir.path().join("empty.txt");
        let written = ops.store_file(&target, None, None).expect("store empty");
        assert_eq!(written, 0);
        assert!(target.exists());
    }

    #[test]
    fn build_directory_creates_nested_segments() {
        let (dir, ops) = default_operations();
        let nested = dir.path().join("out/sub/deeper");
        ops.build_directory(&nested).expect("build");
        assert!(nested.is_dir());
        // Second invocation is a no-op, not an error.
        ops.build_directory(&nested).expect("rebuild");
    }

    #[test]
    fn rename_falls_back_to_copy_within_filesystem_failures() {
        let (dir, ops) = default_operations();
        let from = dir.path().join("from.txt");
        let to = dir.path().join("to.txt");
        fs::write(&from, b"payload").expect("seed");
        ops.rename_file(&from, &to).expect("rename");
        assert!(!from.exists());
        assert_eq!(fs::read(&to).expect("read"), b"payload");
    }

    #[test]
    fn work_file_body_is_adopted_by_rename() {
        let (dir, ops) = default_operations();
        let work = dir.path().join("stage.tmp");
        let target = dir.path().join("final.txt");
        fs::write(&work, b"staged").expect("seed");
        let written = ops
            .store_file(&target, Some(Body::File(&work)), None)
            .expect("store");
        assert_eq!(written, 6);
        assert!(!work.exists());
        assert_eq!(fs::read(&target).expect("read"), b"staged");
    }

    #[test]
    fn checksum_sidecar_holds_hex_digest() {
        let mut settings = EndpointSettings::new("placeholder");
        settings.checksum_file_algorithm = Some(ChecksumAlgorithm::Sha256);
        let (dir, ops) = operations(settings);
        let target = dir.path().join("payload.bin");
        fs::write(&target, b"abc").expect("seed");
        let sidecar = ops
            .write_checksum_file(&target)
            .expect("sidecar")
            .expect("configured");
        let digest = fs::read_to_string(sidecar).expect("read");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn done_file_lands_next_to_target() {
        let mut settings = EndpointSettings::new("placeholder");
        settings.done_file_name =
            Some(sluice_core::DoneFilePattern::parse("${file:name}.done").expect("pattern"));
        let (dir, ops) = operations(settings);
        let target = dir.path().join("out/report.csv");
        ops.build_directory(target.parent().expect("parent")).expect("build");
        fs::write(&target, b"data").expect("seed");
        let done = ops
            .write_done_file(&target)
            .expect("done")
            .expect("configured");
        assert_eq!(done, dir.path().join("out/report.csv.done"));
        assert!(done.exists());
    }

    #[test]
    fn charset_writes_encode_content() {
        let mut settings = EndpointSettings::new("placeholder");
        settings.charset = Some("iso-8859-1".to_string());
        let (dir, ops) = operations(settings);
        let target = dir.path().join("latin.txt");
        ops.store_file(&target, Some(Body::Bytes("héllo".as_bytes())), None)
            .expect("store");
        assert_eq!(fs::read(&target).expect("read"), b"h\xe9llo");
    }

    #[test]
    fn unknown_charset_is_a_startup_error() {
        let mut settings = EndpointSettings::new("/tmp");
        settings.charset = Some("no-such-charset".to_string());
        let settings = settings.validated().expect("valid");
        assert!(matches!(
            FileOperations::new(Arc::new(settings)),
            Err(FsOpsError::Encoding { .. })
        ));
    }

    #[test]
    fn remove_matching_purges_markers() {
        let (dir, ops) = default_operations();
        fs::write(dir.path().join("a.txt.sluicelock"), b"").expect("seed");
        fs::create_dir(dir.path().join("sub")).expect("mkdir");
        fs::write(dir.path().join("sub/b.txt.sluicelock"), b"").expect("seed");
        fs::write(dir.path().join("keep.txt"), b"").expect("seed");

        let removed = ops
            .remove_matching(dir.path(), true, ".sluicelock")
            .expect("sweep");
        assert_eq!(removed, 2);
        assert!(dir.path().join("keep.txt").exists());
    }

    #[test]
    fn compact_path_resolves_relative_segments() {
        assert_eq!(
            compact_path(Path::new("/data/out/sub/../file.txt")),
            PathBuf::from("/data/out/file.txt")
        );
        assert_eq!(
            compact_path(Path::new("/data/out/./file.txt")),
            PathBuf::from("/data/out/file.txt")
        );
        assert_eq!(
            compact_path(Path::new("/data/../../etc/passwd")),
            PathBuf::from("/../etc/passwd")
        );
    }
}
