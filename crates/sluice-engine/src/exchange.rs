//! The unit of work handed to the processing callback.
//!
//! A [`Delivery`] carries one admitted [`SourceFile`], the derived headers,
//! and (unless retrieval is skipped) the file body. The callback signals
//! success or failure through its result; the dispatcher turns that into the
//! commit or rollback path of the completion hook.

use std::collections::HashMap;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use sluice_core::SourceFile;
use uuid::Uuid;

/// Header keys populated on every delivery.
pub mod headers {
    /// Relative name of the file, including sub-directories.
    pub const FILE_NAME: &str = "file.name";
    /// Final path segment.
    pub const FILE_NAME_ONLY: &str = "file.name_only";
    /// Parent directory of the absolute path.
    pub const FILE_PARENT: &str = "file.parent";
    /// Absolute path.
    pub const FILE_ABSOLUTE_PATH: &str = "file.absolute_path";
    /// Path relative to the configured root.
    pub const FILE_RELATIVE_PATH: &str = "file.relative_path";
    /// Byte length at admission or after the read lock was granted.
    pub const FILE_LENGTH: &str = "file.length";
    /// Last-modified timestamp in milliseconds since the Unix epoch.
    pub const FILE_LAST_MODIFIED: &str = "file.last_modified";
}

/// One admitted file on its way through the consume lifecycle.
#[derive(Debug, Clone)]
pub struct Delivery {
    id: Uuid,
    file: SourceFile,
    headers: HashMap<String, String>,
    body: Option<Vec<u8>>,
    batch_index: usize,
    batch_size: usize,
}

impl Delivery {
    /// Wrap an admitted file, deriving its headers.
    #[must_use]
    pub fn new(file: SourceFile) -> Self {
        let mut delivery = Self {
            id: Uuid::new_v4(),
            file,
            headers: HashMap::new(),
            body: None,
            batch_index: 0,
            batch_size: 0,
        };
        delivery.refresh_headers();
        delivery
    }

    /// Unique identifier of this delivery.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// The file being delivered.
    #[must_use]
    pub const fn file(&self) -> &SourceFile {
        &self.file
    }

    /// Mutable access to the file; used by pre-move and metadata refresh.
    pub const fn file_mut(&mut self) -> &mut SourceFile {
        &mut self.file
    }

    /// Derived headers.
    #[must_use]
    pub const fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Look up a single header.
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// The retrieved body, when retrieval ran.
    #[must_use]
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Attach the retrieved body.
    pub fn set_body(&mut self, body: Option<Vec<u8>>) {
        self.body = body;
    }

    /// Take ownership of the body, leaving `None` behind.
    pub fn take_body(&mut self) -> Option<Vec<u8>> {
        self.body.take()
    }

    /// Zero-based position of this delivery within its poll batch.
    #[must_use]
    pub const fn batch_index(&self) -> usize {
        self.batch_index
    }

    /// Number of deliveries in this poll batch.
    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Whether this is the final delivery of its batch.
    #[must_use]
    pub const fn batch_complete(&self) -> bool {
        self.batch_size > 0 && self.batch_index == self.batch_size - 1
    }

    pub(crate) const fn set_batch(&mut self, index: usize, size: usize) {
        self.batch_index = index;
        self.batch_size = size;
    }

    /// Rebuild the derived headers from the current file state.
    ///
    /// Called after the read lock is granted, since size and timestamp may
    /// have moved while the lock was being acquired.
    pub fn refresh_headers(&mut self) {
        let file = &self.file;
        self.headers
            .insert(headers::FILE_NAME.to_string(), file.file_name());
        self.headers.insert(
            headers::FILE_NAME_ONLY.to_string(),
            file.file_name_only().to_string(),
        );
        self.headers.insert(
            headers::FILE_PARENT.to_string(),
            file.absolute_path()
                .parent()
                .map(|parent| parent.display().to_string())
                .unwrap_or_default(),
        );
        self.headers.insert(
            headers::FILE_ABSOLUTE_PATH.to_string(),
            file.absolute_path().display().to_string(),
        );
        self.headers.insert(
            headers::FILE_RELATIVE_PATH.to_string(),
            file.relative_path().display().to_string(),
        );
        self.headers.insert(
            headers::FILE_LENGTH.to_string(),
            file.file_length().to_string(),
        );
        let modified_millis = file
            .last_modified()
            .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
            .map(|duration| duration.as_millis().to_string())
            .unwrap_or_default();
        self.headers
            .insert(headers::FILE_LAST_MODIFIED.to_string(), modified_millis);
    }
}

/// Callback invoked once per admitted, lock-acquired delivery.
///
/// An `Ok` return commits the delivery (post-action and tracker release); an
/// `Err` return rolls it back.
#[async_trait]
pub trait DeliveryProcessor: Send + Sync {
    /// Process one delivery.
    async fn process(&self, delivery: &mut Delivery) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Delivery {
        Delivery::new(SourceFile::new(
            "/data/in",
            "/data/in/sub/report.csv",
            false,
            42,
            Some(UNIX_EPOCH + std::time::Duration::from_millis(1_700_000_000_000)),
        ))
    }

    #[test]
    fn headers_are_derived_from_the_file() {
        let delivery = sample();
        assert_eq!(delivery.header(headers::FILE_NAME), Some("sub/report.csv"));
        assert_eq!(delivery.header(headers::FILE_NAME_ONLY), Some("report.csv"));
        assert_eq!(delivery.header(headers::FILE_LENGTH), Some("42"));
        assert_eq!(
            delivery.header(headers::FILE_PARENT),
            Some("/data/in/sub")
        );
        assert_eq!(
            delivery.header(headers::FILE_LAST_MODIFIED),
            Some("1700000000000")
        );
    }

    #[test]
    fn refresh_follows_a_relocation() {
        let mut delivery = sample();
        delivery.file_mut().relocate("/data/in/.staging/report.csv");
        delivery.refresh_headers();
        assert_eq!(
            delivery.header(headers::FILE_ABSOLUTE_PATH),
            Some("/data/in/.staging/report.csv")
        );
    }

    #[test]
    fn batch_properties_mark_the_last_delivery() {
        let mut delivery = sample();
        delivery.set_batch(2, 3);
        assert_eq!(delivery.batch_index(), 2);
        assert!(delivery.batch_complete());
    }
}
