#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]

//! Domain model shared across the Sluice workspace.
//!
//! Carries the value type describing a discovered filesystem entry, the
//! key-set repository abstraction used for in-progress and idempotent
//! tracking, and the `${file:*}` naming patterns evaluated when files are
//! renamed, staged, or marked done.

pub mod error;
pub mod model;
pub mod naming;
pub mod repository;

pub use error::{CoreError, CoreResult};
pub use model::SourceFile;
pub use naming::{DoneFilePattern, NamePattern};
pub use repository::{FileRepository, MemoryRepository, Repository};
