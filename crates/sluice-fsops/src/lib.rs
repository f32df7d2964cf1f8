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

//! Filesystem operations and the producer (writer) side of the engine.
//!
//! [`FileOperations`] provides the platform primitives: existence checks,
//! deletes, renames with a copy fallback, recursive directory creation, and
//! byte/character writes with collision handling. [`FileProducer`] builds on
//! them: it computes and jails the target name, stages through a temporary
//! name, and emits done-marker and checksum sidecars.

pub mod error;
pub mod operations;
pub mod producer;

pub use error::{FsOpsError, FsOpsResult};
pub use operations::{Body, FileOperations, compact_path};
pub use producer::FileProducer;
