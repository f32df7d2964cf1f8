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

//! Endpoint configuration for the Sluice file transfer engine.
//!
//! An [`EndpointSettings`] aggregate is built once, validated with
//! [`EndpointSettings::validated`], and treated as immutable afterwards.
//! Validation failures stop the endpoint from starting; nothing is checked
//! lazily at poll or lock time.

pub mod error;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use model::{
    ChecksumAlgorithm, CollisionPolicy, EndpointSettings, ReadLockKind, SortBy,
};
pub use validate::{ant_filter, ext_list, name_regex};
