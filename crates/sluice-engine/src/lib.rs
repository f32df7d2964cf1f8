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

//! The polling consumer side of the Sluice file transfer engine.
//!
//! A [`PollingConsumer`] walks a root directory, admits candidates through
//! the filter chain and tracking repositories, acquires a read lock per
//! candidate, and drives each admitted file through the
//! begin → retrieve → process → commit-or-rollback lifecycle, dispatching to
//! a [`DeliveryProcessor`] callback.

pub mod consumer;
pub mod error;
pub mod exchange;
pub mod filter;
pub mod lock;
mod scanner;
mod strategy;

pub use consumer::{ConsumerBuilder, PollingConsumer};
pub use error::{EngineError, EngineResult};
pub use exchange::{Delivery, DeliveryProcessor, headers};
pub use filter::FileFilter;
pub use lock::{MARKER_SUFFIX, PROBE_SUFFIX, ReadLockStrategy};
