//! zipapps - Package Python code and its dependencies into one archive
//!
//! The builder stages includes and pip requirements, records run-time
//! parameters and seals everything into a zip that Python can import from.
//! The bootstrap side activates such archives: it extracts selected members
//! to a cache, installs deferred dependencies once, assembles the search
//! path and dispatches to the entry point.

pub mod archive;
pub mod bootstrap;
pub mod builder;
pub mod cli;
pub mod config;
pub mod error;
pub mod paths;
pub mod toolchain;
pub mod ui;

pub use error::{ZipappsError, ZipappsResult};
