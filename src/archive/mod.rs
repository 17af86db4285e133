//! Archive format
//!
//! An archive is a zip file, optionally prefixed with a shebang line, that
//! Python can place on its import path. Besides the staged tree it carries:
//!
//! | Member | Purpose |
//! |--------|---------|
//! | `__main__.py` | fixed stub handing `python app.pyz` to the launcher |
//! | `zipapps_bootstrap.json` | run-time record read by the activator |
//! | `zipapps_config.json` | build configuration for later reuse |
//! | `_zip_time_<ts>` | generation timestamp, compared against the cache |
//! | `_zipapps_build_id_<hash>` | build fingerprint for build-skip |

pub mod fingerprint;
pub mod layout;
pub mod reader;
pub mod writer;

pub use fingerprint::BuildFingerprint;
pub use reader::{archive_has_member, ArchiveReader};
pub use writer::{seal, SealStats};
