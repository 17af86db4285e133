//! Terminal feedback for the builder
//!
//! Everything is drawn on stderr: archive output on stdout must stay clean
//! (`--dump-config -`, `freeze -`, `activate`). Spinners fall back to plain
//! lines when stderr is not a terminal or a CI environment is detected.

mod context;
mod progress;

pub use context::UiContext;
pub use progress::TaskSpinner;
