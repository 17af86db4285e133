//! CLI command implementations

pub mod activate;
pub mod build;
pub mod freeze;
pub mod run;

pub use activate::execute as activate;
pub use build::execute as build;
pub use freeze::execute as freeze;
pub use run::execute as run;
