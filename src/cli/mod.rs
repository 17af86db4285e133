//! Command line interface

pub mod args;
pub mod commands;

pub use args::{ActivateArgs, BuildArgs, Cli, Commands, FreezeArgs, RunArgs};
