//! Run command - activate an archive and dispatch into it

use crate::bootstrap::{Activator, LaunchOutcome};
use crate::cli::args::RunArgs;
use crate::error::ZipappsResult;

/// Execute the run command, returning the exit code to terminate with
pub async fn execute(args: RunArgs) -> ZipappsResult<i32> {
    let outcome = Activator::from_env().launch(&args.archive, args.args).await?;
    Ok(match outcome {
        LaunchOutcome::Activated(pythonpath) => {
            println!("{}", pythonpath.to_string_lossy());
            0
        }
        LaunchOutcome::Exited(code) => code,
    })
}
