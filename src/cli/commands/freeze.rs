//! Freeze command - pin pip arguments to exact versions

use crate::builder::FreezeTool;
use crate::cli::args::FreezeArgs;
use crate::config::schema::default_python;
use crate::error::ZipappsResult;

/// Execute the freeze command
pub async fn execute(args: FreezeArgs) -> ZipappsResult<()> {
    let python = args.python.unwrap_or_else(default_python);
    FreezeTool::new(python)
        .freeze_to(&args.pip_args, &args.output)
        .await?;
    Ok(())
}
