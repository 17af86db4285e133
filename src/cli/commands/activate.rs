//! Activate command - prepare archives for import without running them

use crate::bootstrap::Activator;
use crate::cli::args::ActivateArgs;
use crate::error::{ZipappsError, ZipappsResult};

/// Execute the activate command
///
/// Prints the PYTHONPATH that makes the listed archives importable. The
/// first archive's record decides the strict search path setting.
pub async fn execute(args: ActivateArgs) -> ZipappsResult<()> {
    let activator = Activator::from_env();
    let activations = activator.activate_list(&args.archives.join(",")).await?;

    let (primary, others) = activations
        .split_first()
        .ok_or_else(|| ZipappsError::User("no archives to activate".to_string()))?;
    let path = activator.search_path(primary, others);

    println!("{}", path.to_env()?.to_string_lossy());
    Ok(())
}
