//! Build command - seal includes and dependencies into an archive

use crate::builder::{BuildOutcome, Builder, FreezeTool};
use crate::cli::args::BuildArgs;
use crate::config::ConfigManager;
use crate::error::ZipappsResult;
use crate::ui::{TaskSpinner, UiContext};
use console::style;
use tracing::debug;

/// Execute the build command
pub async fn execute(args: BuildArgs) -> ZipappsResult<()> {
    let base = match args.load_config {
        Some(ref path) => {
            debug!("Loading build configuration from {}", path.display());
            Some(ConfigManager::with_path(path.clone()).load().await?)
        }
        None => None,
    };
    let config = args.to_config(base);

    if let Some(ref output) = args.freeze_reqs {
        FreezeTool::new(config.python.clone())
            .freeze_to(&config.pip_args, output)
            .await?;
        return Ok(());
    }

    if let Some(ref path) = args.dump_config {
        return ConfigManager::with_path(path.clone()).dump(&config).await;
    }

    let builder = Builder::new(config);
    builder.validate()?;

    let mut spinner = TaskSpinner::new(&UiContext::detect());
    spinner.start(&format!("Building {}", builder.config().output));

    match builder.build().await {
        Ok(BuildOutcome::Built { path, stats }) => {
            spinner.stop(&format!(
                "Successfully built {} ({} files)",
                style(path.display()).cyan(),
                stats.files
            ));
            Ok(())
        }
        Ok(BuildOutcome::Skipped(path)) => {
            spinner.stop(&format!(
                "{} is up to date, build skipped",
                style(path.display()).cyan()
            ));
            Ok(())
        }
        Err(e) => {
            spinner.stop_error("Build failed");
            Err(e)
        }
    }
}
