use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;

use loadr_core::config::{self, RunnerConfig};
use loadr_core::results;
use loadr_core::runner::{self, CancelFlag, ModeRun};

use crate::cli::Cli;
use crate::output;
use crate::run_error::RunError;

pub async fn run(args: Cli) -> Result<(), RunError> {
    let config = config::load(&args.config_file)
        .map_err(|err| RunError::InvalidInput(anyhow::Error::new(err)))?;

    let cancel = Arc::new(CancelFlag::new());
    {
        // Operator cancellation: stop scheduling, abort outstanding work, and
        // still emit a report from whatever completed.
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received; cancelling outstanding work");
                cancel.cancel();
            }
        });
    }

    let runs = runner::run(&config, cancel)
        .await
        .map_err(|err| RunError::RuntimeError(anyhow::Error::new(err)))?;

    std::fs::create_dir_all(&config.output_path)
        .with_context(|| {
            format!(
                "failed to create output dir: {}",
                config.output_path.display()
            )
        })
        .map_err(RunError::RuntimeError)?;

    for mode_run in &runs {
        let path = result_path(&config, mode_run);
        results::write_result_file(&path, &mode_run.lines)
            .map_err(|err| RunError::RuntimeError(anyhow::Error::new(err)))?;
        tracing::info!(
            path = %path.display(),
            lines = mode_run.lines.len(),
            "wrote result file"
        );

        print!("{}", output::render(mode_run));
    }
    std::io::stdout().flush().ok();

    Ok(())
}

fn result_path(config: &RunnerConfig, run: &ModeRun) -> PathBuf {
    let name = match &run.label {
        Some(label) => format!("{}_{label}.txt", config.result_file),
        None => format!("{}.txt", config.result_file),
    };
    config.output_path.join(name)
}
