use crate::cli::Cli;
use crate::config::{AppConfig, build_config};
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use tracing::{debug, info};
use trajflow::core::parallel::World;
use trajflow::engine::progress::ProgressReporter;
use trajflow::workflows::process::{self, ProcessOutcome};

pub fn run(args: Cli) -> Result<()> {
    let AppConfig { script, core_config } = build_config(&args)?;
    debug!(?core_config, "Configuration resolved.");

    let progress_handler = core_config.progress.then(CliProgressHandler::new);
    let ranks = core_config.ranks;
    if ranks > 1 {
        info!(ranks, "Running with {ranks} ranks.");
    }

    let results = World::spawn(ranks, |world| {
        let reporter = match &progress_handler {
            Some(handler) if world.is_master() => {
                ProgressReporter::with_callback(handler.get_callback())
            }
            _ => ProgressReporter::new(),
        };
        process::run(&core_config, &script, &world, &reporter)
    })?;

    let mut outcomes = Vec::with_capacity(results.len());
    for result in results {
        outcomes.push(result?);
    }

    match outcomes.first() {
        Some(ProcessOutcome::Completed { summary, datasets }) => {
            info!(datasets = datasets.len(), frames = summary.frames_total, "Run complete.");
            println!("{summary}");
        }
        Some(ProcessOutcome::Aborted) => println!("Input aborted; nothing was run."),
        None => {}
    }
    Ok(())
}
