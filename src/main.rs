//! Entry point for the daymet-proc application.
//! Handles CLI parsing, configuration validation and runs the requested operation over all regions.

use clap::Parser;
use daymet_proc::cli::Args;
use daymet_proc::config::ProcessingConfig;
use daymet_proc::dispatch::{Dispatcher, RunReport};
use daymet_proc::errors::Result;
use daymet_proc::logging;
use daymet_proc::parallel::ParallelInfo;
use std::process::ExitCode;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(args.verbose);

    println!(
        r#"
------------------------------------------------------------------
                         daymet-proc
          combine | clip | aggregate Daymet per region
------------------------------------------------------------------
"#
    );

    match run(args).await {
        Ok(report) => {
            report.print();
            if report.has_failures() {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!("{e}");
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<RunReport> {
    let config = ProcessingConfig::from_path(&args.config)?;
    let mut plan = config.validate(args.operation)?;
    if let Some(threads) = args.threads {
        plan.parallel.num_threads = Some(threads);
    }
    plan.parallel.setup_global_pool()?;
    if args.parallel_info {
        ParallelInfo::gather(&plan.parallel).print_info();
    }

    println!(
        "🚀 Running {} on {} ({} {}) -> {}",
        plan.operation,
        plan.data_dir.display(),
        plan.version,
        plan.output_format,
        plan.output_dir.display()
    );
    Dispatcher::new(plan).run().await
}
