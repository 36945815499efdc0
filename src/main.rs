use std::env;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use env_logger::Builder;
use log::{self, LevelFilter, error, info};

use basecall_pipelines::cli::parse;
use basecall_pipelines::config::defs::PipelineError;
use basecall_pipelines::pipelines::basecall_nanopore;


#[tokio::main]
async fn main() -> Result<()> {
    let run_start = Instant::now();

    let args = parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    println!("\n-------------\n Basecall Pipelines\n-------------\n");

    let dir = env::current_dir()?;
    info!("The current directory is {:?}\n", dir);

    if let Err(e) = basecall_run(args).await {
        error!("Pipeline failed: {} at {} milliseconds.", e, run_start.elapsed().as_millis());
        std::process::exit(1);
    }

    println!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());
    Ok(())
}


async fn basecall_run(args: basecall_pipelines::Arguments) -> Result<(), PipelineError> {
    let run_config = Arc::new(basecall_nanopore::build_run_config(args)?);
    info!("Input folder: {}", run_config.input_dir.display());
    info!("Output folder: {}", run_config.out_dir.display());

    let summary = basecall_nanopore::run(run_config).await?;
    for (stage, outcome) in &summary.stages {
        info!("{}: {:?}", stage.label(), outcome);
    }
    info!("{} samples in final output", summary.samples.len());
    Ok(())
}
