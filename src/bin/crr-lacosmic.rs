use anyhow::Result;
use clap::Parser;
use crr::cli::LaCosmicArgs;
use crr::config::Config;
use crr::detect::ExternalDetector;
use crr::{RunSummary, logging, pipeline};
use tracing::info;

fn main() {
    let args = LaCosmicArgs::parse();
    logging::init(args.common.verbose);

    match run(&args) {
        Ok(summary) => {
            info!(input = %summary.input.display(), %summary, "cosmic ray removal complete");
            println!("{}", summary.cleaned_path.display());
            if let Some(mask) = &summary.mask_path {
                println!("{}", mask.display());
            }
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn run(args: &LaCosmicArgs) -> Result<RunSummary> {
    let config = Config::discover(args.common.config.as_deref())?;
    let engine = config.lacosmic_engine(args.common.engine.as_deref());
    let detector = ExternalDetector::lacosmic(engine, &args.params())?;
    Ok(pipeline::run_lacosmic(args, &detector)?)
}
