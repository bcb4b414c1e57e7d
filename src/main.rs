use anyhow::Result;
use clap::Parser;
use tracing::error;

use placemap::analysis::{analyze_location_history, print_analysis_results};
use placemap::utils::{setup_logging, validate_args};
use placemap::Args;

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.verbose);

    validate_args(&args)?;

    match analyze_location_history(&args) {
        Ok(result) => {
            print_analysis_results(&result, &args);
            Ok(())
        }
        Err(e) => {
            error!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
