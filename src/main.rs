use bedrock_updater::cli::Args;
use bedrock_updater::config::UpdaterConfig;
use bedrock_updater::error::UpdateError;
use bedrock_updater::install::run_cli;
use bedrock_updater::logging;
use log::{error, info};

fn main() {
    let args = Args::parse_args();

    if args.dump_config {
        match UpdaterConfig::default_toml() {
            Ok(text) => print!("{text}"),
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(e.exit_code());
            }
        }
        return;
    }

    let (config, source) = match UpdaterConfig::discover(args.config.as_deref(), &args.dir) {
        Ok(found) => found,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(e.exit_code());
        }
    };

    logging::init(&config.logging, &args.dir);
    match source {
        Some(path) => info!("Using config from: {}", path.display()),
        None => info!("No configuration file found, using built-in defaults"),
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("FATAL: Failed to create Tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(run_cli(&args, config)) {
        error!("{e:#}");
        std::process::exit(exit_code(&e));
    }
}

/// Failure kind → process exit status; anything unexpected is 1.
fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<UpdateError>()
        .map_or(1, UpdateError::exit_code)
}
