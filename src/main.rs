use clap::Parser;
use tracing::{error, info};

use gcb_relay::config::Config;
use gcb_relay::{env_vars, logging, App};

#[derive(Parser)]
#[command(name = "gcb-relay")]
#[command(about = "Relay Cloud Build step progress to a GitHub commit status")]
#[command(version)]
#[command(after_help = env_vars::help_text())]
pub struct Cli {
    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Build manifest (cloudbuild.yaml) used to name steps
    #[arg(short, long)]
    manifest: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = relay(cli).await;
    std::process::exit(code);
}

/// Run the relay and return the process exit code.
async fn relay(cli: Cli) -> i32 {
    // Load configuration first (needed for logging setup)
    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return 1;
        }
    };
    if let Some(manifest) = cli.manifest {
        config.build.manifest = Some(manifest);
    }

    let _logging_handle = match logging::init_logging(&config, cli.debug) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return 1;
        }
    };

    ignore_sigterm();

    let result = match App::new(config) {
        Ok(app) => app.run().await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => {
            info!("Done");
            0
        }
        Err(e) => {
            error!(error = %e, "Relay failed");
            e.exit_code()
        }
    }
}

/// Cloud Build sends SIGTERM to every container when the build ends; the relay
/// keeps going so it can publish the final status.
#[cfg(unix)]
fn ignore_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::spawn(async move {
                while sigterm.recv().await.is_some() {
                    info!("Ignoring SIGTERM until the final status is published");
                }
            });
        }
        Err(e) => error!(error = %e, "Failed to install SIGTERM handler"),
    }
}

#[cfg(not(unix))]
fn ignore_sigterm() {}
