//! downscalerd — the ASG downscaler daemon.
//!
//! Scales an AWS autoscaling group to zero outside working hours and back
//! to its remembered size when the working day starts. Fatal errors exit
//! non-zero; the daemon expects a supervisor (a Kubernetes Deployment, a
//! systemd unit) to restart it.
//!
//! # Usage
//!
//! ```text
//! downscalerd --autodetect --start 8 --end 19 --interval 60s
//! downscalerd --asg-name eks-workers --region eu-west-1 --consultant-mode
//! ```

use clap::Parser;
use tracing::error;

use downscaler_core::config::FileConfig;

mod cli;
mod daemon;

use cli::{Cli, Settings};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let file = match cli.config.as_deref().map(FileConfig::from_file).transpose() {
        Ok(file) => file.unwrap_or_default(),
        Err(e) => {
            init_tracing(cli.verbose);
            error!(error = %e, "invalid config file");
            std::process::exit(2);
        }
    };

    init_tracing(cli.verbose_with(&file));

    let settings = match Settings::resolve(cli, file) {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "invalid params");
            std::process::exit(2);
        }
    };

    if let Err(e) = daemon::run(settings).await {
        error!(error = %format!("{e:#}"), "fatal error, exiting");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "info,downscalerd=debug,downscaler_core=debug,downscaler_aws=debug,downscaler_state=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();
}
