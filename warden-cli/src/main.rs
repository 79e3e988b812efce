use clap::Parser;

use warden_cli::cli::Cli;
use warden_cli::{commands, init_subscriber_with_config, TracingConfig};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_subscriber_with_config(TracingConfig {
        format: cli.log_format,
        ..TracingConfig::default().with_verbosity(cli.verbose)
    });

    match commands::run(cli).await {
        Ok(response) => {
            if !response.output.is_empty() {
                println!("{}", response.output);
            }
            std::process::exit(response.exit_code);
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Command failed");
            eprintln!("{}", e);
            std::process::exit(e.exit_code());
        }
    }
}
