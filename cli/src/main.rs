//! ctx7 binary
//!
//! Command-line interface for supervising the local Context7 helper.

use clap::Parser;
use cli::Cli;
use ctx7_core::utils::init_tracing;
use tracing::debug;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(&cli.log_level) {
        eprintln!("warning: {}", e);
    }

    let mut stdout = std::io::stdout();
    if let Err(e) = cli::run(&cli, &mut stdout).await {
        debug!("Command failed with {}", e.code());
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
