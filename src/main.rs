mod cli;
mod watch;

use clap::Parser;
use cli::Cli;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = watch::run(cli.change(), cli.display.as_deref()) {
        tracing::error!(error = %e, "watch failed");
        eprintln!("focusnice: {e}");
        std::process::exit(1);
    }
}
