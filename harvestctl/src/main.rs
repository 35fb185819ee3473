use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = harvestctl::Cli::parse();
    init_tracing(cli.verbose);
    if let Err(err) = harvestctl::run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
