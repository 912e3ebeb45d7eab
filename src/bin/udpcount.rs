//
// Counts UDP packets and bytes arriving on a port and prints the rates once a second.
//
use std::process;

use structopt::StructOpt;
use tracing::error;
use tracing_subscriber::EnvFilter;

use udpcount::{Backend, Capture, Config};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Usage errors exit with status 1, --help with 0.
    let config = match Config::from_iter_safe(std::env::args_os()) {
        Ok(config) => config,
        Err(err) => err.exit(),
    };

    if let Err(err) = config.validate() {
        error!("{}", err);
        process::exit(1);
    }

    let r = Backend::start(&config).and_then(Capture::run);
    if let Err(err) = r {
        error!("{}", err);
        process::exit(1);
    }
}
