use clap::Parser;
use proxy_log::{errors, info};

use evhttpd::config::{Cli, Config};
use evhttpd::error::Result;
use evhttpd::reactor::Reactor;
use evhttpd::worker::WorkerPool;

fn main() {
    if let Err(e) = run() {
        errors!("{e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_cli(cli)?;

    // Not wired into request handling; starting it here only proves the
    // pool is independently usable as an execution backend.
    let _workers = (config.workers > 0).then(|| {
        info!("starting optional worker pool with {} thread(s)", config.workers);
        WorkerPool::new(config.workers)
    });

    let mut reactor = Reactor::new(&config)?;
    reactor.run()
}
