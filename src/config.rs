//! CLI argument parsing and startup validation.
//!
//! Grounded on the teacher's `config_handler`/`config` split (a raw parsed
//! struct plus a validation pass) but swaps the YAML/multi-vhost shape for
//! the five flat arguments this server actually takes, parsed with `clap`'s
//! derive macros the way the rest of the crate pack leans on `clap` for
//! binary entry points.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use clap::Parser;

use crate::error::{Result, ServerError};

/// Default deadline multiplier from the data model: a connection times out
/// after three missed timer intervals.
pub const DEADLINE_MULTIPLIER: u32 = 3;

#[derive(Parser, Debug)]
#[command(name = "evhttpd", about = "A single-threaded, event-driven static file server")]
pub struct Cli {
    /// IPv4 address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    pub bind: Ipv4Addr,

    /// TCP port to listen on.
    #[arg(long, default_value_t = 443)]
    pub port: u16,

    /// Listen backlog passed to `listen(2)`.
    #[arg(long, default_value_t = 5)]
    pub backlog: u32,

    /// Multiplexer event-buffer capacity hint (not the expiry heap, which
    /// has its own fixed default per the startup sequence).
    #[arg(long, default_value_t = 5)]
    pub capacity: usize,

    /// Document root directory served to clients.
    #[arg(long)]
    pub root: PathBuf,

    /// Seconds between expiry sweeps. Connections time out after three
    /// missed intervals. Lowered in tests to avoid multi-second sleeps.
    #[arg(long, default_value_t = 5)]
    pub timer_interval: u64,

    /// Start the optional worker pool alongside the reactor. Not wired into
    /// request handling; this only proves the pool starts and shuts down
    /// independently.
    #[arg(long, default_value_t = 0)]
    pub workers: usize,
}

pub struct Config {
    pub bind: Ipv4Addr,
    pub port: u16,
    pub backlog: u32,
    pub capacity: usize,
    pub root: PathBuf,
    pub timer_interval: std::time::Duration,
    pub workers: usize,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let metadata = std::fs::metadata(&cli.root)
            .map_err(|_| ServerError::InvalidRoot(format!("{} does not exist", cli.root.display())))?;
        if !metadata.is_dir() {
            return Err(ServerError::InvalidRoot(format!("{} is not a directory", cli.root.display())));
        }

        Ok(Config {
            bind: cli.bind,
            port: cli.port,
            backlog: cli.backlog,
            capacity: cli.capacity,
            root: cli.root,
            timer_interval: std::time::Duration::from_secs(cli.timer_interval),
            workers: cli.workers,
        })
    }

    pub fn deadline(&self) -> std::time::Duration {
        self.timer_interval * DEADLINE_MULTIPLIER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cli(root: PathBuf) -> Cli {
        Cli {
            bind: Ipv4Addr::LOCALHOST,
            port: 8080,
            backlog: 5,
            capacity: 5,
            root,
            timer_interval: 5,
            workers: 0,
        }
    }

    #[test]
    fn rejects_missing_root() {
        let cli = base_cli(PathBuf::from("/does/not/exist/hopefully"));
        assert!(Config::from_cli(cli).is_err());
    }

    #[test]
    fn rejects_file_as_root() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let cli = base_cli(tmp.path().to_path_buf());
        assert!(Config::from_cli(cli).is_err());
    }

    #[test]
    fn accepts_real_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cli = base_cli(dir.path().to_path_buf());
        let config = Config::from_cli(cli).unwrap();
        assert_eq!(config.deadline(), std::time::Duration::from_secs(15));
    }
}
