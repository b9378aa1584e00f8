//! `paperdrop run`: the long-running watcher.

use anyhow::{Context, Result};

use paperdrop_core::Config;
use paperdrop_daemon::start_blocking;

pub fn run() -> Result<()> {
    let config = Config::from_env().context("invalid configuration")?;
    start_blocking(config).context("paperdrop exited with error")
}
