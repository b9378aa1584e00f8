//! `paperdrop upload`: push one file through the same executor the daemon
//! uses, once.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use paperdrop_core::{Config, StablePath};
use paperdrop_daemon::fs::{FileSystem, OsFileSystem};
use paperdrop_daemon::http::UreqClient;
use paperdrop_daemon::{DocumentUploader, Upload};

/// Arguments for `paperdrop upload`.
#[derive(Args, Debug)]
pub struct UploadArgs {
    /// File to upload.
    pub file: PathBuf,

    /// Keep the local file after a successful upload.
    #[arg(long)]
    pub keep: bool,
}

impl UploadArgs {
    pub fn run(self) -> Result<()> {
        let config = Config::from_env().context("invalid configuration")?;
        let fs: Arc<dyn FileSystem> = Arc::new(OsFileSystem);
        let uploader =
            DocumentUploader::from_config(fs.clone(), Arc::new(UreqClient::new()), &config);

        if !config.allow_list.allows(&self.file) {
            eprintln!(
                "{} {} is not covered by the file whitelist; uploading anyway",
                "warning:".yellow().bold(),
                self.file.display(),
            );
        }

        let path = StablePath(self.file);
        uploader
            .upload(&path)
            .with_context(|| format!("failed to upload {path} to {}", uploader.endpoint()))?;
        println!("{} {path}", "uploaded".green().bold());

        if !self.keep {
            fs.remove(path.as_path())
                .with_context(|| format!("uploaded but could not delete {path}"))?;
            println!("{} {path}", "deleted".bright_black());
        }
        Ok(())
    }
}
