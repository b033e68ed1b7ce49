//! CLI command definitions and dispatch.

mod cimd;
mod fetch;
mod images;
mod resolve;
mod rmi;
mod version;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use depot_core::{DepotConfig, InsecureOptions};

/// Depot - convert docker archives into native images.
#[derive(Parser)]
#[command(name = "depot", version, about)]
pub struct Cli {
    /// Configuration file (default: ~/.depot/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output, including per-fetch conversion details
    #[arg(long, global = true)]
    pub debug: bool,

    /// Comma-separated security checks to skip (e.g. "image,tls", "all-fetch")
    #[arg(long, global = true)]
    pub insecure_options: Option<InsecureOptions>,

    /// Image store directory
    #[arg(long, global = true)]
    pub store_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Convert a docker archive and add it to the image store
    Fetch(fetch::FetchArgs),
    /// Print the canonical identifier of a docker archive
    Cimd(cimd::CimdArgs),
    /// Resolve a canonical identifier to its source
    Resolve(resolve::ResolveArgs),
    /// List stored images
    Images(images::ImagesArgs),
    /// Remove one or more stored images
    Rmi(rmi::RmiArgs),
    /// Show version information
    Version(version::VersionArgs),
}

impl Cli {
    /// Effective configuration: file, then `DEPOT_*` variables, then flags.
    pub fn load_config(&self) -> depot_core::Result<DepotConfig> {
        let path = self.config.clone().or_else(default_config_path);
        let mut config = DepotConfig::load_or_default(path.as_deref())?.from_env()?;

        if let Some(dir) = &self.store_dir {
            config.store_dir = dir.clone();
        }
        if let Some(options) = self.insecure_options {
            config.insecure_options = options;
        }
        config.debug |= self.debug;
        Ok(config)
    }

    /// Log filter used when `RUST_LOG` is not set.
    pub fn default_log_filter(&self) -> &'static str {
        if self.debug {
            return "debug";
        }
        match self.load_config() {
            Ok(config) if config.debug => "debug",
            Ok(config) => config.log_level.as_filter(),
            Err(_) => "warn",
        }
    }
}

/// Default configuration file (~/.depot/config.yaml).
fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".depot").join("config.yaml"))
}

/// Open the image store named by `config`.
pub(crate) fn open_image_store(
    config: &DepotConfig,
) -> Result<depot_runtime::ImageStore, Box<dyn std::error::Error>> {
    let store = depot_runtime::ImageStore::new(&config.store_dir)?;
    Ok(store)
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = cli.load_config()?;
    tracing::debug!(
        store_dir = %config.store_dir.display(),
        insecure = %config.insecure_options,
        "Loaded configuration"
    );

    match cli.command {
        Command::Fetch(args) => fetch::execute(args, &config).await,
        Command::Cimd(args) => cimd::execute(args).await,
        Command::Resolve(args) => resolve::execute(args).await,
        Command::Images(args) => images::execute(args, &config).await,
        Command::Rmi(args) => rmi::execute(args, &config).await,
        Command::Version(args) => version::execute(args).await,
    }
}

/// Turn an archive path or `file://` URL into an absolute `file://` URL.
pub(crate) fn archive_url(location: &str) -> Result<String, Box<dyn std::error::Error>> {
    let path = depot_runtime::image::resolve_location(location)?;
    let url = url::Url::from_file_path(&path)
        .map_err(|_| format!("Cannot express {} as a file URL", path.display()))?;
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "depot",
            "images",
            "--store-dir",
            "/tmp/depot-store",
            "--insecure-options",
            "image,tls",
            "--debug",
        ])
        .unwrap();
        assert_eq!(cli.store_dir, Some(PathBuf::from("/tmp/depot-store")));
        assert_eq!(
            cli.insecure_options.unwrap().to_string(),
            "image,tls"
        );
        assert!(cli.debug);
    }

    #[test]
    fn test_bad_insecure_options_rejected() {
        assert!(Cli::try_parse_from(["depot", "--insecure-options", "bogus", "images"]).is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config_path = tmp.path().join("config.yaml");
        std::fs::write(&config_path, "store_dir: /from/file\nlog_level: info\n").unwrap();

        let cli = Cli::try_parse_from([
            "depot",
            "--config",
            config_path.to_str().unwrap(),
            "--store-dir",
            "/from/flag",
            "images",
        ])
        .unwrap();
        let config = cli.load_config().unwrap();
        assert_eq!(config.store_dir, PathBuf::from("/from/flag"));
        assert_eq!(config.log_level, depot_core::LogLevel::Info);
    }

    #[test]
    fn test_archive_url_from_path() {
        assert_eq!(
            archive_url("/full/path/to/busybox.tar").unwrap(),
            "file:///full/path/to/busybox.tar"
        );
        assert_eq!(
            archive_url("file:///full/path/to/busybox.tar").unwrap(),
            "file:///full/path/to/busybox.tar"
        );
    }

    #[test]
    fn test_archive_url_rejects_remote() {
        assert!(archive_url("https://example.com/busybox.tar").is_err());
    }
}
