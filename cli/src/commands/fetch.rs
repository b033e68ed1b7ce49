//! `depot fetch` command - convert a docker archive into the image store.

use std::sync::Arc;

use clap::Args;
use depot_core::DepotConfig;
use depot_runtime::distribution::Distribution;
use depot_runtime::{DockerArchive, DockerArchiveFetcher, DockerSaveConverter};

#[derive(Args)]
pub struct FetchArgs {
    /// Docker archive produced by `docker save` (path or file:// URL)
    pub archive: String,
}

pub async fn execute(
    args: FetchArgs,
    config: &DepotConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let distribution = DockerArchive::from_location(&super::archive_url(&args.archive)?)?;
    let cimd = distribution.cimd();

    let store = Arc::new(super::open_image_store(config)?);
    let fetcher = DockerArchiveFetcher::new(
        store,
        Arc::new(DockerSaveConverter::new()),
        config.insecure_options,
    )
    .with_debug(config.debug);

    // Conversion is blocking file I/O
    let key =
        tokio::task::spawn_blocking(move || fetcher.fetch_distribution(&distribution)).await??;

    println!("{key}");
    println!("{cimd}");
    Ok(())
}
