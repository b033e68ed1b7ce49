//! `depot cimd` command.

use clap::Args;
use depot_runtime::distribution::Distribution;
use depot_runtime::DockerArchive;

#[derive(Args)]
pub struct CimdArgs {
    /// Docker archive location (path or file:// URL)
    pub location: String,
}

pub async fn execute(args: CimdArgs) -> Result<(), Box<dyn std::error::Error>> {
    let distribution = DockerArchive::from_location(&super::archive_url(&args.location)?)?;
    println!("{}", distribution.cimd());
    Ok(())
}
