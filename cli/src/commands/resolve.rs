//! `depot resolve` command - look up the source behind an identifier.

use clap::Args;
use depot_runtime::Distribution;

#[derive(Args)]
pub struct ResolveArgs {
    /// Canonical identifier (cimd:<type>:v=<version>:<data>)
    pub cimd: String,
}

pub async fn execute(args: ResolveArgs) -> Result<(), Box<dyn std::error::Error>> {
    let distribution = depot_runtime::parse_distribution(&args.cimd)?;

    println!("Type:       {}", distribution.kind());
    println!("Source:     {}", distribution.display_form());
    println!("Identifier: {}", distribution.cimd());
    Ok(())
}
