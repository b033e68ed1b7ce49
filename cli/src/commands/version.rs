//! `depot version` command.

use clap::Args;

#[derive(Args)]
pub struct VersionArgs;

pub async fn execute(_args: VersionArgs) -> Result<(), Box<dyn std::error::Error>> {
    println!("depot version {}", depot_core::VERSION);
    println!("runtime version {}", depot_runtime::VERSION);
    Ok(())
}
