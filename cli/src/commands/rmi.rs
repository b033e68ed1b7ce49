//! `depot rmi` command - remove one or more stored images.

use clap::Args;
use depot_core::DepotConfig;

#[derive(Args)]
pub struct RmiArgs {
    /// Image keys to remove
    #[arg(required = true)]
    pub keys: Vec<String>,

    /// Ignore keys that are not in the store
    #[arg(short, long)]
    pub force: bool,
}

pub async fn execute(args: RmiArgs, config: &DepotConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = super::open_image_store(config)?;

    let mut errors: Vec<String> = Vec::new();
    for key in &args.keys {
        if args.force && store.get(key).is_none() {
            continue;
        }
        match store.remove(key) {
            Ok(()) => println!("Removed: {key}"),
            Err(e) => errors.push(format!("{key}: {e}")),
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(format!("Failed to remove image(s):\n{}", errors.join("\n")).into())
    }
}
