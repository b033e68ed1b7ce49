//! `depot images` command.

use clap::Args;
use depot_core::DepotConfig;

use crate::output;

const HEADERS: [&str; 5] = ["KEY", "SIZE", "IMPORTED", "LAST USED", "LATEST"];

#[derive(Args)]
pub struct ImagesArgs {
    /// Only show image keys (one per line)
    #[arg(short, long)]
    pub quiet: bool,
}

pub async fn execute(
    args: ImagesArgs,
    config: &DepotConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    if !config.store_dir.exists() {
        if !args.quiet {
            println!("{}", output::new_table(&HEADERS));
        }
        return Ok(());
    }

    let store = super::open_image_store(config)?;
    let images = store.list();

    // --quiet: print only keys
    if args.quiet {
        for image in &images {
            println!("{}", image.key);
        }
        return Ok(());
    }

    let mut table = output::new_table(&HEADERS);
    for image in &images {
        table.add_row([
            output::short_key(&image.key),
            output::format_bytes(image.size_bytes),
            output::format_ago(&image.imported_at),
            output::format_ago(&image.last_used),
            if image.latest { "yes" } else { "no" }.to_string(),
        ]);
    }

    println!("{table}");
    Ok(())
}
