use std::fs;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::FindNamesArgs;
use crate::gnames::GnFinderClient;
use crate::http::JsonClient;

pub fn run(args: FindNamesArgs) -> Result<()> {
    let text = fs::read_to_string(&args.text_file)
        .with_context(|| format!("failed to read {}", args.text_file.display()))?;

    let client = JsonClient::new(Duration::from_secs(args.timeout_secs));
    let finder = GnFinderClient::new(client, &args.finder_url)
        .with_context(|| format!("invalid finder url {}", args.finder_url))?;
    let names = finder
        .find_names(&text)
        .with_context(|| format!("name finding failed for {}", args.text_file.display()))?;

    info!(
        path = %args.text_file.display(),
        names = names.len(),
        "names found"
    );
    let rendered = serde_json::to_string_pretty(&names).context("failed to serialize found names")?;
    println!("{rendered}");
    Ok(())
}
