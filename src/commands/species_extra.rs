use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use crate::artifacts::{ArtifactPaths, load_extra_or_empty, load_verified_or_empty, save_extra};
use crate::cli::SpeciesExtraArgs;
use crate::commands::shared::RunRecorder;
use crate::extra_info::{enrich_all, load_data_sources};
use crate::http::JsonClient;

pub fn run(args: SpeciesExtraArgs) -> Result<()> {
    let paths = ArtifactPaths::new(&args.output_dir);
    let mut recorder = RunRecorder::start("species-extra");

    let verified = load_verified_or_empty(&paths)?;
    let existing = load_extra_or_empty(&paths)?;
    let sources = load_data_sources(args.extra.data_sources_path.as_deref())?;
    info!(
        verified = verified.len(),
        existing = existing.species.len(),
        sources = sources.len(),
        refresh = args.refresh,
        "loaded verified species"
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(args.workers.max(1))
        .thread_name(|index| format!("extra-{index}"))
        .build()
        .context("failed to build enrichment worker pool")?;
    let client = JsonClient::new(Duration::from_secs(args.timeout_secs));

    let extra = enrich_all(
        &pool,
        &client,
        &sources,
        &verified,
        existing.species,
        args.refresh,
    );

    recorder.counts.verified_records = verified.len();
    recorder.counts.extra_missing = extra.metadata.missing_count;
    save_extra(&paths, &extra)?;
    recorder.finish(&paths)
}
