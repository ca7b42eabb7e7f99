use anyhow::Result;
use tracing::info;

use crate::artifacts::{ArtifactPaths, load_index, load_verified_or_empty, save_index};
use crate::classify::LineClassifier;
use crate::cli::RetryArgs;
use crate::commands::shared::{RunRecorder, VerificationSetup, verification_setup, verify_unmatched};
use crate::reclassify::reclassify_tree;
use crate::verification::{VerificationStore, resolve_matches};

pub fn run(args: RetryArgs) -> Result<()> {
    let paths = ArtifactPaths::new(&args.output_dir);
    let mut recorder = RunRecorder::start("process-text");

    let mut index = load_index(&paths)?;
    let known = load_verified_or_empty(&paths)?;
    info!(
        genera = index.species.len(),
        verified = known.len(),
        "loaded species index"
    );

    let classifier = LineClassifier::new()?;
    let summary = reclassify_tree(&mut index.species, &classifier);
    info!(
        genera = summary.genera,
        species = summary.species,
        renamed = summary.renamed,
        rejected = summary.rejected,
        "reclassified stored texts"
    );
    if summary.rejected > 0 {
        recorder.warn(format!(
            "{} stored entries no longer classify and kept their previous values",
            summary.rejected
        ));
    }

    let VerificationSetup {
        runner,
        pool,
        metadata,
    } = verification_setup(&args.verifier, &paths, VerificationStore::with_records(known))?;
    recorder.verifier_version = metadata.verifier_version.clone();

    let requests = verify_unmatched(&runner, &pool, &index.species);
    let unmatched = resolve_matches(&mut index.species, runner.store());
    let verified = runner.into_store().into_records();

    recorder.counts.genera = summary.genera;
    recorder.counts.species = summary.species;
    recorder.counts.verification_requests = requests;
    recorder.counts.verified_records = verified.len();
    recorder.counts.unmatched_entries = unmatched;

    save_index(&paths, &metadata, index.species, verified)?;
    recorder.finish(&paths)
}
