use anyhow::Result;
use tracing::info;

use crate::artifacts::{ArtifactPaths, load_index, load_verified_or_empty, save_index};
use crate::cli::RetryArgs;
use crate::commands::shared::{RunRecorder, VerificationSetup, verification_setup, verify_unmatched};
use crate::verification::{VerificationStore, resolve_matches};

pub fn run(args: RetryArgs) -> Result<()> {
    let paths = ArtifactPaths::new(&args.output_dir);
    let mut recorder = RunRecorder::start("verify-species");

    let mut index = load_index(&paths)?;
    let known = load_verified_or_empty(&paths)?;
    let known_count = known.len();

    let VerificationSetup {
        runner,
        pool,
        metadata,
    } = verification_setup(&args.verifier, &paths, VerificationStore::with_records(known))?;
    recorder.verifier_version = metadata.verifier_version.clone();

    let requests = verify_unmatched(&runner, &pool, &index.species);
    let unmatched = resolve_matches(&mut index.species, runner.store());
    let verified = runner.into_store().into_records();
    info!(
        requests,
        newly_verified = verified.len().saturating_sub(known_count),
        still_unmatched = unmatched,
        "verification retry finished"
    );

    recorder.counts.genera = index.species.len();
    recorder.counts.species = index.species.iter().map(|genus| genus.species.len()).sum();
    recorder.counts.verification_requests = requests;
    recorder.counts.verified_records = verified.len();
    recorder.counts.unmatched_entries = unmatched;

    save_index(&paths, &metadata, index.species, verified)?;
    recorder.finish(&paths)
}
