use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::artifacts::{
    ArtifactPaths, latest_manifest, load_errors_or_empty, load_extra_or_empty, load_index,
};
use crate::cache::cached_entry_count;
use crate::cli::StatusArgs;
use crate::model::{GenusNode, VerifiedSpeciesFile};
use crate::util::read_json;

#[derive(Debug, Default, PartialEq, Eq)]
struct TreeCounts {
    genera: usize,
    species: usize,
    matched: usize,
    unmatched: usize,
    needs_verification: usize,
}

fn count_tree(genera: &[GenusNode]) -> TreeCounts {
    let mut counts = TreeCounts::default();
    for genus in genera {
        counts.genera += 1;
        tally(&mut counts, genus.matched_record_id.is_some(), genus.provenance.needs_verification);
        for species in &genus.species {
            counts.species += 1;
            tally(
                &mut counts,
                species.matched_record_id.is_some(),
                species.provenance.needs_verification,
            );
        }
    }
    counts
}

fn tally(counts: &mut TreeCounts, matched: bool, needs_verification: bool) {
    if matched {
        counts.matched += 1;
    } else {
        counts.unmatched += 1;
    }
    if needs_verification {
        counts.needs_verification += 1;
    }
}

pub fn run(args: StatusArgs) -> Result<()> {
    let paths = ArtifactPaths::new(&args.output_dir);
    info!(output_dir = %paths.root().display(), "status requested");

    if paths.index().exists() {
        let index = load_index(&paths)?;
        let counts = count_tree(&index.species);
        info!(
            genera = counts.genera,
            species = counts.species,
            matched = counts.matched,
            unmatched = counts.unmatched,
            needs_verification = counts.needs_verification,
            verifier_version = %index.metadata.verifier_version,
            run_date = %index.metadata.run_date,
            "species index"
        );
    } else {
        warn!(path = %paths.index().display(), "species index missing");
    }

    if paths.verified().exists() {
        let verified: VerifiedSpeciesFile = read_json(&paths.verified())?;
        info!(records = verified.species.len(), "verified species");
    } else {
        warn!(path = %paths.verified().display(), "verified species missing");
    }

    if paths.errors().exists() {
        let errors = load_errors_or_empty(&paths)?;
        info!(lines = errors.len(), "unverified lines");
    } else {
        warn!(path = %paths.errors().display(), "unverified lines file missing");
    }

    if paths.extra().exists() {
        let extra = load_extra_or_empty(&paths)?;
        info!(
            entries = extra.species.len(),
            missing = extra.metadata.missing_count,
            "extra species information"
        );
    } else {
        warn!(path = %paths.extra().display(), "extra species information missing");
    }

    match latest_manifest(&paths)? {
        Some((path, manifest)) => info!(
            path = %path.display(),
            command = %manifest.command,
            status = %manifest.status,
            finished_at = %manifest.finished_at,
            pages_processed = manifest.counts.pages_processed,
            pages_skipped = manifest.counts.pages_skipped,
            warnings = manifest.warnings.len(),
            "latest run"
        ),
        None => warn!(path = %paths.manifests_dir().display(), "no run manifests"),
    }

    let cache_path = args.cache_path.unwrap_or_else(|| paths.default_cache());
    if cache_path.exists() {
        let connection = Connection::open(&cache_path)
            .with_context(|| format!("failed to open {}", cache_path.display()))?;
        match cached_entry_count(&connection) {
            Ok(entries) => info!(path = %cache_path.display(), entries, "verification cache"),
            Err(err) => warn!(path = %cache_path.display(), error = %err, "verification cache unreadable"),
        }
    } else {
        warn!(path = %cache_path.display(), "verification cache missing");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IndexSpecies, LineProvenance};

    fn provenance(needs_verification: bool) -> LineProvenance {
        LineProvenance {
            needs_verification,
            ..LineProvenance::default()
        }
    }

    #[test]
    fn tree_counts_cover_genera_and_species() {
        let genera = vec![GenusNode {
            genus_name: "Aega".to_string(),
            synonym: None,
            matched_record_id: Some("R1".to_string()),
            cited_pages: vec![42],
            species: vec![
                IndexSpecies {
                    species_name: "psora".to_string(),
                    matched_record_id: None,
                    cited_pages: vec![43],
                    genus_synonym: None,
                    provenance: provenance(true),
                },
                IndexSpecies {
                    species_name: "monophthalma".to_string(),
                    matched_record_id: Some("R2".to_string()),
                    cited_pages: vec![44],
                    genus_synonym: None,
                    provenance: provenance(false),
                },
            ],
            provenance: provenance(false),
        }];

        assert_eq!(
            count_tree(&genera),
            TreeCounts {
                genera: 1,
                species: 2,
                matched: 2,
                unmatched: 1,
                needs_verification: 1,
            }
        );
    }
}
