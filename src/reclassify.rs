use tracing::{debug, warn};

use crate::classify::LineClassifier;
use crate::model::{ClassifiedLine, GenusNode, GenusSynonym, IndexSpecies, LineRole, LineType};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReclassifySummary {
    pub genera: usize,
    pub species: usize,
    pub renamed: usize,
    pub rejected: usize,
}

/// Re-runs classification over the texts stored in each node's provenance.
///
/// The first stored text is the entry line itself; the rest are continuation
/// lines. Nodes whose entry line no longer classifies as expected keep their
/// previous values. Every reclassified node loses its record id so that it is
/// verified again under its current name.
pub fn reclassify_tree(genera: &mut [GenusNode], classifier: &LineClassifier) -> ReclassifySummary {
    let mut summary = ReclassifySummary::default();

    for genus in genera.iter_mut() {
        summary.genera += 1;
        match refold(classifier, &genus.provenance.texts, LineRole::Genus) {
            Some((entry, pages)) => {
                let value = entry.value.clone().unwrap_or_default();
                if value != genus.genus_name {
                    debug!(from = %genus.genus_name, to = %value, "genus renamed");
                    summary.renamed += 1;
                }
                genus.genus_name = value;
                genus.synonym = entry.synonym_reference;
                genus.cited_pages = pages;
                genus.matched_record_id = None;
                genus.provenance.needs_verification = entry.needs_verification;
            }
            None => {
                warn!(
                    genus = %genus.genus_name,
                    page = genus.provenance.page,
                    line = genus.provenance.line,
                    "stored genus text no longer classifies as a genus"
                );
                summary.rejected += 1;
            }
        }

        for species in &mut genus.species {
            summary.species += 1;
            reclassify_species(species, classifier, &mut summary);
        }
    }

    summary
}

fn reclassify_species(
    species: &mut IndexSpecies,
    classifier: &LineClassifier,
    summary: &mut ReclassifySummary,
) {
    match refold(classifier, &species.provenance.texts, LineRole::Species) {
        Some((entry, pages)) => {
            let value = entry.value.clone().unwrap_or_default();
            if value != species.species_name {
                debug!(from = %species.species_name, to = %value, "species renamed");
                summary.renamed += 1;
            }
            species.species_name = value;
            species.cited_pages = pages;
            species.matched_record_id = None;
            species.provenance.needs_verification = entry.needs_verification;
        }
        None => {
            warn!(
                species = %species.species_name,
                page = species.provenance.page,
                line = species.provenance.line,
                "stored species text no longer classifies as a species"
            );
            summary.rejected += 1;
        }
    }

    species.genus_synonym = species
        .genus_synonym
        .take()
        .and_then(|synonym| reclassify_synonym(synonym, classifier));
}

fn reclassify_synonym(mut synonym: GenusSynonym, classifier: &LineClassifier) -> Option<GenusSynonym> {
    let text = synonym.provenance.texts.first()?;
    let line = classifier.classify(text, LineRole::Genus);
    match (line.line_type, line.value) {
        (LineType::GenusSynonym, Some(genus)) => {
            synonym.genus = genus;
            Some(synonym)
        }
        _ => {
            warn!(text = %text, "stored genus synonym no longer classifies as a synonym; dropped");
            None
        }
    }
}

// Classifies the entry text and folds its continuation texts into one page list.
fn refold(
    classifier: &LineClassifier,
    texts: &[String],
    role: LineRole,
) -> Option<(ClassifiedLine, Vec<u32>)> {
    let (first, rest) = texts.split_first()?;
    let entry = classifier.classify(first, role);
    if entry.line_type != LineType::from(role) || entry.value.is_none() {
        return None;
    }

    let mut pages = entry.cited_pages.clone();
    for text in rest {
        let line = classifier.classify(text, role);
        if line.line_type == LineType::Continuation {
            pages.extend_from_slice(&line.cited_pages);
        } else {
            warn!(
                text = %text,
                line_type = ?line.line_type,
                "stored continuation text is not a continuation"
            );
        }
    }

    Some((entry, pages))
}
