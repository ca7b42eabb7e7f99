use std::mem;

use tracing::{debug, warn};

use crate::model::{
    BoundingBox, ClassifiedLine, GenusNode, GenusSynonym, IndexSpecies, LineProvenance, LineRole,
    LineType,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineOrigin {
    pub page: u32,
    pub column: u8,
    pub line: usize,
    pub bounding_box: BoundingBox,
}

impl LineOrigin {
    fn provenance(&self, line: &ClassifiedLine, message: &str) -> LineProvenance {
        LineProvenance {
            texts: vec![line.raw_text.clone()],
            page: self.page,
            column: self.column,
            line: self.line,
            bounding_box: self.bounding_box,
            message: message.to_string(),
            needs_verification: line.needs_verification,
        }
    }
}

#[derive(Debug)]
enum ScanState {
    NoGenus,
    InGenus(GenusNode),
}

#[derive(Debug, Default)]
pub struct AssembledIndex {
    pub genera: Vec<GenusNode>,
    pub errors: Vec<LineProvenance>,
    pub dropped_lines: usize,
}

/// Folds classified lines, in reading order, into the genus/species tree.
///
/// State carries across columns and pages: an index entry may continue at
/// the top of the next column.
#[derive(Debug)]
pub struct IndexAssembler {
    state: ScanState,
    pending_synonym: Option<GenusSynonym>,
    finished: AssembledIndex,
}

impl Default for IndexAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexAssembler {
    pub fn new() -> Self {
        Self {
            state: ScanState::NoGenus,
            pending_synonym: None,
            finished: AssembledIndex::default(),
        }
    }

    /// Returns the name to verify when the line opened a genus or species.
    pub fn push(&mut self, line: ClassifiedLine, role: LineRole, origin: LineOrigin) -> Option<String> {
        debug!(
            page = origin.page,
            column = origin.column,
            line = origin.line,
            line_type = ?line.line_type,
            text = %line.raw_text,
            "classified line"
        );

        match (line.line_type, line.value.clone()) {
            (LineType::Genus, Some(genus_name)) => {
                let node = GenusNode {
                    genus_name: genus_name.clone(),
                    synonym: line.synonym_reference.clone(),
                    matched_record_id: None,
                    cited_pages: line.cited_pages.clone(),
                    species: Vec::new(),
                    provenance: origin.provenance(&line, "genus"),
                };
                if let ScanState::InGenus(previous) = mem::replace(&mut self.state, ScanState::InGenus(node)) {
                    self.finished.genera.push(previous);
                }
                self.pending_synonym = None;
                Some(genus_name)
            }
            (LineType::Species, Some(species_name)) => {
                let ScanState::InGenus(genus) = &mut self.state else {
                    warn!(
                        page = origin.page,
                        column = origin.column,
                        line = origin.line,
                        text = %line.raw_text,
                        "species line without an open genus; dropped"
                    );
                    self.finished.dropped_lines += 1;
                    return None;
                };
                let species = IndexSpecies {
                    species_name,
                    matched_record_id: None,
                    cited_pages: line.cited_pages.clone(),
                    genus_synonym: self.pending_synonym.take(),
                    provenance: origin.provenance(&line, "species"),
                };
                let query = genus.species_query(&species);
                genus.species.push(species);
                Some(query)
            }
            (LineType::Continuation, _) => {
                self.extend_open_entry(&line, &origin);
                None
            }
            (LineType::GenusSynonym, Some(genus)) => {
                self.pending_synonym = Some(GenusSynonym {
                    genus,
                    provenance: origin.provenance(&line, "genus_synonym"),
                });
                None
            }
            _ => {
                let message = match role {
                    LineRole::Genus => "invalid genus line",
                    LineRole::Species => "invalid species line",
                };
                warn!(
                    page = origin.page,
                    column = origin.column,
                    line = origin.line,
                    text = %line.raw_text,
                    "{message}"
                );
                self.finished.errors.push(origin.provenance(&line, message));
                None
            }
        }
    }

    fn extend_open_entry(&mut self, line: &ClassifiedLine, origin: &LineOrigin) {
        let ScanState::InGenus(genus) = &mut self.state else {
            warn!(
                page = origin.page,
                column = origin.column,
                line = origin.line,
                text = %line.raw_text,
                "continuation without an open genus; dropped"
            );
            self.finished.dropped_lines += 1;
            return;
        };

        let (pages, provenance) = match genus.species.last_mut() {
            Some(species) => (&mut species.cited_pages, &mut species.provenance),
            None => (&mut genus.cited_pages, &mut genus.provenance),
        };
        pages.extend_from_slice(&line.cited_pages);
        provenance.texts.push(line.raw_text.clone());
    }

    pub fn genus_count(&self) -> usize {
        self.finished.genera.len() + usize::from(matches!(self.state, ScanState::InGenus(_)))
    }

    pub fn finish(mut self) -> AssembledIndex {
        if let ScanState::InGenus(last) = self.state {
            self.finished.genera.push(last);
        }
        if let Some(orphan) = self.pending_synonym {
            warn!(
                page = orphan.provenance.page,
                genus = %orphan.genus,
                "genus synonym with no following species"
            );
        }
        self.finished
    }
}
