use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineRole {
    Genus,
    Species,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineType {
    Genus,
    Species,
    GenusSynonym,
    Continuation,
    Error,
}

impl From<LineRole> for LineType {
    fn from(role: LineRole) -> Self {
        match role {
            LineRole::Genus => Self::Genus,
            LineRole::Species => Self::Species,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedLine {
    #[serde(rename = "type")]
    pub line_type: LineType,
    pub value: Option<String>,
    pub synonym_reference: Option<String>,
    pub cited_pages: Vec<u32>,
    pub raw_text: String,
    pub needs_verification: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineProvenance {
    pub texts: Vec<String>,
    pub page: u32,
    pub column: u8,
    pub line: usize,
    pub bounding_box: BoundingBox,
    pub message: String,
    pub needs_verification: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenusSynonym {
    pub genus: String,
    pub provenance: LineProvenance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpecies {
    pub species_name: String,
    pub matched_record_id: Option<String>,
    pub cited_pages: Vec<u32>,
    pub genus_synonym: Option<GenusSynonym>,
    pub provenance: LineProvenance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenusNode {
    pub genus_name: String,
    pub synonym: Option<String>,
    pub matched_record_id: Option<String>,
    pub cited_pages: Vec<u32>,
    pub species: Vec<IndexSpecies>,
    pub provenance: LineProvenance,
}

impl GenusNode {
    pub fn species_query(&self, species: &IndexSpecies) -> String {
        format!("{} {}", self.genus_name, species.species_name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchType {
    NoMatch,
    PartialFuzzy,
    PartialExact,
    Fuzzy,
    Exact,
    Virus,
    FacetedSearch,
    #[default]
    #[serde(other)]
    Unknown,
}

impl MatchType {
    pub fn quality(self) -> u8 {
        match self {
            Self::Exact => 5,
            Self::Fuzzy => 4,
            Self::PartialExact => 3,
            Self::PartialFuzzy => 2,
            Self::Virus | Self::FacetedSearch => 1,
            Self::NoMatch | Self::Unknown => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedRecord {
    pub record_id: String,
    pub matched_name: String,
    #[serde(default)]
    pub classification_path: String,
    #[serde(default)]
    pub classification_ranks: String,
    #[serde(default)]
    pub classification_ids: String,
    #[serde(default)]
    pub match_type: MatchType,
    pub data_source_id: Option<i64>,
    pub data_source_title_short: Option<String>,
    pub curation: Option<String>,
    pub outlink: Option<String>,
    pub entry_date: Option<String>,
    pub matched_cardinality: Option<i64>,
    pub matched_canonical_simple: Option<String>,
    pub matched_canonical_full: Option<String>,
    pub current_record_id: Option<String>,
    pub current_name: Option<String>,
    pub current_canonical_simple: Option<String>,
    pub current_canonical_full: Option<String>,
    #[serde(default)]
    pub is_synonym: bool,
    pub edit_distance: Option<i64>,
    pub stem_edit_distance: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub verifier_version: String,
    pub run_date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSpeciesFile {
    pub metadata: RunMetadata,
    pub species: Vec<GenusNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedSpeciesFile {
    pub metadata: RunMetadata,
    pub species: BTreeMap<String, VerifiedRecord>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaxonRecord {
    pub id: Option<i64>,
    pub url: Option<String>,
    #[serde(default)]
    pub scientificname: String,
    pub authority: Option<String>,
    pub status: Option<String>,
    pub unacceptreason: Option<String>,
    #[serde(rename = "taxonRankID")]
    pub taxon_rank_id: Option<i64>,
    pub rank: Option<String>,
    pub valid_id: Option<i64>,
    pub valid_name: Option<String>,
    pub valid_authority: Option<String>,
    #[serde(rename = "parentNameUsageID")]
    pub parent_name_usage_id: Option<i64>,
    pub kingdom: Option<String>,
    pub phylum: Option<String>,
    pub class: Option<String>,
    pub order: Option<String>,
    pub family: Option<String>,
    pub genus: Option<String>,
    pub citation: Option<String>,
    pub lsid: Option<String>,
    #[serde(rename = "isMarine")]
    pub is_marine: Option<i64>,
    #[serde(rename = "isBrackish")]
    pub is_brackish: Option<i64>,
    #[serde(rename = "isFreshwater")]
    pub is_freshwater: Option<i64>,
    #[serde(rename = "isTerrestrial")]
    pub is_terrestrial: Option<i64>,
    #[serde(rename = "isExtinct")]
    pub is_extinct: Option<i64>,
    pub match_type: Option<String>,
    pub modified: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonName {
    pub vernacular: String,
    pub language_code: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SpeciesExtraInfo {
    pub records: Vec<TaxonRecord>,
    pub synonyms: Vec<TaxonRecord>,
    pub common_names: Vec<CommonName>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtraMetadata {
    pub missing_count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeciesExtraFile {
    pub metadata: ExtraMetadata,
    pub species: BTreeMap<String, SpeciesExtraInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageImageEntry {
    pub page: u32,
    pub filename: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunCounts {
    pub pages_requested: usize,
    pub pages_processed: usize,
    pub pages_skipped: usize,
    pub genera: usize,
    pub species: usize,
    pub unverified_lines: usize,
    pub dropped_lines: usize,
    pub verification_requests: usize,
    pub verified_records: usize,
    pub unmatched_entries: usize,
    pub extra_missing: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub command: String,
    pub status: String,
    pub started_at: String,
    pub finished_at: String,
    pub verifier_version: String,
    pub counts: RunCounts,
    pub page_images: Vec<PageImageEntry>,
    pub warnings: Vec<String>,
}

#[cfg(test)]
pub(crate) fn test_record(record_id: &str, match_type: &str) -> VerifiedRecord {
    serde_json::from_value(serde_json::json!({
        "recordId": record_id,
        "matchedName": record_id,
        "matchType": match_type,
    }))
    .unwrap()
}
