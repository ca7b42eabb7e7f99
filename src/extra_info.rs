use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use rayon::ThreadPool;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use url::Url;

use crate::http::{JsonClient, ServiceError};
use crate::model::{
    CommonName, ExtraMetadata, SpeciesExtraFile, SpeciesExtraInfo, TaxonRecord, VerifiedRecord,
};
use crate::util::read_json;

/// One ranked taxonomic registry queried for extra information.
///
/// URL templates may contain `{id}`, replaced by the accepted record id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    pub id: u32,
    pub title: String,
    pub records_by_match_names_url: String,
    pub match_name_param: String,
    pub synonyms_by_id_url: Option<String>,
    pub vernaculars_by_id_url: Option<String>,
    pub id_field: String,
    pub valid_id_field: String,
}

pub fn default_data_sources() -> Vec<DataSource> {
    vec![
        DataSource {
            id: 9,
            title: "WoRMS".to_string(),
            records_by_match_names_url: "https://www.marinespecies.org/rest/AphiaRecordsByMatchNames"
                .to_string(),
            match_name_param: "scientificnames[]".to_string(),
            synonyms_by_id_url: Some(
                "https://www.marinespecies.org/rest/AphiaSynonymsByAphiaID/{id}".to_string(),
            ),
            vernaculars_by_id_url: Some(
                "https://www.marinespecies.org/rest/AphiaVernacularsByAphiaID/{id}".to_string(),
            ),
            id_field: "AphiaID".to_string(),
            valid_id_field: "valid_AphiaID".to_string(),
        },
        DataSource {
            id: 181,
            title: "IRMNG".to_string(),
            records_by_match_names_url: "https://www.irmng.org/rest/IRMNG_RecordsByMatchNames"
                .to_string(),
            match_name_param: "scientificnames[]".to_string(),
            synonyms_by_id_url: Some(
                "https://www.irmng.org/rest/IRMNG_SynonymsByIRMNG_ID/{id}".to_string(),
            ),
            vernaculars_by_id_url: None,
            id_field: "IRMNG_ID".to_string(),
            valid_id_field: "valid_IRMNG_ID".to_string(),
        },
    ]
}

pub fn load_data_sources(path: Option<&Path>) -> Result<Vec<DataSource>> {
    match path {
        Some(path) => read_json(path),
        None => Ok(default_data_sources()),
    }
}

pub trait JsonFetcher: Send + Sync {
    /// `Ok(None)` when the source has nothing for this request.
    fn fetch(&self, url: &Url) -> Result<Option<Value>, ServiceError>;
}

impl JsonFetcher for JsonClient {
    fn fetch(&self, url: &Url) -> Result<Option<Value>, ServiceError> {
        self.get_json(url)
    }
}

impl DataSource {
    fn records_url(&self, name: &str) -> Option<Url> {
        let mut url = self.parse_url(&self.records_by_match_names_url)?;
        url.query_pairs_mut().append_pair(&self.match_name_param, name);
        Some(url)
    }

    fn by_id_url(&self, template: Option<&str>, id: i64) -> Option<Url> {
        self.parse_url(&template?.replace("{id}", &id.to_string()))
    }

    fn parse_url(&self, raw: &str) -> Option<Url> {
        match Url::parse(raw) {
            Ok(url) => Some(url),
            Err(err) => {
                warn!(source = %self.title, url = raw, error = %err, "invalid data source url");
                None
            }
        }
    }

    // Maps the source's own id field names onto the shared record shape.
    fn normalize(&self, raw: &Value) -> Option<Map<String, Value>> {
        let mut object = raw.as_object()?.clone();
        if let Some(id) = object.remove(&self.id_field) {
            object.insert("id".to_string(), id);
        }
        if let Some(valid_id) = object.remove(&self.valid_id_field) {
            object.insert("valid_id".to_string(), valid_id);
        }
        Some(object)
    }

    fn taxon_record(&self, raw: &Value) -> Option<TaxonRecord> {
        let object = self.normalize(raw)?;
        match serde_json::from_value(Value::Object(object)) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(source = %self.title, error = %err, "skipping unreadable taxon record");
                None
            }
        }
    }
}

fn fetch_list(fetcher: &dyn JsonFetcher, source: &DataSource, url: &Url) -> Vec<Value> {
    match fetcher.fetch(url) {
        Ok(Some(Value::Array(items))) => items,
        Ok(Some(other)) => {
            warn!(source = %source.title, url = %url, body = %other, "expected a json array");
            Vec::new()
        }
        Ok(None) => Vec::new(),
        Err(err) => {
            warn!(source = %source.title, error = %err, "data source request failed");
            Vec::new()
        }
    }
}

// The bulk match endpoints answer with one list of candidates per queried name.
fn first_name_candidates(items: Vec<Value>) -> Vec<Value> {
    match items.into_iter().next() {
        Some(Value::Array(candidates)) => candidates,
        Some(single) => vec![single],
        None => Vec::new(),
    }
}

pub fn match_name(record: &VerifiedRecord) -> &str {
    record
        .matched_canonical_simple
        .as_deref()
        .filter(|name| !name.is_empty())
        .unwrap_or(&record.matched_name)
}

/// Tries each source in rank order and stops at the first one that returns a
/// record with a scientific name.
pub fn fetch_extra_info(
    fetcher: &dyn JsonFetcher,
    sources: &[DataSource],
    record: &VerifiedRecord,
) -> SpeciesExtraInfo {
    let name = match_name(record);

    for source in sources {
        let Some(url) = source.records_url(name) else {
            continue;
        };
        let records: Vec<TaxonRecord> = first_name_candidates(fetch_list(fetcher, source, &url))
            .iter()
            .filter_map(|raw| source.taxon_record(raw))
            .filter(|taxon| !taxon.scientificname.is_empty())
            .collect();

        if records.is_empty() {
            debug!(record_id = %record.record_id, source = %source.title, "no records from source");
            continue;
        }

        let mut info = SpeciesExtraInfo {
            records,
            ..SpeciesExtraInfo::default()
        };

        let accepted_id = info
            .records
            .iter()
            .find(|taxon| taxon.status.as_deref() == Some("accepted"))
            .and_then(|taxon| taxon.id);
        match accepted_id {
            Some(id) => {
                if let Some(url) = source.by_id_url(source.synonyms_by_id_url.as_deref(), id) {
                    info.synonyms = fetch_list(fetcher, source, &url)
                        .iter()
                        .filter_map(|raw| source.taxon_record(raw))
                        .collect();
                }
                if let Some(url) = source.by_id_url(source.vernaculars_by_id_url.as_deref(), id) {
                    info.common_names = fetch_list(fetcher, source, &url)
                        .into_iter()
                        .filter_map(|raw| serde_json::from_value::<CommonName>(raw).ok())
                        .collect();
                }
            }
            None => warn!(record_id = %record.record_id, source = %source.title, "no accepted record"),
        }

        return info;
    }

    SpeciesExtraInfo::default()
}

/// Fetches extra information for every verified record not already present
/// in `existing` (or for all of them when `refresh` is set).
pub fn enrich_all(
    pool: &ThreadPool,
    fetcher: &dyn JsonFetcher,
    sources: &[DataSource],
    verified: &BTreeMap<String, VerifiedRecord>,
    existing: BTreeMap<String, SpeciesExtraInfo>,
    refresh: bool,
) -> SpeciesExtraFile {
    let targets: Vec<&VerifiedRecord> = verified
        .values()
        .filter(|record| refresh || !existing.contains_key(&record.record_id))
        .collect();
    info!(targets = targets.len(), known = existing.len(), "fetching extra species information");

    let fetched: Vec<(String, SpeciesExtraInfo)> = pool.install(|| {
        targets
            .par_iter()
            .map(|record| {
                (
                    record.record_id.clone(),
                    fetch_extra_info(fetcher, sources, record),
                )
            })
            .collect()
    });

    let mut species = existing;
    species.extend(fetched);

    let missing_count = species.values().filter(|info| info.records.is_empty()).count();
    info!(entries = species.len(), missing_count, "extra species information ready");

    SpeciesExtraFile {
        metadata: ExtraMetadata { missing_count },
        species,
    }
}
