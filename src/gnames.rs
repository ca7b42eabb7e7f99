use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use url::Url;

use crate::http::{JsonClient, ServiceError, endpoint};
use crate::model::VerifiedRecord;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NameVerification {
    pub best_result: Option<VerifiedRecord>,
}

pub trait NameVerifier: Send + Sync {
    fn verify(&self, name: &str, sources: &[u32]) -> Result<NameVerification, ServiceError>;
}

#[derive(Debug, Clone)]
pub struct GnVerifierClient {
    client: JsonClient,
    verifications_url: Url,
    version_url: Url,
}

impl GnVerifierClient {
    pub fn new(client: JsonClient, base_url: &str) -> Result<Self, ServiceError> {
        Ok(Self {
            client,
            verifications_url: endpoint(base_url, "verifications")?,
            version_url: endpoint(base_url, "version")?,
        })
    }

    pub fn version(&self) -> Result<String, ServiceError> {
        let body = self
            .client
            .get_json(&self.version_url)?
            .unwrap_or(Value::Null);
        body.get("version")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ServiceError::Decode {
                url: self.version_url.to_string(),
                message: "missing version field".to_string(),
            })
    }
}

impl NameVerifier for GnVerifierClient {
    fn verify(&self, name: &str, sources: &[u32]) -> Result<NameVerification, ServiceError> {
        let request = json!({
            "nameStrings": [name],
            "dataSources": sources,
            "withAllMatches": false,
        });
        let body = self.client.post_json(&self.verifications_url, &request)?;
        parse_verification(&body).map_err(|message| ServiceError::Decode {
            url: self.verifications_url.to_string(),
            message,
        })
    }
}

// Accepts both the `{"names": [...]}` envelope and a bare array of name results.
pub fn parse_verification(body: &Value) -> Result<NameVerification, String> {
    let first = match body {
        Value::Array(items) => items.first(),
        Value::Object(_) => body
            .get("names")
            .and_then(Value::as_array)
            .and_then(|items| items.first()),
        _ => return Err(format!("unexpected verification payload: {body}")),
    };

    let best = first
        .and_then(|item| item.get("bestResult"))
        .filter(|value| !value.is_null());
    let Some(best) = best else {
        return Ok(NameVerification::default());
    };

    let record: VerifiedRecord =
        serde_json::from_value(best.clone()).map_err(|source| source.to_string())?;
    if record.record_id.is_empty() {
        return Ok(NameVerification::default());
    }

    Ok(NameVerification {
        best_result: Some(record),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoundName {
    pub name: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone)]
pub struct GnFinderClient {
    client: JsonClient,
    find_url: Url,
}

impl GnFinderClient {
    pub fn new(client: JsonClient, base_url: &str) -> Result<Self, ServiceError> {
        Ok(Self {
            client,
            find_url: endpoint(base_url, "find")?,
        })
    }

    pub fn find_names(&self, text: &str) -> Result<Vec<FoundName>, ServiceError> {
        let body = self.client.post_json(&self.find_url, &json!({ "text": text }))?;
        parse_found_names(&body).map_err(|message| ServiceError::Decode {
            url: self.find_url.to_string(),
            message,
        })
    }
}

pub fn parse_found_names(body: &Value) -> Result<Vec<FoundName>, String> {
    match body.get("names") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(names) => {
            let mut found: Vec<FoundName> =
                serde_json::from_value(names.clone()).map_err(|source| source.to_string())?;
            found.sort_by_key(|name| name.start);
            Ok(found)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MatchType;

    #[test]
    fn parse_verification_reads_best_result() {
        let body = json!({
            "metadata": {"namesNumber": 1},
            "names": [{
                "name": "Aaptos aaptos",
                "bestResult": {
                    "dataSourceId": 9,
                    "recordId": "134241",
                    "matchedName": "Aaptos aaptos (Schmidt, 1864)",
                    "matchedCanonicalSimple": "Aaptos aaptos",
                    "classificationPath": "Biota|Animalia|Porifera|Aaptos|Aaptos aaptos",
                    "classificationRanks": "|kingdom|phylum|genus|species",
                    "matchType": "Exact",
                    "editDistance": 0
                }
            }]
        });
        let parsed = parse_verification(&body).unwrap();
        let record = parsed.best_result.unwrap();

        assert_eq!(record.record_id, "134241");
        assert_eq!(record.match_type, MatchType::Exact);
        assert_eq!(record.data_source_id, Some(9));
        assert_eq!(record.matched_canonical_simple.as_deref(), Some("Aaptos aaptos"));
    }

    #[test]
    fn parse_verification_without_match_is_empty() {
        let body = json!({"names": [{"name": "Zzzz", "matchType": "NoMatch"}]});
        assert_eq!(parse_verification(&body).unwrap(), NameVerification::default());
        assert_eq!(parse_verification(&json!({"names": []})).unwrap(), NameVerification::default());
        assert_eq!(parse_verification(&json!([])).unwrap(), NameVerification::default());
    }

    #[test]
    fn parse_verification_tolerates_unknown_match_types() {
        let body = json!([{
            "bestResult": {"recordId": "R9", "matchedName": "Aega", "matchType": "SomethingNew"}
        }]);
        let record = parse_verification(&body).unwrap().best_result.unwrap();
        assert_eq!(record.match_type, MatchType::Unknown);
    }

    #[test]
    fn parse_verification_rejects_garbage() {
        assert!(parse_verification(&json!("oops")).is_err());
        assert!(parse_verification(&json!({"names": [{"bestResult": {"recordId": 5}}]})).is_err());
    }

    #[test]
    fn parse_found_names_orders_by_offset() {
        let body = json!({
            "names": [
                {"verbatim": "Aega", "name": "Aega", "start": 40, "end": 44},
                {"verbatim": "Aaptos aaptos", "name": "Aaptos aaptos", "start": 3, "end": 16}
            ]
        });
        let found = parse_found_names(&body).unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "Aaptos aaptos");
        assert_eq!((found[1].start, found[1].end), (40, 44));
        assert!(parse_found_names(&json!({"names": null})).unwrap().is_empty());
    }
}
