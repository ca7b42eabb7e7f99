use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::model::{
    GenusNode, IndexSpeciesFile, LineProvenance, RunManifest, RunMetadata, SpeciesExtraFile,
    VerifiedRecord, VerifiedSpeciesFile,
};
use crate::util::{read_json, write_json_pretty};

pub const INDEX_FILE: &str = "index_species.json";
pub const VERIFIED_FILE: &str = "index_species_verified.json";
pub const ERRORS_FILE: &str = "index_species_errors.json";
pub const EXTRA_FILE: &str = "index_species_verified_extra.json";
pub const CACHE_FILE: &str = "verifier_cache.sqlite";

#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    root: PathBuf,
}

impl ArtifactPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    pub fn verified(&self) -> PathBuf {
        self.root.join(VERIFIED_FILE)
    }

    pub fn errors(&self) -> PathBuf {
        self.root.join(ERRORS_FILE)
    }

    pub fn extra(&self) -> PathBuf {
        self.root.join(EXTRA_FILE)
    }

    pub fn default_cache(&self) -> PathBuf {
        self.root.join(CACHE_FILE)
    }

    pub fn manifests_dir(&self) -> PathBuf {
        self.root.join("manifests")
    }

    pub fn debug_dir(&self) -> PathBuf {
        self.root.join("debug")
    }

    pub fn page_debug_image(&self, page: u32) -> PathBuf {
        self.debug_dir().join(format!("{page:08}.png"))
    }

    pub fn column_debug_image(&self, page: u32, column: u8) -> PathBuf {
        self.debug_dir().join(format!("{page:08}-{column}.png"))
    }
}

pub fn load_index(paths: &ArtifactPaths) -> Result<IndexSpeciesFile> {
    let path = paths.index();
    if !path.exists() {
        bail!(
            "{} does not exist; run process-species first",
            path.display()
        );
    }
    read_json(&path)
}

pub fn load_verified_or_empty(paths: &ArtifactPaths) -> Result<BTreeMap<String, VerifiedRecord>> {
    let path = paths.verified();
    if !path.exists() {
        warn!(path = %path.display(), "no verified species yet; starting empty");
        return Ok(BTreeMap::new());
    }
    let file: VerifiedSpeciesFile = read_json(&path)?;
    Ok(file.species)
}

pub fn load_extra_or_empty(paths: &ArtifactPaths) -> Result<SpeciesExtraFile> {
    let path = paths.extra();
    if !path.exists() {
        return Ok(SpeciesExtraFile::default());
    }
    read_json(&path)
}

pub fn load_errors_or_empty(paths: &ArtifactPaths) -> Result<Vec<LineProvenance>> {
    let path = paths.errors();
    if !path.exists() {
        return Ok(Vec::new());
    }
    read_json(&path)
}

pub fn save_index(
    paths: &ArtifactPaths,
    metadata: &RunMetadata,
    genera: Vec<GenusNode>,
    verified: BTreeMap<String, VerifiedRecord>,
) -> Result<()> {
    let index = IndexSpeciesFile {
        metadata: metadata.clone(),
        species: genera,
    };
    write_json_pretty(&paths.index(), &index)?;

    let verified = VerifiedSpeciesFile {
        metadata: metadata.clone(),
        species: verified,
    };
    write_json_pretty(&paths.verified(), &verified)?;

    info!(
        genera = index.species.len(),
        verified = verified.species.len(),
        path = %paths.root().display(),
        "saved species index"
    );
    Ok(())
}

pub fn save_errors(paths: &ArtifactPaths, errors: &[LineProvenance]) -> Result<()> {
    write_json_pretty(&paths.errors(), &errors)?;
    info!(errors = errors.len(), path = %paths.errors().display(), "saved unverified lines");
    Ok(())
}

pub fn save_extra(paths: &ArtifactPaths, extra: &SpeciesExtraFile) -> Result<()> {
    write_json_pretty(&paths.extra(), extra)?;
    info!(
        entries = extra.species.len(),
        missing_count = extra.metadata.missing_count,
        path = %paths.extra().display(),
        "saved extra species information"
    );
    Ok(())
}

pub fn write_manifest(paths: &ArtifactPaths, manifest: &RunManifest) -> Result<PathBuf> {
    let path = paths
        .manifests_dir()
        .join(format!("run_{}.json", manifest.run_id));
    write_json_pretty(&path, manifest)?;
    info!(path = %path.display(), status = %manifest.status, "wrote run manifest");
    Ok(path)
}

pub fn latest_manifest(paths: &ArtifactPaths) -> Result<Option<(PathBuf, RunManifest)>> {
    let dir = paths.manifests_dir();
    if !dir.exists() {
        return Ok(None);
    }

    let mut candidates = Vec::new();
    for entry in fs::read_dir(&dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with("run_") && name.ends_with(".json") {
            candidates.push(entry.path());
        }
    }
    // Run ids are compact UTC stamps, so the lexical maximum is the newest run.
    candidates.sort();

    match candidates.pop() {
        Some(path) => {
            let manifest = read_json(&path)?;
            Ok(Some((path, manifest)))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RunCounts, test_record};

    fn metadata() -> RunMetadata {
        RunMetadata {
            verifier_version: "v1.2.0".to_string(),
            run_date: "2026-10-19T00:00:00Z".to_string(),
        }
    }

    fn manifest(run_id: &str) -> RunManifest {
        RunManifest {
            manifest_version: 1,
            run_id: run_id.to_string(),
            command: "process-species".to_string(),
            status: "completed".to_string(),
            started_at: "2026-10-19T00:00:00Z".to_string(),
            finished_at: "2026-10-19T00:10:00Z".to_string(),
            verifier_version: "v1.2.0".to_string(),
            counts: RunCounts::default(),
            page_images: Vec::new(),
            warnings: Vec::new(),
        }
    }

    #[test]
    fn paths_follow_the_artifact_layout() {
        let paths = ArtifactPaths::new("data/Oceans1876");
        assert_eq!(paths.index(), Path::new("data/Oceans1876/index_species.json"));
        assert_eq!(
            paths.column_debug_image(739, 2),
            Path::new("data/Oceans1876/debug/00000739-2.png")
        );
        assert_eq!(
            paths.page_debug_image(739),
            Path::new("data/Oceans1876/debug/00000739.png")
        );
    }

    #[test]
    fn index_and_verified_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::new(dir.path());
        let mut verified = BTreeMap::new();
        verified.insert("R1".to_string(), test_record("R1", "Exact"));

        save_index(&paths, &metadata(), Vec::new(), verified).unwrap();

        let index = load_index(&paths).unwrap();
        assert_eq!(index.metadata.verifier_version, "v1.2.0");
        assert!(index.species.is_empty());
        assert_eq!(load_verified_or_empty(&paths).unwrap().len(), 1);
    }

    #[test]
    fn missing_artifacts_load_as_empty_except_the_index() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::new(dir.path());

        assert!(load_index(&paths).is_err());
        assert!(load_verified_or_empty(&paths).unwrap().is_empty());
        assert!(load_extra_or_empty(&paths).unwrap().species.is_empty());
        assert!(load_errors_or_empty(&paths).unwrap().is_empty());
        assert!(latest_manifest(&paths).unwrap().is_none());
    }

    #[test]
    fn latest_manifest_picks_the_newest_run() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::new(dir.path());
        write_manifest(&paths, &manifest("20261018T090000Z")).unwrap();
        write_manifest(&paths, &manifest("20261019T090000Z")).unwrap();

        let (path, latest) = latest_manifest(&paths).unwrap().unwrap();
        assert_eq!(latest.run_id, "20261019T090000Z");
        assert!(path.ends_with("run_20261019T090000Z.json"));
    }
}
