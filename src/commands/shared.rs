use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::artifacts::{ArtifactPaths, write_manifest};
use crate::cache::{CachedVerifier, open_cache};
use crate::cli::VerifierArgs;
use crate::gnames::GnVerifierClient;
use crate::http::JsonClient;
use crate::model::{GenusNode, PageImageEntry, RunCounts, RunManifest, RunMetadata};
use crate::util::{now_utc_string, utc_compact_string};
use crate::verification::{VerificationRunner, VerificationStore, build_pool, unmatched_queries};

const MANIFEST_VERSION: u32 = 1;

pub type Runner = VerificationRunner<CachedVerifier<GnVerifierClient>>;

pub struct VerificationSetup {
    pub runner: Runner,
    pub pool: rayon::ThreadPool,
    pub metadata: RunMetadata,
}

pub fn verification_setup(
    args: &VerifierArgs,
    paths: &ArtifactPaths,
    store: VerificationStore,
) -> Result<VerificationSetup> {
    let client = GnVerifierClient::new(JsonClient::new(args.timeout()), &args.verifier_url)
        .with_context(|| format!("invalid verifier url {}", args.verifier_url))?;

    let verifier_version = match client.version() {
        Ok(version) => version,
        Err(err) => {
            warn!(error = %err, "could not read verifier version");
            "unknown".to_string()
        }
    };
    info!(
        url = %args.verifier_url,
        version = %verifier_version,
        workers = args.workers,
        sources = ?args.data_sources,
        "name verifier ready"
    );

    let cache = match args.resolved_cache_path(&paths.default_cache()) {
        Some(path) => {
            info!(path = %path.display(), "using verification cache");
            Some(open_cache(&path)?)
        }
        None => None,
    };

    let runner = VerificationRunner::new(
        CachedVerifier::new(client, cache),
        args.data_sources.clone(),
        args.retry_policy(),
        store,
    );

    Ok(VerificationSetup {
        runner,
        pool: build_pool(args.workers)?,
        metadata: RunMetadata {
            verifier_version,
            run_date: now_utc_string(),
        },
    })
}

/// Verifies every entry of the tree that has no record id yet and waits for
/// all requests to finish. Returns the number of distinct names sent.
pub fn verify_unmatched(runner: &Runner, pool: &rayon::ThreadPool, genera: &[GenusNode]) -> usize {
    let queries = unmatched_queries(genera);
    info!(queries = queries.len(), "verifying unmatched entries");
    pool.in_place_scope(|scope| {
        for name in queries {
            runner.dispatch(scope, name);
        }
    });
    runner.dispatched_count()
}

pub struct RunRecorder {
    command: &'static str,
    started: DateTime<Utc>,
    started_at: String,
    pub verifier_version: String,
    pub counts: RunCounts,
    pub page_images: Vec<PageImageEntry>,
    pub warnings: Vec<String>,
}

impl RunRecorder {
    pub fn start(command: &'static str) -> Self {
        let started = Utc::now();
        let recorder = Self {
            command,
            started,
            started_at: now_utc_string(),
            verifier_version: "unknown".to_string(),
            counts: RunCounts::default(),
            page_images: Vec::new(),
            warnings: Vec::new(),
        };
        info!(command, run_id = %recorder.run_id(), "run started");
        recorder
    }

    pub fn run_id(&self) -> String {
        utc_compact_string(self.started)
    }

    pub fn warn(&mut self, message: String) {
        self.warnings.push(message);
    }

    pub fn finish(self, paths: &ArtifactPaths) -> Result<()> {
        let elapsed = Utc::now() - self.started;
        let manifest = RunManifest {
            manifest_version: MANIFEST_VERSION,
            run_id: self.run_id(),
            command: self.command.to_string(),
            status: "completed".to_string(),
            started_at: self.started_at,
            finished_at: now_utc_string(),
            verifier_version: self.verifier_version,
            counts: self.counts,
            page_images: self.page_images,
            warnings: self.warnings,
        };
        write_manifest(paths, &manifest)?;
        info!(
            command = %manifest.command,
            elapsed_secs = elapsed.num_seconds(),
            warnings = manifest.warnings.len(),
            "run finished"
        );
        Ok(())
    }
}
