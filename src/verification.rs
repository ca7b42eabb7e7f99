use std::collections::{BTreeMap, HashMap, HashSet};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rayon::Scope;
use tracing::{debug, info, warn};

use crate::gnames::{NameVerification, NameVerifier};
use crate::http::ServiceError;
use crate::model::{GenusNode, VerifiedRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1 << doublings)
    }
}

#[derive(Debug, Default)]
struct StoreState {
    records: BTreeMap<String, VerifiedRecord>,
    matches: HashMap<String, String>,
}

/// Verified records keyed by record id, plus the queried name that led to each.
///
/// Concurrent workers merge into the same store; the quality comparison and the
/// write happen under one lock.
#[derive(Debug, Default)]
pub struct VerificationStore {
    state: Mutex<StoreState>,
}

impl VerificationStore {
    pub fn with_records(records: BTreeMap<String, VerifiedRecord>) -> Self {
        Self {
            state: Mutex::new(StoreState {
                records,
                matches: HashMap::new(),
            }),
        }
    }

    /// Returns `true` when the stored record for this id was inserted or replaced.
    pub fn merge(&self, name: &str, record: VerifiedRecord) -> bool {
        let mut state = self.state.lock();
        let record_id = record.record_id.clone();
        state.matches.insert(name.to_string(), record_id.clone());

        let replace = state
            .records
            .get(&record_id)
            .is_none_or(|existing| record.match_type.quality() > existing.match_type.quality());
        if replace {
            state.records.insert(record_id, record);
        }
        replace
    }

    pub fn record_id_for(&self, name: &str) -> Option<String> {
        self.state.lock().matches.get(name).cloned()
    }

    pub fn remove(&self, record_id: &str) -> Option<VerifiedRecord> {
        let mut state = self.state.lock();
        state.matches.retain(|_, id| id != record_id);
        state.records.remove(record_id)
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_records(self) -> BTreeMap<String, VerifiedRecord> {
        self.state.into_inner().records
    }
}

pub struct VerificationRunner<V> {
    verifier: V,
    sources: Vec<u32>,
    retry: RetryPolicy,
    store: VerificationStore,
    dispatched: Mutex<HashSet<String>>,
}

impl<V: NameVerifier> VerificationRunner<V> {
    pub fn new(verifier: V, sources: Vec<u32>, retry: RetryPolicy, store: VerificationStore) -> Self {
        Self {
            verifier,
            sources,
            retry,
            store,
            dispatched: Mutex::new(HashSet::new()),
        }
    }

    /// Queues `name` on the scope unless it was already dispatched this run.
    pub fn dispatch<'scope>(&'scope self, scope: &Scope<'scope>, name: String) {
        if !self.dispatched.lock().insert(name.clone()) {
            debug!(name = %name, "verification already dispatched");
            return;
        }
        scope.spawn(move |_| self.verify_name(&name));
    }

    pub fn verify_name(&self, name: &str) {
        match self.verify_with_retry(name) {
            Ok(NameVerification {
                best_result: Some(record),
            }) => {
                let record_id = record.record_id.clone();
                let match_type = record.match_type;
                let stored = self.store.merge(name, record);
                debug!(name, record_id = %record_id, ?match_type, stored, "name verified");
            }
            Ok(_) => debug!(name, "no verification match"),
            Err(err) => warn!(name, error = %err, "verification failed; entry left unmatched"),
        }
    }

    pub fn verify_with_retry(&self, name: &str) -> Result<NameVerification, ServiceError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.verifier.verify(name, &self.sources) {
                Ok(verification) => return Ok(verification),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "verification attempt failed; retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub fn dispatched_count(&self) -> usize {
        self.dispatched.lock().len()
    }

    pub fn store(&self) -> &VerificationStore {
        &self.store
    }

    pub fn into_store(self) -> VerificationStore {
        self.store
    }
}

pub fn build_pool(workers: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|index| format!("verifier-{index}"))
        .build()
        .context("failed to build verification worker pool")
}

/// Every queried name of the tree, genus first, that has no record id yet.
pub fn unmatched_queries(genera: &[GenusNode]) -> Vec<String> {
    let mut queries = Vec::new();
    for genus in genera {
        if genus.matched_record_id.is_none() {
            queries.push(genus.genus_name.clone());
        }
        for species in &genus.species {
            if species.matched_record_id.is_none() {
                queries.push(genus.species_query(species));
            }
        }
    }
    queries
}

/// Points every node at the record its query resolved to and returns how
/// many nodes are still unmatched.
pub fn resolve_matches(genera: &mut [GenusNode], store: &VerificationStore) -> usize {
    let mut unmatched = 0;
    for genus in genera.iter_mut() {
        if let Some(record_id) = store.record_id_for(&genus.genus_name) {
            genus.matched_record_id = Some(record_id);
        }
        if genus.matched_record_id.is_none() {
            unmatched += 1;
        }

        let genus_name = genus.genus_name.clone();
        for species in &mut genus.species {
            let query = format!("{} {}", genus_name, species.species_name);
            if let Some(record_id) = store.record_id_for(&query) {
                species.matched_record_id = Some(record_id);
            }
            if species.matched_record_id.is_none() {
                unmatched += 1;
            }
        }
    }

    info!(unmatched, verified = store.len(), "verification results resolved");
    unmatched
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::model::{BoundingBox, IndexSpecies, LineProvenance, MatchType, test_record};

    struct TableVerifier {
        answers: HashMap<&'static str, (&'static str, &'static str)>,
        transient_failures: AtomicUsize,
        calls: AtomicUsize,
    }

    impl TableVerifier {
        fn new(answers: &[(&'static str, &'static str, &'static str)]) -> Self {
            Self {
                answers: answers
                    .iter()
                    .map(|&(name, id, match_type)| (name, (id, match_type)))
                    .collect(),
                transient_failures: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl NameVerifier for TableVerifier {
        fn verify(&self, name: &str, _sources: &[u32]) -> Result<NameVerification, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.transient_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.transient_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(ServiceError::Status {
                    url: "http://verifier.test".to_string(),
                    status: 503,
                });
            }
            Ok(NameVerification {
                best_result: self
                    .answers
                    .get(name)
                    .map(|&(id, match_type)| test_record(id, match_type)),
            })
        }
    }

    fn no_wait() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::ZERO,
        }
    }

    fn provenance() -> LineProvenance {
        LineProvenance {
            texts: Vec::new(),
            page: 739,
            column: 1,
            line: 1,
            bounding_box: BoundingBox::default(),
            message: String::new(),
            needs_verification: false,
        }
    }

    fn genus(name: &str, species: &[&str]) -> GenusNode {
        GenusNode {
            genus_name: name.to_string(),
            synonym: None,
            matched_record_id: None,
            cited_pages: Vec::new(),
            species: species
                .iter()
                .map(|species_name| IndexSpecies {
                    species_name: species_name.to_string(),
                    matched_record_id: None,
                    cited_pages: Vec::new(),
                    genus_synonym: None,
                    provenance: provenance(),
                })
                .collect(),
            provenance: provenance(),
        }
    }

    #[test]
    fn exact_match_wins_regardless_of_arrival_order() {
        for order in [["Fuzzy", "Exact"], ["Exact", "Fuzzy"]] {
            let store = VerificationStore::default();
            store.merge("Aaptos aaptos", test_record("R1", order[0]));
            store.merge("Aaptos aaptas", test_record("R1", order[1]));

            let records = store.into_records();
            assert_eq!(records.len(), 1);
            assert_eq!(records["R1"].match_type, MatchType::Exact);
        }
    }

    #[test]
    fn equal_quality_keeps_the_first_record() {
        let store = VerificationStore::default();
        assert!(store.merge("a", test_record("R1", "Fuzzy")));
        assert!(!store.merge("b", test_record("R1", "Fuzzy")));
        assert_eq!(store.record_id_for("b").as_deref(), Some("R1"));
    }

    #[test]
    fn remove_drops_the_record_and_its_name_links() {
        let store = VerificationStore::default();
        store.merge("Aega", test_record("R7", "Exact"));

        assert!(store.remove("R7").is_some());
        assert!(store.remove("R7").is_none());
        assert_eq!(store.record_id_for("Aega"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn concurrent_dispatch_merges_by_record_id() {
        let verifier = TableVerifier::new(&[
            ("Aaptos", "G1", "Exact"),
            ("Aaptos aaptos", "R1", "Fuzzy"),
            ("Aaptos aaptas", "R1", "Exact"),
        ]);
        let runner = VerificationRunner::new(verifier, vec![9], no_wait(), VerificationStore::default());
        let pool = build_pool(4).unwrap();

        pool.in_place_scope(|scope| {
            for name in ["Aaptos", "Aaptos aaptos", "Aaptos aaptas", "Aaptos aaptos", "Nomatch"] {
                runner.dispatch(scope, name.to_string());
            }
        });

        assert_eq!(runner.dispatched_count(), 4);
        assert_eq!(runner.verifier.calls.load(Ordering::SeqCst), 4);

        let mut genera = vec![genus("Aaptos", &["aaptos", "aaptas"]), genus("Nomatch", &[])];
        let unmatched = resolve_matches(&mut genera, runner.store());
        assert_eq!(unmatched, 1);
        assert_eq!(genera[0].matched_record_id.as_deref(), Some("G1"));
        assert_eq!(genera[0].species[0].matched_record_id.as_deref(), Some("R1"));
        assert_eq!(genera[0].species[1].matched_record_id.as_deref(), Some("R1"));

        let records = runner.into_store().into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records["R1"].match_type, MatchType::Exact);
    }

    #[test]
    fn transient_failures_are_retried() {
        let verifier = TableVerifier::new(&[("Aega", "R2", "Exact")]);
        verifier.transient_failures.store(2, Ordering::SeqCst);
        let runner = VerificationRunner::new(verifier, Vec::new(), no_wait(), VerificationStore::default());

        runner.verify_name("Aega");

        assert_eq!(runner.verifier.calls.load(Ordering::SeqCst), 3);
        assert_eq!(runner.store().record_id_for("Aega").as_deref(), Some("R2"));
    }

    #[test]
    fn exhausted_retries_leave_the_entry_unmatched() {
        let verifier = TableVerifier::new(&[("Aega", "R2", "Exact")]);
        verifier.transient_failures.store(5, Ordering::SeqCst);
        let runner = VerificationRunner::new(verifier, Vec::new(), no_wait(), VerificationStore::default());

        runner.verify_name("Aega");

        assert_eq!(runner.verifier.calls.load(Ordering::SeqCst), 3);
        assert!(runner.store().is_empty());
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(2000));
    }

    #[test]
    fn unmatched_queries_cover_genera_and_species() {
        let mut tree = vec![genus("Aega", &["psora", "monophthalma"])];
        tree[0].species[0].matched_record_id = Some("R3".to_string());

        assert_eq!(unmatched_queries(&tree), vec!["Aega", "Aega monophthalma"]);
    }

    #[test]
    fn previously_matched_nodes_keep_their_record() {
        let mut tree = vec![genus("Aega", &[])];
        tree[0].matched_record_id = Some("R9".to_string());

        assert_eq!(resolve_matches(&mut tree, &VerificationStore::default()), 0);
        assert_eq!(tree[0].matched_record_id.as_deref(), Some("R9"));
    }
}
