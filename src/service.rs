//! UBO Resolution Service
//!
//! Runs determinations against a shared `GraphStore`. Every batch pins one
//! snapshot so all CBUs in it see the same graph version, and fans out to
//! tokio blocking workers bounded by `ubo.max_parallel`.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::task::JoinError;

use crate::config::UboConfig;
use crate::determination::UboEngine;
use crate::diff::diff_results;
use crate::error::{Result, UboError};
use crate::graph_store::{GraphSnapshot, GraphStore};
use ubo_types::{Cbu, CbuId, UboResult, UboResultDiff};

pub struct UboResolutionService {
    store: Arc<GraphStore>,
    config: Arc<UboConfig>,
    /// Bounds the number of CBUs computed at once
    limiter: Arc<Semaphore>,
}

impl UboResolutionService {
    pub fn new(store: Arc<GraphStore>, config: UboConfig) -> Self {
        let limiter = Arc::new(Semaphore::new(config.max_parallel.max(1)));
        Self {
            store,
            config: Arc::new(config),
            limiter,
        }
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    pub fn config(&self) -> &UboConfig {
        &self.config
    }

    /// Resolve one CBU against the current snapshot
    pub fn resolve_cbu(&self, id: &CbuId) -> Result<UboResult> {
        let snapshot = self.store.snapshot();
        resolve_on(&snapshot, &self.config, id)
    }

    /// Recompute a CBU exactly as the graph stood at `version`
    pub fn resolve_at(&self, id: &CbuId, version: u64) -> Result<UboResult> {
        let snapshot = self.store.snapshot_at(version)?;
        resolve_on(&snapshot, &self.config, id)
    }

    /// Recompute `previous`'s CBU on the current snapshot and report what changed
    pub fn diff_since(&self, previous: &UboResult) -> Result<(UboResult, UboResultDiff)> {
        let current = self.resolve_cbu(&previous.cbu_id)?;
        let diff = diff_results(previous, &current)?;
        Ok((current, diff))
    }

    /// Resolve every registered CBU; results are ordered by CBU id
    pub async fn resolve_all(&self) -> Vec<UboResult> {
        let snapshot = self.store.snapshot();
        let cbus: Vec<Cbu> = snapshot.cbus().cloned().collect();
        tracing::info!(
            "ubo.resolve-all: {} CBU(s) at version {} (max_parallel={})",
            cbus.len(),
            snapshot.version(),
            self.config.max_parallel
        );
        self.run_batch(snapshot, cbus).await
    }

    /// Recompute only the results invalidated by later writes
    pub async fn resolve_stale(&self, previous: &[UboResult]) -> Vec<UboResult> {
        let snapshot = self.store.snapshot();
        let cbus: Vec<Cbu> = previous
            .iter()
            .filter(|r| snapshot.is_stale(r))
            .filter_map(|r| snapshot.cbu(&r.cbu_id).cloned())
            .collect();
        tracing::debug!(
            "ubo.resolve-stale: {} of {} result(s) stale at version {}",
            cbus.len(),
            previous.len(),
            snapshot.version()
        );
        self.run_batch(snapshot, cbus).await
    }

    async fn run_batch(&self, snapshot: Arc<GraphSnapshot>, cbus: Vec<Cbu>) -> Vec<UboResult> {
        let tasks = cbus.into_iter().map(|cbu| {
            let snapshot = Arc::clone(&snapshot);
            let config = Arc::clone(&self.config);
            let limiter = Arc::clone(&self.limiter);
            async move {
                // Semaphore is never closed; the permit is held until the worker returns
                let _permit = limiter.acquire_owned().await;
                let worker = (Arc::clone(&snapshot), Arc::clone(&config), cbu.clone());
                match tokio::task::spawn_blocking(move || {
                    let (snapshot, config, cbu) = worker;
                    UboEngine::new(&snapshot, &config).determine(&cbu)
                })
                .await
                {
                    Ok(result) => result,
                    Err(e) => aborted_result(&snapshot, &config, &cbu, e),
                }
            }
        });

        join_all(tasks).await
    }
}

/// FAILED result standing in for a worker that panicked or was cancelled
fn aborted_result(
    snapshot: &GraphSnapshot,
    config: &UboConfig,
    cbu: &Cbu,
    error: JoinError,
) -> UboResult {
    tracing::error!("ubo.resolve-all: worker for {} aborted: {}", cbu.id, error);
    UboEngine::new(snapshot, config).aborted(
        cbu,
        UboError::WorkerAborted {
            cbu: cbu.id.clone(),
            detail: error.to_string(),
        },
    )
}

fn resolve_on(snapshot: &GraphSnapshot, config: &UboConfig, id: &CbuId) -> Result<UboResult> {
    let cbu = snapshot
        .cbu(id)
        .ok_or_else(|| UboError::UnknownCbu(id.clone()))?;
    Ok(UboEngine::new(snapshot, config).determine(cbu))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use ubo_types::{
        CbuRole, Corroboration, EdgeAssertion, Entity, EntityId, EntityType, FailureKind,
        LinkType, Provenance, ResolutionState,
    };

    fn own(store: &GraphStore, owner: &str, owned: &str, pct: i64) {
        store
            .add_ownership_edge(EdgeAssertion::new(
                owner,
                owned,
                Decimal::new(pct, 0),
                LinkType::DirectShare,
                Provenance::new("register", Corroboration::FullyCorroborated),
            ))
            .expect("edge");
    }

    fn service() -> UboResolutionService {
        let store = Arc::new(GraphStore::new());
        for (id, t) in [
            ("OPCO-1", EntityType::Corporation),
            ("OPCO-2", EntityType::Corporation),
            ("alice", EntityType::NaturalPerson),
            ("bob", EntityType::NaturalPerson),
            ("carol", EntityType::NaturalPerson),
        ] {
            store
                .upsert_entity(Entity::new(id, id, "GB", t))
                .expect("entity");
        }
        own(&store, "alice", "OPCO-1", 60);
        own(&store, "bob", "OPCO-2", 80);
        store
            .register_cbu(
                Cbu::new("CBU-2", "Two", "OPCO-2").with_role(CbuRole::UltimateClient, "bob"),
            )
            .expect("cbu 2");
        store
            .register_cbu(
                Cbu::new("CBU-1", "One", "OPCO-1").with_role(CbuRole::UltimateClient, "alice"),
            )
            .expect("cbu 1");
        UboResolutionService::new(store, UboConfig::default())
    }

    #[test]
    fn test_unknown_cbu() {
        let svc = service();
        let err = svc.resolve_cbu(&CbuId::new("NOPE")).unwrap_err();
        assert_eq!(err, UboError::UnknownCbu(CbuId::new("NOPE")));
    }

    #[tokio::test]
    async fn test_resolve_all_pins_one_snapshot() {
        let svc = service();
        let results = svc.resolve_all().await;

        let ids: Vec<&str> = results.iter().map(|r| r.cbu_id.0.as_str()).collect();
        assert_eq!(ids, vec!["CBU-1", "CBU-2"]);
        assert!(results
            .iter()
            .all(|r| r.state == ResolutionState::Resolved));
        assert_eq!(results[0].snapshot_version, results[1].snapshot_version);
    }

    #[tokio::test]
    async fn test_resolve_stale_recomputes_only_changed() {
        let svc = service();
        let first = svc.resolve_all().await;

        own(svc.store(), "carol", "OPCO-1", 30);
        let rerun = svc.resolve_stale(&first).await;

        assert_eq!(rerun.len(), 1);
        assert_eq!(rerun[0].cbu_id, CbuId::new("CBU-1"));
        assert_eq!(rerun[0].ubos().len(), 2);
    }

    #[test]
    fn test_resolve_at_reproduces_earlier_result() {
        let svc = service();
        let before = svc.resolve_cbu(&CbuId::new("CBU-1")).expect("resolve");
        own(svc.store(), "carol", "OPCO-1", 30);

        let replayed = svc
            .resolve_at(&CbuId::new("CBU-1"), before.snapshot_version)
            .expect("replay");
        assert_eq!(replayed.outcome, before.outcome);
        assert_eq!(replayed.aggregated, before.aggregated);
        assert_eq!(replayed.snapshot_version, before.snapshot_version);
    }

    #[tokio::test]
    async fn test_aborted_worker_yields_failed_result() {
        let svc = service();
        let snapshot = svc.store().snapshot();
        let cbu = snapshot
            .cbu(&CbuId::new("CBU-1"))
            .cloned()
            .expect("registered");
        let handle: tokio::task::JoinHandle<()> =
            tokio::task::spawn_blocking(|| panic!("worker panicked"));
        let join_error = handle.await.unwrap_err();

        let result = aborted_result(&snapshot, svc.config(), &cbu, join_error);
        assert_eq!(result.cbu_id, CbuId::new("CBU-1"));
        assert_eq!(result.state, ResolutionState::Failed);
        assert_eq!(result.failure_kind(), Some(FailureKind::Internal));
        assert_eq!(
            result.state_trail,
            vec![ResolutionState::Pending, ResolutionState::Failed]
        );
        assert_eq!(result.snapshot_version, snapshot.version());
        assert!(result.rationale.contains("CBU-1"));
    }

    #[tokio::test]
    async fn test_batch_keeps_one_result_per_cbu() {
        let svc = service();
        let snapshot = svc.store().snapshot();
        let cbus: Vec<Cbu> = snapshot.cbus().cloned().collect();
        let results = svc.run_batch(Arc::clone(&snapshot), cbus.clone()).await;

        let ids: Vec<&CbuId> = results.iter().map(|r| &r.cbu_id).collect();
        let expected: Vec<&CbuId> = cbus.iter().map(|c| &c.id).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_diff_since_reports_new_owner() {
        let svc = service();
        let before = svc.resolve_cbu(&CbuId::new("CBU-1")).expect("resolve");
        own(svc.store(), "carol", "OPCO-1", 30);

        let (current, diff) = svc.diff_since(&before).expect("diff");
        assert_eq!(current.ubos().len(), 2);
        assert_eq!(diff.added, vec![EntityId::new("carol")]);
        assert!(diff.removed.is_empty());
        assert_eq!(diff.version_a, before.snapshot_version);
        assert_eq!(diff.version_b, current.snapshot_version);
    }
}
