//! Shared fixtures for kernel integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use selkie_container::ServiceScope;
use selkie_core::Params;
use selkie_registry::{AgentDirectory, MemoryDirectory};
use selkie_runtime::{FnPlan, PlanContext};

/// Host scope with a fresh in-memory directory installed.
pub fn host_scope() -> (Arc<ServiceScope>, Arc<MemoryDirectory>) {
    let host = Arc::new(ServiceScope::new());
    let directory = MemoryDirectory::shared();
    host.put::<Arc<dyn AgentDirectory>>(directory.clone());
    (host, directory)
}

/// Plan that counts its invocations.
pub fn counting_plan(name: &str, hits: &Arc<AtomicUsize>) -> Arc<FnPlan> {
    let hits = hits.clone();
    FnPlan::new(name, move |_ctx: &PlanContext, _params: Option<&Params>| {
        let hits = hits.clone();
        Box::pin(async move {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    })
}

/// Plan that sleeps, for occupying a run cycle.
pub fn sleeping_plan(name: &str, millis: u64) -> Arc<FnPlan> {
    FnPlan::new(name, move |_ctx: &PlanContext, _params: Option<&Params>| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok(())
        })
    })
}

/// Poll `probe` until it holds or `limit` elapses.
pub async fn wait_until(limit: Duration, probe: impl Fn() -> bool) {
    let deadline = Instant::now() + limit;
    loop {
        if probe() {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "condition not reached within {limit:?}"
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}
