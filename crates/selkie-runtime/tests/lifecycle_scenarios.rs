//! End-to-end lifecycle walks: deploy, start, stop, undeploy, and the
//! rejection matrix between them.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{counting_plan, host_scope, sleeping_plan, wait_until};
use selkie_container::ServiceScope;
use selkie_core::{AgentId, Error, LifecycleState, Message, Params, RoleId};
use selkie_registry::{AgentDirectory, DirectoryError, DirectoryResult, LocalAddress};
use selkie_runtime::{
    Agent, Contribution, RoleBehavior, RoleDescriptor, RoleSource, TypeMatcher,
};
use serde_json::json;

struct CountingRole {
    hits: Arc<AtomicUsize>,
}

impl RoleBehavior for CountingRole {
    fn name(&self) -> &str {
        "counting"
    }

    fn contribute(&self, _params: &Params) -> selkie_core::Result<Contribution> {
        Ok(Contribution::new().on_event(
            TypeMatcher::<Message>::new(),
            counting_plan("count-messages", &self.hits),
        ))
    }
}

fn counting_source(hits: &Arc<AtomicUsize>) -> RoleSource {
    RoleSource::instance(
        Arc::new(CountingRole { hits: hits.clone() }),
        Params::new(),
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn deployed_agent_runs_a_role_plan_per_matching_event() {
    let (host, _directory) = host_scope();
    let agent = Agent::new();
    agent.deploy(&host).await.unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    agent.add_role(counting_source(&hits)).await.unwrap();

    agent.start().await.unwrap();
    agent.notify(Message::new("inform", json!({"seq": 1})));

    wait_until(Duration::from_secs(2), || hits.load(Ordering::SeqCst) == 1).await;
    wait_until(Duration::from_secs(2), || {
        agent.state() == LifecycleState::Waiting
    })
    .await;
    agent.stop().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn structural_calls_while_running_report_gate_contention() {
    let (host, _directory) = host_scope();
    let agent = Agent::new();
    agent.deploy(&host).await.unwrap();
    agent.start().await.unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let err = agent.try_add_role(counting_source(&hits)).unwrap_err();
    assert!(matches!(err, Error::GateBusy { .. }));
    assert!(err.is_retriable());

    let err = agent
        .add_role_timeout(counting_source(&hits), Duration::from_millis(30))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::GateTimeout { .. }));
    assert!(err.is_retriable());

    let err = agent.try_clear_roles().unwrap_err();
    assert!(matches!(err, Error::GateBusy { .. }));

    // None of the rejected calls touched the role set.
    assert!(agent.roles().is_empty());
    agent.stop().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn blocking_add_role_waits_for_stop_then_succeeds() {
    let (host, _directory) = host_scope();
    let agent = Agent::new();
    agent.deploy(&host).await.unwrap();
    agent.start().await.unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let blocked = {
        let agent = agent.clone();
        let source = counting_source(&hits);
        tokio::spawn(async move { agent.add_role(source).await })
    };

    // The structural caller stays parked on the gate while the run is live.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!blocked.is_finished());
    assert!(agent.is_running());

    agent.stop().unwrap();
    blocked.await.unwrap().unwrap();
    assert_eq!(agent.state(), LifecycleState::Idle);
    assert_eq!(agent.roles().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn second_start_while_running_is_rejected_not_forked() {
    let (host, _directory) = host_scope();
    let agent = Agent::new();
    agent.deploy(&host).await.unwrap();
    agent.start().await.unwrap();

    let err = agent.try_start().unwrap_err();
    assert!(matches!(err, Error::GateBusy { .. }));

    let err = agent
        .start_timeout(Duration::from_millis(30))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::GateTimeout { .. }));

    agent.stop().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn blocking_restart_begins_a_fresh_run_after_stop() {
    let (host, _directory) = host_scope();
    let agent = Agent::new();
    agent.deploy(&host).await.unwrap();

    let starts = Arc::new(AtomicUsize::new(0));
    agent
        .add_start_plan(counting_plan("count-starts", &starts))
        .await
        .unwrap();

    agent.start().await.unwrap();
    wait_until(Duration::from_secs(2), || starts.load(Ordering::SeqCst) == 1).await;

    let restart = {
        let agent = agent.clone();
        tokio::spawn(async move { agent.start().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!restart.is_finished());

    agent.stop().unwrap();
    restart.await.unwrap().unwrap();
    wait_until(Duration::from_secs(2), || starts.load(Ordering::SeqCst) == 2).await;
    assert!(agent.is_running());
    agent.stop().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn undeployed_agent_rejects_everything_but_deploy() {
    let agent = Agent::new();
    let hits = Arc::new(AtomicUsize::new(0));

    let err = agent.add_role(counting_source(&hits)).await.unwrap_err();
    assert!(matches!(err, Error::NotDeployed { .. }));
    assert!(!err.is_retriable());

    let err = agent.start().await.unwrap_err();
    assert!(matches!(err, Error::NotDeployed { .. }));

    let err = agent.undeploy().await.unwrap_err();
    assert!(matches!(err, Error::NotDeployed { .. }));

    let err = agent.stop().unwrap_err();
    assert!(matches!(err, Error::AgentNotRunning { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn deploy_registers_and_undeploy_deregisters() {
    let (host, directory) = host_scope();
    let agent = Agent::new();

    agent.deploy(&host).await.unwrap();
    assert_eq!(agent.state(), LifecycleState::Idle);
    assert_eq!(directory.len().await, 1);
    assert!(agent.host_scope().is_some());
    let address = directory.lookup(agent.id()).await.unwrap().unwrap();
    assert!(address.is_live());

    agent.undeploy().await.unwrap();
    assert_eq!(agent.state(), LifecycleState::Unknown);
    assert_eq!(directory.len().await, 0);
    assert!(agent.host_scope().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn deploy_without_a_directory_rolls_back_to_unknown() {
    let host = Arc::new(ServiceScope::new());
    let agent = Agent::new();

    let err = agent.deploy(&host).await.unwrap_err();
    assert!(matches!(err, Error::DeploymentFailed { .. }));
    assert_eq!(agent.state(), LifecycleState::Unknown);
    assert!(agent.host_scope().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn deploy_with_a_rejecting_directory_withdraws_the_published_address() {
    struct RejectingDirectory;

    #[async_trait]
    impl AgentDirectory for RejectingDirectory {
        async fn register(
            &self,
            address: LocalAddress,
        ) -> DirectoryResult<Option<LocalAddress>> {
            Err(DirectoryError::not_registered(address.id()))
        }

        async fn deregister(&self, id: AgentId) -> DirectoryResult<()> {
            Err(DirectoryError::not_registered(id))
        }

        async fn lookup(&self, _id: AgentId) -> DirectoryResult<Option<LocalAddress>> {
            Ok(None)
        }

        async fn len(&self) -> usize {
            0
        }
    }

    let host = Arc::new(ServiceScope::new());
    host.put::<Arc<dyn AgentDirectory>>(Arc::new(RejectingDirectory));

    let agent = Agent::new();
    let err = agent.deploy(&host).await.unwrap_err();
    assert!(matches!(err, Error::DeploymentFailed { .. }));
    assert_eq!(agent.state(), LifecycleState::Unknown);
    assert!(agent.host_scope().is_none());

    // The host must not keep advertising an address for an agent that
    // reverted to undeployed.
    assert!(host
        .get_named::<LocalAddress>(&agent.id().to_string())
        .is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn deploy_while_running_is_rejected() {
    let (host, _directory) = host_scope();
    let agent = Agent::new();
    agent.deploy(&host).await.unwrap();
    agent.start().await.unwrap();

    let err = agent.deploy(&host).await.unwrap_err();
    assert!(matches!(err, Error::AgentRunning { .. }));

    agent.stop().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_during_stop_reports_already_stopping() {
    let (host, _directory) = host_scope();
    let agent = Agent::new();
    agent.deploy(&host).await.unwrap();
    agent
        .add_stop_plan(sleeping_plan("slow-stop", 200))
        .await
        .unwrap();

    agent.start().await.unwrap();
    agent.stop().unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    let err = agent.stop().unwrap_err();
    assert!(matches!(err, Error::AlreadyStopping { .. }));

    wait_until(Duration::from_secs(2), || {
        agent.state() == LifecycleState::Idle
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn roles_persist_across_runs_and_removal_retracts_plans() {
    let (host, _directory) = host_scope();
    let agent = Agent::new();
    agent.deploy(&host).await.unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let role = agent.add_role(counting_source(&hits)).await.unwrap();

    agent.start().await.unwrap();
    agent.notify(Message::new("inform", json!({"run": 1})));
    wait_until(Duration::from_secs(2), || hits.load(Ordering::SeqCst) == 1).await;
    agent.stop().unwrap();
    wait_until(Duration::from_secs(2), || {
        agent.state() == LifecycleState::Idle
    })
    .await;

    // Same role, second run.
    agent.start().await.unwrap();
    agent.notify(Message::new("inform", json!({"run": 2})));
    wait_until(Duration::from_secs(2), || hits.load(Ordering::SeqCst) == 2).await;
    agent.stop().unwrap();
    wait_until(Duration::from_secs(2), || {
        agent.state() == LifecycleState::Idle
    })
    .await;

    agent.remove_role(role).await.unwrap();
    assert!(agent.roles().is_empty());

    agent.start().await.unwrap();
    agent.notify(Message::new("inform", json!({"run": 3})));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    agent.stop().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn activate_is_idempotent_and_rejects_unknown_roles() {
    let (host, _directory) = host_scope();
    let agent = Agent::new();
    agent.deploy(&host).await.unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let role = agent.add_role(counting_source(&hits)).await.unwrap();

    agent.activate_role(role).await.unwrap();
    agent.activate_role(role).await.unwrap();

    let err = agent.activate_role(RoleId::random()).await.unwrap_err();
    assert!(matches!(err, Error::RoleNotFound { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn descriptor_roles_resolve_host_services_at_attach() {
    let (host, _directory) = host_scope();
    host.put(750u64);

    let agent = Agent::new();
    agent.deploy(&host).await.unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let descriptor = {
        let hits = hits.clone();
        RoleDescriptor::new("metered", move |scope| {
            let hits = hits.clone();
            scope
                .get::<u64>()
                .map(move |_rate| Arc::new(CountingRole { hits }) as Arc<dyn RoleBehavior>)
                .ok_or_else(|| Error::internal("u64 rate missing from scope"))
        })
    };

    agent
        .add_role(RoleSource::descriptor(descriptor, Params::new()))
        .await
        .unwrap();
    assert_eq!(agent.roles().len(), 1);
    // The attached role carries the behaviour's name, not the recipe's.
    assert_eq!(agent.roles()[0].name, "counting".to_string());
}

#[tokio::test(flavor = "multi_thread")]
async fn directory_delivery_reaches_the_running_agent() {
    let (host, directory) = host_scope();
    let agent = Agent::new();
    agent.deploy(&host).await.unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    agent.add_role(counting_source(&hits)).await.unwrap();
    agent.start().await.unwrap();

    directory
        .deliver(
            agent.id(),
            Message::new("request", json!({"op": "ping"})).with_sender(agent.id()),
        )
        .await
        .unwrap();

    wait_until(Duration::from_secs(2), || hits.load(Ordering::SeqCst) == 1).await;
    agent.stop().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn redeploy_into_a_different_host_replaces_the_registration() {
    let (first_host, first_directory) = host_scope();
    let (second_host, second_directory) = host_scope();

    let agent = Agent::new();
    agent.deploy(&first_host).await.unwrap();
    assert_eq!(first_directory.len().await, 1);

    // Redeploy from IDLE straight into the second host. The old hosting
    // is unwound first, so the first directory forgets the agent.
    agent.deploy(&second_host).await.unwrap();
    assert_eq!(agent.state(), LifecycleState::Idle);
    assert_eq!(first_directory.len().await, 0);
    assert_eq!(second_directory.len().await, 1);
    let address = second_directory.lookup(agent.id()).await.unwrap().unwrap();
    assert!(address.is_live());
}
