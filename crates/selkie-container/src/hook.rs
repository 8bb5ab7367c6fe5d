//! Deploy-time lifecycle hooks.

use crate::error::ContainerResult;
use crate::scope::ServiceScope;
use async_trait::async_trait;
use std::sync::Arc;

/// A service that participates in agent deployment.
///
/// Hooks run once, after the agent's scope has been linked to its host, in
/// the order the services were installed. A hook resolves whatever it needs
/// from the composed scope; there is no field injection, the hook pulls its
/// own dependencies.
#[async_trait]
pub trait ServiceHook: Send + Sync {
    /// Stable name used in logs and hook-failure errors.
    fn name(&self) -> &str;

    /// Called during deployment with the fully linked scope.
    async fn on_deploy(&self, scope: &Arc<ServiceScope>) -> ContainerResult<()>;

    /// Called during teardown, in reverse installation order. Best effort;
    /// failures are logged by the caller and do not abort teardown.
    async fn on_undeploy(&self, _scope: &Arc<ServiceScope>) -> ContainerResult<()> {
        Ok(())
    }
}
