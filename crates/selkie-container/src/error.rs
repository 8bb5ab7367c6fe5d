//! Container error types.

use thiserror::Error;

/// Result type alias for container operations.
pub type ContainerResult<T> = std::result::Result<T, ContainerError>;

/// Errors raised by the service scope and deploy hooks.
#[derive(Error, Debug)]
pub enum ContainerError {
    /// A required service is not registered anywhere in the scope chain.
    #[error("service not found in scope chain: {service}")]
    ServiceNotFound { service: String },

    /// A deploy hook refused to come up.
    #[error("deploy hook failed for {service}: {reason}")]
    HookFailed { service: String, reason: String },

    /// Linking a scope to this parent would close a cycle.
    #[error("scope parent link would form a cycle")]
    ParentCycle,
}

impl ContainerError {
    pub fn service_not_found(service: impl Into<String>) -> Self {
        Self::ServiceNotFound {
            service: service.into(),
        }
    }

    pub fn hook_failed(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::HookFailed {
            service: service.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_service() {
        let err = ContainerError::service_not_found("directory");
        assert!(err.to_string().contains("directory"));

        let err = ContainerError::hook_failed("belief-store", "no backing file");
        let text = err.to_string();
        assert!(text.contains("belief-store"));
        assert!(text.contains("no backing file"));
    }
}
