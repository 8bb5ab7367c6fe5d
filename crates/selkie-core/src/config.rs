//! Agent tuning knobs.

use crate::constants::{MAILBOX_DEPTH_WARN_DEFAULT, SLOW_PLAN_WARN_MS_DEFAULT};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Observability watermarks for one agent.
///
/// Both knobs only control logging: the mailbox never rejects an offer and a
/// slow plan is never preempted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Mailbox depth above which each offer logs a warning.
    #[serde(default = "default_mailbox_depth_warn")]
    pub mailbox_depth_warn: usize,

    /// Plan invocations running longer than this log a warning on completion.
    #[serde(default = "default_slow_plan_warn_ms")]
    pub slow_plan_warn_ms: u64,
}

fn default_mailbox_depth_warn() -> usize {
    MAILBOX_DEPTH_WARN_DEFAULT
}

fn default_slow_plan_warn_ms() -> u64 {
    SLOW_PLAN_WARN_MS_DEFAULT
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            mailbox_depth_warn: default_mailbox_depth_warn(),
            slow_plan_warn_ms: default_slow_plan_warn_ms(),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.mailbox_depth_warn == 0 {
            return Err(Error::invalid_config("mailbox_depth_warn must be positive"));
        }
        if self.slow_plan_warn_ms == 0 {
            return Err(Error::invalid_config("slow_plan_warn_ms must be positive"));
        }
        Ok(())
    }
}
