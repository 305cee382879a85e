//! Mock NetworkActuator for unit testing
//!
//! Records every executed command in memory and can be configured to fail
//! commands matching a pattern.

use crate::actuator_trait::NetworkActuator;
use crate::error::ActuatorError;
use crate::target::HostTarget;
use std::sync::{Arc, Mutex, PoisonError};

/// One recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedCommand {
    pub target: HostTarget,
    pub command: String,
}

/// Mock actuator for testing
#[derive(Debug, Clone, Default)]
pub struct MockActuator {
    executed: Arc<Mutex<Vec<ExecutedCommand>>>,
    failing: Arc<Mutex<Vec<String>>>,
}

impl MockActuator {
    /// Create a new mock actuator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every command containing `pattern` (for test setup)
    pub fn fail_when(&self, pattern: impl Into<String>) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(pattern.into());
    }

    /// Stop failing commands
    pub fn clear_failures(&self) {
        self.failing.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// All calls so far, including failed ones
    #[must_use]
    pub fn executed(&self) -> Vec<ExecutedCommand> {
        self.executed.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of calls whose command contains `pattern`
    #[must_use]
    pub fn count_containing(&self, pattern: &str) -> usize {
        self.executed()
            .iter()
            .filter(|c| c.command.contains(pattern))
            .count()
    }

    /// Forget recorded calls
    pub fn reset(&self) {
        self.executed.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[async_trait::async_trait]
impl NetworkActuator for MockActuator {
    async fn execute(&self, target: &HostTarget, command: &str) -> Result<(), ActuatorError> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ExecutedCommand {
                target: target.clone(),
                command: command.to_string(),
            });

        let failing = self.failing.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pattern) = failing.iter().find(|p| command.contains(p.as_str())) {
            return Err(ActuatorError::Api(format!("mock failure for pattern {}", pattern)));
        }
        Ok(())
    }
}
