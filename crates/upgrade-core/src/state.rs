use serde::Serialize;

/// What the orchestrator knows about the live service, threaded through
/// every step that can change it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceState {
    /// Whether the service may be accepting traffic.
    pub server_up: bool,
    pub caches_filled: bool,
}

impl Default for ServiceState {
    fn default() -> Self {
        Self {
            server_up: true,
            caches_filled: false,
        }
    }
}

/// Outcome of the change-detection probes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangePlan {
    pub migrations_needed: bool,
    pub puppet_changes_pending: bool,
}

impl ChangePlan {
    pub fn requires_disruption(&self) -> bool {
        self.migrations_needed || self.puppet_changes_pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_starts_up_with_cold_caches() {
        let state = ServiceState::default();
        assert!(state.server_up);
        assert!(!state.caches_filled);
    }

    #[test]
    fn plan_disruption() {
        assert!(!ChangePlan::default().requires_disruption());
        let plan = ChangePlan {
            migrations_needed: true,
            puppet_changes_pending: false,
        };
        assert!(plan.requires_disruption());
    }
}
