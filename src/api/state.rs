//! API shared state

use std::sync::Arc;

use crate::orchestrator::Remediator;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    pub remediator: Arc<Remediator>,
}

impl ApiState {
    pub fn new(remediator: Remediator) -> Self {
        Self {
            remediator: Arc::new(remediator),
        }
    }
}
