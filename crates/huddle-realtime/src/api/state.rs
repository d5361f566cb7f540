//! Application state shared across handlers.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::ws::Hub;

#[derive(Clone)]
pub struct AppState {
    /// The fan-out hub; shared with every connection actor.
    pub hub: Arc<Hub>,
    /// Process start time, reported by the health endpoint.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self {
            hub,
            started_at: Utc::now(),
        }
    }
}
