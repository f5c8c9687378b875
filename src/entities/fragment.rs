use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::Waypoint;

/// Fewest waypoints a fragment needs to contribute to a route.
pub const MIN_FRAGMENT_WAYPOINTS: usize = 2;

/// One contiguous run of waypoints as recorded in a single source log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFragment {
    pub id: String,
    pub trip_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub waypoints: Vec<Waypoint>,
    pub log_link: String,
}

impl LogFragment {
    pub fn new(
        id: impl Into<String>,
        trip_id: Uuid,
        timestamp: DateTime<Utc>,
        waypoints: Vec<Waypoint>,
        log_link: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            trip_id,
            timestamp,
            waypoints,
            log_link: log_link.into(),
        }
    }

    /// Reason this fragment cannot be used, if any.
    pub fn invalidity_reason(&self) -> Option<String> {
        match self.waypoints.len() {
            n if n >= MIN_FRAGMENT_WAYPOINTS => None,
            n => Some(format!(
                "has {} waypoint(s), at least {} required",
                n, MIN_FRAGMENT_WAYPOINTS
            )),
        }
    }
}
