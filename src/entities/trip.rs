use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{LocationDetails, OrderDetails, UnifiedRoute};

/// Everything needed to render and export the map of one trip.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripMap {
    pub route: UnifiedRoute,
    pub orders: Vec<OrderDetails>,
    pub locations: Vec<LocationDetails>,
    pub log_links: Vec<String>,
    /// Set when the log search hit its page limit, so fragments may be missing.
    #[serde(default)]
    pub logs_truncated: bool,
}

impl TripMap {
    pub fn new(route: UnifiedRoute, log_links: Vec<String>) -> Self {
        Self {
            route,
            orders: vec![],
            locations: vec![],
            log_links,
            logs_truncated: false,
        }
    }

    pub fn trip_id(&self) -> Uuid {
        self.route.trip_id
    }

    pub fn file_stem(&self) -> String {
        format!("trip-{}", self.route.trip_id)
    }
}
