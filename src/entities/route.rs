use geo_types::{coord, Rect};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{RouteSegment, Waypoint};
use crate::error::AggregationError;

/// The result of aggregating the log fragments of one trip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedRoute {
    pub trip_id: Uuid,
    pub waypoints: Vec<Waypoint>,
    pub segments: Vec<RouteSegment>,
    pub fragment_count: usize,
    pub is_complete: bool,
    /// Non-fatal problems met while aggregating (fragments that were dropped).
    #[serde(skip)]
    pub warnings: Vec<AggregationError>,
}

impl UnifiedRoute {
    pub fn gap_count(&self) -> usize {
        self.segments.iter().filter(|s| s.is_gap()).count()
    }

    /// Distinct order ids in the order they are first visited.
    pub fn order_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = vec![];

        for id in self.waypoints.iter().filter_map(|w| w.order_id.as_ref()) {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }

        ids
    }

    /// Bounding box of every waypoint (x = longitude, y = latitude).
    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        let first = self.waypoints.first()?;
        let start = coord! { x: first.longitude, y: first.latitude };
        let (mut min, mut max) = (start, start);

        for w in &self.waypoints {
            min.x = min.x.min(w.longitude);
            min.y = min.y.min(w.latitude);
            max.x = max.x.max(w.longitude);
            max.y = max.y.max(w.latitude);
        }

        Some(Rect::new(min, max))
    }
}

#[test]
fn order_ids_are_distinct_and_ordered() {
    let route = UnifiedRoute {
        trip_id: Uuid::new_v4(),
        waypoints: vec![
            Waypoint::with_order(1.0, 1.0, "b"),
            Waypoint::with_order(1.1, 1.0, "a"),
            Waypoint::with_order(1.2, 1.0, "b"),
            Waypoint::new(1.3, 1.0),
        ],
        segments: vec![],
        fragment_count: 1,
        is_complete: true,
        warnings: vec![],
    };

    assert_eq!(route.order_ids(), vec!["b".to_string(), "a".to_string()]);

    let rect = route.bounding_rect().unwrap();
    assert_eq!(rect.min().y, 1.0);
    assert_eq!(rect.max().y, 1.3);
}
