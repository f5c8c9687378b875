use serde::{Deserialize, Serialize};

use crate::entities::Waypoint;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentType {
    Continuous,
    Gap,
}

impl SegmentType {
    pub fn name(&self) -> String {
        match self {
            Self::Continuous => "continuous".into(),
            Self::Gap => "gap".into(),
        }
    }
}

/// A renderable piece of a reconstructed route.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSegment {
    pub waypoints: Vec<Waypoint>,
    #[serde(rename = "type")]
    pub segment_type: SegmentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_fragment_id: Option<String>,
}

impl RouteSegment {
    pub fn continuous(waypoints: Vec<Waypoint>, source_fragment_id: impl Into<String>) -> Self {
        Self {
            waypoints,
            segment_type: SegmentType::Continuous,
            source_fragment_id: Some(source_fragment_id.into()),
        }
    }

    /// Synthetic bridge between the end of one fragment and the start of the next.
    pub fn gap(from: Waypoint, to: Waypoint) -> Self {
        Self {
            waypoints: vec![from, to],
            segment_type: SegmentType::Gap,
            source_fragment_id: None,
        }
    }

    pub fn is_gap(&self) -> bool {
        match self.segment_type {
            SegmentType::Gap => true,
            _ => false,
        }
    }
}

#[test]
fn gap_segment_has_two_points_and_no_source() {
    let segment = RouteSegment::gap(Waypoint::new(1.0, 2.0), Waypoint::new(3.0, 4.0));

    assert!(segment.is_gap());
    assert_eq!(segment.waypoints.len(), 2);
    assert_eq!(segment.source_fragment_id, None);
}
