//! Reconstruction of a single trip route from crash-fragmented log recordings.
//!
//! Fragments are ordered by timestamp (stable for ties), consecutive fragments
//! further apart than the gap threshold are bridged with a [`SegmentType::Gap`]
//! segment, and a fragment whose first point repeats the last accumulated point
//! loses that point.
//!
//! Deduplication only looks at fragment seams: the first waypoint of a fragment
//! is compared to the last accumulated waypoint and nothing else. Several
//! leading near-duplicates within one fragment are kept.

use chrono::Duration;

use crate::entities::{LogFragment, RouteSegment, UnifiedRoute, Waypoint};
use crate::error::AggregationError;

/// Two waypoints closer than this on both axes (about one meter at the
/// equator) are the same physical point.
pub const DEDUP_TOLERANCE_DEGREES: f64 = 1e-5;

/// Default time between fragments above which a gap is drawn.
pub fn default_gap_threshold() -> Duration {
    Duration::seconds(300)
}

#[tracing::instrument(skip(fragments), fields(fragments = fragments.len()))]
pub fn aggregate(
    fragments: &[LogFragment],
    gap_threshold: Duration,
) -> Result<UnifiedRoute, AggregationError> {
    let first = fragments.first().ok_or(AggregationError::EmptyFragments)?;
    let trip_id = first.trip_id;

    if let Some(other) = fragments.iter().find(|f| f.trip_id != trip_id) {
        return Err(AggregationError::TripIdMismatch {
            expected: trip_id,
            found: other.trip_id,
        });
    }

    if fragments.len() == 1 {
        return aggregate_single(first);
    }

    let mut warnings = vec![];
    let mut valid: Vec<&LogFragment> = Vec::with_capacity(fragments.len());

    for fragment in fragments {
        match fragment.invalidity_reason() {
            None => valid.push(fragment),
            Some(reason) => {
                tracing::warn!("dropping fragment {}: {}", fragment.id, reason);
                warnings.push(AggregationError::InvalidFragment {
                    id: fragment.id.clone(),
                    reason,
                });
            }
        }
    }

    if valid.is_empty() {
        return Err(AggregationError::AllFragmentsInvalid);
    }

    // stable: fragments sharing a timestamp keep their input order
    valid.sort_by_key(|f| f.timestamp);

    let mut waypoints: Vec<Waypoint> = vec![];
    let mut segments: Vec<RouteSegment> = vec![];
    let mut previous: Option<&LogFragment> = None;

    for current in valid.iter().copied() {
        if let Some(previous) = previous {
            if let Some(gap) = gap_between(previous, current, gap_threshold) {
                segments.push(gap);
            }
        }

        let mut tagged: Vec<Waypoint> = current
            .waypoints
            .iter()
            .map(|w| w.tagged(&current.id))
            .collect();

        let repeats_previous = match (waypoints.last(), tagged.first()) {
            (Some(last), Some(head)) => head.is_near(last, DEDUP_TOLERANCE_DEGREES),
            _ => false,
        };

        if repeats_previous {
            tracing::debug!("fragment {} repeats the previous point, dropping it", current.id);
            tagged.remove(0);
        }

        if !tagged.is_empty() {
            waypoints.extend(tagged.iter().cloned());
            segments.push(RouteSegment::continuous(tagged, current.id.clone()));
        }

        previous = Some(current);
    }

    let fragment_count = valid.len();

    Ok(UnifiedRoute {
        trip_id,
        waypoints,
        segments,
        fragment_count,
        is_complete: fragment_count == fragments.len(),
        warnings,
    })
}

fn aggregate_single(fragment: &LogFragment) -> Result<UnifiedRoute, AggregationError> {
    if let Some(reason) = fragment.invalidity_reason() {
        return Err(AggregationError::InvalidFragment {
            id: fragment.id.clone(),
            reason,
        });
    }

    let waypoints: Vec<Waypoint> = fragment
        .waypoints
        .iter()
        .map(|w| w.tagged(&fragment.id))
        .collect();

    Ok(UnifiedRoute {
        trip_id: fragment.trip_id,
        waypoints: waypoints.clone(),
        segments: vec![RouteSegment::continuous(waypoints, fragment.id.clone())],
        fragment_count: 1,
        is_complete: true,
        warnings: vec![],
    })
}

fn gap_between(
    previous: &LogFragment,
    current: &LogFragment,
    gap_threshold: Duration,
) -> Option<RouteSegment> {
    if current.timestamp - previous.timestamp <= gap_threshold {
        return None;
    }

    let from = previous.waypoints.last()?;
    let to = current.waypoints.first()?;

    tracing::debug!(
        "gap of {}s between fragments {} and {}",
        (current.timestamp - previous.timestamp).num_seconds(),
        previous.id,
        current.id
    );

    Some(RouteSegment::gap(from.clone(), to.clone()))
}

#[cfg(test)]
fn fragment(id: &str, trip_id: uuid::Uuid, seconds: i64, points: &[(f64, f64)]) -> LogFragment {
    use chrono::{TimeZone, Utc};

    LogFragment::new(
        id,
        trip_id,
        Utc.timestamp_opt(seconds, 0).unwrap(),
        points.iter().map(|&(lat, lng)| Waypoint::new(lat, lng)).collect(),
        format!("https://app.datadoghq.com/logs?event={}", id),
    )
}

#[test]
fn empty_input_fails() {
    assert_eq!(
        aggregate(&[], default_gap_threshold()),
        Err(AggregationError::EmptyFragments)
    );
}

#[test]
fn single_fragment_short_circuits() {
    let trip_id = uuid::Uuid::new_v4();
    let points = [(37.77, -122.41), (37.78, -122.42), (37.79, -122.43)];
    let f1 = fragment("f1", trip_id, 1000, &points);

    let route = aggregate(&[f1], default_gap_threshold()).unwrap();

    assert_eq!(route.trip_id, trip_id);
    assert_eq!(route.segments.len(), 1);
    assert_eq!(route.segments[0].source_fragment_id.as_deref(), Some("f1"));
    assert_eq!(route.waypoints.len(), 3);
    assert!(route.waypoints.iter().all(|w| w.fragment_id.as_deref() == Some("f1")));
    assert_eq!(route.fragment_count, 1);
    assert!(route.is_complete);
}

#[test]
fn single_invalid_fragment_fails() {
    let f1 = fragment("f1", uuid::Uuid::new_v4(), 1000, &[(37.77, -122.41)]);

    match aggregate(&[f1], default_gap_threshold()) {
        Err(AggregationError::InvalidFragment { id, .. }) => assert_eq!(id, "f1"),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn mismatched_trip_ids_fail() {
    let expected = uuid::Uuid::new_v4();
    let found = uuid::Uuid::new_v4();
    let f1 = fragment("f1", expected, 1000, &[(1.0, 1.0), (1.1, 1.1)]);
    let f2 = fragment("f2", found, 1100, &[(1.2, 1.2), (1.3, 1.3)]);

    assert_eq!(
        aggregate(&[f1, f2], default_gap_threshold()),
        Err(AggregationError::TripIdMismatch { expected, found })
    );
}

#[test]
fn all_invalid_fragments_fail() {
    let trip_id = uuid::Uuid::new_v4();
    let f1 = fragment("f1", trip_id, 1000, &[(1.0, 1.0)]);
    let f2 = fragment("f2", trip_id, 1100, &[]);

    assert_eq!(
        aggregate(&[f1, f2], default_gap_threshold()),
        Err(AggregationError::AllFragmentsInvalid)
    );
}

#[test]
fn two_far_apart_fragments_are_bridged_by_a_gap() {
    use crate::entities::SegmentType;

    let trip_id = uuid::Uuid::new_v4();
    let f1 = fragment("f1", trip_id, 1000, &[(37.77, -122.41), (37.78, -122.42)]);
    let f2 = fragment("f2", trip_id, 1400, &[(37.80, -122.44), (37.81, -122.45)]);

    let route = aggregate(&[f1, f2], Duration::seconds(300)).unwrap();

    let types: Vec<SegmentType> = route.segments.iter().map(|s| s.segment_type).collect();
    assert_eq!(
        types,
        vec![SegmentType::Continuous, SegmentType::Gap, SegmentType::Continuous]
    );
    assert_eq!(route.segments[0].source_fragment_id.as_deref(), Some("f1"));
    assert_eq!(route.segments[1].source_fragment_id, None);
    assert_eq!(route.segments[2].source_fragment_id.as_deref(), Some("f2"));
    assert_eq!(route.fragment_count, 2);
    assert!(route.is_complete);
    assert_eq!(route.waypoints.len(), 4);

    let gap = &route.segments[1];
    assert_eq!(gap.waypoints.len(), 2);
    assert_eq!((gap.waypoints[0].latitude, gap.waypoints[0].longitude), (37.78, -122.42));
    assert_eq!((gap.waypoints[1].latitude, gap.waypoints[1].longitude), (37.80, -122.44));
}

#[test]
fn gap_threshold_is_strict() {
    let trip_id = uuid::Uuid::new_v4();
    let threshold = Duration::seconds(300);
    let points_a = [(1.0, 1.0), (1.1, 1.1)];
    let points_b = [(1.2, 1.2), (1.3, 1.3)];

    let at_threshold = [
        fragment("f1", trip_id, 1000, &points_a),
        fragment("f2", trip_id, 1300, &points_b),
    ];
    assert_eq!(aggregate(&at_threshold, threshold).unwrap().gap_count(), 0);

    let mut just_over = at_threshold.clone();
    just_over[1].timestamp = just_over[1].timestamp + Duration::milliseconds(1);
    assert_eq!(aggregate(&just_over, threshold).unwrap().gap_count(), 1);
}

#[test]
fn seam_duplicate_is_dropped_once() {
    let trip_id = uuid::Uuid::new_v4();
    let f1 = fragment("f1", trip_id, 1000, &[(37.77, -122.41), (37.78, -122.42)]);
    let f2 = fragment(
        "f2",
        trip_id,
        1010,
        &[(37.780005, -122.420005), (37.780006, -122.420006), (37.79, -122.43)],
    );

    let route = aggregate(&[f1, f2], default_gap_threshold()).unwrap();

    assert_eq!(route.waypoints.len(), 4);
    assert_eq!(route.segments[1].waypoints.len(), 2);
    assert_eq!(route.segments[1].waypoints[0].latitude, 37.780006);
    assert!(route
        .segments
        .iter()
        .all(|s| s.waypoints.iter().all(|w| w.fragment_id == s.source_fragment_id)));
}

#[test]
fn seam_points_beyond_tolerance_are_kept() {
    let trip_id = uuid::Uuid::new_v4();
    let f1 = fragment("f1", trip_id, 1000, &[(37.77, -122.41), (37.78, -122.42)]);
    let f2 = fragment("f2", trip_id, 1010, &[(37.78002, -122.42), (37.79, -122.43)]);
    let f3 = fragment("f3", trip_id, 1020, &[(37.79, -122.43002), (37.80, -122.44)]);

    let route = aggregate(&[f1, f2, f3], default_gap_threshold()).unwrap();

    assert_eq!(route.waypoints.len(), 6);
    assert_eq!(route.gap_count(), 0);
}

#[test]
fn seam_duplicate_keeps_the_rest_of_the_fragment() {
    let trip_id = uuid::Uuid::new_v4();
    let f1 = fragment("f1", trip_id, 1000, &[(1.0, 1.0), (1.1, 1.1)]);
    let f2 = fragment("f2", trip_id, 1010, &[(1.1, 1.1), (1.2, 1.2)]);

    let route = aggregate(&[f1, f2], default_gap_threshold()).unwrap();

    assert_eq!(route.segments.len(), 2);
    assert_eq!(route.waypoints.len(), 3);
}

#[test]
fn invalid_fragments_are_dropped_and_reported() {
    let trip_id = uuid::Uuid::new_v4();
    let f1 = fragment("f1", trip_id, 1000, &[(1.0, 1.0), (1.1, 1.1)]);
    let broken = fragment("broken", trip_id, 1005, &[(5.0, 5.0)]);
    let f2 = fragment("f2", trip_id, 1010, &[(1.2, 1.2), (1.3, 1.3)]);

    let route = aggregate(&[f1, broken, f2], default_gap_threshold()).unwrap();

    assert_eq!(route.fragment_count, 2);
    assert!(!route.is_complete);
    assert_eq!(route.fragment_count == 3, route.is_complete);
    assert_eq!(route.warnings.len(), 1);
    assert!(route.waypoints.iter().all(|w| w.fragment_id.as_deref() != Some("broken")));
}

#[test]
fn any_permutation_yields_the_same_segments() {
    use rand::seq::SliceRandom;

    let trip_id = uuid::Uuid::new_v4();
    let fragments = vec![
        fragment("f1", trip_id, 1000, &[(1.0, 1.0), (1.1, 1.1)]),
        fragment("f2", trip_id, 1100, &[(1.2, 1.2), (1.3, 1.3)]),
        fragment("f3", trip_id, 2000, &[(1.4, 1.4), (1.5, 1.5)]),
        fragment("f4", trip_id, 2050, &[(1.5, 1.5), (1.6, 1.6)]),
        fragment("f5", trip_id, 9000, &[(1.7, 1.7), (1.8, 1.8)]),
    ];
    let expected = aggregate(&fragments, default_gap_threshold()).unwrap();

    let mut rng = rand::thread_rng();
    for _ in 0..50 {
        let mut shuffled = fragments.clone();
        shuffled.shuffle(&mut rng);

        let route = aggregate(&shuffled, default_gap_threshold()).unwrap();
        assert_eq!(route.segments, expected.segments);
        assert_eq!(route.waypoints, expected.waypoints);
    }
}

#[test]
fn equal_timestamps_keep_input_order() {
    let trip_id = uuid::Uuid::new_v4();
    let a = fragment("a", trip_id, 1000, &[(1.0, 1.0), (1.1, 1.1)]);
    let b = fragment("b", trip_id, 1000, &[(2.0, 2.0), (2.1, 2.1)]);

    let forward = aggregate(&[a.clone(), b.clone()], default_gap_threshold()).unwrap();
    let backward = aggregate(&[b, a], default_gap_threshold()).unwrap();

    let sources = |route: &UnifiedRoute| -> Vec<Option<String>> {
        route.segments.iter().map(|s| s.source_fragment_id.clone()).collect()
    };
    assert_eq!(sources(&forward), vec![Some("a".into()), Some("b".into())]);
    assert_eq!(sources(&backward), vec![Some("b".into()), Some("a".into())]);
}
