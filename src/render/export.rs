use serde_json::{json, Map, Value};

use crate::entities::{RouteSegment, TripMap, Waypoint};

/// Machine-readable export of a trip map, also embedded in the HTML page.
pub fn trip_data(trip_map: &TripMap) -> Value {
    let route = &trip_map.route;

    json!({
        "tripId": route.trip_id,
        "fragmentCount": route.fragment_count,
        "isComplete": route.is_complete,
        "logsTruncated": trip_map.logs_truncated,
        "gapCount": route.gap_count(),
        "bounds": route.bounding_rect().map(|rect| json!({
            "south": rect.min().y,
            "west": rect.min().x,
            "north": rect.max().y,
            "east": rect.max().x,
        })),
        "segments": route.segments.iter().map(segment).collect::<Vec<_>>(),
        "waypoints": route.waypoints.iter().map(point).collect::<Vec<_>>(),
        "orders": trip_map.orders,
        "locations": trip_map.locations,
        "logLinks": trip_map.log_links,
    })
}

fn segment(segment: &RouteSegment) -> Value {
    let mut map = Map::new();

    map.insert("type".into(), json!(segment.segment_type.name()));
    if let Some(id) = &segment.source_fragment_id {
        map.insert("sourceFragmentId".into(), json!(id));
    }
    map.insert(
        "waypoints".into(),
        Value::Array(segment.waypoints.iter().map(point).collect()),
    );

    Value::Object(map)
}

fn point(waypoint: &Waypoint) -> Value {
    let mut map = Map::new();

    map.insert("latitude".into(), json!(waypoint.latitude));
    map.insert("longitude".into(), json!(waypoint.longitude));
    if let Some(id) = &waypoint.order_id {
        map.insert("orderId".into(), json!(id));
    }

    Value::Object(map)
}

#[cfg(test)]
pub(crate) fn sample_trip_map() -> TripMap {
    use crate::entities::{Address, Coordinates, OrderDetails, UnifiedRoute};

    let first = vec![
        Waypoint::new(37.70, -122.30).tagged("f1"),
        Waypoint::new(37.71, -122.31).tagged("f1"),
    ];
    let second = vec![
        Waypoint {
            order_id: Some("o-1".into()),
            ..Waypoint::new(37.80, -122.40).tagged("f2")
        },
        Waypoint::new(37.81, -122.41).tagged("f2"),
    ];

    let segments = vec![
        RouteSegment::continuous(first.clone(), "f1"),
        RouteSegment::gap(first[1].clone(), second[0].clone()),
        RouteSegment::continuous(second.clone(), "f2"),
    ];

    let route = UnifiedRoute {
        trip_id: uuid::Uuid::new_v4(),
        waypoints: first.into_iter().chain(second).collect(),
        segments,
        fragment_count: 2,
        is_complete: false,
        warnings: vec![],
    };

    let mut trip_map = TripMap::new(
        route,
        vec!["https://app.datadoghq.com/logs?event=f1".into()],
    );
    trip_map.orders.push(OrderDetails {
        order_id: "o-1".into(),
        address: Some(Address {
            address1: "1 Main St".into(),
            address2: None,
            city: "Oakland".into(),
            state: "CA".into(),
            zip: "94607".into(),
        }),
        coordinates: Some(Coordinates {
            latitude: 37.80,
            longitude: -122.40,
        }),
        location_number: Some("loc-42".into()),
    });

    trip_map
}

#[test]
fn trip_data_shape() {
    let trip_map = sample_trip_map();
    let data = trip_data(&trip_map);

    assert_eq!(data["tripId"], trip_map.trip_id().to_string());
    assert_eq!(data["fragmentCount"], 2);
    assert_eq!(data["isComplete"], false);
    assert_eq!(data["logsTruncated"], false);
    assert_eq!(data["gapCount"], 1);
    assert_eq!(data["bounds"]["south"], 37.70);
    assert_eq!(data["bounds"]["west"], -122.41);

    let segments = data["segments"].as_array().unwrap();
    assert_eq!(segments.len(), 3);
    assert_eq!(segments[0]["type"], "continuous");
    assert_eq!(segments[0]["sourceFragmentId"], "f1");
    assert_eq!(segments[1]["type"], "gap");
    assert!(segments[1].get("sourceFragmentId").is_none());

    let waypoints = data["waypoints"].as_array().unwrap();
    assert_eq!(waypoints.len(), 4);
    assert!(waypoints[0].get("fragmentId").is_none());
    assert!(waypoints[0].get("orderId").is_none());
    assert_eq!(waypoints[2]["orderId"], "o-1");

    assert_eq!(data["orders"][0]["orderId"], "o-1");
    assert_eq!(data["logLinks"].as_array().unwrap().len(), 1);
}
