//! Extraction of typed route data from loosely structured log payloads.
//!
//! Services log their responses in different shapes: coordinates may be flat
//! (`{"lat": .., "lng": ..}`) or nested (`{"orderId": .., "coordinates":
//! {"latitude": .., "longitude": ..}}`), numbers may be strings, and bodies may
//! be JSON-encoded strings. Everything past this module only sees
//! [`Waypoint`]s and [`LogFragment`]s.

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::entities::{Address, Coordinates, LocationDetails, LogFragment, OrderDetails, Waypoint};
use crate::external::datadog::LogEvent;

const LATITUDE_KEYS: [&str; 2] = ["latitude", "lat"];
const LONGITUDE_KEYS: [&str; 3] = ["longitude", "lng", "lon"];
const ORDER_ID_KEYS: [&str; 3] = ["orderId", "order_id", "orderID"];
const TRIP_ID_KEYS: [&str; 3] = ["tripId", "trip_id", "tripID"];
const LOCATION_NUMBER_KEYS: [&str; 3] = ["locationNumber", "location_number", "restaurantNumber"];
const LOCATION_NAME_KEYS: [&str; 3] = ["locationName", "restaurantName", "name"];

const ADDRESS1_KEYS: [&str; 4] = ["address1", "addressLine1", "line1", "street"];
const ADDRESS2_KEYS: [&str; 3] = ["address2", "addressLine2", "line2"];
const CITY_KEYS: [&str; 2] = ["city", "locality"];
const STATE_KEYS: [&str; 3] = ["state", "stateCode", "region"];
const ZIP_KEYS: [&str; 3] = ["zip", "zipCode", "postalCode"];

/// Subtrees holding the planned (not driven) route.
const PLANNED_PREFIX: &str = "planned";

/// The response payload of a log event, decoded when it was logged as a JSON string.
pub fn response_body(event: &LogEvent) -> Option<Value> {
    let attributes = &event.attributes.attributes;

    let candidates = [
        attributes.get("response_body"),
        attributes.get("response"),
        attributes.get("body"),
    ];

    let body = candidates
        .into_iter()
        .flatten()
        .find(|value| !value.is_null())
        .cloned()
        .or_else(|| {
            let message = event.attributes.message.as_ref()?;
            (!message.is_empty()).then(|| Value::String(message.clone()))
        })
        .or_else(|| match attributes {
            Value::Object(map) if !map.is_empty() => Some(attributes.clone()),
            _ => None,
        })?;

    match body {
        Value::String(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(value @ (Value::Object(_) | Value::Array(_))) => Some(value),
            _ => Some(Value::String(raw)),
        },
        value => Some(value),
    }
}

/// Every valid point of the payload in document order, skipping planned routes.
pub fn extract_waypoints(value: &Value) -> Vec<Waypoint> {
    let mut waypoints = vec![];
    collect_waypoints(value, None, &mut waypoints);
    waypoints
}

fn collect_waypoints(value: &Value, order_id: Option<&str>, waypoints: &mut Vec<Waypoint>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_waypoints(item, order_id, waypoints);
            }
        }
        Value::Object(map) => {
            let own_order_id = string_field(map, &ORDER_ID_KEYS);
            let order_id = own_order_id.as_deref().or(order_id);

            if let Some((latitude, longitude)) = point(map) {
                let waypoint = Waypoint {
                    order_id: order_id.map(String::from),
                    ..Waypoint::new(latitude, longitude)
                };

                if waypoint.is_valid() {
                    waypoints.push(waypoint);
                } else {
                    tracing::debug!("rejecting out of range point ({}, {})", latitude, longitude);
                }
                return;
            }

            for (key, child) in map {
                if key.to_lowercase().starts_with(PLANNED_PREFIX) {
                    continue;
                }
                collect_waypoints(child, order_id, waypoints);
            }
        }
        _ => (),
    }
}

fn point(map: &Map<String, Value>) -> Option<(f64, f64)> {
    let latitude = LATITUDE_KEYS.iter().find_map(|k| map.get(*k).and_then(number))?;
    let longitude = LONGITUDE_KEYS.iter().find_map(|k| map.get(*k).and_then(number))?;

    Some((latitude, longitude))
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn string_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match map.get(*k)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// First string (or number) found under any of `keys`, searching depth first.
pub fn find_string(value: &Value, keys: &[&str]) -> Option<String> {
    match value {
        Value::Object(map) => string_field(map, keys)
            .or_else(|| map.values().find_map(|child| find_string(child, keys))),
        Value::Array(items) => items.iter().find_map(|item| find_string(item, keys)),
        _ => None,
    }
}

fn find_object<'a>(
    value: &'a Value,
    predicate: &dyn Fn(&Map<String, Value>) -> bool,
) -> Option<&'a Map<String, Value>> {
    match value {
        Value::Object(map) if predicate(map) => Some(map),
        Value::Object(map) => map.values().find_map(|child| find_object(child, predicate)),
        Value::Array(items) => items.iter().find_map(|item| find_object(item, predicate)),
        _ => None,
    }
}

pub fn find_address(value: &Value) -> Option<Address> {
    let has_street = |map: &Map<String, Value>| string_field(map, &ADDRESS1_KEYS).is_some();
    let map = find_object(value, &has_street)?;

    Some(Address {
        address1: string_field(map, &ADDRESS1_KEYS).unwrap_or_default(),
        address2: string_field(map, &ADDRESS2_KEYS),
        city: string_field(map, &CITY_KEYS).unwrap_or_default(),
        state: string_field(map, &STATE_KEYS).unwrap_or_default(),
        zip: string_field(map, &ZIP_KEYS).unwrap_or_default(),
    })
}

pub fn find_trip_id(value: &Value) -> Option<Uuid> {
    find_string(value, &TRIP_ID_KEYS).and_then(|id| Uuid::parse_str(&id).ok())
}

/// Builds the route fragment recorded by a route-details log event.
///
/// The trip id comes from the payload (or the event attributes) when present,
/// `trip_id` otherwise. Events without a payload yield `None`.
pub fn fragment_from_event(event: &LogEvent, trip_id: Uuid, site: &str) -> Option<LogFragment> {
    let body = response_body(event)?;

    let trip_id = find_trip_id(&body)
        .or_else(|| find_trip_id(&event.attributes.attributes))
        .unwrap_or(trip_id);

    Some(LogFragment::new(
        event.id.clone(),
        trip_id,
        event.attributes.timestamp,
        extract_waypoints(&body),
        event.link(site),
    ))
}

pub fn order_details(body: &Value, order_id: &str) -> OrderDetails {
    OrderDetails {
        order_id: order_id.into(),
        address: find_address(body),
        coordinates: extract_waypoints(body).first().map(Coordinates::from),
        location_number: find_string(body, &LOCATION_NUMBER_KEYS),
    }
}

pub fn location_details(body: &Value, location_number: &str) -> LocationDetails {
    LocationDetails {
        location_number: location_number.into(),
        name: find_string(body, &LOCATION_NAME_KEYS),
        address: find_address(body),
        coordinates: extract_waypoints(body).first().map(Coordinates::from),
    }
}

/// Case-insensitive presence of each field name anywhere in the event.
pub fn check_fields(event: &LogEvent, fields: &[&str]) -> Vec<(String, bool)> {
    let serialized = serde_json::to_string(event)
        .unwrap_or_default()
        .to_lowercase();

    fields
        .iter()
        .map(|field| (field.to_string(), serialized.contains(&field.to_lowercase())))
        .collect()
}

#[cfg(test)]
fn event(id: &str, attributes: Value) -> LogEvent {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "attributes": {
            "timestamp": "2024-05-01T12:00:00Z",
            "message": "handled request for GetRouteDetailsForTrip",
            "attributes": attributes,
        }
    }))
    .unwrap()
}

#[test]
fn extracts_flat_and_nested_points_in_order() {
    let body = serde_json::json!({
        "routeSegments": [{
            "planned": [{ "lat": 1.0, "lng": 1.0 }],
            "actual": [
                { "lat": 37.77, "lng": -122.41 },
                { "orderId": "o-1", "coordinates": { "latitude": "37.78", "longitude": "-122.42" } },
                { "latitude": 95.0, "longitude": 0.0 },
                { "lat": 37.79, "lon": -122.43 }
            ]
        }]
    });

    let waypoints = extract_waypoints(&body);

    assert_eq!(
        waypoints,
        vec![
            Waypoint::new(37.77, -122.41),
            Waypoint::with_order(37.78, -122.42, "o-1"),
            Waypoint::new(37.79, -122.43),
        ]
    );
    assert!(waypoints.iter().all(|w| w.fragment_id.is_none()));
}

#[test]
fn malformed_points_are_skipped() {
    let body = serde_json::json!([
        { "lat": "north", "lng": 1.0 },
        { "lat": 1.0 },
        { "lat": null, "lng": 2.0 },
        { "lat": 2.0, "lng": 3.0 }
    ]);

    assert_eq!(extract_waypoints(&body), vec![Waypoint::new(2.0, 3.0)]);
}

#[test]
fn response_body_decodes_json_strings() {
    let route = event(
        "e1",
        serde_json::json!({ "response_body": "{\"tripId\":\"x\",\"points\":[]}" }),
    );
    assert_eq!(response_body(&route).unwrap()["tripId"], "x");

    let plain = event("e2", serde_json::json!({}));
    assert_eq!(
        response_body(&plain),
        Some(Value::String("handled request for GetRouteDetailsForTrip".into()))
    );
}

#[test]
fn response_body_falls_back_to_all_attributes() {
    let structured: LogEvent = serde_json::from_value(serde_json::json!({
        "id": "e3",
        "attributes": {
            "timestamp": "2024-05-01T12:00:00Z",
            "attributes": {
                "payload": { "actual": [{ "lat": 1.0, "lng": 2.0 }, { "lat": 1.1, "lng": 2.1 }] }
            }
        }
    }))
    .unwrap();

    let body = response_body(&structured).unwrap();
    assert!(body.get("payload").is_some());
    assert_eq!(extract_waypoints(&body).len(), 2);

    let empty: LogEvent = serde_json::from_value(serde_json::json!({
        "id": "e4",
        "attributes": { "timestamp": "2024-05-01T12:00:00Z", "message": "" }
    }))
    .unwrap();
    assert_eq!(response_body(&empty), None);
}

#[test]
fn fragment_takes_trip_id_from_the_payload() {
    let logged_trip = Uuid::new_v4();
    let requested_trip = Uuid::new_v4();

    let e = event(
        "e1",
        serde_json::json!({
            "response": {
                "tripId": logged_trip.to_string(),
                "actual": [{ "lat": 1.0, "lng": 2.0 }, { "lat": 1.1, "lng": 2.1 }]
            }
        }),
    );

    let fragment = fragment_from_event(&e, requested_trip, "datadoghq.com").unwrap();

    assert_eq!(fragment.id, "e1");
    assert_eq!(fragment.trip_id, logged_trip);
    assert_eq!(fragment.waypoints.len(), 2);
    assert_eq!(fragment.log_link, "https://app.datadoghq.com/logs?event=e1");

    let anonymous = event(
        "e2",
        serde_json::json!({ "response": { "actual": [{ "lat": 1.0, "lng": 2.0 }] } }),
    );
    let fragment = fragment_from_event(&anonymous, requested_trip, "datadoghq.com").unwrap();
    assert_eq!(fragment.trip_id, requested_trip);
}

#[test]
fn order_and_location_details() {
    let order = serde_json::json!({
        "order": {
            "orderId": "o-1",
            "locationNumber": 1234,
            "deliveryAddress": {
                "address1": "1 Main St",
                "address2": "",
                "city": "Springfield",
                "state": "IL",
                "zip": "62701",
                "coordinates": { "latitude": 39.78, "longitude": -89.65 }
            }
        }
    });

    let details = order_details(&order, "o-1");
    assert_eq!(details.location_number.as_deref(), Some("1234"));
    assert_eq!(details.address.unwrap().formatted(), "1 Main St, Springfield, IL 62701");
    assert_eq!(details.coordinates.unwrap().latitude, 39.78);

    let location = serde_json::json!({
        "locations": [{ "locationNumber": "1234", "name": "Downtown", "lat": 39.8, "lng": -89.6 }]
    });

    let details = location_details(&location, "1234");
    assert_eq!(details.name.as_deref(), Some("Downtown"));
    assert!(details.address.is_none());
    assert_eq!(details.coordinates.unwrap().longitude, -89.6);
}

#[test]
fn field_check_is_case_insensitive() {
    let e = event("e1", serde_json::json!({ "response": { "RouteSegments": [] } }));

    let results = check_fields(&e, &["routeSegments", "planned"]);

    assert_eq!(
        results,
        vec![("routeSegments".to_string(), true), ("planned".to_string(), false)]
    );
}
