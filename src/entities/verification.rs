use serde::{Deserialize, Serialize};

/// A gRPC handler whose logged responses the map is built from.
#[derive(Clone, Copy, Debug)]
pub struct Handler {
    pub name: &'static str,
    pub expected_fields: &'static [&'static str],
    pub description: &'static str,
}

pub const GET_DELIVERY_ORDER: Handler = Handler {
    name: "GetDeliveryOrder",
    expected_fields: &["coordinates", "address", "latitude", "longitude"],
    description: "Single order lookup with address/coordinates",
};

pub const GET_TRIP_DETAILS: Handler = Handler {
    name: "GetTripDetails",
    expected_fields: &["orders", "coordinates", "address", "tripID"],
    description: "All orders in a trip with addresses",
};

pub const GET_ROUTE_DETAILS_FOR_TRIP: Handler = Handler {
    name: "GetRouteDetailsForTrip",
    expected_fields: &["routeSegments", "planned", "actual"],
    description: "Route waypoints (planned vs actual)",
};

pub const GET_LOCATIONS_DETAILS: Handler = Handler {
    name: "GetLocationsDetails",
    expected_fields: &["locations", "locationNumber", "coordinates", "address"],
    description: "Restaurant address/coordinates by location number",
};

pub const GET_DELIVERY_DRIVER_BY_ID: Handler = Handler {
    name: "GetDeliveryDriverByID",
    expected_fields: &["driver", "coordinates", "driverStatus"],
    description: "Driver current GPS location",
};

pub const HANDLERS: [Handler; 5] = [
    GET_DELIVERY_ORDER,
    GET_TRIP_DETAILS,
    GET_ROUTE_DETAILS_FOR_TRIP,
    GET_LOCATIONS_DETAILS,
    GET_DELIVERY_DRIVER_BY_ID,
];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Found,
    NoExpectedFields,
    NoLogs,
}

impl VerificationStatus {
    pub fn name(&self) -> String {
        match self {
            Self::Found => "FOUND".into(),
            Self::NoExpectedFields => "NO_EXPECTED_FIELDS".into(),
            Self::NoLogs => "NO_LOGS".into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerificationResult {
    pub handler: String,
    pub logs_found: usize,
    pub fields_found: Vec<String>,
    pub fields_missing: Vec<String>,
    pub status: VerificationStatus,
}

impl VerificationResult {
    pub fn new(handler: &Handler, logs_found: usize, fields: Vec<(String, bool)>) -> Self {
        let (found, missing): (Vec<_>, Vec<_>) = fields.into_iter().partition(|(_, ok)| *ok);
        let fields_found: Vec<String> = found.into_iter().map(|(f, _)| f).collect();

        let status = if logs_found == 0 {
            VerificationStatus::NoLogs
        } else if fields_found.is_empty() {
            VerificationStatus::NoExpectedFields
        } else {
            VerificationStatus::Found
        };

        Self {
            handler: handler.name.into(),
            logs_found,
            fields_found,
            fields_missing: missing.into_iter().map(|(f, _)| f).collect(),
            status,
        }
    }
}

#[test]
fn verification_status() {
    let no_logs = VerificationResult::new(&GET_TRIP_DETAILS, 0, vec![]);
    assert_eq!(no_logs.status, VerificationStatus::NoLogs);

    let none_found = VerificationResult::new(
        &GET_TRIP_DETAILS,
        2,
        vec![("orders".into(), false), ("address".into(), false)],
    );
    assert_eq!(none_found.status, VerificationStatus::NoExpectedFields);
    assert_eq!(none_found.fields_missing.len(), 2);

    let found = VerificationResult::new(
        &GET_TRIP_DETAILS,
        1,
        vec![("orders".into(), true), ("address".into(), false)],
    );
    assert_eq!(found.status, VerificationStatus::Found);
    assert_eq!(found.fields_found, vec!["orders".to_string()]);
    assert_eq!(found.fields_missing, vec!["address".to_string()]);
}
