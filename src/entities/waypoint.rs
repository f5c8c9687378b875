use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{invalid_input_error, Error};

/// A single point of a reconstructed route.
///
/// Equality is exact. Tolerance-based comparison only happens during
/// aggregation, see [`Waypoint::is_near`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Waypoint {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragment_id: Option<String>,
}

impl Waypoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            order_id: None,
            fragment_id: None,
        }
    }

    pub fn with_order(latitude: f64, longitude: f64, order_id: impl Into<String>) -> Self {
        Self {
            order_id: Some(order_id.into()),
            ..Self::new(latitude, longitude)
        }
    }

    /// Returns a copy of this waypoint tagged with the given fragment id.
    pub fn tagged(&self, fragment_id: &str) -> Self {
        Self {
            fragment_id: Some(fragment_id.into()),
            ..self.clone()
        }
    }

    /// True when both axes differ by strictly less than `tolerance` degrees.
    pub fn is_near(&self, other: &Waypoint, tolerance: f64) -> bool {
        (self.latitude - other.latitude).abs() < tolerance
            && (self.longitude - other.longitude).abs() < tolerance
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Parses `"lat,lng"`, rejecting out of range points.
impl FromStr for Waypoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (latitude, longitude) = s.split_once(',').ok_or_else(invalid_input_error)?;

        let latitude: f64 = latitude.trim().parse().map_err(|_| invalid_input_error())?;
        let longitude: f64 = longitude.trim().parse().map_err(|_| invalid_input_error())?;

        let waypoint = Waypoint::new(latitude, longitude);
        if !waypoint.is_valid() {
            return Err(invalid_input_error());
        }

        Ok(waypoint)
    }
}

#[test]
fn waypoint_equality_is_exact() {
    let a = Waypoint::new(37.77, -122.41);
    let b = Waypoint::new(37.770001, -122.41);

    assert_ne!(a, b);
    assert!(a.is_near(&b, 1e-5));
    assert_eq!(a, a.clone());
    assert_ne!(a, a.tagged("f1"));
}

#[test]
fn waypoint_validity() {
    assert!(Waypoint::new(90.0, -180.0).is_valid());
    assert!(!Waypoint::new(90.5, 0.0).is_valid());
    assert!(!Waypoint::new(0.0, 181.0).is_valid());
    assert!(!Waypoint::new(f64::NAN, 0.0).is_valid());
}

#[test]
fn waypoint_serializes_without_empty_ids() {
    let json = serde_json::to_value(Waypoint::with_order(1.0, 2.0, "o-1")).unwrap();

    assert_eq!(
        json,
        serde_json::json!({ "latitude": 1.0, "longitude": 2.0, "orderId": "o-1" })
    );
}

#[test]
fn waypoint_from_str() {
    assert_eq!("38.5,-120.2".parse::<Waypoint>().unwrap(), Waypoint::new(38.5, -120.2));
    assert_eq!(" 1 , 2 ".parse::<Waypoint>().unwrap(), Waypoint::new(1.0, 2.0));
    assert!("38.5".parse::<Waypoint>().is_err());
    assert!("north,1".parse::<Waypoint>().is_err());
    assert!("91,0".parse::<Waypoint>().is_err());
}
