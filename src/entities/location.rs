use serde::{Deserialize, Serialize};

use crate::entities::Waypoint;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl From<&Waypoint> for Coordinates {
    fn from(waypoint: &Waypoint) -> Self {
        Self {
            latitude: waypoint.latitude,
            longitude: waypoint.longitude,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub address1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address2: Option<String>,
    pub city: String,
    pub state: String,
    pub zip: String,
}

impl Address {
    /// Single-line form, e.g. `"1 Main St, Apt 2, Springfield, IL 62701"`.
    pub fn formatted(&self) -> String {
        let mut parts = vec![self.address1.clone()];

        if let Some(address2) = self.address2.as_ref().filter(|a| !a.is_empty()) {
            parts.push(address2.clone());
        }

        parts.push(self.city.clone());
        parts.push(format!("{} {}", self.state, self.zip).trim().to_string());

        parts
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[test]
fn address_formatting() {
    let mut address = Address {
        address1: "1 Main St".into(),
        address2: Some("Apt 2".into()),
        city: "Springfield".into(),
        state: "IL".into(),
        zip: "62701".into(),
    };
    assert_eq!(address.formatted(), "1 Main St, Apt 2, Springfield, IL 62701");

    address.address2 = None;
    address.zip = "".into();
    assert_eq!(address.formatted(), "1 Main St, Springfield, IL");
}
