use serde::{Deserialize, Serialize};

use crate::entities::{Address, Coordinates};

/// A delivery order as reported by the order service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    pub order_id: String,
    pub address: Option<Address>,
    pub coordinates: Option<Coordinates>,
    /// The restaurant the order was picked up from.
    pub location_number: Option<String>,
}

/// A restaurant as reported by the locations service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationDetails {
    pub location_number: String,
    pub name: Option<String>,
    pub address: Option<Address>,
    pub coordinates: Option<Coordinates>,
}
