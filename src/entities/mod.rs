mod fragment;
mod location;
mod order;
mod route;
mod segment;
mod trip;
mod verification;
mod waypoint;

pub use fragment::{LogFragment, MIN_FRAGMENT_WAYPOINTS};
pub use location::{Address, Coordinates};
pub use order::{LocationDetails, OrderDetails};
pub use route::UnifiedRoute;
pub use segment::{RouteSegment, SegmentType};
pub use trip::TripMap;
pub use verification::{
    Handler, VerificationResult, VerificationStatus, GET_DELIVERY_ORDER, GET_LOCATIONS_DETAILS,
    GET_ROUTE_DETAILS_FOR_TRIP, HANDLERS,
};
pub use waypoint::Waypoint;
