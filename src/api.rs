use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::{LocationDetails, LogFragment, OrderDetails, TripMap, VerificationResult};
use crate::error::Error;
use crate::external::datadog::{LogEvents, LogQuery};

#[async_trait]
pub trait LogSearchAPI {
    async fn search_logs(&self, query: &LogQuery) -> Result<LogEvents, Error>;
}

#[async_trait]
pub trait EnrichmentAPI {
    async fn find_order(&self, order_id: &str) -> Result<OrderDetails, Error>;
    async fn find_location(&self, location_number: &str) -> Result<LocationDetails, Error>;
}

#[async_trait]
pub trait TripMapAPI {
    async fn find_fragments(&self, trip_id: Uuid) -> Result<Vec<LogFragment>, Error>;
    async fn build_trip_map(&self, trip_id: Uuid, options: &MapOptions) -> Result<TripMap, Error>;
}

#[async_trait]
pub trait VerificationAPI {
    async fn verify_handlers(&self, limit: u32) -> Result<Vec<VerificationResult>, Error>;
}

pub trait API: EnrichmentAPI + TripMapAPI + VerificationAPI {}

pub type DynLogSearch = Arc<dyn LogSearchAPI + Send + Sync>;

#[derive(Clone, Debug)]
pub struct MapOptions {
    pub gap_threshold: chrono::Duration,
    pub enrich: bool,
}
