use super::Engine;

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    api::EnrichmentAPI,
    entities::{Handler, LocationDetails, OrderDetails, GET_DELIVERY_ORDER, GET_LOCATIONS_DETAILS},
    error::{not_found_error, Error},
    external::datadog::LogQuery,
    parser::{location_details, order_details, response_body},
};

impl Engine {
    /// Structured response body of the most recent `handler` log mentioning `term`.
    async fn latest_response(&self, handler: &Handler, term: &str) -> Result<Value, Error> {
        let query = LogQuery::handled_request(
            &self.settings.datadog.env,
            handler.name,
            Some(term),
            self.settings.lookback(),
        );

        let mut events = self.search(&query).await?.events;
        events.sort_by(|a, b| b.attributes.timestamp.cmp(&a.attributes.timestamp));

        events
            .iter()
            .filter_map(response_body)
            .find(|body| body.is_object() || body.is_array())
            .ok_or_else(|| not_found_error(&format!("{} logs for {}", handler.name, term)))
    }
}

#[async_trait]
impl EnrichmentAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn find_order(&self, order_id: &str) -> Result<OrderDetails, Error> {
        let body = self.latest_response(&GET_DELIVERY_ORDER, order_id).await?;

        Ok(order_details(&body, order_id))
    }

    #[tracing::instrument(skip(self))]
    async fn find_location(&self, location_number: &str) -> Result<LocationDetails, Error> {
        let body = self
            .latest_response(&GET_LOCATIONS_DETAILS, location_number)
            .await?;

        Ok(location_details(&body, location_number))
    }
}

#[test]
fn find_order_uses_the_latest_log() {
    use super::fake::{engine, event, FakeLogs};
    use serde_json::json;
    use tokio_test::block_on;

    let (engine, logs) = engine(FakeLogs::default().with(
        "o-7",
        vec![
            event(
                "old",
                "2024-05-01T10:00:00Z",
                json!({ "orderId": "o-7", "locationNumber": "old-store" }),
            ),
            event(
                "new",
                "2024-05-01T11:00:00Z",
                json!({
                    "orderId": "o-7",
                    "locationNumber": "new-store",
                    "deliveryAddress": {
                        "address1": "9 Elm St",
                        "city": "Austin",
                        "state": "TX",
                        "zip": "78701",
                        "coordinates": { "latitude": 30.27, "longitude": -97.74 }
                    }
                }),
            ),
        ],
    ));

    let order = block_on(engine.find_order("o-7")).unwrap();

    assert_eq!(order.order_id, "o-7");
    assert_eq!(order.location_number.as_deref(), Some("new-store"));
    assert_eq!(order.address.unwrap().city, "Austin");
    assert_eq!(order.coordinates.unwrap().latitude, 30.27);

    let queries = logs.queries.lock().unwrap();
    assert!(queries[0].contains("handled request for GetDeliveryOrder"));
}

#[test]
fn find_location_retries_transient_failures() {
    use super::fake::{engine, event, FakeLogs};
    use serde_json::json;
    use tokio_test::block_on;

    let (engine, logs) = engine(
        FakeLogs::default()
            .with(
                "store-9",
                vec![event(
                    "loc",
                    "2024-05-01T10:00:00Z",
                    json!({ "locations": [{ "locationNumber": "store-9", "name": "Midtown" }] }),
                )],
            )
            .failing(2),
    );

    let location = block_on(engine.find_location("store-9")).unwrap();

    assert_eq!(location.name.as_deref(), Some("Midtown"));
    assert!(location.coordinates.is_none());
    assert_eq!(logs.queries.lock().unwrap().len(), 3);
}

#[test]
fn unknown_order_is_not_found() {
    use super::fake::{engine, FakeLogs};
    use tokio_test::block_on;

    let (engine, _) = engine(FakeLogs::default());

    let err = block_on(engine.find_order("nope")).unwrap_err();

    assert_eq!(err.code, 104);
}
