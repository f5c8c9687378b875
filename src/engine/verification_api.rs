use super::Engine;

use async_trait::async_trait;

use crate::{
    api::VerificationAPI,
    entities::{VerificationResult, HANDLERS},
    error::Error,
    external::datadog::LogQuery,
    parser::check_fields,
};

#[async_trait]
impl VerificationAPI for Engine {
    /// Checks that every handler the map depends on logs its responses with the
    /// fields the parser needs. A field counts as found when any sampled log has it.
    /// A handler whose search fails is reported without logs and the others are
    /// still checked.
    #[tracing::instrument(skip(self))]
    async fn verify_handlers(&self, limit: u32) -> Result<Vec<VerificationResult>, Error> {
        let mut results = vec![];

        for handler in HANDLERS.iter() {
            let query = LogQuery::handled_request(
                &self.settings.datadog.env,
                handler.name,
                None,
                self.settings.lookback(),
            )
            .with_limit(limit);

            let events = match self.search(&query).await {
                Ok(found) => found.events,
                Err(err) => {
                    tracing::warn!("log search for {} failed: {}", handler.name, err);
                    vec![]
                }
            };

            let checks: Vec<Vec<(String, bool)>> = events
                .iter()
                .map(|event| check_fields(event, handler.expected_fields))
                .collect();

            let fields = handler
                .expected_fields
                .iter()
                .enumerate()
                .map(|(i, field)| (field.to_string(), checks.iter().any(|c| c[i].1)))
                .collect();

            let result = VerificationResult::new(handler, events.len(), fields);
            tracing::info!(
                "{}: {} ({} log(s))",
                handler.name,
                result.status.name(),
                result.logs_found
            );

            results.push(result);
        }

        Ok(results)
    }
}

#[test]
fn reports_each_handler() {
    use super::fake::{engine, event, FakeLogs};
    use crate::entities::VerificationStatus;
    use serde_json::json;
    use tokio_test::block_on;

    let (engine, logs) = engine(
        FakeLogs::default()
            .with(
                "GetRouteDetailsForTrip",
                vec![
                    event("r1", "2024-05-01T10:00:00Z", json!({ "routeSegments": [] })),
                    event("r2", "2024-05-01T10:01:00Z", json!({ "actual": [] })),
                ],
            )
            .with(
                "GetTripDetails",
                vec![event("t1", "2024-05-01T10:00:00Z", json!({ "status": "ok" }))],
            ),
    );

    let results = block_on(engine.verify_handlers(5)).unwrap();

    assert_eq!(results.len(), 5);

    let route = results
        .iter()
        .find(|r| r.handler == "GetRouteDetailsForTrip")
        .unwrap();
    assert_eq!(route.status, VerificationStatus::Found);
    assert_eq!(route.logs_found, 2);
    assert_eq!(route.fields_found, vec!["routeSegments", "actual"]);
    assert_eq!(route.fields_missing, vec!["planned"]);

    let trip = results.iter().find(|r| r.handler == "GetTripDetails").unwrap();
    assert_eq!(trip.status, VerificationStatus::NoExpectedFields);

    let driver = results
        .iter()
        .find(|r| r.handler == "GetDeliveryDriverByID")
        .unwrap();
    assert_eq!(driver.status, VerificationStatus::NoLogs);

    assert!(logs.queries.lock().unwrap().iter().all(|q| !q.contains("\" \"")));
}

#[test]
fn failed_search_only_affects_its_handler() {
    use super::fake::{engine, event, FakeLogs};
    use crate::entities::VerificationStatus;
    use serde_json::json;
    use tokio_test::block_on;

    // the first handler's search uses up every retry attempt
    let (engine, logs) = engine(
        FakeLogs::default()
            .with(
                "GetTripDetails",
                vec![event("t1", "2024-05-01T10:00:00Z", json!({ "status": "ok" }))],
            )
            .failing(3),
    );

    let results = block_on(engine.verify_handlers(5)).unwrap();

    assert_eq!(results.len(), 5);
    assert_eq!(results[0].status, VerificationStatus::NoLogs);
    assert_eq!(results[0].logs_found, 0);

    let trip = results.iter().find(|r| r.handler == "GetTripDetails").unwrap();
    assert_eq!(trip.logs_found, 1);

    assert_eq!(logs.queries.lock().unwrap().len(), 3 + 4);
}
