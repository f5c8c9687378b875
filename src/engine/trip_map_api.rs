use super::Engine;

use async_trait::async_trait;
use futures::future::join_all;
use uuid::Uuid;

use crate::{
    aggregator::aggregate,
    api::{EnrichmentAPI, MapOptions, TripMapAPI},
    entities::{LogFragment, TripMap, GET_ROUTE_DETAILS_FOR_TRIP},
    error::{not_found_error, Error},
    external::datadog::LogQuery,
    parser::fragment_from_event,
};

impl Engine {
    /// Route fragments of the trip, and whether the search was cut short.
    async fn route_fragments(&self, trip_id: Uuid) -> Result<(Vec<LogFragment>, bool), Error> {
        let trip = trip_id.to_string();
        let query = LogQuery::handled_request(
            &self.settings.datadog.env,
            GET_ROUTE_DETAILS_FOR_TRIP.name,
            Some(&trip),
            self.settings.lookback(),
        );

        let found = self.search(&query).await?;
        let site = &self.settings.datadog.site;

        let fragments: Vec<LogFragment> = found
            .events
            .iter()
            .filter_map(|event| fragment_from_event(event, trip_id, site))
            .filter(|fragment| {
                if fragment.trip_id != trip_id {
                    tracing::warn!(
                        "discarding fragment {} of trip {}",
                        fragment.id,
                        fragment.trip_id
                    );
                    return false;
                }
                true
            })
            .collect();

        tracing::info!(
            "found {} route fragment(s) in {} log event(s)",
            fragments.len(),
            found.events.len()
        );

        Ok((fragments, found.truncated))
    }
}

#[async_trait]
impl TripMapAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn find_fragments(&self, trip_id: Uuid) -> Result<Vec<LogFragment>, Error> {
        let (fragments, _) = self.route_fragments(trip_id).await?;

        Ok(fragments)
    }

    #[tracing::instrument(skip(self, options))]
    async fn build_trip_map(&self, trip_id: Uuid, options: &MapOptions) -> Result<TripMap, Error> {
        let (fragments, truncated) = self.route_fragments(trip_id).await?;

        if fragments.is_empty() {
            return Err(not_found_error(&format!("route logs for trip {}", trip_id)));
        }

        tracing::info!("aggregating {} fragment(s)", fragments.len());
        let route = aggregate(&fragments, options.gap_threshold)?;

        for warning in &route.warnings {
            tracing::warn!("{}", warning);
        }
        if route.gap_count() > 0 {
            tracing::info!("route has {} gap(s)", route.gap_count());
        }

        let log_links = fragments.iter().map(|f| f.log_link.clone()).collect();
        let mut trip_map = TripMap::new(route, log_links);
        trip_map.logs_truncated = truncated;

        if !options.enrich {
            return Ok(trip_map);
        }

        let order_ids = trip_map.route.order_ids();
        tracing::info!("enriching {} order(s)", order_ids.len());

        let orders = join_all(order_ids.iter().map(|id| self.find_order(id))).await;
        trip_map.orders = order_ids
            .iter()
            .zip(orders)
            .filter_map(|(id, result)| match result {
                Ok(order) => Some(order),
                Err(err) => {
                    tracing::warn!("skipping order {}: {}", id, err);
                    None
                }
            })
            .collect();

        let mut location_numbers: Vec<String> = vec![];
        for number in trip_map.orders.iter().filter_map(|o| o.location_number.clone()) {
            if !location_numbers.contains(&number) {
                location_numbers.push(number);
            }
        }

        let locations = join_all(location_numbers.iter().map(|n| self.find_location(n))).await;
        trip_map.locations = location_numbers
            .iter()
            .zip(locations)
            .filter_map(|(number, result)| match result {
                Ok(location) => Some(location),
                Err(err) => {
                    tracing::warn!("skipping location {}: {}", number, err);
                    None
                }
            })
            .collect();

        Ok(trip_map)
    }
}

#[cfg(test)]
fn options(enrich: bool) -> MapOptions {
    MapOptions {
        gap_threshold: crate::aggregator::default_gap_threshold(),
        enrich,
    }
}

#[test]
fn fragments_of_other_trips_are_discarded() {
    use super::fake::{engine, event, FakeLogs};
    use serde_json::json;
    use tokio_test::block_on;

    let trip_id = Uuid::new_v4();
    let other = Uuid::new_v4();

    let (engine, logs) = engine(FakeLogs::default().with(
        &trip_id.to_string(),
        vec![
            event(
                "a",
                "2024-05-01T12:00:00Z",
                json!({ "tripId": trip_id.to_string(), "actual": [{ "lat": 1.0, "lng": 1.0 }, { "lat": 1.1, "lng": 1.1 }] }),
            ),
            event(
                "b",
                "2024-05-01T12:01:00Z",
                json!({ "tripId": other.to_string(), "actual": [{ "lat": 2.0, "lng": 2.0 }, { "lat": 2.1, "lng": 2.1 }] }),
            ),
        ],
    ));

    let fragments = block_on(engine.find_fragments(trip_id)).unwrap();

    assert_eq!(fragments.len(), 1);
    assert_eq!(fragments[0].id, "a");

    let queries = logs.queries.lock().unwrap();
    assert!(queries[0].contains("handled request for GetRouteDetailsForTrip"));
    assert!(queries[0].contains(&trip_id.to_string()));
}

#[test]
fn build_trip_map_bridges_restarts_and_enriches_orders() {
    use super::fake::{engine, event, FakeLogs};
    use serde_json::json;
    use tokio_test::block_on;

    let trip_id = Uuid::new_v4();
    let route = |points: serde_json::Value| json!({ "tripId": trip_id.to_string(), "actual": points });

    let logs = FakeLogs::default()
        .with(
            &trip_id.to_string(),
            vec![
                // logged out of order, the second session starts 15 minutes after the first
                event(
                    "second",
                    "2024-05-01T12:15:00Z",
                    route(json!([
                        { "orderId": "o-1", "coordinates": { "latitude": 37.80, "longitude": -122.40 } },
                        { "lat": 37.81, "lng": -122.41 }
                    ])),
                ),
                event(
                    "first",
                    "2024-05-01T12:00:00Z",
                    route(json!([{ "lat": 37.70, "lng": -122.30 }, { "lat": 37.71, "lng": -122.31 }])),
                ),
            ],
        )
        .with(
            "o-1",
            vec![event(
                "order",
                "2024-05-01T12:16:00Z",
                json!({ "orderId": "o-1", "locationNumber": "loc-42", "address": { "address1": "1 Main St", "city": "Oakland", "state": "CA", "zip": "94607" } }),
            )],
        )
        .with(
            "loc-42",
            vec![event(
                "location",
                "2024-05-01T12:17:00Z",
                json!({ "locations": [{ "locationNumber": "loc-42", "name": "Uptown", "lat": 37.79, "lng": -122.27 }] }),
            )],
        );

    let (engine, _) = engine(logs);
    let trip_map = block_on(engine.build_trip_map(trip_id, &options(true))).unwrap();

    assert_eq!(trip_map.route.fragment_count, 2);
    assert!(trip_map.route.is_complete);
    assert_eq!(trip_map.route.gap_count(), 1);
    assert_eq!(trip_map.route.segments.len(), 3);
    assert!(trip_map.route.segments[1].is_gap());
    assert_eq!(trip_map.log_links.len(), 2);

    assert_eq!(trip_map.orders.len(), 1);
    assert_eq!(trip_map.orders[0].location_number.as_deref(), Some("loc-42"));
    assert_eq!(trip_map.locations.len(), 1);
    assert_eq!(trip_map.locations[0].name.as_deref(), Some("Uptown"));
}

#[test]
fn failed_enrichment_is_skipped() {
    use super::fake::{engine, event, FakeLogs};
    use serde_json::json;
    use tokio_test::block_on;

    let trip_id = Uuid::new_v4();
    let (engine, _) = engine(FakeLogs::default().with(
        &trip_id.to_string(),
        vec![event(
            "only",
            "2024-05-01T12:00:00Z",
            json!({ "actual": [
                { "orderId": "missing", "lat": 1.0, "lng": 1.0 },
                { "lat": 1.1, "lng": 1.1 }
            ] }),
        )],
    ));

    let trip_map = block_on(engine.build_trip_map(trip_id, &options(true))).unwrap();

    assert!(trip_map.route.is_complete);
    assert_eq!(trip_map.route.order_ids(), vec!["missing".to_string()]);
    assert!(trip_map.orders.is_empty());
    assert!(trip_map.locations.is_empty());
}

#[test]
fn no_route_logs_is_not_found() {
    use super::fake::{engine, FakeLogs};
    use tokio_test::block_on;

    let (engine, _) = engine(FakeLogs::default());

    let err = block_on(engine.build_trip_map(Uuid::new_v4(), &options(false))).unwrap_err();

    assert_eq!(err.code, 104);
}

#[test]
fn truncated_log_search_is_flagged_on_the_map() {
    use super::fake::{engine, event, FakeLogs};
    use serde_json::json;
    use tokio_test::block_on;

    let trip_id = Uuid::new_v4();
    let body = json!({ "actual": [{ "lat": 1.0, "lng": 1.0 }, { "lat": 1.1, "lng": 1.1 }] });

    let (complete, _) = engine(FakeLogs::default().with(
        &trip_id.to_string(),
        vec![event("a", "2024-05-01T12:00:00Z", body.clone())],
    ));
    let trip_map = block_on(complete.build_trip_map(trip_id, &options(false))).unwrap();
    assert!(!trip_map.logs_truncated);

    let (cut_short, _) = engine(
        FakeLogs::default()
            .with(&trip_id.to_string(), vec![event("a", "2024-05-01T12:00:00Z", body)])
            .truncating(),
    );
    let trip_map = block_on(cut_short.build_trip_map(trip_id, &options(false))).unwrap();
    assert!(trip_map.logs_truncated);
    assert_eq!(trip_map.route.fragment_count, 1);
}
