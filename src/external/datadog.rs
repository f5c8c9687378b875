use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::Future;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    api::LogSearchAPI,
    config::DatadogSettings,
    error::{invalid_config_error, invalid_input_error, upstream_error, Error},
};

/// A single log event as returned by the DataDog v2 logs search API.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogEvent {
    pub id: String,
    pub attributes: LogAttributes,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogAttributes {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Structured attributes of the event, schema depends on the emitting service.
    #[serde(default)]
    pub attributes: Value,
}

impl LogEvent {
    /// Link to this event in the DataDog log explorer.
    pub fn link(&self, site: &str) -> String {
        format!("https://app.{}/logs?event={}", site, self.id)
    }
}

/// Events returned by a search, newest first.
///
/// `truncated` is set when the page limit stopped the search while DataDog
/// still had matching events.
#[derive(Clone, Debug, Default)]
pub struct LogEvents {
    pub events: Vec<LogEvent>,
    pub truncated: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LogQuery {
    pub query: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub limit: Option<u32>,
}

impl LogQuery {
    /// Logs emitted when a gRPC handler finished serving `function`, optionally
    /// narrowed down by a free-text term (trip id, order id, ...).
    pub fn handled_request(
        env: &str,
        function: &str,
        term: Option<&str>,
        lookback: Duration,
    ) -> Self {
        let mut query = format!("env:{} \"handled request for {}\"", env, function);

        if let Some(term) = term {
            query.push_str(&format!(" \"{}\"", term.replace('"', "")));
        }

        let to = Utc::now();

        Self {
            query,
            from: to - lookback,
            to,
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    filter: SearchFilter<'a>,
    sort: &'static str,
    page: SearchPage<'a>,
}

#[derive(Serialize)]
struct SearchFilter<'a> {
    query: &'a str,
    from: String,
    to: String,
}

#[derive(Serialize)]
struct SearchPage<'a> {
    limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<&'a str>,
}

impl<'a> SearchRequest<'a> {
    /// Newest events first, so the page limit drops the oldest ones.
    fn new(query: &'a LogQuery, limit: u32, cursor: Option<&'a str>) -> Self {
        Self {
            filter: SearchFilter {
                query: &query.query,
                from: query.from.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
                to: query.to.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            },
            sort: "-timestamp",
            page: SearchPage { limit, cursor },
        }
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<LogEvent>,
    #[serde(default)]
    meta: Option<SearchMeta>,
}

#[derive(Deserialize)]
struct SearchMeta {
    #[serde(default)]
    page: Option<SearchMetaPage>,
}

#[derive(Deserialize)]
struct SearchMetaPage {
    #[serde(default)]
    after: Option<String>,
}

impl SearchResponse {
    fn next_cursor(&self) -> Option<String> {
        self.meta.as_ref()?.page.as_ref()?.after.clone()
    }
}

pub struct Client {
    http: reqwest::Client,
    url: String,
    api_key: String,
    app_key: String,
    page_limit: u32,
    max_pages: u32,
}

impl Client {
    pub fn new(settings: &DatadogSettings) -> Result<Self, Error> {
        let api_key = settings
            .api_key
            .clone()
            .ok_or_else(|| invalid_config_error("missing DataDog API key (DD_API_KEY)"))?;
        let app_key = settings
            .app_key
            .clone()
            .ok_or_else(|| invalid_config_error("missing DataDog application key (DD_APP_KEY)"))?;

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            url: format!("https://api.{}/api/v2/logs/events/search", settings.site),
            api_key,
            app_key,
            page_limit: settings.page_limit,
            max_pages: settings.max_pages,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn search_page(
        &self,
        query: &LogQuery,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<SearchResponse, Error> {
        let body = SearchRequest::new(query, limit, cursor);

        let res = self
            .http
            .post(&self.url)
            .header("DD-API-KEY", &self.api_key)
            .header("DD-APPLICATION-KEY", &self.app_key)
            .json(&body)
            .send()
            .await?;

        let status_code = res.status().as_u16();

        if status_code >= 400 && status_code < 500 {
            tracing::warn!("DataDog rejected the search with status {}", status_code);
            return Err(invalid_input_error());
        } else if status_code != 200 {
            tracing::warn!("DataDog search failed with status {}", status_code);
            return Err(upstream_error());
        }

        Ok(res.json().await?)
    }
}

#[async_trait]
impl LogSearchAPI for Client {
    #[tracing::instrument(skip(self), fields(query = %query.query))]
    async fn search_logs(&self, query: &LogQuery) -> Result<LogEvents, Error> {
        let wanted = query.limit.map(|l| l as usize);

        let fetch = move |limit: u32, cursor: Option<String>| async move {
            self.search_page(query, limit, cursor.as_deref()).await
        };
        let found = collect_pages(wanted, self.page_limit, self.max_pages, fetch).await?;

        tracing::debug!("found {} log event(s)", found.events.len());

        Ok(found)
    }
}

/// Follows result cursors until `wanted` events are collected, the results run
/// out or `max_pages` pages have been read.
async fn collect_pages<F, Fut>(
    wanted: Option<usize>,
    page_limit: u32,
    max_pages: u32,
    mut fetch: F,
) -> Result<LogEvents, Error>
where
    F: FnMut(u32, Option<String>) -> Fut,
    Fut: Future<Output = Result<SearchResponse, Error>>,
{
    let max_pages = max_pages.max(1);
    let mut events: Vec<LogEvent> = vec![];
    let mut cursor: Option<String> = None;

    for _ in 0..max_pages {
        let limit = match wanted {
            Some(wanted) => wanted.saturating_sub(events.len()).min(page_limit as usize) as u32,
            None => page_limit,
        };

        if limit == 0 {
            break;
        }

        let page = fetch(limit, cursor.take()).await?;
        cursor = page.next_cursor();
        events.extend(page.data);

        let satisfied = wanted.map_or(false, |wanted| events.len() >= wanted);
        if cursor.is_none() || satisfied {
            return Ok(LogEvents {
                events,
                truncated: false,
            });
        }
    }

    let truncated = cursor.is_some();
    if truncated {
        tracing::warn!(
            "more logs match than {} page(s) hold, results are truncated at {} event(s)",
            max_pages,
            events.len()
        );
    }

    Ok(LogEvents { events, truncated })
}

#[test]
fn handled_request_query() {
    let query = LogQuery::handled_request(
        "prod",
        "GetRouteDetailsForTrip",
        Some("8a3e\"b"),
        Duration::days(7),
    );

    assert_eq!(
        query.query,
        "env:prod \"handled request for GetRouteDetailsForTrip\" \"8a3eb\""
    );
    assert_eq!(query.to - query.from, Duration::days(7));
    assert_eq!(query.limit, None);
    assert_eq!(query.with_limit(3).limit, Some(3));
}

#[test]
fn search_requests_newest_logs_first() {
    let query = LogQuery::handled_request("prod", "GetDeliveryOrder", Some("o-1"), Duration::days(1));

    let body = serde_json::to_value(SearchRequest::new(&query, 25, None)).unwrap();
    assert_eq!(body["sort"], "-timestamp");
    assert_eq!(body["page"], serde_json::json!({ "limit": 25 }));
    assert_eq!(body["filter"]["query"], query.query.as_str());

    let body = serde_json::to_value(SearchRequest::new(&query, 25, Some("next"))).unwrap();
    assert_eq!(body["page"]["cursor"], "next");
}

#[test]
fn log_events_deserialize_from_search_results() {
    let response: SearchResponse = serde_json::from_value(serde_json::json!({
        "data": [{
            "id": "AAAAAYx",
            "type": "log",
            "attributes": {
                "timestamp": "2024-05-01T12:00:00Z",
                "message": "handled request for GetRouteDetailsForTrip",
                "service": "routing",
                "tags": ["env:prod"],
                "attributes": { "tripId": "abc" }
            }
        }],
        "meta": { "page": { "after": "cursor-2" } }
    }))
    .unwrap();

    assert_eq!(response.next_cursor().as_deref(), Some("cursor-2"));
    assert_eq!(response.data.len(), 1);

    let event = &response.data[0];
    assert_eq!(event.attributes.attributes["tripId"], "abc");
    assert_eq!(event.link("datadoghq.eu"), "https://app.datadoghq.eu/logs?event=AAAAAYx");
}

#[test]
fn client_requires_credentials() {
    let settings = DatadogSettings::default();

    match Client::new(&settings) {
        Err(err) => assert_eq!(err.code, 102),
        Ok(_) => panic!("client built without credentials"),
    }
}

#[cfg(test)]
fn page(ids: &[&str], after: Option<&str>) -> SearchResponse {
    let data: Vec<serde_json::Value> = ids
        .iter()
        .map(|id| {
            serde_json::json!({
                "id": id,
                "attributes": { "timestamp": "2024-05-01T12:00:00Z" }
            })
        })
        .collect();

    serde_json::from_value(serde_json::json!({
        "data": data,
        "meta": { "page": { "after": after } }
    }))
    .unwrap()
}

#[test]
fn paging_stops_at_max_pages_and_flags_truncation() {
    use std::cell::RefCell;
    use tokio_test::block_on;

    let cursors: RefCell<Vec<Option<String>>> = RefCell::new(vec![]);
    let found = block_on(collect_pages(None, 2, 2, |limit, cursor| {
        assert_eq!(limit, 2);
        let n = cursors.borrow().len();
        cursors.borrow_mut().push(cursor);
        async move {
            let after = format!("cursor-{}", n + 1);
            Ok(page(&["a", "b"], Some(&after)))
        }
    }))
    .unwrap();

    assert_eq!(found.events.len(), 4);
    assert!(found.truncated);
    assert_eq!(
        cursors.into_inner(),
        vec![None, Some("cursor-1".to_string())]
    );
}

#[test]
fn paging_ends_when_results_run_out() {
    use std::cell::Cell;
    use tokio_test::block_on;

    let calls = Cell::new(0);
    let found = block_on(collect_pages(None, 2, 5, |_, _| {
        calls.set(calls.get() + 1);
        let n = calls.get();
        async move {
            if n == 1 {
                Ok(page(&["a", "b"], Some("next")))
            } else {
                Ok(page(&["c"], None))
            }
        }
    }))
    .unwrap();

    assert_eq!(calls.get(), 2);
    assert_eq!(found.events.len(), 3);
    assert!(!found.truncated);
}

#[test]
fn paging_stops_once_the_limit_is_met() {
    use std::cell::RefCell;
    use tokio_test::block_on;

    let limits = RefCell::new(vec![]);
    let found = block_on(collect_pages(Some(3), 2, 5, |limit, _| {
        limits.borrow_mut().push(limit);
        async move {
            let ids = ["a", "b"];
            Ok(page(&ids[..limit as usize], Some("more")))
        }
    }))
    .unwrap();

    assert_eq!(limits.into_inner(), vec![2, 1]);
    assert_eq!(found.events.len(), 3);
    assert!(!found.truncated);
}
