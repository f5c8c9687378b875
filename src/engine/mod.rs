mod enrichment_api;
mod retry;
mod trip_map_api;
mod verification_api;

pub use retry::with_retry;

use crate::{
    api::{DynLogSearch, API},
    config::Settings,
    error::Error,
    external::datadog::{LogEvents, LogQuery},
};

pub struct Engine {
    settings: Settings,
    logs: DynLogSearch,
}

impl Engine {
    #[tracing::instrument(name = "Engine::new", skip_all)]
    pub fn new(settings: Settings, logs: DynLogSearch) -> Self {
        Self { settings, logs }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Runs a log search, retrying transient failures.
    async fn search(&self, query: &LogQuery) -> Result<LogEvents, Error> {
        with_retry(&self.settings.retry, "search_logs", || {
            self.logs.search_logs(query)
        })
        .await
    }
}

impl API for Engine {}

/// In-memory log source answering every query whose text contains a key.
#[cfg(test)]
pub(crate) mod fake {
    use async_trait::async_trait;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };

    use super::Engine;
    use crate::{
        api::LogSearchAPI,
        config::Settings,
        error::{upstream_error, Error},
        external::datadog::{LogEvent, LogEvents, LogQuery},
    };

    #[derive(Default)]
    pub struct FakeLogs {
        pub events: Vec<(String, Vec<LogEvent>)>,
        pub failures: AtomicUsize,
        pub queries: Mutex<Vec<String>>,
        pub truncated: bool,
    }

    impl FakeLogs {
        pub fn with(mut self, term: &str, events: Vec<LogEvent>) -> Self {
            self.events.push((term.into(), events));
            self
        }

        pub fn failing(self, failures: usize) -> Self {
            self.failures.store(failures, Ordering::SeqCst);
            self
        }

        /// Reports every search as cut short by the page limit.
        pub fn truncating(mut self) -> Self {
            self.truncated = true;
            self
        }
    }

    #[async_trait]
    impl LogSearchAPI for FakeLogs {
        async fn search_logs(&self, query: &LogQuery) -> Result<LogEvents, Error> {
            self.queries.lock().unwrap().push(query.query.clone());

            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(upstream_error());
            }

            let mut found: Vec<LogEvent> = self
                .events
                .iter()
                .filter(|(term, _)| query.query.contains(term.as_str()))
                .flat_map(|(_, events)| events.clone())
                .collect();

            if let Some(limit) = query.limit {
                found.truncate(limit as usize);
            }

            Ok(LogEvents {
                events: found,
                truncated: self.truncated,
            })
        }
    }

    pub fn engine(logs: FakeLogs) -> (Engine, Arc<FakeLogs>) {
        let mut settings = Settings::default();
        settings.retry.base_delay_ms = 0;

        let logs = Arc::new(logs);
        (Engine::new(settings, logs.clone()), logs)
    }

    pub fn event(id: &str, timestamp: &str, body: serde_json::Value) -> LogEvent {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "attributes": {
                "timestamp": timestamp,
                "attributes": { "response_body": body },
            }
        }))
        .unwrap()
    }
}
