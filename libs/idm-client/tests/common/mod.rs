#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

//! Common test utilities for idm-client integration tests

use std::sync::{Arc, Mutex};
use std::time::Duration;

use httpmock::MockServer;
use idm_client::{ApiClient, ClientConfig, IdmAdmin, ReadRetry};
use serde_json::{Value, json};

pub const TOKEN: &str = "test-pat";
pub const ORG: &str = "301926074198032394";

pub fn config(server: &MockServer, page_size: u32) -> ClientConfig {
    ClientConfig::new(server.base_url(), TOKEN, ORG)
        .with_page_size(page_size)
        .with_request_timeout(Duration::from_secs(5))
}

pub fn api(server: &MockServer, page_size: u32) -> ApiClient {
    ApiClient::new(config(server, page_size)).unwrap()
}

pub fn admin(server: &MockServer) -> IdmAdmin {
    IdmAdmin::new(api(server, 200)).with_read_retry(ReadRetry::disabled())
}

/// `{"id": "<prefix>-<i>"}` objects for `range`.
pub fn records(prefix: &str, range: std::ops::Range<usize>) -> Vec<Value> {
    range.map(|i| json!({ "id": format!("{prefix}-{i}") })).collect()
}

/// Tracing layer collecting the messages of WARN events.
#[derive(Clone, Default)]
pub struct WarningCapture {
    pub warnings: Arc<Mutex<Vec<String>>>,
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for WarningCapture {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::WARN {
            let mut visitor = MessageVisitor(String::new());
            event.record(&mut visitor);
            self.warnings.lock().unwrap().push(visitor.0);
        }
    }
}

struct MessageVisitor(String);

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

/// Run `f` under a subscriber that records warnings; returns both.
pub fn capture_warnings<T>(f: impl FnOnce() -> T) -> (T, Vec<String>) {
    use tracing_subscriber::layer::SubscriberExt;

    let capture = WarningCapture::default();
    let warnings = capture.warnings.clone();
    let subscriber = tracing_subscriber::registry().with(capture);
    let out = tracing::subscriber::with_default(subscriber, f);
    let captured = warnings.lock().unwrap().clone();
    (out, captured)
}
