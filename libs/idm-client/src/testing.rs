#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Scripted transport for unit tests.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::api::ApiClient;
use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::transport::{ApiRequest, ApiResponse, Transport};

type Reply = Result<ApiResponse, TransportError>;

/// Replays queued replies in order and records every request it sees.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    seen: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn reply(&self, status: u16, body: &str) -> &Self {
        self.replies.lock().push_back(Ok(ApiResponse::new(status, body)));
        self
    }

    pub(crate) fn reply_json(&self, status: u16, body: &serde_json::Value) -> &Self {
        self.reply(status, &body.to_string())
    }

    pub(crate) fn fail(&self, err: TransportError) -> &Self {
        self.replies.lock().push_back(Err(err));
        self
    }

    pub(crate) fn requests(&self) -> Vec<ApiRequest> {
        self.seen.lock().clone()
    }

    pub(crate) fn request_count(&self) -> usize {
        self.seen.lock().len()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        self.seen.lock().push(request.clone());
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(ApiResponse::new(599, "script exhausted")))
    }
}

pub(crate) fn client_with(transport: &Arc<ScriptedTransport>, page_size: u32) -> ApiClient {
    let cfg = ClientConfig::new("https://idp.test", "pat", "org-default").with_page_size(page_size);
    ApiClient::with_transport(cfg, transport.clone()).unwrap()
}
