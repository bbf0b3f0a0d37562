//! Paginated search over listing endpoints.
//!
//! A [`SearchSession`] turns repeated `_search` requests into one lazy,
//! ordered sequence of [`Record`]s. It accepts both envelope shapes seen in
//! the wild (`{"result": [...]}` and `{"projects": [...]}`) and both
//! pagination schemes (offset/limit and continuation tokens).
//!
//! ```rust,ignore
//! let search = PagedSearchClient::new(api.clone());
//! for record in search.search(&catalog::projects(), &SearchQuery::default()) {
//!     let project = record?;
//!     println!("{}", project.text(&FieldSpec::PROJECT_NAME));
//! }
//! ```

use std::collections::{HashSet, VecDeque};
use std::fmt;

use http::Method;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::api::{ApiClient, OrgContext};
use crate::error::IdmError;
use crate::fields::Record;

/// Top-level keys checked for a continuation token, in order.
const TOKEN_KEYS: &[&str] = &["nextPageToken", "next_page_token", "pageToken"];

/// Nested location checked after [`TOKEN_KEYS`].
const DETAILS_TOKEN_PATH: (&str, &str) = ("details", "nextPageToken");

/// Envelope keys that carry metadata rather than records.
const METADATA_KEYS: &[&str] = &["details"];

/// How a search endpoint pages through results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaginationStyle {
    /// Start with offset paging, switch to tokens once the server returns one
    #[default]
    Auto,
    /// `{limit, offset, asc}`; tokens in responses are ignored
    Offset,
    /// `{limit, pageToken}`; ends when no token is returned
    Token,
}

/// One listing endpoint and how to read its responses.
#[derive(Debug, Clone)]
pub struct SearchEndpoint {
    /// API path, already rendered (e.g. `/management/v1/projects/123/apps/_search`)
    pub path: String,
    /// Keys holding the record array, tried in order
    pub envelope_keys: Vec<String>,
    pub style: PaginationStyle,
    pub org: OrgContext,
}

impl SearchEndpoint {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            envelope_keys: vec!["result".to_owned()],
            style: PaginationStyle::Auto,
            org: OrgContext::Default,
        }
    }

    #[must_use]
    pub fn envelope(mut self, keys: &[&str]) -> Self {
        self.envelope_keys = keys.iter().map(|k| (*k).to_owned()).collect();
        self
    }

    #[must_use]
    pub fn style(mut self, style: PaginationStyle) -> Self {
        self.style = style;
        self
    }

    #[must_use]
    pub fn org(mut self, org: OrgContext) -> Self {
        self.org = org;
        self
    }
}

/// Filter payload sent with every page request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchQuery {
    /// Platform query objects, e.g. `{"typeQuery": {"type": "TYPE_MACHINE"}}`
    pub queries: Vec<Value>,
    /// Additional top-level body fields
    pub extra: Map<String, Value>,
}

impl SearchQuery {
    #[must_use]
    pub fn query(mut self, query: Value) -> Self {
        self.queries.push(query);
        self
    }

    #[must_use]
    pub fn field(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_owned(), value);
        self
    }
}

/// Why a session stopped fetching pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Short page (offset mode) or no continuation token (token mode)
    EndOfData,
    /// No configured envelope key matched; the session yielded nothing more
    UnrecognizedEnvelope,
    /// A page contained only records already yielded
    RepeatedPage,
    /// The server handed back a continuation token that was already used
    RepeatedCursor,
    /// A request failed; the error was yielded to the caller
    Failed,
}

impl Termination {
    /// `true` only for [`EndOfData`](Self::EndOfData).
    #[must_use]
    pub fn is_clean(self) -> bool {
        self == Self::EndOfData
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::EndOfData => "end of data",
            Self::UnrecognizedEnvelope => "unrecognized envelope",
            Self::RepeatedPage => "repeated page",
            Self::RepeatedCursor => "repeated cursor",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Fully drained session.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub records: Vec<Record>,
    pub termination: Termination,
    pub pages: usize,
}

/// Entry point for paginated searches.
#[derive(Debug, Clone)]
pub struct PagedSearchClient {
    api: ApiClient,
    page_size: u32,
}

impl PagedSearchClient {
    /// Client using the page size from the API client's configuration.
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        let page_size = api.config().page_size;
        Self { api, page_size }
    }

    /// Override the page size.
    ///
    /// # Errors
    ///
    /// Returns [`IdmError::Config`] when `page_size` is zero.
    pub fn with_page_size(mut self, page_size: u32) -> Result<Self, IdmError> {
        if page_size == 0 {
            return Err(IdmError::Config("page_size must be a positive integer".to_owned()));
        }
        self.page_size = page_size;
        Ok(self)
    }

    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Start a new session. Nothing is sent until the first item is requested.
    #[must_use]
    pub fn search(&self, endpoint: &SearchEndpoint, query: &SearchQuery) -> SearchSession {
        SearchSession {
            api: self.api.clone(),
            endpoint: endpoint.clone(),
            query: query.clone(),
            page_size: self.page_size,
            buffer: VecDeque::new(),
            offset: 0,
            token: None,
            token_mode: endpoint.style == PaginationStyle::Token,
            seen_records: HashSet::new(),
            used_tokens: HashSet::new(),
            pages: 0,
            termination: None,
        }
    }
}

/// One pagination run; owns its cursor.
///
/// Yields `Ok(record)` in server order. After an `Err` the session is
/// finished. Dropping the session early is always safe.
pub struct SearchSession {
    api: ApiClient,
    endpoint: SearchEndpoint,
    query: SearchQuery,
    page_size: u32,
    buffer: VecDeque<Record>,
    offset: u64,
    token: Option<String>,
    token_mode: bool,
    seen_records: HashSet<String>,
    used_tokens: HashSet<String>,
    pages: usize,
    termination: Option<Termination>,
}

impl SearchSession {
    /// Set once the session has decided not to fetch further pages.
    #[must_use]
    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    #[must_use]
    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    /// Drain the session.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered; records gathered so far are dropped.
    pub fn collect_all(mut self) -> Result<SearchResult, IdmError> {
        let mut records = Vec::new();
        for item in self.by_ref() {
            records.push(item?);
        }
        Ok(SearchResult {
            records,
            termination: self.termination.unwrap_or(Termination::EndOfData),
            pages: self.pages,
        })
    }

    fn request_body(&self) -> Value {
        let limit = self.page_size;
        let mut body = if self.token_mode {
            let mut body = json!({ "limit": limit, "queries": self.query.queries });
            if let (Some(token), Some(map)) = (&self.token, body.as_object_mut()) {
                map.insert("pageToken".to_owned(), Value::String(token.clone()));
            }
            body
        } else {
            json!({
                "limit": limit,
                "offset": self.offset,
                "asc": true,
                "queries": self.query.queries,
            })
        };
        if let Some(map) = body.as_object_mut() {
            for (k, v) in &self.query.extra {
                map.insert(k.clone(), v.clone());
            }
        }
        body
    }

    fn fetch_page(&mut self) -> Result<(), IdmError> {
        let mut req = self
            .api
            .request(Method::POST, &self.endpoint.path, &self.endpoint.org);
        req.body = Some(self.request_body());
        let url = req.url.clone();

        let envelope = self.api.send_json(&req)?;
        self.pages += 1;

        let Value::Object(envelope) = envelope else {
            return Err(IdmError::decode(&url, "response envelope is not a JSON object"));
        };

        let Some(chunk) = self.extract_chunk(&url, &envelope)? else {
            warn!(
                url = %url,
                expected = ?self.endpoint.envelope_keys,
                received = ?envelope.keys().collect::<Vec<_>>(),
                "search response has no recognized envelope key; stopping with no further records"
            );
            self.termination = Some(Termination::UnrecognizedEnvelope);
            return Ok(());
        };

        let received = chunk.len();
        let mut fresh = 0usize;
        let mut repeated = 0usize;
        for item in chunk {
            let Value::Object(map) = item else {
                return Err(IdmError::decode(&url, "search result item is not a JSON object"));
            };
            let key = Value::Object(map.clone()).to_string();
            if self.seen_records.insert(key) {
                self.buffer.push_back(Record::new(map));
                fresh += 1;
            } else {
                repeated += 1;
            }
        }
        debug!(url = %url, page = self.pages, received, fresh, "search page received");

        if received > 0 && fresh == 0 {
            warn!(url = %url, page = self.pages, "search page repeats earlier records only; stopping");
            self.termination = Some(Termination::RepeatedPage);
            return Ok(());
        }
        if repeated > 0 {
            warn!(url = %url, page = self.pages, repeated, "skipped records already returned earlier in this search");
        }

        let next_token = match self.endpoint.style {
            PaginationStyle::Offset => None,
            PaginationStyle::Auto | PaginationStyle::Token => continuation_token(&envelope),
        };

        match next_token {
            Some(token) => {
                self.token_mode = true;
                if !self.used_tokens.insert(token.clone()) {
                    warn!(url = %url, page = self.pages, "server returned an already used page token; stopping");
                    self.termination = Some(Termination::RepeatedCursor);
                    return Ok(());
                }
                self.token = Some(token);
            }
            None if self.token_mode => {
                self.termination = Some(Termination::EndOfData);
            }
            None => {
                if received < self.page_size as usize {
                    self.termination = Some(Termination::EndOfData);
                } else {
                    self.offset += received as u64;
                }
            }
        }
        Ok(())
    }

    /// `Ok(None)` when no envelope key matched.
    fn extract_chunk(
        &self,
        url: &str,
        envelope: &Map<String, Value>,
    ) -> Result<Option<Vec<Value>>, IdmError> {
        for key in &self.endpoint.envelope_keys {
            match envelope.get(key) {
                None | Some(Value::Null) => {}
                Some(Value::Array(items)) => return Ok(Some(items.clone())),
                Some(_) => {
                    return Err(IdmError::decode(url, format!("'{key}' is not an array")));
                }
            }
        }
        // Empty repeated fields are omitted from the JSON rendering entirely
        if envelope.keys().all(|k| METADATA_KEYS.contains(&k.as_str())) {
            return Ok(Some(Vec::new()));
        }
        Ok(None)
    }
}

impl Iterator for SearchSession {
    type Item = Result<Record, IdmError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Some(Ok(record));
            }
            if self.termination.is_some() {
                return None;
            }
            if let Err(err) = self.fetch_page() {
                self.termination = Some(Termination::Failed);
                return Some(Err(err));
            }
        }
    }
}

impl fmt::Debug for SearchSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchSession")
            .field("path", &self.endpoint.path)
            .field("pages", &self.pages)
            .field("offset", &self.offset)
            .field("token_mode", &self.token_mode)
            .field("termination", &self.termination)
            .finish_non_exhaustive()
    }
}

fn continuation_token(envelope: &Map<String, Value>) -> Option<String> {
    let top = TOKEN_KEYS.iter().find_map(|k| non_empty(envelope.get(*k)));
    top.or_else(|| {
        let (outer, inner) = DETAILS_TOKEN_PATH;
        non_empty(envelope.get(outer).and_then(|d| d.get(inner)))
    })
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::testing::{ScriptedTransport, client_with};

    fn items(range: std::ops::Range<usize>) -> Vec<Value> {
        range.map(|i| json!({"id": i.to_string()})).collect()
    }

    fn ids(result: &SearchResult) -> Vec<String> {
        result
            .records
            .iter()
            .map(|r| r.text(&crate::fields::FieldSpec::RESOURCE_ID))
            .collect()
    }

    #[test]
    fn test_offset_mode_exact_multiple_needs_extra_request() {
        let t = ScriptedTransport::new();
        t.reply_json(200, &json!({"result": items(0..3)}))
            .reply_json(200, &json!({"result": []}));
        let search = PagedSearchClient::new(client_with(&t, 3));

        let result = search
            .search(&SearchEndpoint::new("/p/_search"), &SearchQuery::default())
            .collect_all()
            .unwrap();

        assert_eq!(ids(&result), vec!["0", "1", "2"]);
        assert_eq!(result.termination, Termination::EndOfData);
        assert_eq!(result.pages, 2);

        let bodies: Vec<Value> = t.requests().into_iter().filter_map(|r| r.body).collect();
        assert_eq!(bodies[0]["offset"], 0);
        assert_eq!(bodies[0]["asc"], true);
        assert_eq!(bodies[0]["limit"], 3);
        assert_eq!(bodies[1]["offset"], 3);
    }

    #[test]
    fn test_empty_first_page_is_empty_sequence() {
        let t = ScriptedTransport::new();
        t.reply_json(200, &json!({"result": []}));
        let search = PagedSearchClient::new(client_with(&t, 10));
        let result = search
            .search(&SearchEndpoint::new("/p/_search"), &SearchQuery::default())
            .collect_all()
            .unwrap();
        assert!(result.records.is_empty());
        assert_eq!(result.termination, Termination::EndOfData);
        assert_eq!(t.request_count(), 1);
    }

    #[test]
    fn test_details_only_envelope_is_empty_page() {
        let t = ScriptedTransport::new();
        t.reply_json(200, &json!({"details": {"totalResult": "0"}}));
        let search = PagedSearchClient::new(client_with(&t, 10));
        let result = search
            .search(&SearchEndpoint::new("/p/_search"), &SearchQuery::default())
            .collect_all()
            .unwrap();
        assert!(result.records.is_empty());
        assert_eq!(result.termination, Termination::EndOfData);
    }

    #[test]
    fn test_envelope_keys_tried_in_order() {
        let t = ScriptedTransport::new();
        t.reply_json(200, &json!({"projects": items(0..2)}));
        let search = PagedSearchClient::new(client_with(&t, 10));
        let endpoint = SearchEndpoint::new("/p/_search").envelope(&["result", "projects"]);
        let result = search
            .search(&endpoint, &SearchQuery::default())
            .collect_all()
            .unwrap();
        assert_eq!(ids(&result), vec!["0", "1"]);
    }

    #[test]
    fn test_unrecognized_envelope_is_distinct_termination() {
        let t = ScriptedTransport::new();
        t.reply_json(200, &json!({"items": items(0..2)}));
        let search = PagedSearchClient::new(client_with(&t, 10));
        let mut session = search.search(&SearchEndpoint::new("/p/_search"), &SearchQuery::default());
        assert!(session.next().is_none());
        assert_eq!(session.termination(), Some(Termination::UnrecognizedEnvelope));
        assert!(!Termination::UnrecognizedEnvelope.is_clean());
    }

    #[test]
    fn test_token_mode_follows_details_token() {
        let t = ScriptedTransport::new();
        t.reply_json(200, &json!({"users": items(0..2), "details": {"nextPageToken": "t1"}}))
            .reply_json(200, &json!({"users": items(2..3), "details": {"nextPageToken": ""}}));
        let search = PagedSearchClient::new(client_with(&t, 2));
        let endpoint = SearchEndpoint::new("/v2/users")
            .envelope(&["users", "result"])
            .style(PaginationStyle::Token);
        let query = SearchQuery::default().query(json!({"typeQuery": {"type": "TYPE_MACHINE"}}));

        let result = search.search(&endpoint, &query).collect_all().unwrap();
        assert_eq!(ids(&result), vec!["0", "1", "2"]);
        assert_eq!(result.termination, Termination::EndOfData);

        let bodies: Vec<Value> = t.requests().into_iter().filter_map(|r| r.body).collect();
        assert!(bodies[0].get("pageToken").is_none());
        assert!(bodies[0].get("offset").is_none());
        assert_eq!(bodies[0]["queries"][0]["typeQuery"]["type"], "TYPE_MACHINE");
        assert_eq!(bodies[1]["pageToken"], "t1");
    }

    #[test]
    fn test_auto_mode_switches_to_token_when_seen() {
        let t = ScriptedTransport::new();
        // Short page, but a token is present: token wins over the short-page rule
        t.reply_json(200, &json!({"result": items(0..1), "nextPageToken": "abc"}))
            .reply_json(200, &json!({"result": items(1..2)}));
        let search = PagedSearchClient::new(client_with(&t, 5));
        let result = search
            .search(&SearchEndpoint::new("/p/_search"), &SearchQuery::default())
            .collect_all()
            .unwrap();
        assert_eq!(ids(&result), vec!["0", "1"]);
        let bodies: Vec<Value> = t.requests().into_iter().filter_map(|r| r.body).collect();
        assert_eq!(bodies[1]["pageToken"], "abc");
    }

    #[test]
    fn test_offset_style_ignores_tokens() {
        let t = ScriptedTransport::new();
        t.reply_json(200, &json!({"result": items(0..1), "nextPageToken": "abc"}));
        let search = PagedSearchClient::new(client_with(&t, 5));
        let endpoint = SearchEndpoint::new("/p/_search").style(PaginationStyle::Offset);
        let result = search.search(&endpoint, &SearchQuery::default()).collect_all().unwrap();
        assert_eq!(result.records.len(), 1);
        assert_eq!(t.request_count(), 1);
    }

    #[test]
    fn test_repeated_cursor_stops() {
        let t = ScriptedTransport::new();
        t.reply_json(200, &json!({"result": items(0..2), "nextPageToken": "same"}))
            .reply_json(200, &json!({"result": items(2..4), "nextPageToken": "same"}));
        let search = PagedSearchClient::new(client_with(&t, 2));
        let result = search
            .search(&SearchEndpoint::new("/p/_search"), &SearchQuery::default())
            .collect_all()
            .unwrap();
        assert_eq!(ids(&result), vec!["0", "1", "2", "3"]);
        assert_eq!(result.termination, Termination::RepeatedCursor);
        assert_eq!(t.request_count(), 2);
    }

    #[test]
    fn test_repeated_page_stops_offset_loop() {
        let t = ScriptedTransport::new();
        // Server ignores the offset and keeps returning the first page
        t.reply_json(200, &json!({"result": items(0..2)}))
            .reply_json(200, &json!({"result": items(0..2)}));
        let search = PagedSearchClient::new(client_with(&t, 2));
        let result = search
            .search(&SearchEndpoint::new("/p/_search"), &SearchQuery::default())
            .collect_all()
            .unwrap();
        assert_eq!(ids(&result), vec!["0", "1"]);
        assert_eq!(result.termination, Termination::RepeatedPage);
    }

    #[test]
    fn test_partial_repeats_are_skipped() {
        let t = ScriptedTransport::new();
        t.reply_json(200, &json!({"result": items(0..2)}))
            .reply_json(200, &json!({"result": [{"id": "1"}, {"id": "2"}]}))
            .reply_json(200, &json!({"result": []}));
        let search = PagedSearchClient::new(client_with(&t, 2));
        let result = search
            .search(&SearchEndpoint::new("/p/_search"), &SearchQuery::default())
            .collect_all()
            .unwrap();
        assert_eq!(ids(&result), vec!["0", "1", "2"]);
    }

    #[test]
    fn test_non_success_yields_transport_error_then_ends() {
        let t = ScriptedTransport::new();
        t.reply(503, "unavailable");
        let search = PagedSearchClient::new(client_with(&t, 2));
        let mut session = search.search(&SearchEndpoint::new("/p/_search"), &SearchQuery::default());
        let err = session.next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            IdmError::Transport(TransportError::Status { status: 503, .. })
        ));
        assert!(session.next().is_none());
        assert_eq!(session.termination(), Some(Termination::Failed));
        assert_eq!(t.request_count(), 1);
    }

    #[test]
    fn test_malformed_shapes_are_decode_errors() {
        let cases = [
            json!([1, 2]),
            json!({"result": {"not": "an array"}}),
            json!({"result": ["string item"]}),
        ];
        for body in cases {
            let t = ScriptedTransport::new();
            t.reply_json(200, &body);
            let search = PagedSearchClient::new(client_with(&t, 2));
            let err = search
                .search(&SearchEndpoint::new("/p/_search"), &SearchQuery::default())
                .collect_all()
                .unwrap_err();
            assert!(matches!(err, IdmError::Decode { .. }), "body {body} gave {err}");
        }
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let t = ScriptedTransport::new();
        let search = PagedSearchClient::new(client_with(&t, 2));
        assert!(matches!(search.with_page_size(0), Err(IdmError::Config(_))));
    }

    #[test]
    fn test_session_is_lazy() {
        let t = ScriptedTransport::new();
        let search = PagedSearchClient::new(client_with(&t, 2));
        let session = search.search(&SearchEndpoint::new("/p/_search"), &SearchQuery::default());
        drop(session);
        assert_eq!(t.request_count(), 0);
    }

    #[test]
    fn test_extra_fields_and_org_context_are_sent() {
        let t = ScriptedTransport::new();
        t.reply_json(200, &json!({"result": []}));
        let search = PagedSearchClient::new(client_with(&t, 2));
        let endpoint = SearchEndpoint::new("/p/_search").org(OrgContext::None);
        let query = SearchQuery::default().field("sortingColumn", json!("NAME"));
        search.search(&endpoint, &query).collect_all().unwrap();
        let req = &t.requests()[0];
        assert!(req.header("x-zitadel-orgid").is_none());
        assert_eq!(req.body.as_ref().unwrap()["sortingColumn"], "NAME");
    }

    #[test]
    fn test_token_locations() {
        let top = json!({"next_page_token": "a"});
        let nested = json!({"details": {"nextPageToken": "b"}});
        let empty = json!({"nextPageToken": "", "details": {}});
        assert_eq!(continuation_token(top.as_object().unwrap()), Some("a".to_owned()));
        assert_eq!(continuation_token(nested.as_object().unwrap()), Some("b".to_owned()));
        assert_eq!(continuation_token(empty.as_object().unwrap()), None);
    }

    #[test]
    fn test_network_failure_surfaces() {
        let t = ScriptedTransport::new();
        t.fail(TransportError::Timeout {
            url: "https://idp.test/p/_search".to_owned(),
            timeout: std::time::Duration::from_secs(30),
        });
        let search = PagedSearchClient::new(client_with(&t, 2));
        let err = search
            .search(&SearchEndpoint::new("/p/_search"), &SearchQuery::default())
            .collect_all()
            .unwrap_err();
        assert_eq!(err.kind(), "transport");
    }
}
