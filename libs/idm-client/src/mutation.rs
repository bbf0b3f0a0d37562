//! Multi-endpoint fallback for state-changing calls.
//!
//! Platform versions expose the same mutation under different paths, API
//! generations and organization contexts. A [`Mutation`] lists those
//! [`EndpointVariant`]s in priority order and the
//! [`FallbackMutationExecutor`] walks them:
//!
//! - 2xx: read the result and stop (unreadable result is terminal)
//! - 404: the variant does not apply here, try the next one
//! - 403: stop, the caller lacks privilege
//! - anything else, including network failures: stop
//!
//! Each variant gets exactly one request. Nothing is retried.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use http::Method;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, OrgContext, parse_json};
use crate::error::{IdmError, TransportError, body_preview};
use crate::fields::{FieldSpec, resolve_in};
use crate::secret::SecretString;
use crate::transport::ApiRequest;

/// Identifiers of the resource a mutation targets.
///
/// The parameters fill `{name}` placeholders in variant paths and header
/// values. [`key`](Self::key) identifies the resource for serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    kind: &'static str,
    id: String,
    params: BTreeMap<String, String>,
}

impl ResourceRef {
    pub fn new(kind: &'static str, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            params: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.params.insert(name.to_owned(), value.into());
        self
    }

    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Stable identity, e.g. `app:301926077821911050`.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind, self.id)
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind, self.id)
    }
}

/// Per-variant header adjustment, applied on top of the client's base headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderOverride {
    /// Set a header; the value is a template
    Set(String, String),
    /// Drop a header
    Remove(String),
    /// Send the configured organization header with this value (template)
    Org(String),
    /// Send no organization header
    NoOrg,
}

/// One way of performing a mutation.
#[derive(Debug, Clone)]
pub struct EndpointVariant {
    /// Short name used in logs and errors
    pub label: String,
    pub method: Method,
    /// Path template, e.g. `/v2/users/{user_id}/secret`
    pub path: String,
    pub headers: Vec<HeaderOverride>,
}

impl EndpointVariant {
    pub fn new(label: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            method,
            path: path.into(),
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn header(mut self, header: HeaderOverride) -> Self {
        self.headers.push(header);
        self
    }
}

/// How the result is read from a 2xx body.
#[derive(Debug, Clone, Copy)]
pub enum ResultRule {
    /// First present candidate field
    Fields(FieldSpec),
    /// Any JSON object body is the result
    WholeBody,
}

/// A state-changing operation with its ordered endpoint variants.
#[derive(Debug, Clone)]
pub struct Mutation {
    pub variants: Vec<EndpointVariant>,
    pub body: Value,
    pub result: ResultRule,
}

impl Mutation {
    #[must_use]
    pub fn new(variants: Vec<EndpointVariant>, body: Value, result: ResultRule) -> Self {
        Self {
            variants,
            body,
            result,
        }
    }
}

/// Accepted mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationSuccess {
    pub value: Value,
    /// Label of the variant that accepted the request
    pub variant: String,
    /// Requests sent, including the successful one
    pub attempts: usize,
}

impl MutationSuccess {
    /// Result rendered as text (strings and numbers).
    #[must_use]
    pub fn text(&self) -> Option<String> {
        match &self.value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Result as a redacting secret; `None` for non-text results.
    #[must_use]
    pub fn secret(&self) -> Option<SecretString> {
        self.text().map(SecretString::new)
    }
}

/// Executes mutations across endpoint variants.
///
/// Safe to share between threads. Attempts against the same
/// [`ResourceRef::key`] are serialized.
pub struct FallbackMutationExecutor {
    api: ApiClient,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl fmt::Debug for FallbackMutationExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackMutationExecutor")
            .field("api", &self.api)
            .finish_non_exhaustive()
    }
}

struct PreparedVariant {
    label: String,
    request: ApiRequest,
}

impl FallbackMutationExecutor {
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            locks: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Run `mutation` against `resource`.
    ///
    /// # Errors
    ///
    /// - [`IdmError::Config`]: empty variant list or unresolved placeholder (nothing sent)
    /// - [`IdmError::MalformedResponse`]: 2xx without a readable result
    /// - [`IdmError::Forbidden`]: a variant answered 403
    /// - [`IdmError::Transport`]: network failure, timeout or unclassified status
    /// - [`IdmError::NoApplicableVariant`]: every variant answered 404
    pub fn execute(
        &self,
        resource: &ResourceRef,
        mutation: &Mutation,
    ) -> Result<MutationSuccess, IdmError> {
        if mutation.variants.is_empty() {
            return Err(IdmError::Config(format!(
                "mutation for {resource} has no endpoint variants"
            )));
        }
        let prepared = mutation
            .variants
            .iter()
            .map(|variant| self.prepare(resource, variant, &mutation.body))
            .collect::<Result<Vec<_>, _>>()?;

        let key = resource.key();
        let lock = self.lock_for(&key);
        let outcome = {
            let _guard = lock.lock();
            self.send_variants(resource, mutation, &prepared)
        };
        self.release_lock(&key, lock);
        outcome
    }

    fn send_variants(
        &self,
        resource: &ResourceRef,
        mutation: &Mutation,
        prepared: &[PreparedVariant],
    ) -> Result<MutationSuccess, IdmError> {
        let mut attempted = Vec::with_capacity(prepared.len());
        for variant in prepared {
            attempted.push(variant.label.clone());
            let response = self.api.send(&variant.request)?;

            match response.status {
                200..=299 => {
                    let value = extract_result(&variant.label, response.status, &response.body, mutation.result)?;
                    info!(
                        resource = %resource,
                        variant = %variant.label,
                        attempts = attempted.len(),
                        "mutation accepted"
                    );
                    return Ok(MutationSuccess {
                        value,
                        variant: variant.label.clone(),
                        attempts: attempted.len(),
                    });
                }
                404 => {
                    debug!(resource = %resource, variant = %variant.label, "variant answered 404, trying next");
                }
                403 => {
                    warn!(resource = %resource, variant = %variant.label, "mutation forbidden");
                    return Err(IdmError::Forbidden {
                        variant: variant.label.clone(),
                        body_preview: body_preview(&response.body),
                    });
                }
                status => {
                    return Err(TransportError::status_with_body(
                        &variant.request.url,
                        status,
                        &response.body,
                    )
                    .into());
                }
            }
        }

        warn!(resource = %resource, attempted = ?attempted, "no endpoint variant applied");
        Err(IdmError::NoApplicableVariant { attempted })
    }

    fn prepare(
        &self,
        resource: &ResourceRef,
        variant: &EndpointVariant,
        body: &Value,
    ) -> Result<PreparedVariant, IdmError> {
        let path = render_template(&variant.path, resource)?;
        let mut request = self.api.request(variant.method.clone(), &path, &OrgContext::Default);
        let org_header = self.api.config().org_header.clone();
        for header in &variant.headers {
            match header {
                HeaderOverride::Set(name, value) => {
                    request.set_header(name, render_template(value, resource)?);
                }
                HeaderOverride::Remove(name) => request.remove_header(name),
                HeaderOverride::Org(value) => {
                    let org = render_template(value, resource)?;
                    if org.is_empty() {
                        request.remove_header(&org_header);
                    } else {
                        request.set_header(&org_header, org);
                    }
                }
                HeaderOverride::NoOrg => request.remove_header(&org_header),
            }
        }
        request.body = Some(body.clone());
        Ok(PreparedVariant {
            label: variant.label.clone(),
            request,
        })
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the map entry for `key` once no other caller holds or awaits it.
    fn release_lock(&self, key: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock();
        // one reference in the map, one here
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }
}

fn extract_result(
    variant: &str,
    status: u16,
    body: &str,
    rule: ResultRule,
) -> Result<Value, IdmError> {
    let malformed = || IdmError::MalformedResponse {
        variant: variant.to_owned(),
        status,
        body_preview: body_preview(body),
    };
    let Ok(Value::Object(map)) = parse_json(variant, body) else {
        return Err(malformed());
    };
    match rule {
        ResultRule::WholeBody => Ok(Value::Object(map)),
        ResultRule::Fields(spec) => resolve_in(&map, spec.paths)
            .value()
            .cloned()
            .ok_or_else(malformed),
    }
}

/// Fill `{name}` placeholders from the resource parameters.
///
/// # Errors
///
/// Returns [`IdmError::Config`] for an unknown or unterminated placeholder.
pub fn render_template(template: &str, resource: &ResourceRef) -> Result<String, IdmError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            return Err(IdmError::Config(format!(
                "unterminated placeholder in template '{template}'"
            )));
        };
        let name = &after[..end];
        let Some(value) = resource.param(name) else {
            return Err(IdmError::Config(format!(
                "template '{template}' needs '{name}' which {resource} does not provide"
            )));
        };
        out.push_str(value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
