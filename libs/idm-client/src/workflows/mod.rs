//! Administrative workflows built on the search client, field resolver and
//! mutation executor.

mod inventory;
mod project;
mod provisioning;
mod redirect;
mod service_user;

use std::time::Duration;

use http::Method;
use tracing::warn;

pub use inventory::{InventoryOptions, InventoryReport, InventoryRow, RotationOutcome, Scope};
pub use project::{AppSummary, ProjectDescription};
pub use provisioning::ProvisionedUser;
pub use redirect::{AppLocation, RedirectUpdate};
pub use service_user::{MachineUser, MachineUserSecret};

use crate::api::{ApiClient, OrgContext, parse_json};
use crate::catalog;
use crate::error::{IdmError, TransportError};
use crate::fields::Record;
use crate::mutation::FallbackMutationExecutor;
use crate::retry::ReadRetry;
use crate::search::{PagedSearchClient, SearchEndpoint, SearchQuery, SearchResult};

/// Entry point for the administrative operations.
///
/// Reads go through [`ReadRetry`]; mutations are attempted once per variant.
#[derive(Debug)]
pub struct IdmAdmin {
    search: PagedSearchClient,
    executor: FallbackMutationExecutor,
    retry: ReadRetry,
    mutation_pause: Duration,
}

impl IdmAdmin {
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self {
            search: PagedSearchClient::new(api.clone()),
            executor: FallbackMutationExecutor::new(api),
            retry: ReadRetry::default(),
            mutation_pause: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_read_retry(mut self, retry: ReadRetry) -> Self {
        self.retry = retry;
        self
    }

    /// Pause between consecutive mutations in bulk operations.
    #[must_use]
    pub fn with_mutation_pause(mut self, pause: Duration) -> Self {
        self.mutation_pause = pause;
        self
    }

    #[must_use]
    pub fn api(&self) -> &ApiClient {
        self.executor.api()
    }

    #[must_use]
    pub fn executor(&self) -> &FallbackMutationExecutor {
        &self.executor
    }

    #[must_use]
    pub fn search_client(&self) -> &PagedSearchClient {
        &self.search
    }

    /// All projects visible in the default organization.
    ///
    /// # Errors
    ///
    /// Returns the search error after read retries are exhausted.
    pub fn list_projects(&self) -> Result<Vec<Record>, IdmError> {
        self.projects_noting(&mut Vec::new())
    }

    /// All applications of a project.
    ///
    /// # Errors
    ///
    /// Returns the search error after read retries are exhausted.
    pub fn list_apps(&self, project_id: &str) -> Result<Vec<Record>, IdmError> {
        self.apps_noting(project_id, &mut Vec::new())
    }

    fn projects_noting(&self, warnings: &mut Vec<String>) -> Result<Vec<Record>, IdmError> {
        self.collect(
            "list projects",
            &catalog::projects(),
            &SearchQuery::default(),
            warnings,
        )
    }

    fn apps_noting(
        &self,
        project_id: &str,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<Record>, IdmError> {
        self.collect(
            &format!("list apps of project {project_id}"),
            &catalog::project_apps(project_id),
            &SearchQuery::default(),
            warnings,
        )
    }

    /// Drain a search. A session that stopped before end of data keeps its
    /// records and adds a line to `warnings`.
    fn collect(
        &self,
        what: &str,
        endpoint: &SearchEndpoint,
        query: &SearchQuery,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<Record>, IdmError> {
        let result = self
            .retry
            .run(what, || self.search.search(endpoint, query).collect_all())?;
        if !result.termination.is_clean() {
            warn!(
                operation = what,
                termination = %result.termination,
                records = result.records.len(),
                "search ended early"
            );
            warnings.push(incomplete_listing(what, &result));
        }
        Ok(result.records)
    }

    /// `GET` a single object; `Ok(None)` on 404.
    fn get_record(&self, path: &str, org: &OrgContext) -> Result<Option<Record>, IdmError> {
        self.retry.run("get", || {
            let api = self.api();
            let req = api.request(Method::GET, path, org);
            let response = api.send(&req)?;
            if response.status == 404 {
                return Ok(None);
            }
            if !response.is_success() {
                return Err(TransportError::status_with_body(
                    &req.url,
                    response.status,
                    &response.body,
                )
                .into());
            }
            let value = parse_json(&req.url, &response.body)?;
            Record::from_value(value)
                .map(Some)
                .ok_or_else(|| IdmError::decode(&req.url, "response is not a JSON object"))
        })
    }

    fn pause(&self) {
        if !self.mutation_pause.is_zero() {
            std::thread::sleep(self.mutation_pause);
        }
    }
}

fn incomplete_listing(what: &str, result: &SearchResult) -> String {
    format!(
        "{what}: search ended early ({}) after {} records; results may be incomplete",
        result.termination,
        result.records.len()
    )
}
