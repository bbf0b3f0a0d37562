#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Client for identity-platform administration APIs
//!
//! The crate packages the access patterns an operator needs against an
//! identity platform whose REST surface drifts between versions:
//! - **Paginated search** over listing endpoints, tolerant of envelope shape
//!   (`result` vs `projects`) and of offset or token pagination
//! - **Field resolution** across candidate paths (`oidcConfig.clientId`,
//!   `apiConfig.clientId`, `clientId`)
//! - **Fallback mutations** that try endpoint variants in order and classify
//!   every outcome (404 means "try the next one", 403 is terminal)
//! - Administrative **workflows** built on those three: client inventory,
//!   secret rotation, redirect updates, user provisioning
//!
//! All I/O is blocking. One [`ApiClient`] holds the configuration; there is
//! no process-wide state.
//!
//! # Example
//!
//! ```ignore
//! use idm_client::{ApiClient, ClientConfig, IdmAdmin, InventoryOptions};
//!
//! let api = ApiClient::new(ClientConfig::new(
//!     "https://idp.example.com",
//!     token,
//!     "301926074198032394",
//! ))?;
//! let admin = IdmAdmin::new(api);
//! let report = admin.inventory(&InventoryOptions {
//!     target_client_id: Some("301926079046713354".into()),
//!     ..Default::default()
//! })?;
//! for row in report.rotated() {
//!     println!("{},{}", row.name, row.rotation.report_value());
//! }
//! ```

mod api;
pub mod catalog;
mod config;
mod error;
mod fields;
mod mutation;
mod retry;
mod search;
mod secret;
mod transport;
mod workflows;

#[cfg(test)]
mod testing;

pub use api::{ApiClient, OrgContext};
pub use catalog::NewHumanUser;
pub use config::{
    ClientConfig, DEFAULT_ORG_HEADER, DEFAULT_PAGE_SIZE, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_USER_AGENT,
};
pub use error::{ERROR_BODY_PREVIEW_LIMIT, IdmError, Operation, TransportError};
pub use fields::{AppKind, FieldPath, FieldSpec, Record, Resolved, resolve, resolve_in};
pub use mutation::{
    EndpointVariant, FallbackMutationExecutor, HeaderOverride, Mutation, MutationSuccess,
    ResourceRef, ResultRule, render_template,
};
pub use retry::{ExponentialBackoff, ReadRetry};
pub use search::{
    PagedSearchClient, PaginationStyle, SearchEndpoint, SearchQuery, SearchResult, SearchSession,
    Termination,
};
pub use secret::SecretString;
pub use transport::{ApiRequest, ApiResponse, Transport, UreqTransport};
pub use workflows::{
    AppLocation, AppSummary, IdmAdmin, InventoryOptions, InventoryReport, InventoryRow, MachineUser,
    MachineUserSecret, ProjectDescription, ProvisionedUser, RedirectUpdate, RotationOutcome, Scope,
};
