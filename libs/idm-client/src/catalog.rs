//! Endpoints and variant tables of the platform's management and v2 APIs.

use http::Method;
use serde_json::{Value, json};

use crate::api::OrgContext;
use crate::fields::{AppKind, FieldSpec};
use crate::mutation::{EndpointVariant, HeaderOverride, Mutation, ResourceRef, ResultRule};
use crate::search::{PaginationStyle, SearchEndpoint, SearchQuery};
use crate::secret::SecretString;

pub const PROJECTS_SEARCH: &str = "/management/v1/projects/_search";
pub const USERS_V2: &str = "/v2/users";
pub const ORG_MEMBERS: &str = "/management/v1/orgs/me/members";
pub const HUMAN_USERS_V2: &str = "/v2/users/human";
pub const APP_SERVICE_REGENERATE_SECRET: &str =
    "/zitadel.app.v2beta.AppService/RegenerateClientSecret";

/// Project listing.
#[must_use]
pub fn projects() -> SearchEndpoint {
    SearchEndpoint::new(PROJECTS_SEARCH).envelope(&["result", "projects"])
}

/// Applications of one project.
#[must_use]
pub fn project_apps(project_id: &str) -> SearchEndpoint {
    SearchEndpoint::new(format!("/management/v1/projects/{project_id}/apps/_search"))
        .envelope(&["result", "apps"])
}

/// Machine (service) users, token-paginated.
#[must_use]
pub fn machine_users() -> (SearchEndpoint, SearchQuery) {
    let endpoint = SearchEndpoint::new(USERS_V2)
        .envelope(&["users", "result"])
        .style(PaginationStyle::Token);
    let query = SearchQuery::default().query(json!({"typeQuery": {"type": "TYPE_MACHINE"}}));
    (endpoint, query)
}

#[must_use]
pub fn project_path(project_id: &str) -> String {
    format!("/management/v1/projects/{project_id}")
}

#[must_use]
pub fn user_path(user_id: &str) -> String {
    format!("{USERS_V2}/{user_id}")
}

/// Organization contexts tried when looking up a user: hint first, then none.
#[must_use]
pub fn user_lookup_contexts(org_hint: Option<&str>) -> Vec<OrgContext> {
    match OrgContext::from_hint(org_hint) {
        OrgContext::None => vec![OrgContext::None],
        hinted => vec![hinted, OrgContext::None],
    }
}

/// Resource reference for an application.
#[must_use]
pub fn app_ref(project_id: &str, app_id: &str, kind: &AppKind) -> ResourceRef {
    ResourceRef::new("app", app_id)
        .with("project_id", project_id)
        .with("app_id", app_id)
        .with("config", kind.config_segment())
}

/// Resource reference for a user; `owner` may be empty.
#[must_use]
pub fn user_ref(user_id: &str, owner: &str) -> ResourceRef {
    ResourceRef::new("user", user_id)
        .with("user_id", user_id)
        .with("owner", owner)
}

/// Client-secret regeneration: app service v2beta first, management v1 second.
#[must_use]
pub fn rotate_app_secret(project_id: &str, app_id: &str) -> Mutation {
    Mutation::new(
        vec![
            EndpointVariant::new("app-service-v2beta", Method::POST, APP_SERVICE_REGENERATE_SECRET)
                .header(HeaderOverride::Set(
                    "Connect-Protocol-Version".to_owned(),
                    "1".to_owned(),
                )),
            EndpointVariant::new(
                "management-v1",
                Method::POST,
                "/management/v1/projects/{project_id}/apps/{app_id}/{config}/_generate_client_secret",
            ),
        ],
        json!({"projectId": project_id, "appId": app_id}),
        ResultRule::Fields(FieldSpec::SECRET),
    )
}

/// Machine-user secret regeneration.
///
/// v2 with the owning org, v2 without an org header, then management v1
/// with the owning org. The `owner` parameter of the [`ResourceRef`] selects
/// the organization.
#[must_use]
pub fn rotate_machine_user_secret() -> Mutation {
    Mutation::new(
        vec![
            EndpointVariant::new("user-v2-owner-org", Method::POST, "/v2/users/{user_id}/secret")
                .header(HeaderOverride::Org("{owner}".to_owned())),
            EndpointVariant::new("user-v2-no-org", Method::POST, "/v2/users/{user_id}/secret")
                .header(HeaderOverride::NoOrg),
            EndpointVariant::new(
                "management-v1-owner-org",
                Method::PUT,
                "/management/v1/users/{user_id}/secret",
            )
            .header(HeaderOverride::Org("{owner}".to_owned())),
        ],
        json!({}),
        ResultRule::Fields(FieldSpec::SECRET),
    )
}

/// Replace the redirect and post-logout URIs of an OIDC application.
#[must_use]
pub fn update_oidc_redirects(redirect_uris: &[String], post_logout_uris: &[String]) -> Mutation {
    Mutation::new(
        vec![EndpointVariant::new(
            "management-v1",
            Method::PUT,
            "/management/v1/projects/{project_id}/apps/{app_id}/oidc_config",
        )],
        json!({
            "redirectUris": redirect_uris,
            "postLogoutRedirectUris": post_logout_uris,
        }),
        ResultRule::WholeBody,
    )
}

/// Human user to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHumanUser {
    pub username: String,
    pub given_name: String,
    pub family_name: String,
    pub email: String,
    pub email_verified: bool,
    pub password: Option<SecretString>,
    pub password_change_required: bool,
}

impl NewHumanUser {
    fn body(&self) -> Value {
        let mut body = json!({
            "userName": self.username,
            "profile": {"givenName": self.given_name, "familyName": self.family_name},
            "email": {"email": self.email, "isVerified": self.email_verified},
        });
        if let (Some(password), Some(map)) = (&self.password, body.as_object_mut()) {
            map.insert(
                "password".to_owned(),
                json!({"password": password.expose(), "changeRequired": self.password_change_required}),
            );
        }
        body
    }
}

#[must_use]
pub fn create_human_user(user: &NewHumanUser) -> Mutation {
    Mutation::new(
        vec![EndpointVariant::new("user-v2-human", Method::POST, HUMAN_USERS_V2)],
        user.body(),
        ResultRule::Fields(FieldSpec::CREATED_USER_ID),
    )
}

/// Grant organization roles to a user.
#[must_use]
pub fn add_org_member(user_id: &str, roles: &[String]) -> Mutation {
    Mutation::new(
        vec![EndpointVariant::new("management-v1", Method::POST, ORG_MEMBERS)],
        json!({"userId": user_id, "roles": roles}),
        ResultRule::WholeBody,
    )
}
