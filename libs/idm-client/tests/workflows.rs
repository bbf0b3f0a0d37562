#![allow(clippy::unwrap_used, clippy::expect_used, clippy::use_debug)]

//! Administrative workflows end to end against a mock platform.

mod common;

use httpmock::prelude::*;
use idm_client::{
    IdmError, InventoryOptions, NewHumanUser, RotationOutcome, Scope, SecretString, catalog,
};
use serde_json::{Value, json};

use common::{ORG, admin, capture_warnings};

fn app(id: &str, name: &str, client_id: &str) -> Value {
    json!({"id": id, "name": name, "oidcConfig": {"clientId": client_id}})
}

fn mock_two_projects(server: &MockServer) {
    server.mock(|when, then| {
        when.method(POST).path(catalog::PROJECTS_SEARCH);
        then.status(200).json_body(json!({"result": [
            {"id": "p-1", "name": "Billing"},
            {"id": "p-2", "name": "Portal"}
        ]}));
    });
    server.mock(|when, then| {
        when.method(POST).path("/management/v1/projects/p-1/apps/_search");
        then.status(200).json_body(json!({"result": [
            app("a-1", "billing-web", "c-1"),
            app("a-2", "billing-batch", "c-2"),
            {"id": "a-3", "name": "billing-api", "apiConfig": {"clientId": "c-3"}}
        ]}));
    });
    server.mock(|when, then| {
        when.method(POST).path("/management/v1/projects/p-2/apps/_search");
        then.status(200).json_body(json!({"apps": [
            app("a-4", "portal-web", "c-4"),
            app("a-5", "portal-admin", "c-5"),
            {"id": "a-6", "name": "portal-saml", "samlConfig": {}}
        ]}));
    });
}

#[test]
fn inventory_rotates_only_the_targeted_client() {
    let server = MockServer::start();
    mock_two_projects(&server);
    let rotation = server.mock(|when, then| {
        when.method(POST)
            .path(catalog::APP_SERVICE_REGENERATE_SECRET)
            .body_includes("\"appId\":\"a-5\"");
        then.status(200).json_body(json!({"clientSecret": "rotated-secret"}));
    });
    let other_rotation = server.mock(|when, then| {
        when.method(POST)
            .path(catalog::APP_SERVICE_REGENERATE_SECRET)
            .body_excludes("\"appId\":\"a-5\"");
        then.status(200).json_body(json!({"clientSecret": "wrong"}));
    });

    let report = admin(&server)
        .inventory(&InventoryOptions {
            target_client_id: Some("c-5".to_owned()),
            ..Default::default()
        })
        .unwrap();

    assert_eq!(report.rows.len(), 6);
    assert!(report.warnings.is_empty());
    let rotated: Vec<_> = report.rotated().collect();
    assert_eq!(rotated.len(), 1);
    assert_eq!(rotated[0].resource_id, "a-5");
    assert_eq!(rotated[0].project_name, "Portal");
    assert_eq!(rotated[0].rotation.report_value(), "rotated-secret");
    for row in report.rows.iter().filter(|r| r.resource_id != "a-5") {
        assert_eq!(row.rotation, RotationOutcome::NotTargeted);
        assert_eq!(row.rotation.report_value(), "");
    }
    rotation.assert_calls(1);
    other_rotation.assert_calls(0);
}

#[test]
fn inventory_keeps_going_when_one_project_fails() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path(catalog::PROJECTS_SEARCH);
        then.status(200).json_body(json!({"result": [
            {"id": "p-1", "name": "Broken"},
            {"id": "p-2", "name": "Fine"}
        ]}));
    });
    server.mock(|when, then| {
        when.method(POST).path("/management/v1/projects/p-1/apps/_search");
        then.status(403).body("denied");
    });
    server.mock(|when, then| {
        when.method(POST).path("/management/v1/projects/p-2/apps/_search");
        then.status(200).json_body(json!({"result": [app("a-9", "fine-web", "c-9")]}));
    });

    let report = admin(&server).inventory(&InventoryOptions::default()).unwrap();

    assert_eq!(report.rows.len(), 1);
    assert_eq!(report.rows[0].client_id, "c-9");
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("p-1"));
}

#[test]
fn inventory_fails_when_projects_cannot_be_listed() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path(catalog::PROJECTS_SEARCH);
        then.status(401).body("unauthenticated");
    });

    let err = admin(&server).inventory(&InventoryOptions::default()).unwrap_err();
    assert!(matches!(err, IdmError::Transport(_)));
}

#[test]
fn unrecognized_listing_shape_is_reported_not_silent() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path(catalog::PROJECTS_SEARCH);
        then.status(200).json_body(json!({"projectList": [{"id": "p-1"}]}));
    });

    let (report, warnings) =
        capture_warnings(|| admin(&server).inventory(&InventoryOptions::default()).unwrap());

    assert!(report.rows.is_empty());
    assert!(
        warnings.iter().any(|w| w.contains("envelope")),
        "expected an envelope warning, got: {warnings:?}"
    );
    assert_eq!(report.warnings.len(), 1, "{:?}", report.warnings);
    assert!(report.warnings[0].contains("list projects"));
    assert!(report.warnings[0].contains("unrecognized envelope"));
    assert!(!report.is_complete());
}

#[test]
fn bulk_rotation_skips_applications_without_secrets() {
    let server = MockServer::start();
    mock_two_projects(&server);
    let rotation = server.mock(|when, then| {
        when.method(POST).path(catalog::APP_SERVICE_REGENERATE_SECRET);
        then.status(200).json_body(json!({"clientSecret": "bulk"}));
    });

    let report = admin(&server).rotate_all_app_secrets().unwrap();

    assert_eq!(report.rows.len(), 6);
    assert_eq!(report.rotated().count(), 5);
    let saml = report.rows.iter().find(|r| r.resource_id == "a-6").unwrap();
    assert!(matches!(saml.rotation, RotationOutcome::Skipped { .. }));
    rotation.assert_calls(5);
}

#[test]
fn explicit_service_user_rotation_uses_owner_org() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path(catalog::PROJECTS_SEARCH);
        then.status(200).json_body(json!({"result": []}));
    });
    let lookup = server.mock(|when, then| {
        when.method(GET).path("/v2/users/u-9").header("x-zitadel-orgid", ORG);
        then.status(200).json_body(json!({
            "details": {"resourceOwner": "owner-org"},
            "user": {"userId": "u-9", "username": "ci-bot", "machine": {"name": "CI bot"}}
        }));
    });
    let rotate = server.mock(|when, then| {
        when.method(POST)
            .path("/v2/users/u-9/secret")
            .header("x-zitadel-orgid", "owner-org");
        then.status(200).json_body(json!({"clientSecret": "bot-secret"}));
    });

    let report = admin(&server)
        .inventory(&InventoryOptions {
            target_service_user_id: Some("u-9".to_owned()),
            ..Default::default()
        })
        .unwrap_or_else(|err| panic!("inventory failed: {err}"));

    let row = report
        .rows
        .iter()
        .find(|r| r.scope == Scope::ServiceUser)
        .unwrap();
    assert_eq!(row.resource_id, "u-9");
    assert_eq!(row.rotation.report_value(), "bot-secret");
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    lookup.assert_calls(1);
    rotate.assert_calls(1);
}

#[test]
fn machine_user_without_owner_falls_back_to_hint_then_no_org() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v2/users/u-3").header("x-zitadel-orgid", "hint-org");
        then.status(404);
    });
    server.mock(|when, then| {
        when.method(GET).path("/v2/users/u-3").header_missing("x-zitadel-orgid");
        then.status(200).json_body(json!({"user": {"userId": "u-3", "type": "TYPE_MACHINE"}}));
    });
    let with_hint = server.mock(|when, then| {
        when.method(POST)
            .path("/v2/users/u-3/secret")
            .header("x-zitadel-orgid", "hint-org");
        then.status(404);
    });
    let without_org = server.mock(|when, then| {
        when.method(POST)
            .path("/v2/users/u-3/secret")
            .header_missing("x-zitadel-orgid");
        then.status(200).json_body(json!({"clientSecret": "s-3"}));
    });

    let rotated = admin(&server)
        .rotate_machine_user_secret("u-3", Some("hint-org"))
        .unwrap();

    assert_eq!(rotated.owner, "hint-org");
    assert_eq!(rotated.variant, "user-v2-no-org");
    assert_eq!(rotated.attempts, 2);
    assert_eq!(rotated.secret.expose(), "s-3");
    with_hint.assert_calls(1);
    without_org.assert_calls(1);
}

#[test]
fn human_user_is_refused_for_secret_rotation() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v2/users/u-h");
        then.status(200).json_body(json!({
            "user": {"userId": "u-h", "state": "USER_STATE_ACTIVE", "human": {"email": {}}}
        }));
    });
    let rotate = server.mock(|when, then| {
        when.method(POST).path("/v2/users/u-h/secret");
        then.status(200).json_body(json!({"clientSecret": "never"}));
    });

    let err = admin(&server)
        .rotate_machine_user_secret("u-h", None)
        .unwrap_err();

    assert!(matches!(err, IdmError::NotMachineUser { .. }));
    rotate.assert_calls(0);
}

#[test]
fn redirect_update_locates_project_and_replaces_uris() {
    let server = MockServer::start();
    mock_two_projects(&server);
    let update = server.mock(|when, then| {
        when.method(PUT)
            .path("/management/v1/projects/p-2/apps/a-4/oidc_config")
            .body_includes("https://app42dev.example.test/auth/callback")
            .body_includes("postLogoutRedirectUris");
        then.status(200).json_body(json!({"details": {}}));
    });

    let updated = admin(&server)
        .update_redirect_uris(
            "a-4",
            &["https://app42dev.example.test/auth/callback".to_owned()],
            &["https://app42dev.example.test/app-web/".to_owned()],
        )
        .unwrap();

    assert_eq!(updated.project_id, "p-2");
    update.assert_calls(1);
}

#[test]
fn provisioning_creates_user_then_grants_roles() {
    let server = MockServer::start();
    let create = server.mock(|when, then| {
        when.method(POST)
            .path(catalog::HUMAN_USERS_V2)
            .body_includes("\"userName\":\"jdoe\"");
        then.status(201).json_body(json!({"userId": "u-new"}));
    });
    let grant = server.mock(|when, then| {
        when.method(POST)
            .path(catalog::ORG_MEMBERS)
            .body_includes("\"userId\":\"u-new\"")
            .body_includes("ORG_USER_MANAGER");
        then.status(200).json_body(json!({"details": {}}));
    });

    let user = NewHumanUser {
        username: "jdoe".to_owned(),
        given_name: "Jane".to_owned(),
        family_name: "Doe".to_owned(),
        email: "jane@example.test".to_owned(),
        email_verified: true,
        password: Some(SecretString::new("Initial-Pass-1")),
        password_change_required: true,
    };
    let provisioned = admin(&server)
        .provision_human_user(&user, &["ORG_USER_MANAGER".to_owned()])
        .unwrap();

    assert_eq!(provisioned.user_id, "u-new");
    assert_eq!(provisioned.org_id, ORG);
    assert!(provisioned.membership_error.is_none());
    create.assert_calls(1);
    grant.assert_calls(1);
}
