use super::IdmAdmin;
use crate::api::OrgContext;
use crate::catalog;
use crate::error::IdmError;
use crate::fields::{AppKind, FieldSpec, Record};

/// Application with its normalized identifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct AppSummary {
    pub app_id: String,
    pub name: String,
    pub kind: AppKind,
    pub client_id: String,
    pub record: Record,
}

impl AppSummary {
    fn from_record(record: Record) -> Self {
        Self {
            app_id: record.text(&FieldSpec::RESOURCE_ID),
            name: record.text(&FieldSpec::DISPLAY_NAME),
            kind: AppKind::classify(&record),
            client_id: record.text(&FieldSpec::CLIENT_ID),
            record,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectDescription {
    pub project: Record,
    pub apps: Vec<AppSummary>,
}

impl IdmAdmin {
    /// Project details plus its applications.
    ///
    /// # Errors
    ///
    /// Returns [`IdmError::NotFound`] for an unknown project and propagates
    /// read failures.
    pub fn describe_project(&self, project_id: &str) -> Result<ProjectDescription, IdmError> {
        let payload = self
            .get_record(&catalog::project_path(project_id), &OrgContext::Default)?
            .ok_or_else(|| IdmError::NotFound {
                kind: "project",
                id: project_id.to_owned(),
            })?;
        let project = payload.unwrap_envelope("project");
        let apps = self
            .list_apps(project_id)?
            .into_iter()
            .map(AppSummary::from_record)
            .collect();
        Ok(ProjectDescription { project, apps })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::retry::ReadRetry;
    use crate::testing::{ScriptedTransport, client_with};
    use serde_json::json;

    #[test]
    fn test_nested_project_is_unwrapped() {
        let t = ScriptedTransport::new();
        t.reply_json(200, &json!({"project": {"id": "p1", "name": "Billing"}}))
            .reply_json(
                200,
                &json!({"result": [
                    {"id": "a1", "name": "web", "oidcConfig": {"clientId": "c-web"}},
                    {"id": "a2", "name": "batch", "apiConfig": {"clientId": "c-batch"}}
                ]}),
            );
        let admin = IdmAdmin::new(client_with(&t, 10));
        let described = admin.describe_project("p1").unwrap();
        assert_eq!(described.project.text(&FieldSpec::PROJECT_NAME), "Billing");
        assert_eq!(described.apps.len(), 2);
        assert_eq!(described.apps[0].kind, AppKind::Oidc);
        assert_eq!(described.apps[1].client_id, "c-batch");
    }

    #[test]
    fn test_flat_project_and_missing_project() {
        let t = ScriptedTransport::new();
        t.reply_json(200, &json!({"id": "p1", "name": "Flat"}))
            .reply_json(200, &json!({"result": []}))
            .reply(404, "");
        let admin = IdmAdmin::new(client_with(&t, 10)).with_read_retry(ReadRetry::disabled());
        let described = admin.describe_project("p1").unwrap();
        assert_eq!(described.project.text(&FieldSpec::PROJECT_NAME), "Flat");
        assert!(described.apps.is_empty());

        let err = admin.describe_project("p2").unwrap_err();
        assert!(matches!(err, IdmError::NotFound { kind: "project", .. }));
    }
}
