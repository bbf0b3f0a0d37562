use tracing::{info, warn};

use super::IdmAdmin;
use crate::catalog;
use crate::error::IdmError;
use crate::fields::{AppKind, FieldSpec};

/// Applied redirect change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectUpdate {
    pub project_id: String,
    pub app_id: String,
    pub redirect_uris: Vec<String>,
    pub post_logout_uris: Vec<String>,
    pub variant: String,
    /// Listings that failed or stopped early while locating the app
    pub warnings: Vec<String>,
}

/// Result of searching every project for an application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppLocation {
    pub project_id: Option<String>,
    /// Projects skipped and listings cut short during the search
    pub warnings: Vec<String>,
}

impl IdmAdmin {
    /// Project owning `app_id`, searching every visible project.
    ///
    /// Projects whose apps cannot be listed are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error only when the project listing itself fails.
    pub fn find_project_for_app(&self, app_id: &str) -> Result<AppLocation, IdmError> {
        let mut location = AppLocation::default();
        for project in self.projects_noting(&mut location.warnings)? {
            let project_id = project.text(&FieldSpec::RESOURCE_ID);
            if project_id.is_empty() {
                continue;
            }
            match self.apps_noting(&project_id, &mut location.warnings) {
                Ok(apps) => {
                    if apps.iter().any(|app| app.text(&FieldSpec::RESOURCE_ID) == app_id) {
                        location.project_id = Some(project_id);
                        return Ok(location);
                    }
                }
                Err(err) => {
                    warn!(project_id = %project_id, error = %err, "listing apps failed; project skipped");
                    location
                        .warnings
                        .push(format!("listing apps for project {project_id} failed: {err}"));
                }
            }
        }
        Ok(location)
    }

    /// Replace an OIDC application's redirect and post-logout URIs.
    ///
    /// # Errors
    ///
    /// - [`IdmError::Config`] when `redirect_uris` is empty
    /// - [`IdmError::NotFound`] when no project contains the app
    /// - any executor error
    pub fn update_redirect_uris(
        &self,
        app_id: &str,
        redirect_uris: &[String],
        post_logout_uris: &[String],
    ) -> Result<RedirectUpdate, IdmError> {
        if redirect_uris.is_empty() {
            return Err(IdmError::Config("at least one redirect URI is required".to_owned()));
        }
        let location = self.find_project_for_app(app_id)?;
        let Some(project_id) = location.project_id else {
            if !location.warnings.is_empty() {
                warn!(
                    app_id = %app_id,
                    skipped = location.warnings.len(),
                    "app not found, but some listings were incomplete"
                );
            }
            return Err(IdmError::NotFound {
                kind: "app",
                id: app_id.to_owned(),
            });
        };

        let resource = catalog::app_ref(&project_id, app_id, &AppKind::Oidc);
        let success = self.executor.execute(
            &resource,
            &catalog::update_oidc_redirects(redirect_uris, post_logout_uris),
        )?;
        info!(project_id = %project_id, app_id = %app_id, "redirect URIs updated");

        Ok(RedirectUpdate {
            project_id,
            app_id: app_id.to_owned(),
            redirect_uris: redirect_uris.to_vec(),
            post_logout_uris: post_logout_uris.to_vec(),
            variant: success.variant,
            warnings: location.warnings,
        })
    }
}
