use std::fmt;

use tracing::{info, warn};

use super::IdmAdmin;
use crate::catalog;
use crate::error::{IdmError, Operation};
use crate::fields::{AppKind, FieldSpec, Record};
use crate::secret::SecretString;

/// What an inventory row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    App,
    ServiceUser,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::App => "APP",
            Self::ServiceUser => "SERVICE_USER",
        })
    }
}

/// Per-row rotation result.
#[derive(Debug, Clone, PartialEq)]
pub enum RotationOutcome {
    /// The row was not selected for rotation
    NotTargeted,
    /// Selected but the resource has no rotatable secret
    Skipped { reason: String },
    Rotated { secret: SecretString, variant: String },
    Failed {
        kind: &'static str,
        message: String,
        safe_to_rerun: bool,
    },
}

impl RotationOutcome {
    fn from_error(err: &IdmError) -> Self {
        Self::Failed {
            kind: err.kind(),
            message: err.to_string(),
            safe_to_rerun: err.safe_to_rerun(Operation::Mutation),
        }
    }

    #[must_use]
    pub fn secret(&self) -> Option<&SecretString> {
        match self {
            Self::Rotated { secret, .. } => Some(secret),
            Self::NotTargeted | Self::Skipped { .. } | Self::Failed { .. } => None,
        }
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Report cell: the new secret, `ERROR: …`, or empty.
    #[must_use]
    pub fn report_value(&self) -> String {
        match self {
            Self::NotTargeted | Self::Skipped { .. } => String::new(),
            Self::Rotated { secret, .. } => secret.expose().to_owned(),
            Self::Failed { message, .. } => format!("ERROR: {message}"),
        }
    }
}

/// One client (application or service user) in the inventory.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryRow {
    pub scope: Scope,
    pub project_id: String,
    pub project_name: String,
    pub resource_id: String,
    pub name: String,
    pub type_label: String,
    pub client_id: String,
    pub rotation: RotationOutcome,
}

impl InventoryRow {
    /// Report column names in output order.
    pub const COLUMNS: [&'static str; 8] = [
        "scope",
        "project_id",
        "project_name",
        "resource_id",
        "name",
        "type",
        "client_id",
        "new_secret_if_target",
    ];

    /// Cells in [`COLUMNS`](Self::COLUMNS) order.
    #[must_use]
    pub fn cells(&self) -> [String; 8] {
        [
            self.scope.to_string(),
            self.project_id.clone(),
            self.project_name.clone(),
            self.resource_id.clone(),
            self.name.clone(),
            self.type_label.clone(),
            self.client_id.clone(),
            self.rotation.report_value(),
        ]
    }

    fn app(project: &Record, app: &Record) -> Self {
        Self {
            scope: Scope::App,
            project_id: project.text(&FieldSpec::RESOURCE_ID),
            project_name: project.text(&FieldSpec::PROJECT_NAME),
            resource_id: app.text(&FieldSpec::RESOURCE_ID),
            name: app.text(&FieldSpec::DISPLAY_NAME),
            type_label: AppKind::classify(app).to_string(),
            client_id: app.text(&FieldSpec::CLIENT_ID),
            rotation: RotationOutcome::NotTargeted,
        }
    }
}

/// Selection for [`IdmAdmin::inventory`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryOptions {
    /// Rotate apps (and service users) whose client id matches
    pub target_client_id: Option<String>,
    /// Rotate this machine user even if the listing does not return it
    pub target_service_user_id: Option<String>,
    /// Add one row per machine user
    pub include_service_users: bool,
}

impl InventoryOptions {
    fn targets_client(&self, client_id: &str) -> bool {
        !client_id.is_empty() && self.target_client_id.as_deref() == Some(client_id)
    }
}

/// Inventory rows plus the non-fatal problems met along the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InventoryReport {
    pub rows: Vec<InventoryRow>,
    pub warnings: Vec<String>,
}

impl InventoryReport {
    /// Rows that received a new secret.
    pub fn rotated(&self) -> impl Iterator<Item = &InventoryRow> {
        self.rows.iter().filter(|r| r.rotation.secret().is_some())
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.rows.iter().any(|r| r.rotation.is_failure())
    }

    /// `true` when no row failed and nothing was skipped or cut short.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.has_failures() && self.warnings.is_empty()
    }
}

impl IdmAdmin {
    /// List every application (and optionally machine user) and rotate the
    /// secrets of the selected targets.
    ///
    /// Failures listing a single project's apps, or listing machine users,
    /// become warnings, as does any listing that stopped before its end of
    /// data. Rotation failures are recorded in the affected row.
    ///
    /// # Errors
    ///
    /// Returns an error only when the project listing itself fails.
    pub fn inventory(&self, options: &InventoryOptions) -> Result<InventoryReport, IdmError> {
        let mut report = InventoryReport::default();

        for project in self.projects_noting(&mut report.warnings)? {
            let project_id = project.text(&FieldSpec::RESOURCE_ID);
            let Some(apps) = self.apps_or_warn(&project_id, &mut report.warnings) else {
                continue;
            };

            for app in &apps {
                let mut row = InventoryRow::app(&project, app);
                if options.targets_client(&row.client_id) {
                    row.rotation = self.rotate_app(&row.project_id, app);
                }
                report.rows.push(row);
            }
        }

        let mut explicit_seen = false;
        if options.include_service_users {
            match self.machine_users_noting(&mut report.warnings) {
                Ok(users) => {
                    for user in users {
                        let explicit =
                            options.target_service_user_id.as_deref() == Some(user.user_id.as_str());
                        explicit_seen |= explicit;
                        let targeted = explicit
                            || options.targets_client(&user.client_id)
                            || options.targets_client(&user.user_id);
                        let rotation = if targeted {
                            self.rotation_outcome_for_user(&user.user_id)
                        } else {
                            RotationOutcome::NotTargeted
                        };
                        report.rows.push(user.into_row(rotation));
                    }
                }
                Err(err) => {
                    warn!(error = %err, "listing machine users failed");
                    report.warnings.push(format!("listing machine users failed: {err}"));
                }
            }
        }

        if let Some(user_id) = options.target_service_user_id.as_deref()
            && !explicit_seen
            && !user_id.is_empty()
        {
            report.rows.push(self.rotate_unlisted_user(user_id));
        }

        Ok(report)
    }

    /// Rotate the client secret of every OIDC and API application.
    ///
    /// Other application types are reported as skipped. The configured
    /// mutation pause is applied between rotations.
    ///
    /// # Errors
    ///
    /// Returns an error only when the project listing itself fails.
    pub fn rotate_all_app_secrets(&self) -> Result<InventoryReport, IdmError> {
        let mut report = InventoryReport::default();
        let mut first = true;

        for project in self.projects_noting(&mut report.warnings)? {
            let project_id = project.text(&FieldSpec::RESOURCE_ID);
            let Some(apps) = self.apps_or_warn(&project_id, &mut report.warnings) else {
                continue;
            };

            for app in &apps {
                let mut row = InventoryRow::app(&project, app);
                let kind = AppKind::classify(app);
                if kind.has_client_secret() {
                    if !first {
                        self.pause();
                    }
                    first = false;
                    row.rotation = self.rotate_app(&project_id, app);
                } else {
                    info!(app_id = %row.resource_id, app_type = %kind, "application has no client secret; skipped");
                    row.rotation = RotationOutcome::Skipped {
                        reason: format!("{kind} applications have no client secret"),
                    };
                }
                report.rows.push(row);
            }
        }
        Ok(report)
    }

    /// Rotate one application's secret.
    ///
    /// # Errors
    ///
    /// Returns the executor's error, see [`FallbackMutationExecutor::execute`](crate::FallbackMutationExecutor::execute).
    pub fn rotate_app_secret(
        &self,
        project_id: &str,
        app: &Record,
    ) -> Result<(SecretString, String), IdmError> {
        let app_id = app.text(&FieldSpec::RESOURCE_ID);
        let kind = AppKind::classify(app);
        let resource = catalog::app_ref(project_id, &app_id, &kind);
        let success = self
            .executor
            .execute(&resource, &catalog::rotate_app_secret(project_id, &app_id))?;
        let secret = success.secret().ok_or_else(|| IdmError::MalformedResponse {
            variant: success.variant.clone(),
            status: 200,
            body_preview: "secret field is not a string".to_owned(),
        })?;
        Ok((secret, success.variant))
    }

    fn apps_or_warn(&self, project_id: &str, warnings: &mut Vec<String>) -> Option<Vec<Record>> {
        if project_id.is_empty() {
            warn!("project without id skipped");
            warnings.push("project without id skipped".to_owned());
            return None;
        }
        match self.apps_noting(project_id, warnings) {
            Ok(apps) => Some(apps),
            Err(err) => {
                warn!(project_id = %project_id, error = %err, "listing apps failed; project skipped");
                warnings.push(format!("listing apps for project {project_id} failed: {err}"));
                None
            }
        }
    }

    fn rotate_app(&self, project_id: &str, app: &Record) -> RotationOutcome {
        match self.rotate_app_secret(project_id, app) {
            Ok((secret, variant)) => RotationOutcome::Rotated { secret, variant },
            Err(err) => {
                warn!(
                    project_id = %project_id,
                    app_id = %app.text(&FieldSpec::RESOURCE_ID),
                    error = %err,
                    "app secret rotation failed"
                );
                RotationOutcome::from_error(&err)
            }
        }
    }

    fn rotation_outcome_for_user(&self, user_id: &str) -> RotationOutcome {
        match self.rotate_machine_user_secret(user_id, Some(self.api().config().org_id.as_str())) {
            Ok(rotated) => RotationOutcome::Rotated {
                secret: rotated.secret,
                variant: rotated.variant,
            },
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "machine user secret rotation failed");
                RotationOutcome::from_error(&err)
            }
        }
    }

    /// Row for an explicitly targeted user that the listing did not return.
    fn rotate_unlisted_user(&self, user_id: &str) -> InventoryRow {
        let mut row = InventoryRow {
            scope: Scope::ServiceUser,
            project_id: String::new(),
            project_name: String::new(),
            resource_id: user_id.to_owned(),
            name: String::new(),
            type_label: Scope::ServiceUser.to_string(),
            client_id: String::new(),
            rotation: RotationOutcome::NotTargeted,
        };
        match self.rotate_machine_user_secret(user_id, Some(self.api().config().org_id.as_str())) {
            Ok(rotated) => {
                row.name = rotated.display_name;
                row.rotation = RotationOutcome::Rotated {
                    secret: rotated.secret,
                    variant: rotated.variant,
                };
            }
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "machine user secret rotation failed");
                row.rotation = RotationOutcome::from_error(&err);
            }
        }
        row
    }
}
