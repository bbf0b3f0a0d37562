use tracing::{info, warn};

use super::IdmAdmin;
use crate::catalog::{self, NewHumanUser};
use crate::error::IdmError;
use crate::mutation::ResourceRef;

/// Outcome of [`IdmAdmin::provision_human_user`].
///
/// The user exists once this value is returned; `membership_error` reports
/// a failed role grant separately so the caller does not create it twice.
#[derive(Debug)]
pub struct ProvisionedUser {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub org_id: String,
    pub roles_granted: Vec<String>,
    pub membership_error: Option<IdmError>,
}

impl IdmAdmin {
    /// Create a human user, then grant `roles` in the default organization.
    ///
    /// # Errors
    ///
    /// Returns an error when the user could not be created (or the created
    /// user id could not be read). Role-grant failures are reported in
    /// [`ProvisionedUser::membership_error`].
    pub fn provision_human_user(
        &self,
        user: &NewHumanUser,
        roles: &[String],
    ) -> Result<ProvisionedUser, IdmError> {
        if user.username.trim().is_empty() {
            return Err(IdmError::Config("username is required".to_owned()));
        }

        let created = self.executor.execute(
            &ResourceRef::new("new-user", &user.username),
            &catalog::create_human_user(user),
        )?;
        let user_id = created.text().ok_or_else(|| IdmError::MalformedResponse {
            variant: created.variant.clone(),
            status: 200,
            body_preview: created.value.to_string(),
        })?;
        info!(user_id = %user_id, username = %user.username, "human user created");

        let mut provisioned = ProvisionedUser {
            user_id: user_id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            org_id: self.api().config().org_id.clone(),
            roles_granted: Vec::new(),
            membership_error: None,
        };
        if roles.is_empty() {
            return Ok(provisioned);
        }

        match self.executor.execute(
            &ResourceRef::new("user", &user_id),
            &catalog::add_org_member(&user_id, roles),
        ) {
            Ok(_) => {
                info!(user_id = %user_id, roles = ?roles, "organization roles granted");
                provisioned.roles_granted = roles.to_vec();
            }
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "granting organization roles failed");
                provisioned.membership_error = Some(err);
            }
        }
        Ok(provisioned)
    }
}
