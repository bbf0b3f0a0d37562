use tracing::{debug, info};

use super::IdmAdmin;
use super::inventory::{InventoryRow, RotationOutcome, Scope};
use crate::catalog;
use crate::error::IdmError;
use crate::fields::{FieldSpec, Record};
use crate::secret::SecretString;

/// Machine user as returned by the user listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineUser {
    pub user_id: String,
    pub username: String,
    pub display_name: String,
    /// Client id used for client-credential login (username, else user id)
    pub client_id: String,
    pub owner: String,
}

impl MachineUser {
    fn from_record(record: &Record) -> Self {
        let user = record.unwrap_envelope("user");
        let user_id = user.text(&FieldSpec::USER_ID);
        let username = user.text(&FieldSpec::USERNAME);
        let display_name = user.text(&FieldSpec::USER_DISPLAY);
        let client_id = if username.is_empty() {
            user_id.clone()
        } else {
            username.clone()
        };
        Self {
            user_id,
            username,
            display_name,
            client_id,
            owner: record.text(&FieldSpec::RESOURCE_OWNER),
        }
    }

    pub(super) fn into_row(self, rotation: RotationOutcome) -> InventoryRow {
        InventoryRow {
            scope: Scope::ServiceUser,
            project_id: String::new(),
            project_name: String::new(),
            resource_id: self.user_id,
            name: self.display_name,
            type_label: Scope::ServiceUser.to_string(),
            client_id: self.client_id,
            rotation,
        }
    }
}

/// Result of a machine-user secret rotation.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineUserSecret {
    pub user_id: String,
    /// Organization the rotation was addressed to (empty if unknown)
    pub owner: String,
    pub display_name: String,
    pub secret: SecretString,
    pub variant: String,
    pub attempts: usize,
}

impl IdmAdmin {
    /// Machine users visible to the token.
    ///
    /// # Errors
    ///
    /// Returns the search error after read retries are exhausted.
    pub fn list_machine_users(&self) -> Result<Vec<MachineUser>, IdmError> {
        self.machine_users_noting(&mut Vec::new())
    }

    pub(super) fn machine_users_noting(
        &self,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<MachineUser>, IdmError> {
        let (endpoint, query) = catalog::machine_users();
        let records = self.collect("list machine users", &endpoint, &query, warnings)?;
        Ok(records.iter().map(MachineUser::from_record).collect())
    }

    /// Fetch a user, first in the hinted organization, then without one.
    ///
    /// # Errors
    ///
    /// Returns [`IdmError::NotFound`] when no context knows the user.
    pub fn lookup_user(&self, user_id: &str, org_hint: Option<&str>) -> Result<Record, IdmError> {
        let path = catalog::user_path(user_id);
        for org in catalog::user_lookup_contexts(org_hint) {
            if let Some(record) = self.get_record(&path, &org)? {
                return Ok(record);
            }
            debug!(user_id = %user_id, org = ?org, "user not visible in this context");
        }
        Err(IdmError::NotFound {
            kind: "user",
            id: user_id.to_owned(),
        })
    }

    /// Regenerate a machine user's client secret.
    ///
    /// The owning organization is read from the user record
    /// (`details.resourceOwner`), falling back to `org_hint`.
    ///
    /// # Errors
    ///
    /// - [`IdmError::NotFound`] when the user cannot be fetched
    /// - [`IdmError::NotMachineUser`] for human users
    /// - any executor error
    pub fn rotate_machine_user_secret(
        &self,
        user_id: &str,
        org_hint: Option<&str>,
    ) -> Result<MachineUserSecret, IdmError> {
        let payload = self.lookup_user(user_id, org_hint)?;
        let user = payload.unwrap_envelope("user");

        if !is_machine(&user) {
            return Err(IdmError::NotMachineUser {
                user_id: user_id.to_owned(),
                user_type: non_empty_or_unknown(user.text(&FieldSpec::USER_TYPE)),
                state: non_empty_or_unknown(user.text(&FieldSpec::STATE)),
            });
        }

        let owner = match payload.text(&FieldSpec::RESOURCE_OWNER) {
            owner if !owner.is_empty() => owner,
            _ => org_hint.unwrap_or_default().to_owned(),
        };

        let success = self.executor.execute(
            &catalog::user_ref(user_id, &owner),
            &catalog::rotate_machine_user_secret(),
        )?;
        let secret = success.secret().ok_or_else(|| IdmError::MalformedResponse {
            variant: success.variant.clone(),
            status: 200,
            body_preview: "secret field is not a string".to_owned(),
        })?;
        info!(user_id = %user_id, owner = %owner, variant = %success.variant, "machine user secret rotated");

        Ok(MachineUserSecret {
            user_id: user_id.to_owned(),
            owner,
            display_name: user.text(&FieldSpec::USER_DISPLAY),
            secret,
            variant: success.variant,
            attempts: success.attempts,
        })
    }
}

fn is_machine(user: &Record) -> bool {
    user.text(&FieldSpec::USER_TYPE).to_uppercase().contains("MACHINE") || user.contains_key("machine")
}

fn non_empty_or_unknown(value: String) -> String {
    if value.is_empty() {
        "UNKNOWN".to_owned()
    } else {
        value
    }
}
