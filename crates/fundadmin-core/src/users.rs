use crate::authz::{require, Actor, Operation, ResourceContext};
use crate::error::FundError;
use crate::roles::Role;
use crate::storage::{collections, DocumentStore, Filter};
use crate::types::{
    RegisterUserRequest, UpdateProfileRequest, User, UserStatusRequest, UserView,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

/// Outcome of a delete request. Accounts referenced by investments are
/// soft-disabled instead of removed.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserDeletionOutcome {
    pub id: String,
    pub status: &'static str,
}

/// User accounts: registration, profiles, and admin status changes.
pub struct UserService {
    store: Arc<dyn DocumentStore>,
}

impl UserService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Registration is open; the raw role string is validated here, at the
    /// boundary. Root accounts cannot be self-registered.
    pub async fn register(&self, request: RegisterUserRequest) -> Result<UserView, FundError> {
        if request.display_name.trim().is_empty() {
            return Err(FundError::missing_field("displayName"));
        }
        if !request.email.contains('@') {
            return Err(FundError::Validation(format!(
                "invalid email '{}'",
                request.email
            )));
        }

        let role: Role = request.role.parse()?;
        if role.is_root() {
            return Err(FundError::Validation(
                "root accounts are provisioned out of band".to_string(),
            ));
        }

        let filter = Filter::new().eq("email", request.email.clone());
        let existing = self.store.query(collections::USERS, &filter).await?;
        if !existing.is_empty() {
            return Err(FundError::Validation(format!(
                "email '{}' is already registered",
                request.email
            )));
        }

        let user = User::new(request.email, request.display_name, role);
        let record = serde_json::to_value(&user)
            .map_err(|e| FundError::Storage(format!("user encode failed: {e}")))?;
        self.store
            .insert(collections::USERS, &user.id, record)
            .await?;

        Ok(user.into())
    }

    pub async fn get_profile(&self, actor: &Actor, user_id: &str) -> Result<UserView, FundError> {
        let user = self
            .fetch(user_id)
            .await?
            .ok_or_else(|| FundError::not_found("user", user_id))?;
        require(
            actor,
            Operation::ViewOwnProfile,
            &ResourceContext::owned_by(user.id.clone()),
        )?;
        Ok(user.into())
    }

    pub async fn list_users(&self, actor: &Actor) -> Result<Vec<UserView>, FundError> {
        require(actor, Operation::ListUsers, &ResourceContext::none())?;

        let rows = self.store.query(collections::USERS, &Filter::new()).await?;
        rows.into_iter()
            .map(|row| decode_user(row).map(UserView::from))
            .collect()
    }

    pub async fn update_profile(
        &self,
        actor: &Actor,
        user_id: &str,
        request: UpdateProfileRequest,
    ) -> Result<UserView, FundError> {
        let user = self
            .fetch(user_id)
            .await?
            .ok_or_else(|| FundError::not_found("user", user_id))?;
        require(
            actor,
            Operation::UpdateOwnProfile,
            &ResourceContext::owned_by(user.id.clone()),
        )?;

        let mut patch = serde_json::Map::new();
        if let Some(email) = request.email {
            if !email.contains('@') {
                return Err(FundError::Validation(format!("invalid email '{email}'")));
            }
            patch.insert("email".to_string(), json!(email));
        }
        if let Some(display_name) = request.display_name {
            if display_name.trim().is_empty() {
                return Err(FundError::missing_field("displayName"));
            }
            patch.insert("display_name".to_string(), json!(display_name));
        }
        patch.insert("updated_at".to_string(), json!(Utc::now()));

        let updated = self
            .store
            .update(collections::USERS, user_id, serde_json::Value::Object(patch))
            .await?;
        Ok(decode_user(updated)?.into())
    }

    /// Active-flag and role changes. Root targets are untouchable for every
    /// actor, and no account can be raised to root here.
    pub async fn set_status(
        &self,
        actor: &Actor,
        user_id: &str,
        request: UserStatusRequest,
    ) -> Result<UserView, FundError> {
        let user = self
            .fetch(user_id)
            .await?
            .ok_or_else(|| FundError::not_found("user", user_id))?;
        require(
            actor,
            Operation::UpdateUserStatus,
            &ResourceContext::user_target(user.id.clone(), user.role),
        )?;

        let mut patch = serde_json::Map::new();
        if let Some(active) = request.active {
            patch.insert("active".to_string(), json!(active));
        }
        if let Some(role) = request.role {
            let role: Role = role.parse()?;
            if role.is_root() {
                return Err(FundError::Validation(
                    "cannot promote an account to root".to_string(),
                ));
            }
            patch.insert("role".to_string(), json!(role));
        }
        patch.insert("updated_at".to_string(), json!(Utc::now()));

        let updated = self
            .store
            .update(collections::USERS, user_id, serde_json::Value::Object(patch))
            .await?;
        Ok(decode_user(updated)?.into())
    }

    /// Deletes the account, or soft-disables it when investment records
    /// still reference the user.
    pub async fn delete_user(
        &self,
        actor: &Actor,
        user_id: &str,
    ) -> Result<UserDeletionOutcome, FundError> {
        let user = self
            .fetch(user_id)
            .await?
            .ok_or_else(|| FundError::not_found("user", user_id))?;
        require(
            actor,
            Operation::DeleteUser,
            &ResourceContext::user_target(user.id.clone(), user.role),
        )?;

        let filter = Filter::new().eq("investor_id", user_id);
        let referencing = self.store.query(collections::INVESTMENTS, &filter).await?;
        if !referencing.is_empty() {
            let patch = json!({ "active": false, "updated_at": Utc::now() });
            self.store.update(collections::USERS, user_id, patch).await?;
            return Ok(UserDeletionOutcome {
                id: user_id.to_string(),
                status: "deactivated",
            });
        }

        self.store.delete(collections::USERS, user_id).await?;
        Ok(UserDeletionOutcome {
            id: user_id.to_string(),
            status: "deleted",
        })
    }

    async fn fetch(&self, id: &str) -> Result<Option<User>, FundError> {
        self.store
            .get_by_id(collections::USERS, id)
            .await?
            .map(decode_user)
            .transpose()
    }
}

fn decode_user(value: serde_json::Value) -> Result<User, FundError> {
    serde_json::from_value(value)
        .map_err(|e| FundError::Storage(format!("user decode failed: {e}")))
}
