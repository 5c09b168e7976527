//! Account Service: session tokens and user profiles.
//!
//! Token entries are cache-only. A token the cache cannot vouch for comes
//! back as `TokenStatus::Unknown` and the caller verifies it by other means.

use std::sync::Arc;
use tablebook_core::{
    EngineError, EngineResult, EntityId, FieldErrors, NewUser, StorageError, Timestamp, User,
    UserPatch, ValidationError,
};
use tablebook_storage::{CacheCoordinator, CacheRead, Freshness, RecordStore, TokenStatus};
use tokio_util::sync::CancellationToken;

use crate::cancel::{cancellable, commit};
use crate::validation::{is_valid_email, validate_user_patch};

fn email_taken(e: EngineError) -> EngineError {
    match e {
        EngineError::Storage(StorageError::Duplicate { entity: "user", .. }) => {
            ValidationError::InvalidValue {
                field: "email".to_string(),
                reason: "Email already exists".to_string(),
            }
            .into()
        }
        other => other,
    }
}

#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn RecordStore>,
    cache: Arc<CacheCoordinator>,
}

impl AccountService {
    pub fn new(store: Arc<dyn RecordStore>, cache: Arc<CacheCoordinator>) -> Self {
        Self { store, cache }
    }

    // ========================================================================
    // TOKENS
    // ========================================================================

    /// Remember a freshly issued token until it expires. Returns false when
    /// the token has already expired and nothing was cached.
    pub async fn remember_token(
        &self,
        token: &str,
        user_id: EntityId,
        expires_at: Timestamp,
    ) -> bool {
        self.cache.tokens().remember(token, user_id, expires_at).await
    }

    /// Log out: the token reads as revoked for the rest of its lifetime.
    pub async fn revoke_token(&self, token: &str, expires_at: Timestamp) {
        self.cache.tokens().revoke(token, expires_at).await;
        tracing::info!("session token revoked");
    }

    pub async fn token_status(&self, token: &str) -> TokenStatus {
        self.cache.tokens().status(token).await
    }

    // ========================================================================
    // USERS
    // ========================================================================

    pub async fn create_user(
        &self,
        user: &NewUser,
        cancel: &CancellationToken,
    ) -> EngineResult<User> {
        let mut errors = FieldErrors::new();
        let email = user.email.trim();
        if email.is_empty() {
            errors.add("email", "Email is required");
        } else if !is_valid_email(email) {
            errors.add("email", "Invalid email format");
        }
        if user.name.trim().is_empty() {
            errors.add("name", "Name is required");
        }
        errors.into_result()?;

        let new = NewUser {
            email: email.to_string(),
            name: user.name.trim().to_string(),
            phone: user.phone.as_deref().map(|p| p.trim().to_string()),
            role: user.role,
        };
        let store = self.store.clone();
        let created = commit(cancel, async move {
            store.create_user(&new).await.map_err(email_taken)
        })
        .await?;
        tracing::info!(user_id = %created.id, "user created");
        Ok(created)
    }

    pub async fn get_user(
        &self,
        id: EntityId,
        freshness: Freshness,
        cancel: &CancellationToken,
    ) -> EngineResult<CacheRead<User>> {
        let store = &self.store;
        cancellable(
            cancel,
            self.cache.users().by_id(id, freshness, || store.get_user(id)),
        )
        .await?
        .ok_or_else(|| EngineError::not_found("user", id))
    }

    /// Look up by e-mail, case-insensitively.
    pub async fn get_user_by_email(
        &self,
        email: &str,
        freshness: Freshness,
        cancel: &CancellationToken,
    ) -> EngineResult<CacheRead<User>> {
        let email = email.trim().to_lowercase();
        let store = &self.store;
        cancellable(
            cancel,
            self.cache
                .users()
                .by_email(&email, freshness, || store.get_user_by_email(&email)),
        )
        .await?
        .ok_or_else(|| EngineError::not_found("user", &email))
    }

    /// Update a profile. A patch with no fields returns the current user.
    pub async fn update_user(
        &self,
        id: EntityId,
        patch: &UserPatch,
        cancel: &CancellationToken,
    ) -> EngineResult<User> {
        let patch = validate_user_patch(patch)?;
        let current = cancellable(cancel, self.store.get_user(id))
            .await?
            .ok_or_else(|| EngineError::not_found("user", id))?;
        if patch.is_empty() {
            return Ok(current);
        }

        let store = self.store.clone();
        let cache = self.cache.clone();
        let updated = commit(cancel, async move {
            let updated = store.update_user(id, &patch).await.map_err(email_taken)?;
            cache.users().invalidate(&updated, Some(current.email.as_str())).await;
            Ok(updated)
        })
        .await?;
        tracing::info!(user_id = %id, "user updated");
        Ok(updated)
    }
}
