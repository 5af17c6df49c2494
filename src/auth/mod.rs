//! Password hashing and session-backed user extractors.

use crate::{entities::user, errors::ServiceError, session, AppState};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

/// Hashes a password into a PHC string with a random salt.
pub fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ServiceError::HashError(e.to_string()))
}

/// Checks a password against a stored PHC hash. Malformed hashes never verify.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

async fn session_from_parts(parts: &mut Parts, state: &AppState) -> Result<Session, ServiceError> {
    Session::from_request_parts(parts, state)
        .await
        .map_err(|(_, msg)| ServiceError::SessionError(msg.to_string()))
}

async fn load_session_user(
    parts: &mut Parts,
    state: &AppState,
) -> Result<Option<user::Model>, ServiceError> {
    let session = session_from_parts(parts, state).await?;
    let Some(user_id) = session::user_id(&session).await? else {
        return Ok(None);
    };
    let user = state.services.users.find(user_id).await?;
    Ok(user.filter(|u| u.is_active))
}

/// The logged-in user; rejects with 401 otherwise.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub user::Model);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        load_session_user(parts, state)
            .await?
            .map(CurrentUser)
            .ok_or_else(|| ServiceError::Unauthorized("Authentication required".to_string()))
    }
}

/// The logged-in user, if any.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<user::Model>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(load_session_user(parts, state).await?))
    }
}

/// A logged-in staff member; 401 when anonymous, 403 for regular users.
#[derive(Debug, Clone)]
pub struct StaffUser(pub user::Model);

#[async_trait]
impl FromRequestParts<AppState> for StaffUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if user.is_staff {
            Ok(StaffUser(user))
        } else {
            Err(ServiceError::Forbidden(
                "Staff access required".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_password_verifies() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse battery", &hash));
        assert!(!verify_password("wrong horse battery", &hash));
    }

    #[test]
    fn hashes_are_salted() {
        let a = hash_password("same-password").unwrap();
        let b = hash_password("same-password").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }
}
