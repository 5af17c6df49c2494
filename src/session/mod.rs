//! Session keys and helpers shared by the cart, order and user handlers.

use crate::errors::ServiceError;
use tower_sessions::Session;
use uuid::Uuid;

pub mod store;

pub use store::{sweep_expired, DatabaseSessionStore};

pub const CART_ID_KEY: &str = "cart_id";
pub const USER_ID_KEY: &str = "user_id";

/// Returns the session id, persisting a fresh session first if it has none yet.
pub async fn session_key(session: &Session) -> Result<String, ServiceError> {
    if session.id().is_none() {
        session.save().await?;
    }
    session
        .id()
        .map(|id| id.to_string())
        .ok_or_else(|| ServiceError::SessionError("session has no id after save".to_string()))
}

pub async fn cart_id(session: &Session) -> Result<Option<Uuid>, ServiceError> {
    Ok(session.get::<Uuid>(CART_ID_KEY).await?)
}

pub async fn set_cart_id(session: &Session, cart_id: Uuid) -> Result<(), ServiceError> {
    session.insert(CART_ID_KEY, cart_id).await?;
    Ok(())
}

pub async fn user_id(session: &Session) -> Result<Option<Uuid>, ServiceError> {
    Ok(session.get::<Uuid>(USER_ID_KEY).await?)
}

/// Cycles the session id and records the logged-in user. Returns the new session key.
pub async fn log_in(session: &Session, user_id: Uuid) -> Result<String, ServiceError> {
    session.cycle_id().await?;
    session.insert(USER_ID_KEY, user_id).await?;
    session_key(session).await
}

pub async fn log_out(session: &Session) -> Result<(), ServiceError> {
    session.flush().await?;
    Ok(())
}
