use super::{
    common::{created_response, map_service_error, success_response, validate_input, JsonOrForm},
    orders,
};
use crate::{
    auth::CurrentUser,
    errors::ApiError,
    services::users::{LoginInput, RegisterInput, UpdateAccountInput, UserProfile},
    session, AppState,
};
use axum::{
    extract::State,
    response::Response,
    routing::{get, post},
    Router,
};
use serde_json::json;
use tower_sessions::Session;
use tracing::info;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/register/", post(register))
        .route("/login/", post(login))
        .route("/logout/", post(logout))
        .route("/profile/", get(profile))
        .route("/account/", get(account_details))
        .route("/account/update/", post(update_account))
        .route("/orders/", get(orders::order_history))
        .route("/orders/:id/", get(orders::order_detail))
}

/// Create an account
#[utoipa::path(
    post,
    path = "/users/register/",
    summary = "Register",
    request_body = RegisterInput,
    responses(
        (status = 201, description = "Account created"),
        (status = 400, description = "Invalid form, duplicate email or mismatched passwords", body = crate::errors::ErrorResponse),
    ),
    tag = "users"
)]
pub async fn register(
    State(state): State<AppState>,
    JsonOrForm(form): JsonOrForm<RegisterInput>,
) -> Result<Response, ApiError> {
    validate_input(&form)?;

    let user = state
        .services
        .users
        .register(form)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(json!({
        "success": true,
        "message": format!("Account created for {}!", user.email),
        "user": UserProfile::from(user),
    })))
}

/// Log in with email and password
#[utoipa::path(
    post,
    path = "/users/login/",
    summary = "Log in",
    description = "Stores the user in the session. The session id is cycled and the session cart follows the new id.",
    request_body = LoginInput,
    responses(
        (status = 200, description = "Logged in"),
        (status = 401, description = "Invalid email or password", body = crate::errors::ErrorResponse),
        (status = 403, description = "Account inactive", body = crate::errors::ErrorResponse),
    ),
    tag = "users"
)]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    JsonOrForm(form): JsonOrForm<LoginInput>,
) -> Result<Response, ApiError> {
    validate_input(&form)?;

    let user = state
        .services
        .users
        .authenticate(&form.email, &form.password)
        .await
        .map_err(map_service_error)?;

    let previous_key = session.id().map(|id| id.to_string());
    let cart_id = session::cart_id(&session)
        .await
        .map_err(map_service_error)?;
    let new_key = session::log_in(&session, user.id)
        .await
        .map_err(map_service_error)?;

    if let (Some(old_key), Some(cart_id)) = (previous_key, cart_id) {
        state
            .services
            .cart
            .rebind_session(cart_id, &old_key, &new_key)
            .await
            .map_err(map_service_error)?;
    }

    info!(user_id = %user.id, "user logged in");
    Ok(success_response(json!({
        "success": true,
        "message": format!("Welcome back, {}!", user.first_name),
        "user": UserProfile::from(user),
    })))
}

/// Log out and forget the session
#[utoipa::path(
    post,
    path = "/users/logout/",
    summary = "Log out",
    responses((status = 200, description = "Logged out")),
    tag = "users"
)]
pub async fn logout(session: Session) -> Result<Response, ApiError> {
    session::log_out(&session)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(json!({
        "success": true,
        "message": "You have been logged out.",
    })))
}

/// Current user's profile
#[utoipa::path(
    get,
    path = "/users/profile/",
    summary = "Profile",
    responses(
        (status = 200, description = "Profile of the logged-in user", body = UserProfile),
        (status = 401, description = "Authentication required", body = crate::errors::ErrorResponse),
    ),
    tag = "users"
)]
pub async fn profile(CurrentUser(user): CurrentUser) -> Result<Response, ApiError> {
    Ok(success_response(UserProfile::from(user)))
}

/// Current user's account details
#[utoipa::path(
    get,
    path = "/users/account/",
    summary = "Account details",
    responses(
        (status = 200, description = "Account details of the logged-in user", body = UserProfile),
        (status = 401, description = "Authentication required", body = crate::errors::ErrorResponse),
    ),
    tag = "users"
)]
pub async fn account_details(CurrentUser(user): CurrentUser) -> Result<Response, ApiError> {
    Ok(success_response(json!({
        "success": true,
        "user": UserProfile::from(user),
    })))
}

/// Update account details
#[utoipa::path(
    post,
    path = "/users/account/update/",
    summary = "Update account",
    description = "A blank email keeps the current one. Address fields have HTML tags stripped.",
    request_body = UpdateAccountInput,
    responses(
        (status = 200, description = "Account updated"),
        (status = 400, description = "Invalid form or email already in use", body = crate::errors::ErrorResponse),
        (status = 401, description = "Authentication required", body = crate::errors::ErrorResponse),
    ),
    tag = "users"
)]
pub async fn update_account(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonOrForm(form): JsonOrForm<UpdateAccountInput>,
) -> Result<Response, ApiError> {
    validate_input(&form)?;

    let updated = state
        .services
        .users
        .update_account(user.id, form)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(json!({
        "success": true,
        "message": "Account details updated.",
        "user": UserProfile::from(updated),
    })))
}
