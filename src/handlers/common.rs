use crate::errors::{validation_message, ApiError, ServiceError};
use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    extract::{FromRequest, Form, Request},
    http::{header::CONTENT_TYPE, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use maud::Markup;
use serde::{de, de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use std::{fmt, str::FromStr};
use validator::Validate;

pub const HX_REQUEST: &str = "hx-request";

/// True when the client asked for an HTML fragment.
pub fn is_htmx(headers: &HeaderMap) -> bool {
    headers
        .get(HX_REQUEST)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Renders the fragment for HTMX clients and the JSON body for everyone else.
pub fn negotiate<T: Serialize>(headers: &HeaderMap, fragment: impl FnOnce() -> Markup, data: T) -> Response {
    if is_htmx(headers) {
        fragment().into_response()
    } else {
        success_response(data)
    }
}

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(data)).into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(data)).into_response()
}

/// Validate request input
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ApiError> {
    input
        .validate()
        .map_err(|e| ApiError::ValidationError(validation_message(&e)))
}

/// Map service errors to API errors
pub fn map_service_error(err: ServiceError) -> ApiError {
    ApiError::ServiceError(err)
}

/// Deserializes `""` (as sent by empty form fields) as `None`.
pub fn empty_string_as_none<'de, D, T>(de: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let opt = Option::<String>::deserialize(de)?;
    match opt.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => FromStr::from_str(s).map_err(de::Error::custom).map(Some),
    }
}

/// Accepts a JSON body when `Content-Type` says so and a urlencoded form otherwise.
/// An empty body deserializes as if no fields were sent.
#[derive(Debug, Clone)]
pub struct JsonOrForm<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonOrForm<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("application/json"))
            .unwrap_or(false);

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::ValidationError(e.body_text()))?;

        if is_json {
            let source: &[u8] = if bytes.is_empty() { b"{}" } else { &bytes };
            return serde_json::from_slice(source)
                .map(JsonOrForm)
                .map_err(|e| ApiError::ValidationError(format!("Invalid JSON body: {}", e)));
        }

        let form_request = Request::builder()
            .method(Method::POST)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(bytes))
            .map_err(|e| ApiError::ValidationError(e.to_string()))?;

        Form::<T>::from_request(form_request, state)
            .await
            .map(|Form(value)| JsonOrForm(value))
            .map_err(|e| ApiError::ValidationError(e.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use uuid::Uuid;

    #[derive(Debug, Deserialize)]
    struct AddForm {
        #[serde(default)]
        quantity: Option<i32>,
        #[serde(default, deserialize_with = "empty_string_as_none")]
        size_id: Option<Uuid>,
    }

    async fn extract(content_type: Option<&str>, body: &'static str) -> Result<AddForm, ApiError> {
        let mut builder = Request::builder().method(Method::POST).uri("/");
        if let Some(ct) = content_type {
            builder = builder.header(CONTENT_TYPE, ct);
        }
        let req = builder.body(Body::from(body)).unwrap();
        JsonOrForm::<AddForm>::from_request(req, &()).await.map(|j| j.0)
    }

    #[test]
    fn htmx_header_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_htmx(&headers));
        headers.insert(HX_REQUEST, HeaderValue::from_static("true"));
        assert!(is_htmx(&headers));
    }

    #[tokio::test]
    async fn parses_json_bodies() {
        let form = extract(Some("application/json"), r#"{"quantity": 3}"#)
            .await
            .unwrap();
        assert_eq!(form.quantity, Some(3));
        assert_eq!(form.size_id, None);
    }

    #[tokio::test]
    async fn parses_form_bodies_with_blank_fields() {
        let form = extract(
            Some("application/x-www-form-urlencoded"),
            "quantity=2&size_id=",
        )
        .await
        .unwrap();
        assert_eq!(form.quantity, Some(2));
        assert_eq!(form.size_id, None);
    }

    #[tokio::test]
    async fn empty_body_without_content_type_uses_defaults() {
        let form = extract(None, "").await.unwrap();
        assert_eq!(form.quantity, None);
    }

    #[tokio::test]
    async fn malformed_json_is_a_validation_error() {
        let err = extract(Some("application/json"), "{nope").await.unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));
    }
}
