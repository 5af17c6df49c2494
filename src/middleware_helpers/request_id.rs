use crate::tracing::RequestId;
use axum::{
    extract::Request,
    http::{header::HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;

/// Header name for the request ID
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Assigns a request ID (reusing a well-formed incoming one), exposes it as a
/// request extension and task-local, and echoes it on the response.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(RequestId::from_header)
        .unwrap_or_default();

    let header_value = HeaderValue::from_str(request_id.as_str()).ok();
    if let Some(value) = header_value.clone() {
        request
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }

    request.extensions_mut().insert(request_id.clone());

    let span = tracing::info_span!(
        "request",
        request_id = %request_id.as_str(),
        method = %request.method(),
        uri = %request.uri(),
    );

    let mut response = crate::tracing::scope_request_id(
        request_id,
        async move { next.run(request).await }.instrument(span),
    )
    .await;

    if let Some(value) = header_value {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracing::current_request_id;
    use axum::{body::Body, http::Request as HttpRequest, routing::get, Router};
    use tower::ServiceExt;

    /// Echoes the id seen by handler code through the task-local.
    async fn whoami() -> String {
        current_request_id()
            .map(|id| id.to_string())
            .unwrap_or_default()
    }

    async fn call(header: Option<&str>) -> (String, String) {
        let mut builder = HttpRequest::builder().uri("/whoami");
        if let Some(value) = header {
            builder = builder.header(REQUEST_ID_HEADER, value);
        }
        let response = Router::new()
            .route("/whoami", get(whoami))
            .layer(axum::middleware::from_fn(request_id_middleware))
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let echoed = response.headers()[REQUEST_ID_HEADER]
            .to_str()
            .unwrap()
            .to_owned();
        let bytes = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .unwrap();
        (echoed, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn handlers_see_the_echoed_id() {
        let (echoed, seen) = call(None).await;
        assert!(!echoed.is_empty());
        assert_eq!(echoed, seen);
    }

    #[tokio::test]
    async fn client_id_is_kept_when_well_formed() {
        let (echoed, seen) = call(Some("cart-req-42")).await;
        assert_eq!(echoed, "cart-req-42");
        assert_eq!(seen, "cart-req-42");
    }

    #[tokio::test]
    async fn malformed_client_id_is_replaced() {
        let long = "x".repeat(200);
        let (echoed, _) = call(Some(&long)).await;
        assert_ne!(echoed, long);
        assert!(!echoed.is_empty());
    }
}
