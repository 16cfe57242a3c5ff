//! Control-plane HTTP surface.
//!
//! Trusted backends push messages here, on any path. Parameters come from
//! a urlencoded or multipart form body or, when the body carries none,
//! from the query string. The response is a single plain-text word.

use crate::metrics;
use axum::{
    extract::{multipart::MultipartError, FromRequest, Multipart, Query, Request, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Form, Router,
};
use beacon_core::{ControlParams, ControlRequest, HubHandle};
use tracing::{debug, error, warn};

/// Build the control-plane router.
pub fn control_app(hub: HubHandle) -> Router {
    Router::new()
        .route("/", get(control_handler).post(control_handler))
        .fallback(control_handler)
        .with_state(hub)
}

async fn control_handler(
    State(hub): State<HubHandle>,
    query: Option<Query<ControlParams>>,
    request: Request,
) -> impl IntoResponse {
    let body = read_body_params(request).await;
    let params = select_params(body, query.map(|Query(p)| p));
    let request = ControlRequest::from(params);
    debug!(kind = ?request.kind, to = ?request.to, "Control request");

    match hub.control(request).await {
        Ok(response) => {
            metrics::record_control(response.as_str());
            (StatusCode::OK, response.as_str())
        }
        Err(e) => {
            error!(error = %e, "Control request failed");
            metrics::record_error("control");
            (StatusCode::SERVICE_UNAVAILABLE, "send_fail")
        }
    }
}

/// Read form parameters from the body, urlencoded or multipart.
async fn read_body_params(request: Request) -> Option<ControlParams> {
    if is_multipart(request.headers()) {
        let multipart = match Multipart::from_request(request, &()).await {
            Ok(multipart) => multipart,
            Err(e) => {
                warn!(error = %e, "Rejected multipart body");
                return None;
            }
        };
        match read_multipart(multipart).await {
            Ok(params) => Some(params),
            Err(e) => {
                warn!(error = %e, "Malformed multipart body");
                None
            }
        }
    } else {
        Form::<ControlParams>::from_request(request, &())
            .await
            .ok()
            .map(|Form(params)| params)
    }
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|ct| ct.trim_start().starts_with("multipart/form-data"))
}

async fn read_multipart(mut multipart: Multipart) -> Result<ControlParams, MultipartError> {
    let mut params = ControlParams::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        let value = field.text().await?;
        match name.as_deref() {
            Some("type") => params.kind = Some(value),
            Some("to") => params.to = Some(value),
            Some("content") => params.content = Some(value),
            _ => {}
        }
    }
    Ok(params)
}

/// Prefer body parameters; fall back to the query string when the body
/// carries none.
fn select_params(form: Option<ControlParams>, query: Option<ControlParams>) -> ControlParams {
    match form {
        Some(p) if has_any(&p) => p,
        _ => query.unwrap_or_default(),
    }
}

fn has_any(params: &ControlParams) -> bool {
    params.kind.is_some() || params.to.is_some() || params.content.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(kind: &str) -> ControlParams {
        ControlParams {
            kind: Some(kind.to_string()),
            ..ControlParams::default()
        }
    }

    #[test]
    fn test_form_preferred_over_query() {
        let chosen = select_params(Some(params("publish")), Some(params("other")));
        assert_eq!(chosen.kind.as_deref(), Some("publish"));
    }

    #[test]
    fn test_empty_form_falls_back_to_query() {
        let chosen = select_params(Some(ControlParams::default()), Some(params("publish")));
        assert_eq!(chosen.kind.as_deref(), Some("publish"));

        let chosen = select_params(None, Some(params("qrcode_auth_success")));
        assert_eq!(chosen.kind.as_deref(), Some("qrcode_auth_success"));
    }

    #[test]
    fn test_multipart_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_multipart(&headers));

        headers.insert(
            CONTENT_TYPE,
            "application/x-www-form-urlencoded".parse().unwrap(),
        );
        assert!(!is_multipart(&headers));

        headers.insert(
            CONTENT_TYPE,
            "multipart/form-data; boundary=----x".parse().unwrap(),
        );
        assert!(is_multipart(&headers));
    }

    #[test]
    fn test_nothing_supplied() {
        let chosen = select_params(None, None);
        assert!(!has_any(&chosen));
    }
}
