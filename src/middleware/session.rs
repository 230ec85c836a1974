use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};

/// Opaque browser-session identifier handed to us per request by the
/// session layer in front of this service. The core never creates or
/// validates sessions; it only scopes staging state by this key.
#[derive(Clone, Debug)]
pub struct SessionKey(pub String);

pub async fn session_middleware(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let key = req
        .headers()
        .get("x-session-key")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.trim().to_string());

    match key {
        Some(key) if !key.is_empty() => {
            req.extensions_mut().insert(SessionKey(key));
            Ok(next.run(req).await)
        }
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}
