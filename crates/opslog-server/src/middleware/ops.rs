//! Per-request admission middleware (kill switch, canary, rate limit,
//! size cap, security headers) in the fixed order the write/read paths
//! rely on. CORS is layered separately at the router level so it wraps
//! outermost and still runs after these headers are attached.

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use sha2::{Digest, Sha256};

use crate::state::AppState;

const USER_AGENT_TRUNCATE_LEN: usize = 32;

/// Hashes the session id alone when present, so a request's cohort stays
/// stable across its session regardless of IP/user-agent churn. Falls
/// back to client-ip + truncated user-agent when there is no session.
fn canary_bucket(session_id: &str, client_ip: &str, user_agent: &str) -> u8 {
    let input = if !session_id.is_empty() {
        session_id.to_string()
    } else {
        let truncated_ua: String = user_agent.chars().take(USER_AGENT_TRUNCATE_LEN).collect();
        format!("{client_ip}{truncated_ua}")
    };
    let digest = Sha256::digest(input.as_bytes());
    let first_four: [u8; 4] = [digest[0], digest[1], digest[2], digest[3]];
    (u32::from_be_bytes(first_four) % 100) as u8
}

fn client_identity(session_id: Option<&str>, client_ip: &str) -> String {
    session_id.map(|s| s.to_string()).unwrap_or_else(|| {
        if client_ip.is_empty() { "unknown".to_string() } else { client_ip.to_string() }
    })
}

pub async fn ops_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if state.config.disable_new_mw {
        let response = next.run(req).await;
        return attach_security_headers(response, &state);
    }

    let session_id = req
        .headers()
        .get("x-session-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let client_ip = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let in_canary = if state.config.enable_canary {
        canary_bucket(session_id.as_deref().unwrap_or(""), &client_ip, &user_agent) < state.config.canary_percent
    } else {
        false
    };

    if state.config.enable_rate_limit || in_canary {
        let identity = client_identity(session_id.as_deref(), &client_ip);
        let admission = state.rate_limiter.admit(state.kv.as_ref(), &state.metrics, &identity).await;
        if matches!(admission, opslog_core::rate_limiter::Admission::Deny) {
            return rate_limited_response();
        }
    }

    if let Some(len) = content_length(&req) {
        if len > state.config.req_size_bytes {
            state.metrics.increment("request_size_exceeded_total", &[]).await;
            if state.config.enable_req_size_cap || in_canary {
                return attach_security_headers(size_exceeded_response(), &state);
            }
        }
    }

    let response = next.run(req).await;
    attach_security_headers(response, &state)
}

fn content_length(req: &Request) -> Option<u64> {
    req.headers().get(header::CONTENT_LENGTH)?.to_str().ok()?.parse().ok()
}

fn rate_limited_response() -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(serde_json::json!({"error": "rate limited", "message": "too many requests"})),
    )
        .into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from_static("60"));
    response
}

fn size_exceeded_response() -> Response {
    (
        StatusCode::PAYLOAD_TOO_LARGE,
        Json(serde_json::json!({"error": "request size exceeded", "message": "payload too large"})),
    )
        .into_response()
}

fn attach_security_headers(mut response: Response, state: &AppState) -> Response {
    if !state.config.enable_security_headers {
        return response;
    }
    let headers = response.headers_mut();
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(header::REFERRER_POLICY, HeaderValue::from_static("no-referrer"));
    if state.config.enable_hsts {
        headers.insert(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=63072000; includeSubDomains"),
        );
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canary_bucket_is_stable_for_same_input() {
        let a = canary_bucket("session-1", "1.2.3.4", "curl/8.0");
        let b = canary_bucket("session-1", "1.2.3.4", "curl/8.0");
        assert_eq!(a, b);
        assert!(a < 100);
    }

    #[test]
    fn canary_bucket_ignores_ip_and_ua_when_session_present() {
        let a = canary_bucket("session-1", "1.2.3.4", "curl/8.0");
        let b = canary_bucket("session-1", "5.6.7.8", "Mozilla/5.0");
        assert_eq!(a, b);
    }

    #[test]
    fn canary_bucket_falls_back_to_ip_and_ua_without_session() {
        let a = canary_bucket("", "1.2.3.4", "curl/8.0");
        let b = canary_bucket("", "5.6.7.8", "curl/8.0");
        assert_ne!(a, b);
    }

    #[test]
    fn client_identity_prefers_session_then_ip_then_unknown() {
        assert_eq!(client_identity(Some("s1"), "1.2.3.4"), "s1");
        assert_eq!(client_identity(None, "1.2.3.4"), "1.2.3.4");
        assert_eq!(client_identity(None, ""), "unknown");
    }
}
