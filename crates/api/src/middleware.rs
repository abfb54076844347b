use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    RequestExt,
    body::{Body, Bytes},
    extract::{ConnectInfo, Extension, FromRequest, Path, Query, Request, State},
    http::{HeaderMap, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use chrono::Utc;

use agencyportal_auth::csrf::{CSRF_COOKIE, CSRF_FIELD, CSRF_HEADER};
use agencyportal_auth::{
    AuthError, AuthRequest, CsrfCandidates, RateLimitDecision, RoleSet, RouteRequirements,
    TenantTarget, client_address, is_safe_method,
};
use agencyportal_core::ResourceId;

use crate::app::errors::{
    RATE_LIMIT_LIMIT, apply_rate_limit_headers, auth_error_to_response, json_error,
};
use crate::app::services::AppServices;
use crate::context::{AuthContext, ClientAddress};

/// Cookie carrying the session token for browser clients.
pub const AUTH_COOKIE: &str = "auth_token";

/// Mutating request bodies are buffered to look for a CSRF field.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Resolve the client address once and stash it for limiters and handlers.
pub async fn resolve_client_address(mut req: Request, next: Next) -> Response {
    let headers = req.headers();
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let address = client_address(
        header_str(headers, "x-forwarded-for"),
        header_str(headers, "x-real-ip"),
        peer,
    );

    req.extensions_mut().insert(ClientAddress(address));
    next.run(req).await
}

/// General API budget per client address.
///
/// Headers go on every response unless an inner, tighter limiter already
/// reported its own budget.
pub async fn api_rate_limit(
    State(services): State<Arc<AppServices>>,
    Extension(client): Extension<ClientAddress>,
    req: Request,
    next: Next,
) -> Response {
    let decision = services
        .api_limiter
        .check(&format!("api:{}", client.as_str()), Utc::now());

    let mut res = match decision {
        RateLimitDecision::Allowed(_) => next.run(req).await,
        RateLimitDecision::Limited { retry_after_secs, .. } => {
            auth_error_to_response(&AuthError::RateLimited { retry_after_secs })
        }
    };
    if !res.headers().contains_key(RATE_LIMIT_LIMIT) {
        apply_rate_limit_headers(res.headers_mut(), decision.status());
    }
    res
}

/// Extra budget for destructive operations, per authenticated user.
///
/// Must sit inside [`require_auth`].
pub async fn sensitive_rate_limit(
    State(services): State<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    req: Request,
    next: Next,
) -> Response {
    let key = format!("sensitive:{}", ctx.user_id());
    let decision = services.sensitive_limiter.check(&key, Utc::now());

    let mut res = match decision {
        RateLimitDecision::Allowed(_) => next.run(req).await,
        RateLimitDecision::Limited { retry_after_secs, .. } => {
            auth_error_to_response(&AuthError::RateLimited { retry_after_secs })
        }
    };
    apply_rate_limit_headers(res.headers_mut(), decision.status());
    res
}

/// Per-route access requirements, checked by [`require_auth`].
#[derive(Clone)]
pub struct RouteGuard {
    services: Arc<AppServices>,
    allowed: RoleSet,
    resource_param: Option<&'static str>,
}

impl RouteGuard {
    pub fn new(services: Arc<AppServices>, allowed: RoleSet) -> Self {
        Self {
            services,
            allowed,
            resource_param: None,
        }
    }

    /// Scope the route to the tenant owning the policy named by path param `name`.
    pub fn owned_resource(mut self, name: &'static str) -> Self {
        self.resource_param = Some(name);
        self
    }
}

/// The only place requests become authenticated.
///
/// Runs the authenticator with the route's requirements and inserts an
/// [`AuthContext`] on success.
pub async fn require_auth(State(guard): State<RouteGuard>, mut req: Request, next: Next) -> Response {
    let resource_id = match guard.resource_param {
        Some(name) => {
            let Path(params) = match req.extract_parts::<Path<HashMap<String, String>>>().await {
                Ok(p) => p,
                Err(rejection) => return rejection.into_response(),
            };
            match params.get(name).map(ResourceId::new) {
                Some(Ok(id)) => Some(id),
                _ => {
                    return json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid resource id");
                }
            }
        }
        None => None,
    };

    let method = req.method().clone();
    let bearer = bearer_token(req.headers());
    let jar = CookieJar::from_headers(req.headers());
    let header_csrf = header_str(req.headers(), CSRF_HEADER).map(str::to_string);
    let cookie_csrf = jar.get(CSRF_COOKIE).map(|c| c.value().to_string());
    let query_csrf = Query::<HashMap<String, String>>::try_from_uri(req.uri())
        .ok()
        .and_then(|Query(mut q)| q.remove(CSRF_FIELD));

    // Without a token the request is rejected anyway; leave the body unread.
    let (req, body_csrf) = if is_safe_method(method.as_str()) || bearer.is_none() {
        (req, None)
    } else {
        let (parts, body) = req.into_parts();
        let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
            Ok(b) => b,
            Err(_) => {
                return json_error(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    "payload_too_large",
                    "request body too large",
                );
            }
        };
        let token = csrf_field_from_body(&parts.headers, &bytes).await;
        (Request::from_parts(parts, Body::from(bytes)), token)
    };

    let outcome = {
        let auth_req = AuthRequest {
            method: method.as_str(),
            bearer: bearer.as_deref(),
            csrf: CsrfCandidates {
                header: header_csrf.as_deref(),
                cookie: cookie_csrf.as_deref(),
                query: query_csrf.as_deref(),
                body: body_csrf.as_deref(),
            },
        };
        let target = match &resource_id {
            Some(id) => TenantTarget::Resource {
                id,
                owners: &*guard.services.policy_owners,
            },
            None => TenantTarget::Own,
        };
        let route = RouteRequirements {
            allowed: &guard.allowed,
            target,
        };
        guard
            .services
            .authenticator
            .authenticate(&auth_req, &route, Utc::now())
    };

    match outcome {
        Ok(principal) => {
            let mut req = req;
            req.extensions_mut().insert(AuthContext::new(principal));
            next.run(req).await
        }
        Err(rejection) => {
            if rejection.error == AuthError::TokenMissing {
                tracing::debug!(method = %method, path = %req.uri().path(), "no credentials presented");
            } else {
                tracing::warn!(
                    method = %method,
                    path = %req.uri().path(),
                    stage = ?rejection.stage,
                    reason = ?rejection.error,
                    "request rejected"
                );
            }
            auth_error_to_response(&rejection.error)
        }
    }
}

/// `Authorization: Bearer` first, then the session cookie.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let from_header = header_str(headers, header::AUTHORIZATION.as_str())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = from_header {
        return Some(token.to_string());
    }

    CookieJar::from_headers(headers)
        .get(AUTH_COOKIE)
        .map(|c| c.value().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// `_csrf` from a JSON object or form-urlencoded body.
async fn csrf_field_from_body(headers: &HeaderMap, bytes: &Bytes) -> Option<String> {
    let content_type = header_str(headers, header::CONTENT_TYPE.as_str())?.to_ascii_lowercase();

    if content_type.starts_with("application/json") {
        let value: serde_json::Value = serde_json::from_slice(bytes).ok()?;
        return value.get(CSRF_FIELD)?.as_str().map(str::to_string);
    }

    if content_type.starts_with("application/x-www-form-urlencoded") {
        let form = Request::builder()
            .method(Method::POST)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(bytes.clone()))
            .ok()?;
        let axum::Form(mut fields) = axum::Form::<HashMap<String, String>>::from_request(form, &())
            .await
            .ok()?;
        return fields.remove(CSRF_FIELD);
    }

    None
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
