use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;

use agencyportal_auth::csrf::CSRF_COOKIE;
use agencyportal_auth::{
    AuthError, RateLimitDecision, SessionClaims, login_fingerprint, resolve_claimed_role,
    resolve_redirect_target,
};
use agencyportal_infra::{CredentialDirectory, UserRecord};

use crate::app::dto::{CsrfTokenResponse, LoginRequest, LoginResponse, RedirectResponse, UserSummary};
use crate::app::errors::{apply_rate_limit_headers, auth_error_to_response, json_error};
use crate::app::services::AppServices;
use crate::context::{AuthContext, ClientAddress};
use crate::middleware::AUTH_COOKIE;

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(client): Extension<ClientAddress>,
    Json(body): Json<LoginRequest>,
) -> Response {
    let now = Utc::now();
    let fingerprint = login_fingerprint(client.as_str(), &body.email);

    let decision = services.login_limiter.check(&fingerprint, now);
    if let RateLimitDecision::Limited { retry_after_secs, status } = decision {
        let mut res = auth_error_to_response(&AuthError::RateLimited { retry_after_secs });
        apply_rate_limit_headers(res.headers_mut(), &status);
        return res;
    }

    let Some(user) = check_credentials(&services, body).await else {
        let mut res = json_error(StatusCode::UNAUTHORIZED, "unauthorized", "invalid credentials");
        apply_rate_limit_headers(res.headers_mut(), decision.status());
        return res;
    };

    let role = match resolve_claimed_role(user.role.as_deref(), services.authenticator.missing_role()) {
        Ok(role) => role,
        Err(e) => {
            tracing::warn!(user_id = %user.id, role = %e.0, "stored role is not recognized");
            return auth_error_to_response(&AuthError::RoleUnrecognized);
        }
    };

    let budget = services.login_limiter.reset(&fingerprint, now);

    let claims = SessionClaims::new(
        user.id.clone(),
        user.email.clone(),
        Some(role.as_str().to_string()),
        user.tenant_id.clone(),
        now,
        services.token_ttl,
    );
    let token = match services.authenticator.tokens().issue(&claims) {
        Ok(t) => t,
        Err(e) => {
            tracing::error!(error = %e, "failed to sign session token");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error");
        }
    };

    let expires_in_seconds = claims.remaining_secs(claims.issued_at);
    tracing::info!(user_id = %user.id, role = %role, "login succeeded");

    let cookie = session_cookie(AUTH_COOKIE, &token, expires_in_seconds, true);
    let mut res = (
        [(header::SET_COOKIE, cookie)],
        Json(LoginResponse {
            token,
            expires_in_seconds,
            redirect_to: resolve_redirect_target(&[role.as_str()]),
            user: UserSummary {
                id: user.id,
                email: user.email,
                role,
                tenant_id: user.tenant_id,
            },
        }),
    )
        .into_response();
    apply_rate_limit_headers(res.headers_mut(), &budget);
    res
}

/// Unknown email and wrong password are indistinguishable to the caller.
async fn check_credentials(services: &AppServices, body: LoginRequest) -> Option<UserRecord> {
    let user = services.users.find_by_email(&body.email);
    let decoy = services.decoy.clone();
    let password = body.password;

    // bcrypt blocks; run it off the async workers.
    let verified = tokio::task::spawn_blocking(move || match user {
        Some(user) => user.verify_password(&password).then_some(user),
        None => {
            decoy.burn(&password);
            None
        }
    })
    .await;

    match verified {
        Ok(user) => user,
        Err(e) => {
            tracing::error!(error = %e, "password verification task failed");
            None
        }
    }
}

pub async fn csrf_token(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
) -> Response {
    let issued = services.authenticator.csrf().issue(ctx.session_id(), Utc::now());
    let cookie = session_cookie(CSRF_COOKIE, &issued.token, issued.expires_in_secs, false);

    (
        [(header::SET_COOKIE, cookie)],
        Json(CsrfTokenResponse {
            token: issued.token,
            expires_in_seconds: issued.expires_in_secs,
        }),
    )
        .into_response()
}

pub async fn redirect(Extension(ctx): Extension<AuthContext>) -> Json<RedirectResponse> {
    Json(RedirectResponse {
        redirect_to: resolve_redirect_target(&[ctx.role().as_str()]),
    })
}

/// `Set-Cookie` value scoped to the whole site.
///
/// The CSRF cookie stays readable by scripts so pages can echo it back in
/// the header.
fn session_cookie(name: &str, value: &str, max_age_secs: u64, http_only: bool) -> String {
    let http_only = if http_only { "; HttpOnly" } else { "" };
    format!("{name}={value}; Path=/; SameSite=Lax; Max-Age={max_age_secs}{http_only}")
}
