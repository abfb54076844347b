use axum::{extract::Extension, http::StatusCode, Json};

use crate::app::dto::UserSummary;
use crate::context::AuthContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(ctx): Extension<AuthContext>) -> Json<UserSummary> {
    Json(summary(&ctx))
}

pub(crate) fn summary(ctx: &AuthContext) -> UserSummary {
    UserSummary {
        id: ctx.user_id().clone(),
        email: ctx.email().to_string(),
        role: ctx.role(),
        tenant_id: ctx.tenant_id().cloned(),
    }
}
