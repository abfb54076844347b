//! Policy endpoints. Tenant scope is enforced by the route guard before any
//! handler here runs.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use agencyportal_core::{DomainError, ResourceId};
use agencyportal_infra::{PolicyDirectory, PolicyStatus};

use crate::app::dto::UpdatePolicyRequest;
use crate::app::errors::domain_error_to_response;
use crate::app::services::AppServices;
use crate::context::AuthContext;

pub async fn get_policy(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id = match ResourceId::new(id) {
        Ok(id) => id,
        Err(e) => return domain_error_to_response(e),
    };

    match services.policies.get(&id) {
        Some(policy) => Json(policy).into_response(),
        None => domain_error_to_response(DomainError::not_found()),
    }
}

pub async fn update_policy(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(body): Json<UpdatePolicyRequest>,
) -> Response {
    let id = match ResourceId::new(id) {
        Ok(id) => id,
        Err(e) => return domain_error_to_response(e),
    };

    let status = match body.status.parse::<PolicyStatus>() {
        Ok(s) => s,
        Err(e) => return domain_error_to_response(e),
    };

    match services.policies.update_status(&id, status) {
        Ok(policy) => {
            tracing::info!(
                policy_id = %id,
                user_id = %ctx.user_id(),
                status = ?policy.status,
                "policy status updated"
            );
            Json(policy).into_response()
        }
        Err(e) => domain_error_to_response(e),
    }
}

pub async fn delete_policy(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Response {
    let id = match ResourceId::new(id) {
        Ok(id) => id,
        Err(e) => return domain_error_to_response(e),
    };

    match services.policies.delete(&id) {
        Ok(_) => {
            tracing::info!(policy_id = %id, user_id = %ctx.user_id(), "policy deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => domain_error_to_response(e),
    }
}
