use std::sync::Arc;

use axum::{
    Extension, Router,
    middleware::from_fn_with_state,
    routing::{MethodRouter, delete, get, patch},
};

use agencyportal_auth::{Role, RoleSet};

use crate::app::services::AppServices;
use crate::middleware::{RouteGuard, api_rate_limit, require_auth, sensitive_rate_limit};

pub mod auth;
pub mod dashboards;
pub mod policies;
pub mod system;

/// Router for all authenticated endpoints.
///
/// Every route declares the roles it admits; there is no default.
pub fn router(services: Arc<AppServices>) -> Router {
    use Role::*;

    let all = RoleSet::all();
    let guard = |allowed: RoleSet| RouteGuard::new(services.clone(), allowed);

    let policy_routes = guarded(get(policies::get_policy), guard(all.clone()).owned_resource("id"))
        .merge(guarded(
            patch(policies::update_policy),
            guard(RoleSet::of(&[Agent, Manager, Admin, SuperAdmin])).owned_resource("id"),
        ))
        .merge(guarded(
            delete(policies::delete_policy)
                .route_layer(from_fn_with_state(services.clone(), sensitive_rate_limit)),
            guard(RoleSet::of(&[Admin, SuperAdmin])).owned_resource("id"),
        ));

    Router::new()
        .route("/whoami", guarded(get(system::whoami), guard(all.clone())))
        .route("/auth/csrf-token", guarded(get(auth::csrf_token), guard(all.clone())))
        .route("/auth/redirect", guarded(get(auth::redirect), guard(all.clone())))
        .route(
            "/agent/dashboard",
            guarded(get(dashboards::dashboard), guard(RoleSet::of(&[Agent]))),
        )
        .route(
            "/manager/dashboard",
            guarded(get(dashboards::dashboard), guard(RoleSet::of(&[Manager]))),
        )
        .route(
            "/customer-service/dashboard",
            guarded(get(dashboards::dashboard), guard(RoleSet::of(&[CustomerService]))),
        )
        .route(
            "/admin/dashboard",
            guarded(get(dashboards::dashboard), guard(RoleSet::of(&[Admin, SuperAdmin]))),
        )
        .route(
            "/super-admin/dashboard",
            guarded(get(dashboards::dashboard), guard(RoleSet::of(&[SuperAdmin]))),
        )
        .route("/policies/:id", policy_routes)
        .layer(Extension(services.clone()))
        .layer(from_fn_with_state(services.clone(), api_rate_limit))
}

fn guarded(route: MethodRouter, guard: RouteGuard) -> MethodRouter {
    route.route_layer(from_fn_with_state(guard, require_auth))
}
