//! Role landing pages. The UI itself is served elsewhere; these only confirm
//! who landed where.

use axum::{extract::Extension, http::Uri, Json};
use serde_json::json;

use crate::app::routes::system::summary;
use crate::context::AuthContext;

pub async fn dashboard(uri: Uri, Extension(ctx): Extension<AuthContext>) -> Json<serde_json::Value> {
    Json(json!({
        "dashboard": uri.path(),
        "home": ctx.role().dashboard_path(),
        "user": summary(&ctx),
    }))
}
