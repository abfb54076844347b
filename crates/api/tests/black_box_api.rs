use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{json, Value};

use agencyportal_api::app::{AppServices, build_app};
use agencyportal_api::config::AppConfig;
use agencyportal_core::{ResourceId, TenantId, UserId};
use agencyportal_infra::{
    InMemoryCredentialDirectory, InMemoryPolicyDirectory, PolicyDirectory, PolicyRecord,
    PolicyStatus,
};

const JWT_SECRET: &str = "black-box-test-secret-at-least-32-bytes";
const PASSWORD: &str = "correct horse battery staple";

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with_password_cost(4).await
    }

    async fn spawn_with_password_cost(cost: u32) -> Self {
        let mut config = AppConfig::for_tests(JWT_SECRET).expect("test config");
        config.password_cost = cost;

        let users = Arc::new(InMemoryCredentialDirectory::new());
        for (id, email, role, tenant) in [
            ("u-agent", "agent@t1.test", Some("agent"), Some("T1")),
            ("u-manager", "manager@t1.test", Some("MANAGER"), Some("T1")),
            ("u-admin", "admin@t1.test", Some("Admin"), Some("T1")),
            ("u-cs", "cs@t2.test", Some("customer_service"), Some("T2")),
            ("u-root", "root@portal.test", Some("Super_Admin"), None),
        ] {
            users
                .register(
                    UserId::new(id).unwrap(),
                    email,
                    PASSWORD,
                    role,
                    tenant.map(|t| TenantId::new(t).unwrap()),
                    config.password_cost,
                )
                .unwrap();
        }

        let policies = Arc::new(InMemoryPolicyDirectory::new());
        for (id, tenant) in [("pol-t1", "T1"), ("pol-t2", "T2")] {
            policies.upsert(PolicyRecord {
                id: ResourceId::new(id).unwrap(),
                tenant_id: TenantId::new(tenant).unwrap(),
                policy_number: format!("PN-{id}"),
                holder_name: "Pat Holder".into(),
                status: PolicyStatus::Active,
            });
        }

        // Same router as prod, bound to an ephemeral port.
        let services = AppServices::new(&config, users, policies).expect("services");
        let app = build_app(Arc::new(services));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .await
                .unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn login(&self, client: &reqwest::Client, email: &str) -> String {
        let res = client
            .post(self.url("/auth/login"))
            .json(&json!({ "email": email, "password": PASSWORD }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK, "login failed for {email}");
        let body: Value = res.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }

    async fn csrf_token(&self, client: &reqwest::Client, bearer: &str) -> String {
        let res = client
            .get(self.url("/auth/csrf-token"))
            .bearer_auth(bearer)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(secret: &str, claims: Value) -> String {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn claims(role: &str, tenant: Option<&str>, expires_in: ChronoDuration) -> Value {
    let now = Utc::now();
    let mut c = json!({
        "sub": "u-minted",
        "email": "minted@example.com",
        "role": role,
        "iat": now.timestamp(),
        "exp": (now + expires_in).timestamp(),
    });
    if let Some(t) = tenant {
        c["tenantId"] = json!(t);
    }
    c
}

async fn error_code(res: reqwest::Response) -> (StatusCode, String, String) {
    let status = res.status();
    let body: Value = res.json().await.unwrap();
    (
        status,
        body["error"].as_str().unwrap_or_default().to_string(),
        body["message"].as_str().unwrap_or_default().to_string(),
    )
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    for path in ["/whoami", "/auth/csrf-token", "/agent/dashboard", "/policies/pol-t1"] {
        let res = client.get(srv.url(path)).send().await.unwrap();
        assert!(res.headers().contains_key("x-ratelimit-limit"));
        let (status, code, message) = error_code(res).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{path}");
        assert_eq!(code, "unauthorized");
        assert_eq!(message, "authentication required");
    }
}

#[tokio::test]
async fn login_issues_session_and_redirect() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/auth/login"))
        .json(&json!({ "email": "Manager@T1.test", "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    // The attempt budget is restored by a successful login.
    assert_eq!(res.headers()["x-ratelimit-limit"], "5");
    assert_eq!(res.headers()["x-ratelimit-remaining"], "5");
    assert!(res.headers().contains_key("x-ratelimit-reset"));
    let cookie = res.headers()["set-cookie"].to_str().unwrap().to_string();
    assert!(cookie.starts_with("auth_token="));
    assert!(cookie.contains("HttpOnly"));

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["redirectTo"], "/manager/dashboard");
    assert_eq!(body["user"]["role"], "manager");
    assert_eq!(body["user"]["tenantId"], "T1");
    assert_eq!(body["expiresInSeconds"], 8 * 3600);
    let token = body["token"].as_str().unwrap();

    let res = client.get(srv.url("/whoami")).bearer_auth(token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let me: Value = res.json().await.unwrap();
    assert_eq!(me["id"], "u-manager");
    assert_eq!(me["role"], "manager");

    let res = client.get(srv.url("/auth/redirect")).bearer_auth(token).send().await.unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["redirectTo"], "/manager/dashboard");

    // Browser clients send the cookie instead of a header.
    let res = client
        .get(srv.url("/manager/dashboard"))
        .header("cookie", format!("auth_token={token}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn legacy_role_spellings_land_on_canonical_dashboards() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/auth/login"))
        .json(&json!({ "email": "root@portal.test", "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["redirectTo"], "/super-admin/dashboard");
    assert_eq!(body["user"]["role"], "super-admin");
    assert!(body["user"]["tenantId"].is_null());

    let res = client
        .post(srv.url("/auth/login"))
        .json(&json!({ "email": "cs@t2.test", "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["redirectTo"], "/customer-service/dashboard");
}

#[tokio::test]
async fn repeated_failed_logins_are_rate_limited() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    for _ in 0..5 {
        let res = client
            .post(srv.url("/auth/login"))
            .json(&json!({ "email": "agent@t1.test", "password": "wrong" }))
            .send()
            .await
            .unwrap();
        let (status, _, message) = error_code(res).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(message, "invalid credentials");
    }

    // Sixth attempt is refused even with the right password.
    let res = client
        .post(srv.url("/auth/login"))
        .json(&json!({ "email": "agent@t1.test", "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = res.headers()["retry-after"].to_str().unwrap().parse().unwrap();
    assert!(retry_after > 0 && retry_after <= 900);
    let (_, code, _) = error_code(res).await;
    assert_eq!(code, "rate_limited");

    // Other identities from the same address are unaffected.
    srv.login(&client, "manager@t1.test").await;
}

#[tokio::test]
async fn unknown_email_looks_like_wrong_password() {
    let srv = TestServer::spawn().await;
    let res = reqwest::Client::new()
        .post(srv.url("/auth/login"))
        .json(&json!({ "email": "nobody@t1.test", "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    let (status, code, message) = error_code(res).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(code, "unauthorized");
    assert_eq!(message, "invalid credentials");
}

#[tokio::test]
async fn unknown_email_costs_as_much_as_a_wrong_password() {
    // Cost high enough that a skipped bcrypt check is obvious next to one that ran.
    let srv = TestServer::spawn_with_password_cost(8).await;
    let client = reqwest::Client::new();

    let mut average = Vec::new();
    for email in ["agent@t1.test", "nobody@t1.test"] {
        let mut total = Duration::ZERO;
        for i in 0..3 {
            let started = Instant::now();
            let res = client
                .post(srv.url("/auth/login"))
                .header("x-forwarded-for", format!("10.9.{}.{i}", average.len()))
                .json(&json!({ "email": email, "password": "wrong password" }))
                .send()
                .await
                .unwrap();
            total += started.elapsed();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        }
        average.push(total / 3);
    }

    let (known, unknown) = (average[0], average[1]);
    assert!(
        unknown * 3 >= known,
        "unknown email answered in {unknown:?}, wrong password in {known:?}"
    );
}

#[tokio::test]
async fn successful_login_resets_the_attempt_budget() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let wrong = || {
        client
            .post(srv.url("/auth/login"))
            .json(&json!({ "email": "agent@t1.test", "password": "wrong" }))
            .send()
    };

    for _ in 0..4 {
        assert_eq!(wrong().await.unwrap().status(), StatusCode::UNAUTHORIZED);
    }
    srv.login(&client, "agent@t1.test").await;
    for _ in 0..5 {
        assert_eq!(wrong().await.unwrap().status(), StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn tenant_isolation_blocks_cross_tenant_access() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let agent = srv.login(&client, "agent@t1.test").await;

    let res = client.get(srv.url("/policies/pol-t1")).bearer_auth(&agent).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let policy: Value = res.json().await.unwrap();
    assert_eq!(policy["tenantId"], "T1");

    let (status, code, _) =
        error_code(client.get(srv.url("/policies/pol-t2")).bearer_auth(&agent).send().await.unwrap())
            .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(code, "tenant_mismatch");

    // A missing row is indistinguishable from another tenant's row.
    let (status, code, _) =
        error_code(client.get(srv.url("/policies/nope")).bearer_auth(&agent).send().await.unwrap())
            .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(code, "tenant_mismatch");
}

#[tokio::test]
async fn super_admin_crosses_tenants() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let root = srv.login(&client, "root@portal.test").await;

    let res = client.get(srv.url("/policies/pol-t2")).bearer_auth(&root).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(srv.url("/policies/nope")).bearer_auth(&root).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client.get(srv.url("/admin/dashboard")).bearer_auth(&root).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn mutations_require_a_session_bound_csrf_token() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let agent = srv.login(&client, "agent@t1.test").await;
    let manager = srv.login(&client, "manager@t1.test").await;

    let patch = |token: &str| {
        client
            .patch(srv.url("/policies/pol-t1"))
            .bearer_auth(token.to_string())
    };

    let (status, code, message) =
        error_code(patch(&agent).json(&json!({ "status": "lapsed" })).send().await.unwrap()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(code, "csrf_missing");
    assert_eq!(message, "missing CSRF token");

    let (status, code, _) = error_code(
        patch(&agent)
            .header("x-csrf-token", "not-a-real-token")
            .json(&json!({ "status": "lapsed" }))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(code, "csrf_invalid");

    // Bound to the manager's session, so useless to the agent.
    let foreign = srv.csrf_token(&client, &manager).await;
    let res = patch(&agent)
        .header("x-csrf-token", &foreign)
        .json(&json!({ "status": "lapsed" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let csrf = srv.csrf_token(&client, &agent).await;
    let res = patch(&agent)
        .header("x-csrf-token", &csrf)
        .json(&json!({ "status": "lapsed" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "lapsed");

    // Body field works too, and tokens are reusable within their TTL.
    let res = patch(&agent)
        .json(&json!({ "status": "active", "_csrf": csrf }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn unauthenticated_mutations_are_rejected_before_the_body_is_read() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let oversized = "x".repeat(80 * 1024);
    let (status, code, _) = error_code(
        client
            .patch(srv.url("/policies/pol-t1"))
            .json(&json!({ "status": "lapsed", "note": oversized }))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(code, "unauthorized");
}

#[tokio::test]
async fn unknown_policy_status_is_a_validation_error() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let manager = srv.login(&client, "manager@t1.test").await;
    let csrf = srv.csrf_token(&client, &manager).await;

    let (status, code, message) = error_code(
        client
            .patch(srv.url("/policies/pol-t1"))
            .bearer_auth(&manager)
            .header("x-csrf-token", &csrf)
            .json(&json!({ "status": "void" }))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(code, "validation_error");
    assert!(message.contains("void"));

    let res = client
        .patch(srv.url("/policies/pol-t1"))
        .bearer_auth(&manager)
        .header("x-csrf-token", &csrf)
        .json(&json!({ "status": " Cancelled " }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "cancelled");
}

#[tokio::test]
async fn sensitive_routes_report_their_own_budget() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let root = srv.login(&client, "root@portal.test").await;
    let csrf = srv.csrf_token(&client, &root).await;

    let delete = || {
        client
            .delete(srv.url("/policies/pol-missing"))
            .bearer_auth(&root)
            .header("x-csrf-token", &csrf)
            .send()
    };

    for i in 0..10 {
        let res = delete().await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(res.headers()["x-ratelimit-limit"], "10");
        assert_eq!(res.headers()["x-ratelimit-remaining"], (9 - i).to_string().as_str());
    }

    let res = delete().await.unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(res.headers()["x-ratelimit-limit"], "10");
    assert_eq!(res.headers()["x-ratelimit-remaining"], "0");
    assert!(res.headers().contains_key("retry-after"));

    // Other routes still report the general API budget.
    let res = client.get(srv.url("/whoami")).bearer_auth(&root).send().await.unwrap();
    assert_eq!(res.headers()["x-ratelimit-limit"], "100");
}

#[tokio::test]
async fn roles_are_enforced_per_route() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let agent = srv.login(&client, "agent@t1.test").await;
    let admin = srv.login(&client, "admin@t1.test").await;

    let (status, code, message) = error_code(
        client.get(srv.url("/manager/dashboard")).bearer_auth(&agent).send().await.unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(code, "forbidden");
    assert_eq!(message, "insufficient permissions");

    let res = client.get(srv.url("/super-admin/dashboard")).bearer_auth(&admin).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let csrf = srv.csrf_token(&client, &agent).await;
    let res = client
        .delete(srv.url("/policies/pol-t1"))
        .bearer_auth(&agent)
        .header("x-csrf-token", &csrf)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let csrf = srv.csrf_token(&client, &admin).await;
    let res = client
        .delete(srv.url("/policies/pol-t1"))
        .bearer_auth(&admin)
        .header("x-csrf-token", &csrf)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    // Gone rows have no tenant, so tenant-bound callers are refused outright.
    let res = client.get(srv.url("/policies/pol-t1")).bearer_auth(&admin).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn expired_and_forged_tokens_are_rejected_alike() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let expired = mint_jwt(JWT_SECRET, claims("agent", Some("T1"), ChronoDuration::minutes(-5)));
    let forged = mint_jwt(
        "some-other-secret-entirely-different",
        claims("super_admin", None, ChronoDuration::minutes(10)),
    );

    for token in [expired.as_str(), forged.as_str(), "not.a.jwt"] {
        let (status, code, message) =
            error_code(client.get(srv.url("/whoami")).bearer_auth(token).send().await.unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(code, "unauthorized");
        assert_eq!(message, "invalid credentials");
    }
}

#[tokio::test]
async fn externally_minted_tokens_are_normalized() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let legacy = mint_jwt(JWT_SECRET, claims("Super_Admin", None, ChronoDuration::minutes(10)));
    let res = client.get(srv.url("/super-admin/dashboard")).bearer_auth(&legacy).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Older issuers wrote the subject as `id` and omitted the role.
    let now = Utc::now();
    let roleless = mint_jwt(
        JWT_SECRET,
        json!({
            "id": "u-old",
            "email": "old@t1.test",
            "tenantId": "T1",
            "iat": now.timestamp(),
            "exp": (now + ChronoDuration::minutes(10)).timestamp(),
        }),
    );
    let res = client.get(srv.url("/whoami")).bearer_auth(&roleless).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let me: Value = res.json().await.unwrap();
    assert_eq!(me["id"], "u-old");
    assert_eq!(me["role"], "agent");

    let unknown = mint_jwt(JWT_SECRET, claims("owner", Some("T1"), ChronoDuration::minutes(10)));
    let res = client.get(srv.url("/whoami")).bearer_auth(&unknown).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn authenticated_responses_carry_rate_limit_headers() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let agent = srv.login(&client, "agent@t1.test").await;

    let first = client.get(srv.url("/whoami")).bearer_auth(&agent).send().await.unwrap();
    let second = client.get(srv.url("/whoami")).bearer_auth(&agent).send().await.unwrap();

    assert_eq!(first.headers()["x-ratelimit-limit"], "100");
    let remaining = |r: &reqwest::Response| -> u32 {
        r.headers()["x-ratelimit-remaining"].to_str().unwrap().parse().unwrap()
    };
    assert_eq!(remaining(&first), remaining(&second) + 1);

    let reset: i64 = first.headers()["x-ratelimit-reset"].to_str().unwrap().parse().unwrap();
    assert!(reset > Utc::now().timestamp() - 1);
}
