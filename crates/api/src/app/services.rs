//! Shared request-path services, built once and handed to every route.

use std::sync::Arc;

use chrono::Duration;

use agencyportal_auth::{
    CsrfGuard, RateLimiter, RequestAuthenticator, ResourceTenants, TokenService,
};
use agencyportal_infra::{CredentialDirectory, DecoyHash, DirectoryError, PolicyDirectory, Sweeper};

use crate::config::AppConfig;

pub struct AppServices {
    pub authenticator: RequestAuthenticator,
    pub login_limiter: Arc<RateLimiter>,
    pub api_limiter: Arc<RateLimiter>,
    pub sensitive_limiter: Arc<RateLimiter>,
    pub users: Arc<dyn CredentialDirectory>,
    /// Verified instead of a real hash when the login email is unknown.
    pub decoy: DecoyHash,
    pub policies: Arc<dyn PolicyDirectory>,
    /// Same rows as `policies`, seen only as tenant owners.
    pub policy_owners: Arc<dyn ResourceTenants>,
    pub token_ttl: Duration,
}

impl AppServices {
    pub fn new<U, P>(
        config: &AppConfig,
        users: Arc<U>,
        policies: Arc<P>,
    ) -> Result<Self, DirectoryError>
    where
        U: CredentialDirectory + 'static,
        P: PolicyDirectory + 'static,
    {
        let tokens = Arc::new(TokenService::new(&config.jwt_secret));
        let csrf = Arc::new(CsrfGuard::in_memory(config.csrf_ttl));

        Ok(Self {
            authenticator: RequestAuthenticator::new(tokens, csrf, config.missing_role),
            login_limiter: Arc::new(RateLimiter::in_memory("login", config.login_limit)),
            api_limiter: Arc::new(RateLimiter::in_memory("api", config.api_limit)),
            sensitive_limiter: Arc::new(RateLimiter::in_memory(
                "sensitive",
                config.sensitive_limit,
            )),
            users,
            decoy: DecoyHash::new(config.password_cost)?,
            policy_owners: policies.clone(),
            policies,
            token_ttl: config.token_ttl,
        })
    }

    /// Sweeper over every expiring store these services own.
    pub fn sweeper(&self, interval: std::time::Duration) -> Sweeper {
        Sweeper::new(interval)
            .with(self.login_limiter.clone())
            .with(self.api_limiter.clone())
            .with(self.sensitive_limiter.clone())
            .with(self.authenticator.csrf_handle())
    }
}
