//! UserService orchestration: OTP-gated registration, login, profile.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use uwire_metrics::{
    record_login, record_otp_sent, record_otp_verified, record_profile_cache,
};

use crate::cache::UserCache;
use crate::entities::{IdempotencyRecord, User, UserResult, ValidatedUser};
use crate::error::UserError;
use crate::otp::{self, OtpGenerator, OtpMailer};
use crate::password;
use crate::rate_limit::RateLimiter;
use crate::repository::{IdempotencyRepository, UserRepository};
use crate::token::TokenIssuer;

// ── Commands and results ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendOtpCommand {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyOtpCommand {
    pub email: String,
    pub otp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginCommand {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterCommand {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendOtpResult {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyOtpResult {
    pub result: UserResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResult {
    pub token: String,
    pub user: UserResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResult {
    pub result: UserResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileResult {
    pub result: UserResult,
}

// ── Service ───────────────────────────────────────────────────────

/// Business orchestration over the repositories, cache, mailer, token
/// issuer, and rate limiter.
pub struct UserService {
    users: Arc<dyn UserRepository>,
    idempotency: Arc<dyn IdempotencyRepository>,
    cache: UserCache,
    mailer: Arc<dyn OtpMailer>,
    tokens: TokenIssuer,
    otp: OtpGenerator,
    limiter: Arc<RateLimiter>,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        idempotency: Arc<dyn IdempotencyRepository>,
        cache: UserCache,
        mailer: Arc<dyn OtpMailer>,
        tokens: TokenIssuer,
        otp: OtpGenerator,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            users,
            idempotency,
            cache,
            mailer,
            tokens,
            otp,
            limiter,
        }
    }

    /// First phase of registration: cache an OTP and the pending user, then
    /// dispatch the OTP by email. Nothing touches the database here.
    pub async fn send_otp(&self, cmd: SendOtpCommand) -> Result<SendOtpResult, UserError> {
        if let Some(result) = self.replay(cmd.idempotency_key.as_deref()).await? {
            return Ok(result);
        }

        // Advisory pre-check; the unique index stays the final arbiter.
        if self.users.find_by_username(&cmd.username).await?.is_some() {
            return Err(UserError::Conflict("username already exists".to_string()));
        }

        if !self.limiter.allow(&cmd.email) {
            return Err(UserError::RateLimited(
                "too many OTP requests, please try again later".to_string(),
            ));
        }

        // Within the OTP window a second send re-uses the cached code, so
        // resends are idempotent.
        let otp = match self.cache.get_otp(&cmd.email).await? {
            Some(existing) if !existing.is_empty() => existing,
            _ => {
                let fresh = self.otp.generate()?;
                self.cache
                    .set_otp(&cmd.email, &fresh)
                    .await
                    .map_err(|e| UserError::Upstream(format!("failed to cache OTP: {e}")))?;
                fresh
            }
        };

        let pending = User::new(&cmd.username, &cmd.email, &cmd.password);
        self.cache
            .set_pending_user(&pending)
            .await
            .map_err(|e| UserError::Upstream(format!("failed to cache user data: {e}")))?;

        if let Err(err) = self.mailer.send_otp(&cmd.email, &otp).await {
            // Remove the cached code so the client can retry cleanly.
            if let Err(del) = self.cache.delete_otp(&cmd.email).await {
                warn!(error = %del, "failed to remove OTP after delivery failure");
            }
            return Err(err);
        }
        record_otp_sent();

        let result = SendOtpResult {
            message: "OTP sent successfully".to_string(),
        };
        self.record_idempotency(cmd.idempotency_key.as_deref(), &cmd, &result)
            .await;
        Ok(result)
    }

    /// Second phase: check the OTP, promote the pending user into the
    /// database, and clean up the cache entries.
    pub async fn verify_otp(&self, cmd: VerifyOtpCommand) -> Result<VerifyOtpResult, UserError> {
        if let Some(result) = self.replay(cmd.idempotency_key.as_deref()).await? {
            return Ok(result);
        }

        if !self.limiter.allow(&format!("verify:{}", cmd.email)) {
            return Err(UserError::RateLimited(
                "too many verification attempts, please try again later".to_string(),
            ));
        }

        let cached = self
            .cache
            .get_otp(&cmd.email)
            .await
            .map_err(|e| {
                UserError::Upstream(format!("failed to retrieve OTP from cache: {e}"))
            })?;
        let cached = match cached {
            Some(code) if !code.is_empty() => code,
            _ => return Err(UserError::State("OTP expired or not found".to_string())),
        };

        if !otp::verify_otp(&cmd.otp, &cached) {
            record_otp_verified("invalid");
            return Err(UserError::State("invalid OTP".to_string()));
        }

        let mut pending = self
            .cache
            .get_pending_user(&cmd.email)
            .await
            .map_err(|e| {
                UserError::Upstream(format!("failed to retrieve user data: {e}"))
            })?
            .ok_or_else(|| UserError::State("user data expired or not found".to_string()))?;

        pending.mark_verified();
        let validated = ValidatedUser::new(pending)?;
        // The repository hashes the password and translates unique-index
        // violations from concurrent verifications into conflicts.
        let created = self.users.create(validated).await?;

        // Best-effort cleanup; TTLs bound any leftovers.
        if let Err(err) = self.cache.delete_otp(&cmd.email).await {
            warn!(error = %err, "failed to delete OTP after verification");
        }
        if let Err(err) = self.cache.delete_pending_user(&cmd.email).await {
            warn!(error = %err, "failed to delete pending user after verification");
        }
        record_otp_verified("ok");

        let result = VerifyOtpResult {
            result: UserResult::from(&created),
        };
        self.record_idempotency(cmd.idempotency_key.as_deref(), &cmd, &result)
            .await;
        Ok(result)
    }

    /// Password login. Only verified users are accepted; every failure is
    /// the same opaque message.
    pub async fn login_user(&self, cmd: LoginCommand) -> Result<LoginResult, UserError> {
        let denied = || UserError::Auth("invalid credentials".to_string());

        let Some(user) = self.users.find_by_username(&cmd.username).await? else {
            record_login("denied");
            return Err(denied());
        };
        if !password::verify_password(&cmd.password, &user.password)? {
            record_login("denied");
            return Err(denied());
        }
        if !user.is_verified {
            record_login("denied");
            return Err(denied());
        }

        let token = self.tokens.sign(user.id)?;

        // Token bookkeeping must not block the response; the token is
        // self-validating either way.
        let cache = self.cache.clone();
        let users = self.users.clone();
        let stored_token = token.clone();
        let user_id = user.id;
        tokio::spawn(async move {
            if let Err(err) = cache.set_token(&stored_token, user_id).await {
                warn!(error = %err, "failed to store token in cache");
            }
            if let Err(err) = users.append_token(user_id, &stored_token).await {
                warn!(error = %err, "failed to append token in database");
            }
        });
        record_login("ok");

        Ok(LoginResult {
            token,
            user: UserResult::from(&user),
        })
    }

    /// Read-through profile lookup with a 24-hour consistency bound.
    pub async fn get_profile(&self, user_id: Uuid) -> Result<ProfileResult, UserError> {
        let cached = match self.cache.get_profile(user_id).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(error = %err, "profile cache read failed");
                None
            }
        };
        if let Some(user) = cached {
            record_profile_cache("hit");
            return Ok(ProfileResult {
                result: UserResult::from(&user),
            });
        }
        record_profile_cache("miss");

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| UserError::State("user not found".to_string()))?;

        if let Err(err) = self.cache.set_profile(&user).await {
            warn!(error = %err, "failed to cache user profile");
        }

        Ok(ProfileResult {
            result: UserResult::from(&user),
        })
    }

    /// Direct create path, used internally and by tests; skips the OTP flow.
    pub async fn register_user(&self, cmd: RegisterCommand) -> Result<RegisterResult, UserError> {
        if let Some(result) = self.replay(cmd.idempotency_key.as_deref()).await? {
            return Ok(result);
        }

        if self.users.find_by_username(&cmd.username).await?.is_some() {
            return Err(UserError::Conflict("username already exists".to_string()));
        }
        if self.users.find_by_email(&cmd.email).await?.is_some() {
            return Err(UserError::Conflict("email already exists".to_string()));
        }

        let validated = ValidatedUser::new(User::new(&cmd.username, &cmd.email, &cmd.password))?;
        let created = self.users.create(validated).await?;

        let result = RegisterResult {
            result: UserResult::from(&created),
        };
        self.record_idempotency(cmd.idempotency_key.as_deref(), &cmd, &result)
            .await;
        Ok(result)
    }

    pub async fn find_user_by_id(&self, id: Uuid) -> Result<UserResult, UserError> {
        let user = self
            .users
            .find_by_id(id)
            .await?
            .ok_or_else(|| UserError::State("user not found".to_string()))?;
        Ok(UserResult::from(&user))
    }

    /// Return the stored response for a replayed idempotency key.
    async fn replay<T: DeserializeOwned>(
        &self,
        key: Option<&str>,
    ) -> Result<Option<T>, UserError> {
        let Some(key) = key else { return Ok(None) };
        match self.idempotency.find_by_key(key).await? {
            Some(record) => Ok(Some(
                serde_json::from_str(&record.response).map_err(UserError::internal)?,
            )),
            None => Ok(None),
        }
    }

    /// Persist the idempotency record; storage failure is logged, not fatal.
    async fn record_idempotency<Req: Serialize, Resp: Serialize>(
        &self,
        key: Option<&str>,
        request: &Req,
        response: &Resp,
    ) {
        let Some(key) = key else { return };
        let request_json = match serde_json::to_string(request) {
            Ok(json) => json,
            Err(err) => {
                warn!(error = %err, "failed to serialize idempotency request");
                return;
            }
        };
        let response_json = match serde_json::to_string(response) {
            Ok(json) => json,
            Err(err) => {
                warn!(error = %err, "failed to serialize idempotency response");
                return;
            }
        };
        let mut record = IdempotencyRecord::new(key, request_json);
        record.set_response(response_json, 200);
        if let Err(err) = self.idempotency.create(&record).await {
            warn!(error = %err, "failed to store idempotency record");
        }
    }
}

impl std::fmt::Debug for UserService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserService")
            .field("otp", &self.otp)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{otp_key, pending_user_key, token_key};
    use crate::memory::{
        MemoryCache, MemoryIdempotencyRepository, MemoryMailer, MemoryUserRepository,
    };
    use std::time::Duration;

    struct Harness {
        service: Arc<UserService>,
        users: Arc<MemoryUserRepository>,
        cache: Arc<MemoryCache>,
        mailer: Arc<MemoryMailer>,
        tokens: TokenIssuer,
    }

    fn harness() -> Harness {
        harness_with_limit(5)
    }

    fn harness_with_limit(max_attempts: u32) -> Harness {
        let users = Arc::new(MemoryUserRepository::new());
        let cache = Arc::new(MemoryCache::new());
        let mailer = Arc::new(MemoryMailer::new());
        let tokens = TokenIssuer::new("test-secret", Duration::from_secs(3600)).unwrap();
        let user_cache = UserCache::new(
            cache.clone(),
            Duration::from_secs(300),
            Duration::from_secs(900),
            Duration::from_secs(86_400),
            Duration::from_secs(86_400),
        );
        let service = UserService::new(
            users.clone(),
            Arc::new(MemoryIdempotencyRepository::new()),
            user_cache,
            mailer.clone(),
            tokens.clone(),
            OtpGenerator::new(6),
            Arc::new(RateLimiter::new(Duration::from_secs(900), max_attempts)),
        );
        Harness {
            service: Arc::new(service),
            users,
            cache,
            mailer,
            tokens,
        }
    }

    fn send_cmd(idem: Option<&str>) -> SendOtpCommand {
        SendOtpCommand {
            username: "alice".into(),
            email: "a@x".into(),
            password: "hunter22".into(),
            idempotency_key: idem.map(Into::into),
        }
    }

    fn verify_cmd(otp: &str, idem: Option<&str>) -> VerifyOtpCommand {
        VerifyOtpCommand {
            email: "a@x".into(),
            otp: otp.into(),
            idempotency_key: idem.map(Into::into),
        }
    }

    #[tokio::test]
    async fn happy_path_registration() {
        let h = harness();
        let sent = h.service.send_otp(send_cmd(Some("k1"))).await.unwrap();
        assert_eq!(sent.message, "OTP sent successfully");

        let otp = h.mailer.last_otp("a@x").unwrap();
        let verified = h
            .service
            .verify_otp(verify_cmd(&otp, Some("k2")))
            .await
            .unwrap();
        assert_eq!(verified.result.username, "alice");
        assert_eq!(verified.result.email, "a@x");
        assert!(verified.result.is_verified);

        // Row persisted with a hashed password
        let stored = h.users.find_by_email("a@x").await.unwrap().unwrap();
        assert!(stored.is_verified);
        assert_ne!(stored.password, "hunter22");

        // Cache entries are gone after success
        assert!(!h.cache.contains(&otp_key("a@x")));
        assert!(!h.cache.contains(&pending_user_key("a@x")));
    }

    #[tokio::test]
    async fn resend_within_window_reuses_otp() {
        let h = harness();
        h.service.send_otp(send_cmd(None)).await.unwrap();
        let first = h.mailer.last_otp("a@x").unwrap();
        h.service.send_otp(send_cmd(None)).await.unwrap();
        let second = h.mailer.last_otp("a@x").unwrap();
        assert_eq!(first, second);
        assert_eq!(h.mailer.sent_count(), 2);
    }

    #[tokio::test]
    async fn wrong_otp_then_right() {
        let h = harness();
        h.service.send_otp(send_cmd(None)).await.unwrap();
        let otp = h.mailer.last_otp("a@x").unwrap();

        let wrong = "000000";
        let bad = if otp == wrong { "111111" } else { wrong };
        let err = h.service.verify_otp(verify_cmd(bad, None)).await.unwrap_err();
        assert_eq!(err.to_string(), "invalid OTP");

        let ok = h.service.verify_otp(verify_cmd(&otp, None)).await.unwrap();
        assert!(ok.result.is_verified);
    }

    #[tokio::test]
    async fn expired_otp_is_reported() {
        let h = harness();
        h.service.send_otp(send_cmd(None)).await.unwrap();
        h.cache.expire(&otp_key("a@x"));

        let err = h
            .service
            .verify_otp(verify_cmd("123456", None))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "OTP expired or not found");
    }

    #[tokio::test]
    async fn expired_pending_user_is_reported() {
        let h = harness();
        h.service.send_otp(send_cmd(None)).await.unwrap();
        let otp = h.mailer.last_otp("a@x").unwrap();
        h.cache.expire(&pending_user_key("a@x"));

        let err = h.service.verify_otp(verify_cmd(&otp, None)).await.unwrap_err();
        assert_eq!(err.to_string(), "user data expired or not found");
    }

    #[tokio::test]
    async fn idempotent_verify_replays_identical_bytes() {
        let h = harness();
        h.service.send_otp(send_cmd(Some("k1"))).await.unwrap();
        let otp = h.mailer.last_otp("a@x").unwrap();

        let first = h
            .service
            .verify_otp(verify_cmd(&otp, Some("k2")))
            .await
            .unwrap();
        // Replay after the cache entries are gone and the row exists; the
        // stored response short-circuits everything.
        let second = h
            .service
            .verify_otp(verify_cmd(&otp, Some("k2")))
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn idempotent_send_replays_stored_response() {
        let h = harness();
        let first = h.service.send_otp(send_cmd(Some("k1"))).await.unwrap();
        let second = h.service.send_otp(send_cmd(Some("k1"))).await.unwrap();
        assert_eq!(first.message, second.message);
        // The replay did not dispatch another email
        assert_eq!(h.mailer.sent_count(), 1);
    }

    #[tokio::test]
    async fn sixth_send_within_window_is_limited() {
        let h = harness();
        for _ in 0..5 {
            h.service.send_otp(send_cmd(None)).await.unwrap();
        }
        let err = h.service.send_otp(send_cmd(None)).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "too many OTP requests, please try again later"
        );
        assert!(matches!(err, UserError::RateLimited(_)));
    }

    #[tokio::test]
    async fn verification_attempts_are_limited_separately() {
        let h = harness_with_limit(2);
        h.service.send_otp(send_cmd(None)).await.unwrap();
        let otp = h.mailer.last_otp("a@x").unwrap();
        let bad = if otp == "000000" { "111111" } else { "000000" };

        // send used one slot under key "a@x"; verify uses "verify:a@x"
        assert!(h.service.verify_otp(verify_cmd(bad, None)).await.is_err());
        assert!(h.service.verify_otp(verify_cmd(bad, None)).await.is_err());
        let err = h.service.verify_otp(verify_cmd(&otp, None)).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "too many verification attempts, please try again later"
        );
    }

    #[tokio::test]
    async fn mail_failure_clears_otp_for_retry() {
        let h = harness();
        h.mailer.fail_next();
        let err = h.service.send_otp(send_cmd(None)).await.unwrap_err();
        assert!(err.to_string().starts_with("failed to send OTP"));
        assert!(!h.cache.contains(&otp_key("a@x")));

        // The retry succeeds with a freshly cached OTP
        h.service.send_otp(send_cmd(None)).await.unwrap();
        assert!(h.cache.contains(&otp_key("a@x")));
    }

    #[tokio::test]
    async fn duplicate_username_precheck_rejects_send() {
        let h = harness();
        h.service
            .register_user(RegisterCommand {
                username: "alice".into(),
                email: "other@x".into(),
                password: "pw".into(),
                idempotency_key: None,
            })
            .await
            .unwrap();

        let err = h.service.send_otp(send_cmd(None)).await.unwrap_err();
        assert_eq!(err.to_string(), "username already exists");
    }

    #[tokio::test]
    async fn concurrent_verify_race_yields_one_conflict() {
        let h = harness();
        // Two pending registrations for the same username, different emails.
        h.service.send_otp(send_cmd(None)).await.unwrap();
        h.service
            .send_otp(SendOtpCommand {
                username: "alice".into(),
                email: "b@x".into(),
                password: "pw2".into(),
                idempotency_key: None,
            })
            .await
            .unwrap();
        let otp_a = h.mailer.last_otp("a@x").unwrap();
        let otp_b = h.mailer.last_otp("b@x").unwrap();

        let (ra, rb) = tokio::join!(
            h.service.verify_otp(verify_cmd(&otp_a, None)),
            h.service.verify_otp(VerifyOtpCommand {
                email: "b@x".into(),
                otp: otp_b,
                idempotency_key: None,
            })
        );
        let outcomes = [ra.is_ok(), rb.is_ok()];
        assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
        let err = if outcomes[0] {
            rb.unwrap_err()
        } else {
            ra.unwrap_err()
        };
        assert_eq!(err.to_string(), "username already exists");
    }

    #[tokio::test]
    async fn login_returns_verifiable_token_and_side_effects() {
        let h = harness();
        h.service.send_otp(send_cmd(None)).await.unwrap();
        let otp = h.mailer.last_otp("a@x").unwrap();
        let verified = h.service.verify_otp(verify_cmd(&otp, None)).await.unwrap();

        let login = h
            .service
            .login_user(LoginCommand {
                username: "alice".into(),
                password: "hunter22".into(),
            })
            .await
            .unwrap();
        assert_eq!(login.user.username, "alice");
        assert_eq!(
            h.tokens.verify(&login.token).unwrap(),
            verified.result.id
        );

        // Fire-and-forget side effects land shortly after the response.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let stored = h.users.find_by_id(verified.result.id).await.unwrap().unwrap();
        assert_eq!(stored.tokens, vec![login.token.clone()]);
        assert!(h.cache.contains(&token_key(&login.token)));
    }

    #[tokio::test]
    async fn login_failures_are_opaque() {
        let h = harness();
        h.service.send_otp(send_cmd(None)).await.unwrap();
        let otp = h.mailer.last_otp("a@x").unwrap();
        h.service.verify_otp(verify_cmd(&otp, None)).await.unwrap();

        for (username, password) in [
            ("alice", "wrong-password"),
            ("nobody", "hunter22"),
        ] {
            let err = h
                .service
                .login_user(LoginCommand {
                    username: username.into(),
                    password: password.into(),
                })
                .await
                .unwrap_err();
            assert_eq!(err.to_string(), "invalid credentials");
        }
    }

    #[tokio::test]
    async fn unverified_user_cannot_login() {
        let h = harness();
        h.service
            .register_user(RegisterCommand {
                username: "bob".into(),
                email: "b@x".into(),
                password: "pw".into(),
                idempotency_key: None,
            })
            .await
            .unwrap();

        let err = h
            .service
            .login_user(LoginCommand {
                username: "bob".into(),
                password: "pw".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid credentials");
    }

    #[tokio::test]
    async fn profile_reads_through_cache() {
        let h = harness();
        h.service.send_otp(send_cmd(None)).await.unwrap();
        let otp = h.mailer.last_otp("a@x").unwrap();
        let id = h
            .service
            .verify_otp(verify_cmd(&otp, None))
            .await
            .unwrap()
            .result
            .id;

        let first = h.service.get_profile(id).await.unwrap();
        assert_eq!(first.result.username, "alice");
        // The miss wrote a snapshot through to the cache.
        assert!(h.cache.contains(&crate::cache::profile_key(id)));

        // The cached snapshot serves the second read, stripped of secrets.
        let json = serde_json::to_string(&h.service.get_profile(id).await.unwrap()).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("hunter22"));
        assert!(!json.contains("tokens"));
    }

    #[tokio::test]
    async fn profile_of_unknown_user_not_found() {
        let h = harness();
        let err = h.service.get_profile(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.to_string(), "user not found");
    }
}
