//! Wire-facing method router for the user service.
//!
//! Decodes typed request records per method, dispatches into
//! [`UserService`], and translates errors at the framing boundary.
//! Canonical method names are snake_case; the legacy aliases `register`,
//! `login`, and `profile` are accepted here during rollout.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use uwire_core::ERROR_VALIDATION;
use uwire_proto::{RpcError, RpcHandler};

use crate::service::{
    LoginCommand, RegisterCommand, SendOtpCommand, UserService, VerifyOtpCommand,
};

#[derive(Debug, Deserialize)]
struct ProfileRequest {
    #[serde(rename = "userID", default)]
    user_id: String,
}

/// [`RpcHandler`] implementation exposing the six service methods.
pub struct UserRpc {
    service: Arc<UserService>,
}

impl UserRpc {
    pub fn new(service: Arc<UserService>) -> Self {
        Self { service }
    }

    fn decode<'a, T: Deserialize<'a>>(payload: &'a [u8]) -> Result<T, RpcError> {
        serde_json::from_slice(payload)
            .map_err(|_| RpcError::new(ERROR_VALIDATION, "invalid input data"))
    }

    fn to_value<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, RpcError> {
        serde_json::to_value(value).map_err(|_| RpcError::internal("error generating response"))
    }

    async fn send_otp(&self, payload: &[u8]) -> Result<serde_json::Value, RpcError> {
        let cmd: SendOtpCommand = Self::decode(payload)?;
        if cmd.username.is_empty() || cmd.email.is_empty() || cmd.password.is_empty() {
            return Err(RpcError::new(
                ERROR_VALIDATION,
                "username, email and password are required",
            ));
        }
        let result = self.service.send_otp(cmd).await?;
        Self::to_value(&result)
    }

    async fn verify_otp(&self, payload: &[u8]) -> Result<serde_json::Value, RpcError> {
        let cmd: VerifyOtpCommand = Self::decode(payload)?;
        if cmd.email.is_empty() || cmd.otp.is_empty() {
            return Err(RpcError::new(
                ERROR_VALIDATION,
                "email and OTP are required",
            ));
        }
        let result = self.service.verify_otp(cmd).await?;
        Self::to_value(&result)
    }

    async fn login_user(&self, payload: &[u8]) -> Result<serde_json::Value, RpcError> {
        let cmd: LoginCommand = Self::decode(payload)?;
        if cmd.username.is_empty() || cmd.password.is_empty() {
            return Err(RpcError::new(
                ERROR_VALIDATION,
                "username and password are required",
            ));
        }
        let result = self.service.login_user(cmd).await?;
        Self::to_value(&result)
    }

    async fn get_profile(&self, payload: &[u8]) -> Result<serde_json::Value, RpcError> {
        let req: ProfileRequest = Self::decode(payload)?;
        if req.user_id.is_empty() {
            return Err(RpcError::new(ERROR_VALIDATION, "userID is required"));
        }
        let user_id = Uuid::parse_str(&req.user_id)
            .map_err(|_| RpcError::new(ERROR_VALIDATION, "invalid userID format"))?;
        let result = self.service.get_profile(user_id).await?;
        Self::to_value(&result)
    }

    async fn register_user(&self, payload: &[u8]) -> Result<serde_json::Value, RpcError> {
        let cmd: RegisterCommand = Self::decode(payload)?;
        if cmd.username.is_empty() || cmd.email.is_empty() || cmd.password.is_empty() {
            return Err(RpcError::new(
                ERROR_VALIDATION,
                "username, email and password are required",
            ));
        }
        let result = self.service.register_user(cmd).await?;
        Self::to_value(&result)
    }
}

#[async_trait]
impl RpcHandler for UserRpc {
    async fn dispatch(
        &self,
        method: &str,
        payload: &[u8],
    ) -> Result<serde_json::Value, RpcError> {
        match method {
            "send_otp" => self.send_otp(payload).await,
            "verify_otp" => self.verify_otp(payload).await,
            "login_user" | "login" => self.login_user(payload).await,
            "get_profile" | "profile" => self.get_profile(payload).await,
            "register_user" | "register" => self.register_user(payload).await,
            other => Err(RpcError::unknown_method(other)),
        }
    }
}

impl std::fmt::Debug for UserRpc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRpc").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::UserCache;
    use crate::memory::{
        MemoryCache, MemoryIdempotencyRepository, MemoryMailer, MemoryUserRepository,
    };
    use crate::otp::OtpGenerator;
    use crate::rate_limit::RateLimiter;
    use crate::token::TokenIssuer;
    use std::time::Duration;

    fn rpc() -> (UserRpc, Arc<MemoryMailer>) {
        let cache: Arc<MemoryCache> = Arc::new(MemoryCache::new());
        let mailer = Arc::new(MemoryMailer::new());
        let service = UserService::new(
            Arc::new(MemoryUserRepository::new()),
            Arc::new(MemoryIdempotencyRepository::new()),
            UserCache::new(
                cache,
                Duration::from_secs(300),
                Duration::from_secs(900),
                Duration::from_secs(86_400),
                Duration::from_secs(86_400),
            ),
            mailer.clone(),
            TokenIssuer::new("test-secret", Duration::from_secs(3600)).unwrap(),
            OtpGenerator::new(6),
            Arc::new(RateLimiter::new(Duration::from_secs(900), 5)),
        );
        (UserRpc::new(Arc::new(service)), mailer)
    }

    #[tokio::test]
    async fn full_flow_over_dispatch() {
        let (rpc, mailer) = rpc();

        let sent = rpc
            .dispatch(
                "send_otp",
                br#"{"username":"alice","email":"a@x","password":"hunter22"}"#,
            )
            .await
            .unwrap();
        assert_eq!(sent["message"], "OTP sent successfully");

        let otp = mailer.last_otp("a@x").unwrap();
        let verified = rpc
            .dispatch(
                "verify_otp",
                format!(r#"{{"email":"a@x","otp":"{otp}"}}"#).as_bytes(),
            )
            .await
            .unwrap();
        assert_eq!(verified["result"]["username"], "alice");
        assert_eq!(verified["result"]["is_verified"], true);
        assert!(verified["result"].get("password").is_none());

        let login = rpc
            .dispatch(
                "login_user",
                br#"{"username":"alice","password":"hunter22"}"#,
            )
            .await
            .unwrap();
        assert!(login["token"].as_str().is_some_and(|t| !t.is_empty()));

        let user_id = verified["result"]["id"].as_str().unwrap();
        let profile = rpc
            .dispatch(
                "get_profile",
                format!(r#"{{"userID":"{user_id}"}}"#).as_bytes(),
            )
            .await
            .unwrap();
        assert_eq!(profile["result"]["email"], "a@x");
        assert!(profile["result"].get("password").is_none());
    }

    #[tokio::test]
    async fn legacy_aliases_are_accepted() {
        let (rpc, _mailer) = rpc();

        let registered = rpc
            .dispatch(
                "register",
                br#"{"username":"bob","email":"b@x","password":"pw"}"#,
            )
            .await
            .unwrap();
        let user_id = registered["result"]["id"].as_str().unwrap().to_owned();

        // Unverified users get the opaque login denial through the alias too
        let err = rpc
            .dispatch("login", br#"{"username":"bob","password":"pw"}"#)
            .await
            .unwrap_err();
        assert_eq!(err.message, "invalid credentials");

        let profile = rpc
            .dispatch("profile", format!(r#"{{"userID":"{user_id}"}}"#).as_bytes())
            .await
            .unwrap();
        assert_eq!(profile["result"]["username"], "bob");
    }

    #[tokio::test]
    async fn unknown_method_is_rejected() {
        let (rpc, _mailer) = rpc();
        let err = rpc.dispatch("drop_tables", b"{}").await.unwrap_err();
        assert_eq!(err.message, "unknown method: drop_tables");
    }

    #[tokio::test]
    async fn malformed_json_is_invalid_input() {
        let (rpc, _mailer) = rpc();
        let err = rpc.dispatch("send_otp", b"{not json").await.unwrap_err();
        assert_eq!(err.message, "invalid input data");
    }

    #[tokio::test]
    async fn missing_fields_are_rejected_per_method() {
        let (rpc, _mailer) = rpc();
        let cases: [(&str, &[u8], &str); 4] = [
            (
                "send_otp",
                br#"{"username":"alice","email":"","password":"pw"}"#,
                "username, email and password are required",
            ),
            (
                "verify_otp",
                br#"{"email":"a@x","otp":""}"#,
                "email and OTP are required",
            ),
            (
                "login_user",
                br#"{"username":"","password":"pw"}"#,
                "username and password are required",
            ),
            ("get_profile", br#"{}"#, "userID is required"),
        ];
        for (method, payload, message) in cases {
            let err = rpc.dispatch(method, payload).await.unwrap_err();
            assert_eq!(err.message, message, "method {method}");
        }
    }

    #[tokio::test]
    async fn invalid_uuid_is_rejected() {
        let (rpc, _mailer) = rpc();
        let err = rpc
            .dispatch("get_profile", br#"{"userID":"not-a-uuid"}"#)
            .await
            .unwrap_err();
        assert_eq!(err.message, "invalid userID format");
    }

    #[tokio::test]
    async fn unknown_json_keys_are_ignored() {
        let (rpc, mailer) = rpc();
        rpc.dispatch(
            "send_otp",
            br#"{"username":"alice","email":"a@x","password":"pw","extra":42}"#,
        )
        .await
        .unwrap();
        assert!(mailer.last_otp("a@x").is_some());
    }
}
