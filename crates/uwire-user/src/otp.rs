//! OTP generation, constant-time verification, and email dispatch.

use async_trait::async_trait;
use rand::rngs::OsRng;
use rand::TryRngCore;
use serde::Serialize;
use subtle::ConstantTimeEq;
use tracing::{debug, info};

use crate::error::UserError;

/// Decimal OTP generator backed by the OS CSPRNG.
///
/// Bytes are rejection-sampled (values >= 250 are discarded) so every digit
/// is uniform over 0-9.
#[derive(Debug, Clone, Copy)]
pub struct OtpGenerator {
    length: usize,
}

impl OtpGenerator {
    pub fn new(length: usize) -> Self {
        Self { length }
    }

    pub fn generate(&self) -> Result<String, UserError> {
        let mut otp = String::with_capacity(self.length);
        let mut raw = [0u8; 16];
        while otp.len() < self.length {
            OsRng
                .try_fill_bytes(&mut raw)
                .map_err(|e| UserError::internal(format!("csprng failure: {e}")))?;
            for byte in raw {
                if otp.len() == self.length {
                    break;
                }
                if byte < 250 {
                    otp.push(char::from(b'0' + byte % 10));
                }
            }
        }
        Ok(otp)
    }
}

/// Constant-time comparison of a supplied OTP against the cached one.
pub fn verify_otp(provided: &str, expected: &str) -> bool {
    provided.len() == expected.len()
        && bool::from(provided.as_bytes().ct_eq(expected.as_bytes()))
}

/// Mask a secret for logging: keep the first and last four characters.
pub fn mask_secret(secret: &str) -> String {
    if secret.len() > 8 {
        format!("{}****{}", &secret[..4], &secret[secret.len() - 4..])
    } else {
        "****".to_string()
    }
}

/// Outbound OTP delivery.
#[async_trait]
pub trait OtpMailer: Send + Sync {
    async fn send_otp(&self, recipient: &str, otp: &str) -> Result<(), UserError>;
}

#[derive(Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: String,
}

/// Mailer speaking the Resend HTTP JSON API.
pub struct ResendMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    sender: String,
}

impl ResendMailer {
    /// `base_url` is the provider root (e.g. `https://api.resend.com`).
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        sender: impl Into<String>,
    ) -> Self {
        let base = base_url.into();
        let base = base.trim_end_matches('/');
        let api_key = api_key.into();
        let sender = sender.into();
        info!(
            api_key = %mask_secret(&api_key),
            sender = %sender,
            "otp mailer configured"
        );
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{base}/emails"),
            api_key,
            sender,
        }
    }
}

#[async_trait]
impl OtpMailer for ResendMailer {
    async fn send_otp(&self, recipient: &str, otp: &str) -> Result<(), UserError> {
        debug!(recipient = %recipient, "sending OTP email");
        let body = SendEmailRequest {
            from: &self.sender,
            to: [recipient],
            subject: "Your OTP Code",
            text: format!("Your OTP code is: {otp}"),
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| UserError::upstream("failed to send OTP", e))?;
        if !resp.status().is_success() {
            return Err(UserError::Upstream(format!(
                "failed to send OTP: HTTP {}",
                resp.status().as_u16()
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ResendMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResendMailer")
            .field("endpoint", &self.endpoint)
            .field("api_key", &mask_secret(&self.api_key))
            .field("sender", &self.sender)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generates_configured_length_of_digits() {
        for length in [4, 6, 8] {
            let otp = OtpGenerator::new(length).generate().unwrap();
            assert_eq!(otp.len(), length);
            assert!(otp.bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn consecutive_codes_differ() {
        let gen = OtpGenerator::new(6);
        let codes: HashSet<String> = (0..32).map(|_| gen.generate().unwrap()).collect();
        // 32 identical draws from a uniform 6-digit space would mean a
        // broken RNG, not bad luck.
        assert!(codes.len() > 1);
    }

    #[test]
    fn verify_matches_exact_code_only() {
        assert!(verify_otp("417829", "417829"));
        assert!(!verify_otp("417828", "417829"));
        assert!(!verify_otp("41782", "417829"));
        assert!(!verify_otp("", "417829"));
    }

    #[test]
    fn mask_hides_middle() {
        assert_eq!(mask_secret("re_1234567890abcd"), "re_1****abcd");
        assert_eq!(mask_secret("short"), "****");
    }
}
