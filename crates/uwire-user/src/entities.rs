//! Domain entities: users, validated users, idempotency records.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::UserError;

/// A user account.
///
/// Serialization is used for the ephemeral `user:<email>` pending snapshot
/// and the `profile:<userID>` cache value; the outbound projection is
/// [`UserResult`], which never carries the password or token list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub tokens: Vec<String>,
    #[serde(default)]
    pub is_verified: bool,
}

impl User {
    /// Build a fresh, unverified user from registration input.
    pub fn new(username: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            username: username.into(),
            email: email.into(),
            password: password.into(),
            tokens: Vec::new(),
            is_verified: false,
        }
    }

    fn validate(&self) -> Result<(), UserError> {
        if self.username.is_empty() {
            return Err(UserError::validation("username must not be empty"));
        }
        if self.email.is_empty() {
            return Err(UserError::validation("email must not be empty"));
        }
        if self.password.is_empty() {
            return Err(UserError::validation("password must not be empty"));
        }
        if self.created_at > self.updated_at {
            return Err(UserError::validation(
                "created_at must be before updated_at",
            ));
        }
        Ok(())
    }

    pub fn mark_verified(&mut self) {
        self.is_verified = true;
        self.updated_at = OffsetDateTime::now_utc();
    }

    pub fn add_token(&mut self, token: impl Into<String>) {
        self.tokens.push(token.into());
        self.updated_at = OffsetDateTime::now_utc();
    }
}

/// A user that has passed structural validation.
///
/// Repositories only accept this type on write paths, so every persisted
/// row went through [`User::validate`].
#[derive(Debug, Clone)]
pub struct ValidatedUser(User);

impl ValidatedUser {
    pub fn new(user: User) -> Result<Self, UserError> {
        user.validate()?;
        Ok(Self(user))
    }

    pub fn as_user(&self) -> &User {
        &self.0
    }

    pub fn into_user(self) -> User {
        self.0
    }
}

/// Makes a mutating request safe to retry with byte-identical results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub id: Uuid,
    pub key: String,
    pub request: String,
    pub response: String,
    pub status_code: i32,
    pub created_at: OffsetDateTime,
}

impl IdempotencyRecord {
    pub fn new(key: impl Into<String>, request: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: key.into(),
            request: request.into(),
            response: String::new(),
            status_code: 0,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn set_response(&mut self, response: impl Into<String>, status_code: i32) {
        self.response = response.into();
        self.status_code = status_code;
    }
}

/// Outbound projection of a user record.
///
/// Excludes the password hash and token list by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResult {
    pub id: Uuid,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub username: String,
    pub email: String,
    pub is_verified: bool,
}

impl From<&User> for UserResult {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            created_at: user.created_at,
            updated_at: user.updated_at,
            username: user.username.clone(),
            email: user.email.clone(),
            is_verified: user.is_verified,
        }
    }
}
