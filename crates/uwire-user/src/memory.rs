//! In-memory backends for tests and local development.
//!
//! These honor the same contracts as the production implementations: the
//! repository hashes passwords and enforces uniqueness, the cache expires
//! entries by TTL, and the mailer records what it would have delivered.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::cache::Cache;
use crate::entities::{IdempotencyRecord, User, ValidatedUser};
use crate::error::UserError;
use crate::otp::OtpMailer;
use crate::password;
use crate::repository::{IdempotencyRepository, UserRepository};

/// In-memory user store with unique username/email enforcement.
#[derive(Debug, Default)]
pub struct MemoryUserRepository {
    users: Mutex<HashMap<Uuid, User>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn create(&self, user: ValidatedUser) -> Result<User, UserError> {
        let mut user = user.into_user();
        user.password = password::hash_password(&user.password)?;

        let mut users = self.users.lock();
        // The store itself is the uniqueness arbiter, as the unique index is
        // in Postgres.
        if users.values().any(|u| u.username == user.username) {
            return Err(UserError::Conflict("username already exists".to_string()));
        }
        if users.values().any(|u| u.email == user.email) {
            return Err(UserError::Conflict("email already exists".to_string()));
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, UserError> {
        Ok(self.users.lock().get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, UserError> {
        Ok(self
            .users
            .lock()
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserError> {
        Ok(self
            .users
            .lock()
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn append_token(&self, id: Uuid, token: &str) -> Result<(), UserError> {
        let mut users = self.users.lock();
        match users.get_mut(&id) {
            Some(user) => {
                user.add_token(token);
                Ok(())
            }
            None => Err(UserError::Upstream("database error: no such row".to_string())),
        }
    }
}

/// In-memory idempotency store.
#[derive(Debug, Default)]
pub struct MemoryIdempotencyRepository {
    records: Mutex<HashMap<String, IdempotencyRecord>>,
}

impl MemoryIdempotencyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyRepository for MemoryIdempotencyRepository {
    async fn find_by_key(&self, key: &str) -> Result<Option<IdempotencyRecord>, UserError> {
        Ok(self.records.lock().get(key).cloned())
    }

    async fn create(&self, record: &IdempotencyRecord) -> Result<(), UserError> {
        let mut records = self.records.lock();
        if records.contains_key(&record.key) {
            return Err(UserError::Conflict("duplicate row".to_string()));
        }
        records.insert(record.key.clone(), record.clone());
        Ok(())
    }
}

/// In-memory TTL cache; entries expire lazily on read.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force-expire a key, simulating TTL passage in tests.
    pub fn expire(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .lock()
            .get(key)
            .is_some_and(|(_, deadline)| *deadline > now)
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, UserError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((value, deadline)) if *deadline > now => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), UserError> {
        self.entries
            .lock()
            .insert(key.to_owned(), (value.to_owned(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), UserError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Mailer that records deliveries instead of sending them.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<(String, String)>>,
    fail_next: AtomicBool,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next delivery fail, simulating a provider outage.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// The most recent OTP delivered to `recipient`.
    pub fn last_otp(&self, recipient: &str) -> Option<String> {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|(to, _)| to == recipient)
            .map(|(_, otp)| otp.clone())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl OtpMailer for MemoryMailer {
    async fn send_otp(&self, recipient: &str, otp: &str) -> Result<(), UserError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(UserError::Upstream(
                "failed to send OTP: provider unavailable".to_string(),
            ));
        }
        self.sent
            .lock()
            .push((recipient.to_owned(), otp.to_owned()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn repository_hashes_passwords_and_enforces_uniqueness() {
        let repo = MemoryUserRepository::new();
        let created = repo
            .create(ValidatedUser::new(User::new("alice", "a@x", "hunter22")).unwrap())
            .await
            .unwrap();
        assert_ne!(created.password, "hunter22");

        let dup_name = repo
            .create(ValidatedUser::new(User::new("alice", "b@x", "pw")).unwrap())
            .await;
        assert!(
            matches!(dup_name, Err(UserError::Conflict(ref m)) if m == "username already exists")
        );

        let dup_email = repo
            .create(ValidatedUser::new(User::new("bob", "a@x", "pw")).unwrap())
            .await;
        assert!(
            matches!(dup_email, Err(UserError::Conflict(ref m)) if m == "email already exists")
        );
    }

    #[tokio::test]
    async fn append_token_updates_row() {
        let repo = MemoryUserRepository::new();
        let created = repo
            .create(ValidatedUser::new(User::new("alice", "a@x", "pw")).unwrap())
            .await
            .unwrap();
        repo.append_token(created.id, "tok-1").await.unwrap();
        repo.append_token(created.id, "tok-2").await.unwrap();
        let user = repo.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(user.tokens, vec!["tok-1", "tok-2"]);
    }

    #[tokio::test]
    async fn cache_expires_by_ttl() {
        let cache = MemoryCache::new();
        cache
            .set("otp:a@x", "417829", Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(cache.get("otp:a@x").await.unwrap().as_deref(), Some("417829"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("otp:a@x").await.unwrap(), None);
    }

    #[tokio::test]
    async fn mailer_records_and_fails_on_demand() {
        let mailer = MemoryMailer::new();
        mailer.send_otp("a@x", "123456").await.unwrap();
        assert_eq!(mailer.last_otp("a@x").as_deref(), Some("123456"));

        mailer.fail_next();
        assert!(mailer.send_otp("a@x", "654321").await.is_err());
        // failure did not record a delivery
        assert_eq!(mailer.sent_count(), 1);
    }
}
