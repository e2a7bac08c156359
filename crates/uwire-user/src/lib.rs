//! User identity domain for uwire.
//!
//! Implements the OTP-gated registration state machine, password login with
//! bearer-token issuance, and the read-through profile cache, on top of
//! pluggable repository, cache, and mailer backends.

pub mod cache;
pub mod entities;
pub mod error;
pub mod memory;
pub mod otp;
pub mod password;
pub mod queries;
pub mod rate_limit;
pub mod repository;
pub mod rpc;
pub mod service;
pub mod token;

pub use cache::{Cache, DisabledCache, RedisCache, UserCache};
pub use entities::{IdempotencyRecord, User, UserResult, ValidatedUser};
pub use error::UserError;
pub use memory::{MemoryCache, MemoryIdempotencyRepository, MemoryMailer, MemoryUserRepository};
pub use otp::{mask_secret, OtpGenerator, OtpMailer, ResendMailer};
pub use rate_limit::RateLimiter;
pub use repository::{
    connect_pool, IdempotencyRepository, PgIdempotencyRepository, PgUserRepository, UserRepository,
};
pub use rpc::UserRpc;
pub use service::{
    LoginCommand, LoginResult, ProfileResult, RegisterCommand, RegisterResult, SendOtpCommand,
    SendOtpResult, UserService, VerifyOtpCommand, VerifyOtpResult,
};
pub use token::TokenIssuer;
