//! SQL text for the Postgres repositories.
//!
//! Expected schema (managed outside this service; no migration runner ships):
//!
//! ```sql
//! CREATE TABLE users (
//!     id          uuid PRIMARY KEY,
//!     created_at  timestamptz NOT NULL,
//!     updated_at  timestamptz NOT NULL,
//!     deleted_at  timestamptz,
//!     username    text UNIQUE NOT NULL,
//!     email       text UNIQUE NOT NULL,
//!     password    text NOT NULL,
//!     tokens      text[] NOT NULL DEFAULT '{}',
//!     is_verified boolean NOT NULL DEFAULT false
//! );
//!
//! CREATE TABLE idempotency (
//!     id          uuid PRIMARY KEY,
//!     key         text UNIQUE NOT NULL,
//!     request     text NOT NULL,
//!     response    text NOT NULL,
//!     status_code integer NOT NULL,
//!     created_at  timestamptz NOT NULL
//! );
//! ```

pub const INSERT_USER: &str = "INSERT INTO users \
     (id, created_at, updated_at, username, email, password, tokens, is_verified) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
     RETURNING id, created_at, updated_at, username, email, password, tokens, is_verified";

// Soft-deleted rows are invisible to every read.
pub const SELECT_BY_ID: &str = "SELECT id, created_at, updated_at, username, email, password, \
     tokens, is_verified FROM users WHERE id = $1 AND deleted_at IS NULL";

pub const SELECT_BY_USERNAME: &str = "SELECT id, created_at, updated_at, username, email, \
     password, tokens, is_verified FROM users WHERE username = $1 AND deleted_at IS NULL";

pub const SELECT_BY_EMAIL: &str = "SELECT id, created_at, updated_at, username, email, \
     password, tokens, is_verified FROM users WHERE email = $1 AND deleted_at IS NULL";

/// Append-only token update, scoped to the row.
pub const APPEND_TOKEN: &str =
    "UPDATE users SET tokens = array_append(tokens, $2), updated_at = $3 WHERE id = $1";

pub const FIND_IDEMPOTENCY_BY_KEY: &str = "SELECT id, key, request, response, status_code, \
     created_at FROM idempotency WHERE key = $1";

pub const INSERT_IDEMPOTENCY: &str = "INSERT INTO idempotency \
     (id, key, request, response, status_code, created_at) \
     VALUES ($1, $2, $3, $4, $5, $6)";
