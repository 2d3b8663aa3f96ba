// Durable revocation store behind a swappable trait
// The middleware decides what a store failure means; this layer only reports it

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use crate::db::DieselPool;
use crate::models::revocation::{NewTokenRevocation, TokenRevocation};

#[derive(Debug, Error)]
pub enum RevocationError {
    #[error("Revocation store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),
}

/// Durable record of revoked token identifiers.
/// Implementations must be safe for concurrent use; `is_revoked` is on the
/// hot path of every authenticated request.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Record a revocation. Idempotent: an already-present jti is not an error.
    async fn revoke(&self, entry: NewTokenRevocation) -> Result<(), RevocationError>;

    /// Point lookup: has this jti been revoked?
    async fn is_revoked(&self, jti: &str) -> Result<bool, RevocationError>;

    /// Evict entries with `expires_at < now`; returns how many were removed.
    /// Correctness does not depend on when this runs.
    async fn sweep(&self, now: DateTime<Utc>) -> Result<usize, RevocationError>;
}

/// Postgres-backed store over the shared connection pool
pub struct DieselRevocationStore {
    pool: DieselPool,
}

impl DieselRevocationStore {
    pub fn new(pool: DieselPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RevocationStore for DieselRevocationStore {
    async fn revoke(&self, entry: NewTokenRevocation) -> Result<(), RevocationError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| RevocationError::Unavailable(e.to_string()))?;

        TokenRevocation::insert(&mut conn, entry).await?;
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, RevocationError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| RevocationError::Unavailable(e.to_string()))?;

        Ok(TokenRevocation::exists(&mut conn, jti).await?)
    }

    async fn sweep(&self, now: DateTime<Utc>) -> Result<usize, RevocationError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| RevocationError::Unavailable(e.to_string()))?;

        let swept = TokenRevocation::sweep_expired(&mut conn, now).await?;
        if swept > 0 {
            info!(swept, "Swept expired revocation entries");
        }
        Ok(swept)
    }
}

/// What to do when the store cannot answer. The fail-open choice trades
/// security for availability and must stay an explicit, configured decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationPolicy {
    FailOpen,
    FailClosed,
}

impl RevocationPolicy {
    pub fn from_fail_open(fail_open: bool) -> Self {
        if fail_open {
            RevocationPolicy::FailOpen
        } else {
            RevocationPolicy::FailClosed
        }
    }
}
