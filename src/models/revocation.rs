// Revoked token identifiers
// Read on every authenticated request, written on logout and account deletion

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};

use crate::models::auth::TokenType;
use crate::schema::token_revocations;

/// Revocation record; entries past expires_at no longer affect decisions
/// and are removed by the sweep job.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = token_revocations)]
#[diesel(primary_key(jti))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TokenRevocation {
    pub jti: String,
    pub token_type: String,
    pub revoked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = token_revocations)]
pub struct NewTokenRevocation {
    pub jti: String,
    pub token_type: String,
    pub revoked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub reason: String,
}

impl NewTokenRevocation {
    pub fn new(
        jti: impl Into<String>,
        token_type: TokenType,
        expires_at: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            jti: jti.into(),
            token_type: token_type.as_str().to_string(),
            revoked_at: Utc::now(),
            expires_at,
            reason: reason.into(),
        }
    }
}

impl TokenRevocation {
    /// Insert a revocation; re-revoking the same jti is not an error
    pub async fn insert(
        conn: &mut AsyncPgConnection,
        entry: NewTokenRevocation,
    ) -> Result<(), diesel::result::Error> {
        diesel::insert_into(token_revocations::table)
            .values(&entry)
            .on_conflict(token_revocations::jti)
            .do_nothing()
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Point lookup by jti
    pub async fn exists(
        conn: &mut AsyncPgConnection,
        jti: &str,
    ) -> Result<bool, diesel::result::Error> {
        diesel::select(diesel::dsl::exists(
            token_revocations::table.filter(token_revocations::jti.eq(jti)),
        ))
        .get_result(conn)
        .await
    }

    /// Remove entries whose backing tokens have expired
    pub async fn sweep_expired(
        conn: &mut AsyncPgConnection,
        now: DateTime<Utc>,
    ) -> Result<usize, diesel::result::Error> {
        diesel::delete(token_revocations::table.filter(token_revocations::expires_at.lt(now)))
            .execute(conn)
            .await
    }
}
