//! Blacklist of revoked refresh tokens.
//!
//! Access tokens are stateless and never stored. A refresh token is only
//! written here once it has been revoked (logout or rotation), keyed by JTI.

use sqlx::sqlite::SqlitePool;

/// Store for the refresh token blacklist.
pub struct BlacklistStore {
    pool: SqlitePool,
}

impl BlacklistStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Blacklist a token. Returns false if the JTI was already blacklisted.
    pub async fn add(
        &self,
        jti: &str,
        user_uuid: &str,
        expires_at: u64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO blacklisted_tokens (jti, user_uuid, expires_at) VALUES (?, ?, ?)
             ON CONFLICT(jti) DO NOTHING",
        )
        .bind(jti)
        .bind(user_uuid)
        .bind(expires_at as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn is_blacklisted(&self, jti: &str) -> Result<bool, sqlx::Error> {
        let count: (i32,) = sqlx::query_as("SELECT COUNT(*) FROM blacklisted_tokens WHERE jti = ?")
            .bind(jti)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0 > 0)
    }

    /// Delete entries whose tokens have expired on their own. Returns the number removed.
    pub async fn delete_expired(&self, now: u64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM blacklisted_tokens WHERE expires_at < ?")
            .bind(now as i64)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
